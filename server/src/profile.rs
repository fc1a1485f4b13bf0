use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::Serialize;
use shared::{
    activity_level, earned_badges, longest_streak, streak_history, window_commits, DayBoundary,
    IntoEnumIterator, LeaderboardMetric, StreakBadge, StreakRun, TimePeriod, TimePeriodString,
    UserId, UserStats,
};
use tracing::instrument;

use crate::store::Store;
use crate::sync::MetricRank;

const HEAT_MAP_DAYS: u64 = 365;
const WEEKDAY_WINDOW_DAYS: u64 = 90;
const MONTHS_SHOWN: u32 = 6;
const AVERAGE_WINDOW_DAYS: u32 = 365;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("user {0} not found")]
    NotFound(UserId),
    #[error("the profile of {0} is private")]
    Private(UserId),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Users see their own profile and every public one.
pub async fn ensure_visible(
    store: &dyn Store,
    viewer: &str,
    user_id: &str,
) -> Result<(), ProfileError> {
    match store.is_public(user_id).await? {
        None => Err(ProfileError::NotFound(user_id.to_string())),
        Some(false) if viewer != user_id => Err(ProfileError::Private(user_id.to_string())),
        Some(_) => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOverview {
    pub user_id: UserId,
    pub stats: UserStats,
    pub ranks: Vec<MetricRank>,
}

#[instrument(skip(store))]
pub async fn user_overview(
    store: &dyn Store,
    viewer: &str,
    user_id: &str,
) -> Result<UserOverview, ProfileError> {
    ensure_visible(store, viewer, user_id).await?;
    let stats = store
        .stats(user_id)
        .await?
        .ok_or_else(|| ProfileError::NotFound(user_id.to_string()))?;

    let mut ranks = Vec::new();
    for metric in LeaderboardMetric::iter() {
        let rank = store.rank(user_id, metric).await?;
        ranks.push(MetricRank { metric, rank });
    }
    Ok(UserOverview {
        user_id: user_id.to_string(),
        stats,
        ranks,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatMapDay {
    pub date: NaiveDate,
    pub count: u32,
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekdayTotal {
    pub day: String,
    pub commits: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthTotal {
    pub month: TimePeriodString,
    pub commits: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodTotal {
    pub period: TimePeriod,
    pub key: TimePeriodString,
    pub commits: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub user_id: UserId,
    pub today: NaiveDate,
    /// One entry per day of the last year, oldest first, gaps as zero.
    pub heat_map: Vec<HeatMapDay>,
    /// Last 90 days, Monday first.
    pub weekdays: Vec<WeekdayTotal>,
    pub best_weekday: Option<String>,
    /// Last six months including the current one, oldest first.
    pub months: Vec<MonthTotal>,
    pub average_daily: f64,
    pub periods: Vec<PeriodTotal>,
    pub streaks: Vec<StreakRun>,
    pub longest_streak: u32,
    pub badges: Vec<StreakBadge>,
}

/// Charts and badges derived from the calendar stored by the last sync.
#[instrument(skip(store, boundary))]
pub async fn analytics(
    store: &dyn Store,
    viewer: &str,
    user_id: &str,
    boundary: DayBoundary,
    now: DateTime<Utc>,
) -> Result<Analytics, ProfileError> {
    ensure_visible(store, viewer, user_id).await?;
    let calendar = store
        .calendar(user_id)
        .await?
        .ok_or_else(|| ProfileError::NotFound(user_id.to_string()))?;
    let today = boundary.today(now);

    let first_day = today
        .checked_sub_days(Days::new(HEAT_MAP_DAYS - 1))
        .unwrap_or(today);
    let heat_map = first_day
        .iter_days()
        .take_while(|date| *date <= today)
        .map(|date| {
            let count = calendar.count_on(date);
            HeatMapDay {
                date,
                count,
                level: activity_level(count),
            }
        })
        .collect();

    let weekday_since = today
        .checked_sub_days(Days::new(WEEKDAY_WINDOW_DAYS - 1))
        .unwrap_or(today);
    let weekday_totals = calendar.weekday_totals(weekday_since, today);
    let best_weekday = weekday_totals
        .iter()
        .filter(|(_, commits)| *commits > 0)
        .max_by(|(day_a, a), (day_b, b)| {
            a.cmp(b)
                .then_with(|| day_b.num_days_from_monday().cmp(&day_a.num_days_from_monday()))
        })
        .map(|(day, _)| day.to_string());
    let weekdays = weekday_totals
        .iter()
        .map(|(day, commits)| WeekdayTotal {
            day: day.to_string(),
            commits: *commits,
        })
        .collect();

    let monthly = calendar.monthly_totals(today);
    let first_month = today
        .with_day(1)
        .and_then(|start| start.checked_sub_months(Months::new(MONTHS_SHOWN - 1)))
        .unwrap_or(today);
    let months = (0..MONTHS_SHOWN)
        .filter_map(|offset| first_month.checked_add_months(Months::new(offset)))
        .map(|month| MonthTotal {
            month: TimePeriod::Month.time_string(month),
            commits: monthly
                .iter()
                .find(|(key, _)| *key == (month.year(), month.month()))
                .map(|(_, commits)| *commits)
                .unwrap_or_default(),
        })
        .collect();

    let periods = TimePeriod::iter()
        .map(|period| PeriodTotal {
            period,
            key: period.time_string(today),
            commits: window_commits(&calendar, today, period),
        })
        .collect();

    let longest = longest_streak(&calendar);
    Ok(Analytics {
        user_id: user_id.to_string(),
        today,
        heat_map,
        weekdays,
        best_weekday,
        months,
        average_daily: calendar.average_daily(today, AVERAGE_WINDOW_DAYS),
        periods,
        streaks: streak_history(&calendar),
        longest_streak: longest,
        badges: earned_badges(longest),
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use shared::{ContributionCalendar, ContributionDay, RankRecord};

    use super::*;
    use crate::store::memory::{MemoryStore, MemoryUser};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    fn store() -> MemoryStore {
        let calendar: ContributionCalendar = [
            (date(2023, 6, 1), 40),
            (date(2024, 1, 15), 4),
            (date(2024, 6, 3), 2),
            (date(2024, 6, 8), 1),
            (date(2024, 6, 9), 12),
            (date(2024, 6, 10), 3),
            (date(2024, 6, 11), 50),
        ]
        .into_iter()
        .map(|(date, count)| ContributionDay { date, count })
        .collect();

        let store = MemoryStore::new();
        store.add_user(
            "alice",
            MemoryUser {
                is_public: true,
                stats: UserStats {
                    streak: 3,
                    ..Default::default()
                },
                calendar,
                ..Default::default()
            },
        );
        store.add_user(
            "hermit",
            MemoryUser {
                is_public: false,
                ..Default::default()
            },
        );
        store
    }

    #[rocket::async_test]
    async fn private_profiles_are_for_their_owner() {
        let store = store();
        assert!(ensure_visible(&store, "bob", "alice").await.is_ok());
        assert!(ensure_visible(&store, "hermit", "hermit").await.is_ok());
        assert!(matches!(
            ensure_visible(&store, "bob", "hermit").await,
            Err(ProfileError::Private(_))
        ));
        assert!(matches!(
            ensure_visible(&store, "bob", "ghost").await,
            Err(ProfileError::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn overview_lists_every_metric() {
        let store = store();
        store
            .record_rank("alice", LeaderboardMetric::Streak, Some(4))
            .await
            .unwrap();

        let overview = user_overview(&store, "bob", "alice").await.unwrap();
        assert_eq!(overview.stats.streak, 3);
        assert_eq!(overview.ranks.len(), 3);
        assert_eq!(
            overview.ranks[0],
            MetricRank {
                metric: LeaderboardMetric::Streak,
                rank: RankRecord {
                    current_rank: Some(4),
                    best_rank: Some(4),
                },
            }
        );

        let hidden = user_overview(&store, "bob", "hermit").await;
        assert!(matches!(hidden, Err(ProfileError::Private(_))));
    }

    #[rocket::async_test]
    async fn analytics_from_the_stored_calendar() {
        let store = store();
        let report = analytics(&store, "alice", "alice", DayBoundary::utc(), noon())
            .await
            .unwrap();

        assert_eq!(report.today, date(2024, 6, 10));
        assert_eq!(report.heat_map.len(), 365);
        assert_eq!(report.heat_map[0].date, date(2023, 6, 12));
        let last = report.heat_map.last().unwrap();
        assert_eq!((last.date, last.count, last.level), (date(2024, 6, 10), 3, 1));
        assert_eq!(report.heat_map[363].level, 4);

        // Mondays: the 3rd and the 10th. The 11th is tomorrow.
        assert_eq!(report.weekdays[0].day, "Mon");
        assert_eq!(report.weekdays[0].commits, 5);
        assert_eq!(report.weekdays[6].commits, 12);
        assert_eq!(report.best_weekday.as_deref(), Some("Sun"));

        let months: Vec<_> = report
            .months
            .iter()
            .map(|month| (month.month.as_str(), month.commits))
            .collect();
        assert_eq!(
            months,
            vec![
                ("012024", 4),
                ("022024", 0),
                ("032024", 0),
                ("042024", 0),
                ("052024", 0),
                ("062024", 18),
            ]
        );

        let week = report
            .periods
            .iter()
            .find(|period| period.period == TimePeriod::Week)
            .unwrap();
        assert_eq!(week.key, "2024W24");
        assert_eq!(week.commits, 16);
        assert_eq!(report.longest_streak, 4);
        assert_eq!(report.streaks[0].length, 4);
        assert!(report.badges.is_empty());
        assert!((report.average_daily - 22.0 / 365.0).abs() < 1e-9);
    }

    #[rocket::async_test]
    async fn analytics_respect_visibility() {
        let store = store();
        let result = analytics(&store, "bob", "hermit", DayBoundary::utc(), noon()).await;
        assert!(matches!(result, Err(ProfileError::Private(_))));

        let empty = analytics(&store, "hermit", "hermit", DayBoundary::utc(), noon())
            .await
            .unwrap();
        assert!(empty.heat_map.iter().all(|day| day.level == 0));
        assert_eq!(empty.best_weekday, None);
        assert_eq!(empty.longest_streak, 0);
    }
}
