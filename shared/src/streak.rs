use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

use super::*;

/// Stats derived from a contribution calendar on every sync.
///
/// Always recomputed from scratch and stored wholesale; nothing here is ever
/// patched incrementally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub streak: u32,
    pub total_commits: u32,
    pub today_commits: u32,
    pub yesterday_commits: u32,
    pub weekly_commits: u32,
    pub active_days: u32,
}

pub const WEEK_IN_DAYS: u64 = 7;

pub fn compute_streak_stats(
    calendar: &ContributionCalendar,
    today: NaiveDate,
    yesterday: NaiveDate,
) -> UserStats {
    UserStats {
        streak: current_streak(calendar, today, yesterday),
        total_commits: calendar
            .reported_total()
            .unwrap_or_else(|| calendar.sum_until(today)),
        today_commits: calendar.count_on(today),
        yesterday_commits: calendar.count_on(yesterday),
        weekly_commits: weekly_commits(calendar, today),
        active_days: calendar.active_days_until(today),
    }
}

/// Sum over the seven calendar dates ending at `today`, inclusive.
pub fn weekly_commits(calendar: &ContributionCalendar, today: NaiveDate) -> u32 {
    let from = today
        .checked_sub_days(Days::new(WEEK_IN_DAYS - 1))
        .unwrap_or(NaiveDate::MIN);
    calendar.sum_between(from, today)
}

pub fn window_commits(calendar: &ContributionCalendar, today: NaiveDate, period: TimePeriod) -> u32 {
    let from = period.window_start(today).unwrap_or(NaiveDate::MIN);
    calendar.sum_between(from, today)
}

/// Length of the chain of active days that is still alive.
///
/// The chain has to end today or yesterday: a day without contributions only
/// breaks it once the whole day has passed, so an empty `today` keeps the run
/// that ended `yesterday`. Days after `today` are ignored. A missing day and a
/// zero-count day both break the chain.
pub fn current_streak(calendar: &ContributionCalendar, today: NaiveDate, yesterday: NaiveDate) -> u32 {
    let Some(last_active) = calendar.last_active_on_or_before(today) else {
        return 0;
    };
    if last_active != today && last_active != yesterday {
        return 0;
    }
    run_ending_at(calendar, last_active)
}

fn run_ending_at(calendar: &ContributionCalendar, last: NaiveDate) -> u32 {
    let mut length = 0;
    let mut day = Some(last);
    while let Some(date) = day {
        if !calendar.is_active_on(date) {
            break;
        }
        length += 1;
        day = date.pred_opt();
    }
    length
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRun {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub length: u32,
}

/// Every maximal run of consecutive active days, newest first.
pub fn streak_history(calendar: &ContributionCalendar) -> Vec<StreakRun> {
    let mut runs: Vec<StreakRun> = Vec::new();
    for day in calendar.oldest_first().filter(|day| day.count > 0) {
        match runs.last_mut() {
            Some(run) if run.end.succ_opt() == Some(day.date) => {
                run.end = day.date;
                run.length += 1;
            }
            _ => runs.push(StreakRun {
                start: day.date,
                end: day.date,
                length: 1,
            }),
        }
    }
    runs.reverse();
    runs
}

pub fn longest_streak(calendar: &ContributionCalendar) -> u32 {
    streak_history(calendar)
        .iter()
        .map(|run| run.length)
        .max()
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum StreakBadge {
    #[strum(to_string = "First Week")]
    FirstWeek,
    Consistent,
    Unstoppable,
    Legend,
    Immortal,
}

impl StreakBadge {
    pub const fn required_days(&self) -> u32 {
        match self {
            Self::FirstWeek => 7,
            Self::Consistent => 30,
            Self::Unstoppable => 60,
            Self::Legend => 100,
            Self::Immortal => 365,
        }
    }

    pub fn is_earned(&self, longest_streak: u32) -> bool {
        longest_streak >= self.required_days()
    }
}

pub fn earned_badges(longest_streak: u32) -> Vec<StreakBadge> {
    StreakBadge::iter()
        .filter(|badge| badge.is_earned(longest_streak))
        .collect()
}
