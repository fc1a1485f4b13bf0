use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calendar entry as the GitHub contribution calendar reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawContributionDay {
    pub date: String,
    pub contribution_count: i64,
}

impl RawContributionDay {
    pub fn new(date: impl Into<String>, contribution_count: i64) -> Self {
        Self {
            date: date.into(),
            contribution_count,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContributionDay {
    pub date: NaiveDate,
    pub count: u32,
}

impl TryFrom<&RawContributionDay> for ContributionDay {
    type Error = ();

    fn try_from(raw: &RawContributionDay) -> Result<Self, Self::Error> {
        let date = NaiveDate::parse_from_str(raw.date.trim(), DATE_FORMAT).map_err(|_| ())?;
        let count = u32::try_from(raw.contribution_count).map_err(|_| ())?;
        Ok(Self { date, count })
    }
}

/// Per-day contribution counts keyed by date.
///
/// Producers hand the days over in whatever order they like (GitHub groups
/// them by week, newest or oldest first depending on the caller), so the
/// calendar never keeps the input order. Entries are deduplicated by date with
/// the last write winning, and a date without an entry counts as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContributionCalendar {
    days: BTreeMap<NaiveDate, u32>,
    reported_total: Option<u32>,
}

impl ContributionCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a calendar from raw entries, skipping malformed dates and
    /// negative counts.
    pub fn from_raw<'a>(raw: impl IntoIterator<Item = &'a RawContributionDay>) -> Self {
        raw.into_iter()
            .filter_map(|day| ContributionDay::try_from(day).ok())
            .collect()
    }

    /// Total contributions as reported by the producer, if it reports one.
    pub fn with_reported_total(mut self, total: Option<u32>) -> Self {
        self.reported_total = total;
        self
    }

    pub fn reported_total(&self) -> Option<u32> {
        self.reported_total
    }

    pub fn insert(&mut self, day: ContributionDay) {
        self.days.insert(day.date, day.count);
    }

    pub fn count_on(&self, date: NaiveDate) -> u32 {
        self.days.get(&date).copied().unwrap_or_default()
    }

    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.count_on(date) > 0
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Days ordered from the most recent to the oldest.
    pub fn newest_first(&self) -> impl Iterator<Item = ContributionDay> + '_ {
        self.days
            .iter()
            .rev()
            .map(|(date, count)| ContributionDay {
                date: *date,
                count: *count,
            })
    }

    /// Days ordered from the oldest to the most recent.
    pub fn oldest_first(&self) -> impl Iterator<Item = ContributionDay> + '_ {
        self.days.iter().map(|(date, count)| ContributionDay {
            date: *date,
            count: *count,
        })
    }

    /// Sum of the counts over the inclusive date range `from..=to`.
    pub fn sum_between(&self, from: NaiveDate, to: NaiveDate) -> u32 {
        if from > to {
            return 0;
        }
        self.days
            .range(from..=to)
            .map(|(_, count)| *count)
            .fold(0u32, u32::saturating_add)
    }

    /// Sum of every count on or before `until`.
    pub fn sum_until(&self, until: NaiveDate) -> u32 {
        self.days
            .range(..=until)
            .map(|(_, count)| *count)
            .fold(0u32, u32::saturating_add)
    }

    /// Number of active days on or before `until`.
    pub fn active_days_until(&self, until: NaiveDate) -> u32 {
        self.days
            .range(..=until)
            .filter(|(_, count)| **count > 0)
            .count() as u32
    }

    /// Most recent active day on or before `until`.
    pub fn last_active_on_or_before(&self, until: NaiveDate) -> Option<NaiveDate> {
        self.days
            .range(..=until)
            .rev()
            .find(|(_, count)| **count > 0)
            .map(|(date, _)| *date)
    }

    /// Commit totals per weekday, Monday first, for days in `since..=until`.
    pub fn weekday_totals(&self, since: NaiveDate, until: NaiveDate) -> [(Weekday, u32); 7] {
        let mut totals: [(Weekday, u32); 7] = [
            (Weekday::Mon, 0),
            (Weekday::Tue, 0),
            (Weekday::Wed, 0),
            (Weekday::Thu, 0),
            (Weekday::Fri, 0),
            (Weekday::Sat, 0),
            (Weekday::Sun, 0),
        ];
        if since > until {
            return totals;
        }
        for (date, count) in self.days.range(since..=until) {
            let slot = &mut totals[date.weekday().num_days_from_monday() as usize].1;
            *slot = slot.saturating_add(*count);
        }
        totals
    }

    /// Commit totals per `(year, month)` up to `until`, oldest month first.
    pub fn monthly_totals(&self, until: NaiveDate) -> Vec<((i32, u32), u32)> {
        self.days
            .range(..=until)
            .chunk_by(|(date, _)| (date.year(), date.month()))
            .into_iter()
            .map(|(month, days)| {
                (
                    month,
                    days.map(|(_, count)| *count).fold(0u32, u32::saturating_add),
                )
            })
            .collect()
    }

    /// Average contributions per day over the `days` days ending at `today`.
    pub fn average_daily(&self, today: NaiveDate, days: u32) -> f64 {
        if days == 0 {
            return 0.0;
        }
        let from = today
            .checked_sub_days(Days::new(u64::from(days) - 1))
            .unwrap_or(NaiveDate::MIN);
        f64::from(self.sum_between(from, today)) / f64::from(days)
    }

    /// Entries in the wire shape, oldest first.
    pub fn to_raw(&self) -> Vec<RawContributionDay> {
        self.oldest_first()
            .map(|day| {
                RawContributionDay::new(day.date.format(DATE_FORMAT).to_string(), day.count.into())
            })
            .collect()
    }
}

impl FromIterator<ContributionDay> for ContributionCalendar {
    fn from_iter<T: IntoIterator<Item = ContributionDay>>(iter: T) -> Self {
        let mut calendar = Self::new();
        for day in iter {
            calendar.insert(day);
        }
        calendar
    }
}

/// Heat-map intensity for a day: 0 for no activity, then 1-3, 4-6, 7-9, 10+.
pub const fn activity_level(count: u32) -> u8 {
    match count {
        0 => 0,
        1..=3 => 1,
        4..=6 => 2,
        7..=9 => 3,
        _ => 4,
    }
}
