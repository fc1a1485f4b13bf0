use chrono::{DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use strum::EnumIter;

pub use strum::IntoEnumIterator;

pub type TimePeriodString = String;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Hash, EnumIter)]
#[serde(rename_all = "kebab-case")]
pub enum TimePeriod {
    Day,
    Week,
    Month,
    Quarter,
    Year,
    AllTime,
}

impl TimePeriod {
    pub fn time_string(&self, date: NaiveDate) -> TimePeriodString {
        match self {
            TimePeriod::Day => date.format(crate::calendar::DATE_FORMAT).to_string(),
            TimePeriod::Week => format!("{}W{:02}", date.iso_week().year(), date.iso_week().week()),
            TimePeriod::Month => format!("{:02}{:04}", date.month(), date.year()),
            TimePeriod::Quarter => format!("{}Q{}", date.year(), date.month0() / 3 + 1),
            TimePeriod::Year => date.year().to_string(),
            TimePeriod::AllTime => "all-time".to_string(),
        }
    }

    /// First date (inclusive) of the rolling window that ends at `today`.
    ///
    /// `Week` is the last seven calendar days, not the ISO week. `AllTime` has
    /// no lower bound.
    pub fn window_start(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            TimePeriod::Day => Some(today),
            TimePeriod::Week => today.checked_sub_days(Days::new(6)),
            TimePeriod::Month => today
                .checked_sub_months(Months::new(1))?
                .checked_add_days(Days::new(1)),
            TimePeriod::Quarter => today
                .checked_sub_months(Months::new(3))?
                .checked_add_days(Days::new(1)),
            TimePeriod::Year => today
                .checked_sub_months(Months::new(12))?
                .checked_add_days(Days::new(1)),
            TimePeriod::AllTime => None,
        }
    }
}

/// Where a calendar day starts for the people we count streaks for.
///
/// The metrics never read a clock: whoever holds the wall-clock instant turns
/// it into explicit `today`/`yesterday` dates here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::utc()
    }
}

impl DayBoundary {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Offsets outside of +-24h are rejected.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(minutes.checked_mul(60)?)?;
        Some(Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    pub fn today_and_yesterday(&self, now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
        let today = self.today(now);
        let yesterday = today.pred_opt().unwrap_or(today);
        (today, yesterday)
    }
}
