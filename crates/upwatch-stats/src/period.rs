//! Reporting periods and chart buckets.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, DurationRound, Months, NaiveTime, Utc};

use crate::error::StatsError;

/// A trailing window ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    Hour,
    SixHours,
    #[default]
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Period {
    /// `[now - period, now]`.
    pub fn range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = match self {
            Period::Hour => now - Duration::hours(1),
            Period::SixHours => now - Duration::hours(6),
            Period::Day => now - Duration::days(1),
            Period::Week => now - Duration::weeks(1),
            Period::Month => now - Duration::days(30),
            Period::Quarter => now - Duration::days(90),
            Period::Year => now
                .checked_sub_months(Months::new(12))
                .unwrap_or(now - Duration::days(365)),
        };
        (start, now)
    }

    /// Chart bucket size suited to the period.
    pub fn bucket(&self) -> Bucket {
        match self {
            Period::Hour | Period::SixHours | Period::Day => Bucket::Hour,
            Period::Week | Period::Month | Period::Quarter => Bucket::Day,
            Period::Year => Bucket::Month,
        }
    }
}

impl FromStr for Period {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1h" => Ok(Period::Hour),
            "6h" => Ok(Period::SixHours),
            "24h" => Ok(Period::Day),
            "7d" => Ok(Period::Week),
            "30d" => Ok(Period::Month),
            "90d" => Ok(Period::Quarter),
            "1y" => Ok(Period::Year),
            other => Err(StatsError::UnknownPeriod(other.to_string())),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Period::Hour => "1h",
            Period::SixHours => "6h",
            Period::Day => "24h",
            Period::Week => "7d",
            Period::Month => "30d",
            Period::Quarter => "90d",
            Period::Year => "1y",
        })
    }
}

/// Timestamp truncation used to group chart points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Hour,
    Day,
    Month,
}

impl Bucket {
    /// Start of the bucket containing `at`.
    pub fn truncate(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Bucket::Hour => at.duration_trunc(Duration::hours(1)).unwrap_or(at),
            Bucket::Day => at.date_naive().and_time(NaiveTime::MIN).and_utc(),
            Bucket::Month => {
                let date = at.date_naive();
                date.with_day(1)
                    .unwrap_or(date)
                    .and_time(NaiveTime::MIN)
                    .and_utc()
            }
        }
    }

    pub fn label(&self, bucket_start: DateTime<Utc>) -> String {
        let format = match self {
            Bucket::Hour => "%Y-%m-%d %H:00:00",
            Bucket::Day => "%Y-%m-%d",
            Bucket::Month => "%Y-%m",
        };
        bucket_start.format(format).to_string()
    }
}
