use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};

/// Output period of a resampling call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Monthly,
    Annual,
}

impl Frequency {
    /// Accepts the names used in config files and on the command line
    /// ("daily", "1D", "monthly", "1M", "annual", "A", ...)
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "d" | "1d" | "day" | "daily" => Ok(Frequency::Daily),
            "m" | "1m" | "month" | "monthly" => Ok(Frequency::Monthly),
            "a" | "y" | "1a" | "1y" | "year" | "annual" | "yearly" => Ok(Frequency::Annual),
            _ => Err(ProcessingError::Config(format!(
                "Unsupported resampling frequency: '{}'",
                s
            ))),
        }
    }

    /// First date of the period containing `date`
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Daily => date,
            Frequency::Monthly => date.with_day(1).unwrap_or(date),
            Frequency::Annual => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    /// First date of the period following the one starting at `start`
    pub fn next_period(&self, start: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Daily => start + Duration::days(1),
            Frequency::Monthly => {
                let (year, month) = if start.month() == 12 {
                    (start.year() + 1, 1)
                } else {
                    (start.year(), start.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(start)
            }
            Frequency::Annual => NaiveDate::from_ymd_opt(start.year() + 1, 1, 1).unwrap_or(start),
        }
    }

    /// Format used for the period label in output tables
    pub fn label_format(&self) -> &'static str {
        match self {
            Frequency::Daily => "%Y-%m-%d",
            Frequency::Monthly => "%Y-%m",
            Frequency::Annual => "%Y",
        }
    }

    pub fn file_tag(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Monthly => "monthly",
            Frequency::Annual => "annual",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_tag())
    }
}

/// How a sub-daily timestamp is assigned to an output period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinConvention {
    /// Timestamps mark the end of their averaging interval, so
    /// `2010-01-02 00:00` closes January 1st.
    #[default]
    IntervalEnding,
    /// Timestamps belong to the calendar period they fall in.
    Floor,
}

impl BinConvention {
    /// Calendar date used for binning a timestamp from a series with `step`
    pub fn bin_date(&self, timestamp: NaiveDateTime, step: Duration) -> NaiveDate {
        match self {
            BinConvention::IntervalEnding => (timestamp - step).date(),
            BinConvention::Floor => timestamp.date(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_frequency_aliases() {
        assert_eq!(Frequency::parse("1D").unwrap(), Frequency::Daily);
        assert_eq!(Frequency::parse("monthly").unwrap(), Frequency::Monthly);
        assert_eq!(Frequency::parse("A").unwrap(), Frequency::Annual);
        assert!(Frequency::parse("weekly").is_err());
    }

    #[test]
    fn test_period_boundaries() {
        assert_eq!(
            Frequency::Monthly.period_start(date(2012, 2, 29)),
            date(2012, 2, 1)
        );
        assert_eq!(
            Frequency::Monthly.next_period(date(2012, 12, 1)),
            date(2013, 1, 1)
        );
        assert_eq!(
            Frequency::Annual.period_start(date(2012, 7, 4)),
            date(2012, 1, 1)
        );
        assert_eq!(
            Frequency::Daily.next_period(date(2012, 2, 28)),
            date(2012, 2, 29)
        );
    }

    #[test]
    fn test_interval_ending_midnight_closes_previous_day() {
        let step = Duration::minutes(30);
        let midnight = date(2011, 1, 1).and_hms_opt(0, 0, 0).unwrap();

        assert_eq!(
            BinConvention::IntervalEnding.bin_date(midnight, step),
            date(2010, 12, 31)
        );
        assert_eq!(BinConvention::Floor.bin_date(midnight, step), date(2011, 1, 1));
    }
}
