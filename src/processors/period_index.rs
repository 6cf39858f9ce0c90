use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{ProcessingError, Result};
use crate::models::{BinConvention, Frequency};

/// Reduction applied to the members of one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Mean,
    Sum,
    Min,
    Max,
}

impl Aggregation {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mean" | "avg" => Ok(Aggregation::Mean),
            "sum" => Ok(Aggregation::Sum),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            _ => Err(ProcessingError::Config(format!(
                "Unknown aggregation: '{}'",
                s
            ))),
        }
    }

    /// Column-name suffix for a value rolled up with this reduction
    pub fn suffix(&self) -> &'static str {
        match self {
            Aggregation::Mean => "_avg",
            Aggregation::Sum => "_sum",
            Aggregation::Min => "_min",
            Aggregation::Max => "_max",
        }
    }

    /// Reduce `values`, skipping missing ones. No present values gives
    /// `NaN`, never zero.
    pub fn reduce(&self, values: &[f64]) -> f64 {
        let mut present = values.iter().copied().filter(|v| !v.is_nan());
        let first = match present.next() {
            Some(v) => v,
            None => return f64::NAN,
        };

        match self {
            Aggregation::Sum => present.fold(first, |acc, v| acc + v),
            Aggregation::Mean => {
                let (sum, count) = present.fold((first, 1usize), |(s, n), v| (s + v, n + 1));
                sum / count as f64
            }
            Aggregation::Min => present.fold(first, f64::min),
            Aggregation::Max => present.fold(first, f64::max),
        }
    }
}

/// Maps a sorted index onto consecutive output periods.
///
/// Every period from the first bin to the last is present, so a period
/// with no rows gets an empty range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodIndex {
    frequency: Frequency,
    periods: Vec<NaiveDate>,
    ranges: Vec<Range<usize>>,
}

impl PeriodIndex {
    /// Bin a half-hourly (or any regular) timestamp index
    pub fn from_timestamps(
        index: &[NaiveDateTime],
        step: Duration,
        frequency: Frequency,
        convention: BinConvention,
    ) -> Result<Self> {
        let bins: Vec<NaiveDate> = index
            .iter()
            .map(|ts| frequency.period_start(convention.bin_date(*ts, step)))
            .collect();
        Self::from_bin_dates(&bins, frequency)
    }

    /// Bin an index of dates, e.g. a daily table rolled up to months
    pub fn from_dates(dates: &[NaiveDate], frequency: Frequency) -> Result<Self> {
        let bins: Vec<NaiveDate> = dates.iter().map(|d| frequency.period_start(*d)).collect();
        Self::from_bin_dates(&bins, frequency)
    }

    fn from_bin_dates(bins: &[NaiveDate], frequency: Frequency) -> Result<Self> {
        let mut periods = Vec::new();
        let mut ranges = Vec::new();

        let (first, last) = match (bins.first(), bins.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                return Ok(Self {
                    frequency,
                    periods,
                    ranges,
                })
            }
        };

        if bins.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(ProcessingError::IndexMismatch(
                "Cannot bin an unsorted index into periods".to_string(),
            ));
        }

        let mut row = 0;
        let mut period = first;
        while period <= last {
            let start = row;
            while row < bins.len() && bins[row] == period {
                row += 1;
            }
            periods.push(period);
            ranges.push(start..row);
            period = frequency.next_period(period);
        }

        Ok(Self {
            frequency,
            periods,
            ranges,
        })
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn periods(&self) -> &[NaiveDate] {
        &self.periods
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// One reduced value per period
    pub fn reduce(&self, values: &[f64], aggregation: Aggregation) -> Vec<f64> {
        self.ranges
            .iter()
            .map(|range| aggregation.reduce(&values[range.clone()]))
            .collect()
    }
}
