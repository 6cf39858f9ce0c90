use chrono::Datelike;
use std::collections::{BTreeMap, HashSet};

use crate::error::{ProcessingError, Result};
use crate::models::{Column, DatedSeries};
use crate::processors::period_index::Aggregation;

/// Number of day-of-year positions, enough for leap years
pub const DOY_POSITIONS: usize = 366;

pub const MEAN_COLUMN: &str = "allyr_mean";
pub const STDEV_COLUMN: &str = "allyr_stdev";
pub const STDERR_COLUMN: &str = "allyr_stderr";
pub const CV_COLUMN: &str = "allyr_cv";
pub const CV_OVERALL_COLUMN: &str = "allyr_cv_overall";

/// Day-of-year statistics of one variable across years.
///
/// Rows are day-of-year positions 1..=366. There is one column per year,
/// then the across-year statistics. Leap years are not realigned: the
/// ordinal position is the join key, so after Feb 28 a leap year sits one
/// calendar day off the others.
#[derive(Debug, Clone, PartialEq)]
pub struct ClimatologyTable {
    variable: String,
    years: Vec<i32>,
    year_columns: Vec<Column>,
    mean: Vec<f64>,
    stdev: Vec<f64>,
    stderr: Vec<f64>,
    cv: Vec<f64>,
    cv_overall: Vec<f64>,
}

impl ClimatologyTable {
    /// Build from a daily (or any one-value-per-date) series
    pub fn from_series(series: &DatedSeries) -> Result<Self> {
        let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
        // A missing value still occupies its day
        let mut occupied: HashSet<(i32, usize)> = HashSet::with_capacity(series.len());

        for (date, value) in series.iter() {
            let slot = date.ordinal0() as usize;
            if !occupied.insert((date.year(), slot)) {
                return Err(ProcessingError::IndexMismatch(format!(
                    "More than one value for {} on {}",
                    series.name, date
                )));
            }
            let column = by_year
                .entry(date.year())
                .or_insert_with(|| vec![f64::NAN; DOY_POSITIONS]);
            column[slot] = value;
        }

        let years: Vec<i32> = by_year.keys().copied().collect();
        let year_columns: Vec<Column> = by_year
            .into_iter()
            .map(|(year, values)| Column::new(year.to_string(), values))
            .collect();

        let overall_mean = Aggregation::Mean.reduce(&series.values);

        let mut mean = Vec::with_capacity(DOY_POSITIONS);
        let mut stdev = Vec::with_capacity(DOY_POSITIONS);
        let mut stderr = Vec::with_capacity(DOY_POSITIONS);
        let mut cv = Vec::with_capacity(DOY_POSITIONS);
        let mut cv_overall = Vec::with_capacity(DOY_POSITIONS);

        for slot in 0..DOY_POSITIONS {
            let row: Vec<f64> = year_columns.iter().map(|c| c.values[slot]).collect();
            let n = row.iter().filter(|v| !v.is_nan()).count();
            let m = Aggregation::Mean.reduce(&row);
            let s = sample_stdev(&row);

            mean.push(m);
            stdev.push(s);
            stderr.push(if n > 1 { s / ((n - 1) as f64).sqrt() } else { f64::NAN });
            cv.push(s / m);
            cv_overall.push(s / overall_mean);
        }

        Ok(Self {
            variable: series.name.clone(),
            years,
            year_columns,
            mean,
            stdev,
            stderr,
            cv,
            cv_overall,
        })
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    /// Day-of-year labels, 1..=366
    pub fn doy(&self) -> Vec<u32> {
        (1..=DOY_POSITIONS as u32).collect()
    }

    pub fn year_values(&self, year: i32) -> Option<&[f64]> {
        self.year_columns
            .iter()
            .find(|c| c.name == year.to_string())
            .map(|c| c.values.as_slice())
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn stdev(&self) -> &[f64] {
        &self.stdev
    }

    pub fn stderr(&self) -> &[f64] {
        &self.stderr
    }

    pub fn cv(&self) -> &[f64] {
        &self.cv
    }

    pub fn cv_overall(&self) -> &[f64] {
        &self.cv_overall
    }

    /// Year columns followed by the statistics columns
    pub fn columns(&self) -> Vec<Column> {
        let mut columns = self.year_columns.clone();
        columns.push(Column::new(MEAN_COLUMN, self.mean.clone()));
        columns.push(Column::new(STDEV_COLUMN, self.stdev.clone()));
        columns.push(Column::new(STDERR_COLUMN, self.stderr.clone()));
        columns.push(Column::new(CV_COLUMN, self.cv.clone()));
        columns.push(Column::new(CV_OVERALL_COLUMN, self.cv_overall.clone()));
        columns
    }

    /// Departure of each value from its day-of-year mean, aligned to the
    /// input dates. With `normalize`, departures are divided by the mean.
    pub fn anomalies(&self, series: &DatedSeries, normalize: bool) -> DatedSeries {
        let values = series
            .iter()
            .map(|(date, value)| {
                let mean = self.mean[date.ordinal0() as usize];
                let anomaly = value - mean;
                if normalize {
                    anomaly / mean
                } else {
                    anomaly
                }
            })
            .collect();

        DatedSeries::new(format!("{}_anom", series.name), series.dates.clone(), values)
    }
}

/// Sample standard deviation (n - 1) of the present values
fn sample_stdev(values: &[f64]) -> f64 {
    let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.len() < 2 {
        return f64::NAN;
    }

    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    let ss: f64 = present.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (n - 1.0)).sqrt()
}
