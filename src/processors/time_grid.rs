use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{ProcessingError, Result};
use crate::models::{Column, ObservationSeries, RawTable};
use crate::utils::constants::{DEFAULT_LOWER_BOUND_YEAR, HALF_HOUR_SECONDS};

/// A closed, regular sequence of timestamps `start, start + step, ..., end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeGrid {
    start: NaiveDateTime,
    end: NaiveDateTime,
    step: Duration,
}

impl TimeGrid {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, step: Duration) -> Result<Self> {
        if step.num_seconds() < 1 || step.subsec_nanos() != 0 {
            return Err(ProcessingError::Config(format!(
                "Grid step must be a positive whole number of seconds, got {}",
                step
            )));
        }
        if end < start {
            return Err(ProcessingError::Config(format!(
                "Grid end {} is before start {}",
                end, start
            )));
        }
        if (end - start).num_seconds() % step.num_seconds() != 0 {
            return Err(ProcessingError::Config(format!(
                "Grid end {} is not a whole number of steps after {}",
                end, start
            )));
        }

        Ok(Self { start, end, step })
    }

    /// Half-hourly grid of one year: `YYYY-01-01 00:30` to `(YYYY+1)-01-01 00:00`
    pub fn half_hourly_year(year: i32) -> Result<Self> {
        Self::half_hourly_span(year, year)
    }

    /// Half-hourly grid from `start_year-01-01 00:30` to `(end_year+1)-01-01 00:00`
    pub fn half_hourly_span(start_year: i32, end_year: i32) -> Result<Self> {
        if end_year < start_year {
            return Err(ProcessingError::Config(format!(
                "End year {} is before start year {}",
                end_year, start_year
            )));
        }

        let step = Duration::seconds(HALF_HOUR_SECONDS);
        let start = year_start(start_year)? + step;
        let end = year_start(end_year + 1)?;
        Self::new(start, end, step)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn len(&self) -> usize {
        ((self.end - self.start).num_seconds() / self.step.num_seconds()) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        let mut timestamps = Vec::with_capacity(self.len());
        let mut current = self.start;
        while current <= self.end {
            timestamps.push(current);
            current += self.step;
        }
        timestamps
    }

    /// Row of `timestamp` in this grid, if it lies exactly on it
    pub fn position(&self, timestamp: NaiveDateTime) -> Option<usize> {
        if timestamp < self.start || timestamp > self.end {
            return None;
        }

        let offset = (timestamp - self.start).num_seconds();
        let step = self.step.num_seconds();
        if offset % step != 0 {
            return None;
        }
        Some((offset / step) as usize)
    }
}

/// What a normalization pass did to its input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub input_rows: usize,
    pub below_bound: usize,
    pub off_grid: usize,
    pub retained: usize,
    pub expected: usize,
}

impl NormalizeReport {
    /// Fewer usable rows than grid slots, so some periods are missing
    pub fn is_short(&self) -> bool {
        self.input_rows - self.below_bound < self.expected
    }

    pub fn missing_periods(&self) -> usize {
        self.expected - self.retained
    }
}

/// Realigns parsed tables onto a canonical time grid
#[derive(Debug, Clone)]
pub struct GridNormalizer {
    lower_bound: NaiveDateTime,
}

impl GridNormalizer {
    pub fn new() -> Self {
        Self {
            lower_bound: year_start(DEFAULT_LOWER_BOUND_YEAR)
                .unwrap_or(NaiveDateTime::MIN),
        }
    }

    pub fn with_lower_bound(lower_bound: NaiveDateTime) -> Self {
        Self { lower_bound }
    }

    /// Drop every row dated before January 1st of `year`
    pub fn with_lower_bound_year(year: i32) -> Result<Self> {
        Ok(Self::with_lower_bound(year_start(year)?))
    }

    pub fn lower_bound(&self) -> NaiveDateTime {
        self.lower_bound
    }

    /// Reindex a parsed table onto `grid`.
    ///
    /// Rows before the lower bound are dropped, grid slots with no row become
    /// missing in every column, and rows that fall between or outside grid
    /// slots are discarded. Duplicate timestamps are an integrity error.
    pub fn normalize(
        &self,
        table: &RawTable,
        grid: &TimeGrid,
    ) -> Result<(ObservationSeries, NormalizeReport)> {
        let expected = grid.len();
        let mut report = NormalizeReport {
            input_rows: table.len(),
            expected,
            ..Default::default()
        };

        let mut seen = HashSet::with_capacity(table.len());
        let mut placement: Vec<(usize, usize)> = Vec::with_capacity(table.len());

        for (row, timestamp) in table.index.iter().enumerate() {
            if *timestamp < self.lower_bound {
                report.below_bound += 1;
                continue;
            }

            if !seen.insert(*timestamp) {
                return Err(ProcessingError::DuplicateTimestamp {
                    site: table.site.clone(),
                    timestamp: *timestamp,
                });
            }

            match grid.position(*timestamp) {
                Some(slot) => placement.push((row, slot)),
                None => report.off_grid += 1,
            }
        }
        report.retained = placement.len();

        let columns = table
            .columns
            .iter()
            .map(|column| {
                let mut values = vec![f64::NAN; expected];
                for &(row, slot) in &placement {
                    values[slot] = column.values[row];
                }
                Column::new(column.name.clone(), values)
            })
            .collect();

        if report.is_short() {
            warn!(
                site = %table.site,
                expected = report.expected,
                available = report.input_rows - report.below_bound,
                "some observations may be missing"
            );
        }
        if report.off_grid > 0 {
            debug!(
                site = %table.site,
                off_grid = report.off_grid,
                "dropped rows outside the canonical grid"
            );
        }

        let series =
            ObservationSeries::new(table.site.clone(), grid.step(), grid.timestamps(), columns)?;
        Ok((series, report))
    }

    /// Normalize an existing series onto another grid
    pub fn renormalize(
        &self,
        series: &ObservationSeries,
        grid: &TimeGrid,
    ) -> Result<(ObservationSeries, NormalizeReport)> {
        let raw = RawTable::new(
            series.site(),
            series.index().to_vec(),
            series.columns().to_vec(),
        );
        self.normalize(&raw, grid)
    }

    /// An all-missing table with the grid's shape and the given columns
    pub fn empty<S: AsRef<str>>(
        site: &str,
        grid: &TimeGrid,
        column_names: &[S],
    ) -> Result<ObservationSeries> {
        let columns = column_names
            .iter()
            .map(|name| Column::missing(name.as_ref(), grid.len()))
            .collect();
        ObservationSeries::new(site, grid.step(), grid.timestamps(), columns)
    }
}

impl Default for GridNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn year_start(year: i32) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ProcessingError::Config(format!("Year {} is out of range", year)))
}
