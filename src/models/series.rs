use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::HashSet;

use crate::error::{ProcessingError, Result};

/// A named column of values. Missing values are `NaN`.
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// An all-missing column of the given length
    pub fn missing(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, vec![f64::NAN; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    pub fn present_count(&self) -> usize {
        self.len() - self.missing_count()
    }
}

// NaN marks a missing value, so two missing cells compare equal here.
impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b)
    }
}

/// A parsed table straight out of a reader. Nothing is guaranteed about
/// its index: it may be irregular, unsorted, or contain duplicates.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub site: String,
    pub index: Vec<NaiveDateTime>,
    pub columns: Vec<Column>,
}

impl RawTable {
    pub fn new(site: impl Into<String>, index: Vec<NaiveDateTime>, columns: Vec<Column>) -> Self {
        Self {
            site: site.into(),
            index,
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A regular, complete, timestamp-indexed table for one site.
///
/// The index has a fixed spacing of `step` with no gaps and no duplicates;
/// absent observations are `NaN` cells, never missing rows. Transforms
/// return new series instead of mutating this one.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSeries {
    site: String,
    step: Duration,
    index: Vec<NaiveDateTime>,
    columns: Vec<Column>,
}

impl ObservationSeries {
    /// Build a series, checking the regular-index and column-shape invariants
    pub fn new(
        site: impl Into<String>,
        step: Duration,
        index: Vec<NaiveDateTime>,
        columns: Vec<Column>,
    ) -> Result<Self> {
        let site = site.into();

        if step <= Duration::zero() {
            return Err(ProcessingError::Config(format!(
                "Series step must be positive, got {}",
                step
            )));
        }

        for pair in index.windows(2) {
            if pair[1] == pair[0] {
                return Err(ProcessingError::DuplicateTimestamp {
                    site,
                    timestamp: pair[1],
                });
            }
            if pair[1] - pair[0] != step {
                return Err(ProcessingError::IndexMismatch(format!(
                    "Irregular index for site {} between {} and {}",
                    site, pair[0], pair[1]
                )));
            }
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if column.len() != index.len() {
                return Err(ProcessingError::IndexMismatch(format!(
                    "Column '{}' has {} values but the index has {} timestamps",
                    column.name,
                    column.len(),
                    index.len()
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(ProcessingError::Config(format!(
                    "Column '{}' appears twice in series for site {}",
                    column.name, site
                )));
            }
        }

        Ok(Self {
            site,
            step,
            index,
            columns,
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.index.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.index.last().copied()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Values of a column, or a configuration error naming the variable
    pub fn values(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| ProcessingError::MissingVariable {
                site: self.site.clone(),
                variable: name.to_string(),
            })
    }

    /// Check that every name is a column of this series
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        for name in names {
            self.values(name.as_ref())?;
        }
        Ok(())
    }

    /// Add a column, replacing any existing column with the same name
    pub fn with_column(mut self, column: Column) -> Result<Self> {
        if column.len() != self.len() {
            return Err(ProcessingError::IndexMismatch(format!(
                "Column '{}' has {} values but site {} has {} timestamps",
                column.name,
                column.len(),
                self.site,
                self.len()
            )));
        }

        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(self)
    }

    /// A new series holding only the named columns, in the given order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let columns = names
            .iter()
            .map(|name| {
                let values = self.values(name.as_ref())?;
                Ok(Column::new(name.as_ref(), values.to_vec()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            site: self.site.clone(),
            step: self.step,
            index: self.index.clone(),
            columns,
        })
    }

    /// A copy of this series with every timestamp moved by `offset`
    pub fn shifted(&self, offset: Duration) -> Self {
        Self {
            site: self.site.clone(),
            step: self.step,
            index: self.index.iter().map(|ts| *ts + offset).collect(),
            columns: self.columns.clone(),
        }
    }

    pub fn into_parts(self) -> (String, Duration, Vec<NaiveDateTime>, Vec<Column>) {
        (self.site, self.step, self.index, self.columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2010, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn half_hour() -> Duration {
        Duration::minutes(30)
    }

    #[test]
    fn test_new_series_checks_regularity() {
        let index = vec![ts(1, 0, 30), ts(1, 1, 0), ts(1, 2, 0)];
        let columns = vec![Column::new("TA_F", vec![1.0, 2.0, 3.0])];

        let result = ObservationSeries::new("US-Seg", half_hour(), index, columns);
        assert!(matches!(result, Err(ProcessingError::IndexMismatch(_))));
    }

    #[test]
    fn test_new_series_rejects_duplicates() {
        let index = vec![ts(1, 0, 30), ts(1, 0, 30)];
        let columns = vec![Column::new("TA_F", vec![1.0, 2.0])];

        let result = ObservationSeries::new("US-Seg", half_hour(), index, columns);
        assert!(matches!(
            result,
            Err(ProcessingError::DuplicateTimestamp { .. })
        ));
    }

    #[test]
    fn test_missing_variable_names_the_variable() {
        let series = ObservationSeries::new(
            "US-Seg",
            half_hour(),
            vec![ts(1, 0, 30)],
            vec![Column::new("TA_F", vec![1.0])],
        )
        .unwrap();

        match series.values("LE_F") {
            Err(ProcessingError::MissingVariable { site, variable }) => {
                assert_eq!(site, "US-Seg");
                assert_eq!(variable, "LE_F");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_with_column_replaces_existing() {
        let series = ObservationSeries::new(
            "US-Seg",
            half_hour(),
            vec![ts(1, 0, 30), ts(1, 1, 0)],
            vec![Column::new("TA_F", vec![1.0, 2.0])],
        )
        .unwrap();

        let series = series
            .with_column(Column::new("TA_F", vec![5.0, 6.0]))
            .unwrap()
            .with_column(Column::new("RH_F", vec![40.0, 41.0]))
            .unwrap();

        assert_eq!(series.column_names(), vec!["TA_F", "RH_F"]);
        assert_eq!(series.values("TA_F").unwrap(), &[5.0, 6.0]);
        assert!(series
            .with_column(Column::new("VPD_F", vec![1.0]))
            .is_err());
    }

    #[test]
    fn test_missing_cells_compare_equal() {
        let a = Column::new("P_F", vec![f64::NAN, 1.0]);
        let b = Column::new("P_F", vec![f64::NAN, 1.0]);
        let c = Column::new("P_F", vec![0.0, 1.0]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.missing_count(), 1);
        assert_eq!(a.present_count(), 1);
    }
}
