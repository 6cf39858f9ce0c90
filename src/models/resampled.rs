use chrono::NaiveDate;
use std::collections::HashSet;

use crate::error::{ProcessingError, Result};
use crate::models::{Column, Frequency};

/// One row per output period; columns are derived per input variable
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledTable {
    site: String,
    frequency: Frequency,
    index: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl ResampledTable {
    pub fn new(
        site: impl Into<String>,
        frequency: Frequency,
        index: Vec<NaiveDate>,
        columns: Vec<Column>,
    ) -> Result<Self> {
        let site = site.into();
        let mut seen = HashSet::new();

        for column in &columns {
            if column.len() != index.len() {
                return Err(ProcessingError::IndexMismatch(format!(
                    "Column '{}' has {} values but {} periods",
                    column.name,
                    column.len(),
                    index.len()
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(ProcessingError::Config(format!(
                    "Output column '{}' produced twice for site {}",
                    column.name, site
                )));
            }
        }

        Ok(Self {
            site,
            frequency,
            index,
            columns,
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn index(&self) -> &[NaiveDate] {
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

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn values(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| ProcessingError::MissingVariable {
                site: self.site.clone(),
                variable: name.to_string(),
            })
    }

    /// Value of a column at a period label
    pub fn value_at(&self, name: &str, period: NaiveDate) -> Option<f64> {
        let row = self.index.iter().position(|d| *d == period)?;
        self.column(name).map(|c| c.values[row])
    }

    pub fn with_column(self, column: Column) -> Result<Self> {
        let mut columns = self.columns;
        columns.retain(|c| c.name != column.name);
        columns.push(column);
        Self::new(self.site, self.frequency, self.index, columns)
    }

    /// Horizontal concatenation of two tables sharing the same period index
    pub fn join(self, other: ResampledTable) -> Result<Self> {
        if self.frequency != other.frequency || self.index != other.index {
            return Err(ProcessingError::IndexMismatch(format!(
                "Cannot join {} table for site {} with {} table for site {}: period index differs",
                self.frequency, self.site, other.frequency, other.site
            )));
        }

        let mut columns = self.columns;
        columns.extend(other.columns);
        Self::new(self.site, self.frequency, self.index, columns)
    }

    /// Extract one column as a dated series
    pub fn series(&self, name: &str) -> Result<DatedSeries> {
        let values = self.values(name)?;
        Ok(DatedSeries::new(name, self.index.clone(), values.to_vec()))
    }
}

/// A single variable indexed by date (typically daily)
#[derive(Debug, Clone, PartialEq)]
pub struct DatedSeries {
    pub name: String,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl DatedSeries {
    pub fn new(name: impl Into<String>, dates: Vec<NaiveDate>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            dates,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(n: u32) -> Vec<NaiveDate> {
        (1..=n)
            .map(|d| NaiveDate::from_ymd_opt(2010, 1, d).unwrap())
            .collect()
    }

    #[test]
    fn test_join_requires_matching_index() {
        let a = ResampledTable::new(
            "US-Ses",
            Frequency::Daily,
            days(2),
            vec![Column::new("P_F_sum", vec![1.0, 0.0])],
        )
        .unwrap();
        let b = ResampledTable::new(
            "US-Ses",
            Frequency::Daily,
            days(2),
            vec![Column::new("TA_F_avg", vec![3.0, 4.0])],
        )
        .unwrap();
        let c = ResampledTable::new("US-Ses", Frequency::Daily, days(3), vec![]).unwrap();

        let joined = a.clone().join(b).unwrap();
        assert_eq!(joined.column_names(), vec!["P_F_sum", "TA_F_avg"]);
        assert!(a.join(c).is_err());
    }

    #[test]
    fn test_value_at_period() {
        let table = ResampledTable::new(
            "US-Ses",
            Frequency::Daily,
            days(3),
            vec![Column::new("P_F_sum", vec![1.0, 2.0, 3.0])],
        )
        .unwrap();

        let jan2 = NaiveDate::from_ymd_opt(2010, 1, 2).unwrap();
        assert_eq!(table.value_at("P_F_sum", jan2), Some(2.0));
        assert_eq!(table.value_at("RH_F_avg", jan2), None);
    }
}
