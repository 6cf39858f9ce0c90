use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{ProcessingError, Result};
use crate::models::{Column, ObservationSeries};
use crate::processors::period_index::Aggregation;

/// Logical sensor groups (e.g. shallow, mid, deep soil moisture) mapped to
/// explicit column lists. Each group becomes one row-wise mean column named
/// after the group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepthGroups {
    groups: BTreeMap<String, Vec<String>>,
}

impl DepthGroups {
    pub fn new(groups: BTreeMap<String, Vec<String>>) -> Self {
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<String>> {
        &self.groups
    }

    /// Check the mapping against the columns a series actually has
    pub fn validate<S: AsRef<str>>(&self, available: &[S]) -> Result<()> {
        let mut owner: HashMap<&str, &str> = HashMap::new();

        for (group, columns) in &self.groups {
            if columns.is_empty() {
                return Err(ProcessingError::Config(format!(
                    "Depth group '{}' lists no columns",
                    group
                )));
            }

            for column in columns {
                if !available.iter().any(|a| a.as_ref() == column) {
                    return Err(ProcessingError::Config(format!(
                        "Depth group '{}' names unknown column '{}'",
                        group, column
                    )));
                }
                if let Some(previous) = owner.insert(column.as_str(), group.as_str()) {
                    return Err(ProcessingError::Config(format!(
                        "Column '{}' is in both depth groups '{}' and '{}'",
                        column, previous, group
                    )));
                }
            }
        }

        Ok(())
    }

    /// Add one mean column per group to the series
    pub fn apply(&self, series: ObservationSeries) -> Result<ObservationSeries> {
        self.validate(&series.column_names())?;

        let mut averaged = Vec::with_capacity(self.groups.len());
        for (group, columns) in &self.groups {
            let members = columns
                .iter()
                .map(|c| series.values(c))
                .collect::<Result<Vec<_>>>()?;

            let values = (0..series.len())
                .map(|row| {
                    let cells: Vec<f64> = members.iter().map(|m| m[row]).collect();
                    Aggregation::Mean.reduce(&cells)
                })
                .collect();
            averaged.push(Column::new(group.clone(), values));
        }

        averaged
            .into_iter()
            .try_fold(series, |series, column| series.with_column(column))
    }
}
