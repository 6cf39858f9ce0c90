use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProcessingError, Result};
use crate::models::{Column, ObservationSeries};

/// A rule that edits a series before resampling
pub trait SeriesCorrection: Send + Sync {
    fn apply(&self, series: ObservationSeries) -> Result<ObservationSeries>;

    fn describe(&self) -> String;
}

/// Blank one variable over a closed time range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskPeriod {
    pub variable: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub site: Option<String>,
}

impl MaskPeriod {
    pub fn new(variable: impl Into<String>, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            variable: variable.into(),
            start,
            end,
            site: None,
        }
    }

    pub fn for_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    fn applies_to(&self, site: &str) -> bool {
        self.site.as_deref().map_or(true, |s| s == site)
    }
}

impl SeriesCorrection for MaskPeriod {
    fn apply(&self, series: ObservationSeries) -> Result<ObservationSeries> {
        if self.end < self.start {
            return Err(ProcessingError::Config(format!(
                "Mask for {} ends ({}) before it starts ({})",
                self.variable, self.end, self.start
            )));
        }
        if !self.applies_to(series.site()) {
            return Ok(series);
        }

        let mut values = series.values(&self.variable)?.to_vec();
        let mut masked = 0usize;
        for (value, ts) in values.iter_mut().zip(series.index()) {
            if *ts >= self.start && *ts <= self.end {
                *value = f64::NAN;
                masked += 1;
            }
        }

        debug!(site = series.site(), rule = %self.describe(), masked, "correction applied");
        series.with_column(Column::new(self.variable.clone(), values))
    }

    fn describe(&self) -> String {
        format!("mask {} from {} to {}", self.variable, self.start, self.end)
    }
}

/// An ordered set of correction rules
#[derive(Default)]
pub struct Corrections {
    rules: Vec<Box<dyn SeriesCorrection>>,
}

impl Corrections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_masks(masks: &[MaskPeriod]) -> Self {
        let mut corrections = Self::new();
        for mask in masks {
            corrections.push(mask.clone());
        }
        corrections
    }

    pub fn push(&mut self, rule: impl SeriesCorrection + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order
    pub fn apply(&self, series: ObservationSeries) -> Result<ObservationSeries> {
        self.rules
            .iter()
            .try_fold(series, |series, rule| rule.apply(series))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn ts(hh: u32, mm: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2009, 8, 1)
            .unwrap()
            .and_hms_opt(hh, mm, 0)
            .unwrap()
    }

    fn series(site: &str) -> ObservationSeries {
        ObservationSeries::new(
            site,
            Duration::minutes(30),
            vec![ts(0, 30), ts(1, 0), ts(1, 30)],
            vec![
                Column::new("LE_F", vec![1.0, 2.0, 3.0]),
                Column::new("H_F", vec![4.0, 5.0, 6.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_mask_is_inclusive() {
        let mask = MaskPeriod::new("LE_F", ts(1, 0), ts(1, 30));
        let corrected = Corrections::from_masks(&[mask]).apply(series("US-Vcp")).unwrap();

        let le = corrected.values("LE_F").unwrap();
        assert_eq!(le[0], 1.0);
        assert!(le[1].is_nan() && le[2].is_nan());
        assert_eq!(corrected.values("H_F").unwrap(), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_site_scoped_mask() {
        let mask = MaskPeriod::new("LE_F", ts(0, 0), ts(2, 0)).for_site("US-Vcm");
        let untouched = mask.apply(series("US-Vcp")).unwrap();
        assert_eq!(untouched.values("LE_F").unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mask_unknown_variable() {
        let mask = MaskPeriod::new("FC_F", ts(0, 0), ts(2, 0));
        let result = mask.apply(series("US-Vcp"));
        assert!(matches!(result, Err(ProcessingError::MissingVariable { .. })));
    }
}
