use crate::models::ObservationSeries;
use crate::readers::LoadReport;
use serde::Serialize;
use std::collections::BTreeMap;

/// Plausible physical bounds for common canonical variables
const VALID_RANGES: &[(&str, f64, f64)] = &[
    ("TA_F", -50.0, 60.0),
    ("RH_F", 0.0, 105.0),
    ("VPD_F", 0.0, 15.0),
    ("SW_IN_F", -20.0, 1500.0),
    ("P_F", 0.0, 200.0),
    ("FC_F", -100.0, 100.0),
    ("LE_F", -200.0, 1000.0),
    ("H_F", -300.0, 1000.0),
];

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub total_sites: usize,
    pub total_rows: usize,
    pub violations: Vec<QualityViolation>,
    pub site_statistics: BTreeMap<String, SiteStatistics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityViolation {
    pub site: String,
    pub variable: Option<String>,
    pub violation_type: ViolationType,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationType {
    MissingYear,
    HighMissingFraction,
    OutOfRange,
    UnparsedValues,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteStatistics {
    pub rows: usize,
    pub years_loaded: Vec<i32>,
    pub years_missing: Vec<i32>,
    pub dropped_rows: usize,
    pub unparsed_values: usize,
    /// Fraction of missing cells per column
    pub missing_fraction: BTreeMap<String, f64>,
}

/// Data-quality checks over loaded site series
pub struct IntegrityChecker {
    missing_fraction_threshold: f64,
}

impl IntegrityChecker {
    pub fn new() -> Self {
        Self {
            missing_fraction_threshold: 0.5,
        }
    }

    /// Flag columns whose missing fraction is above `threshold`
    pub fn with_missing_threshold(threshold: f64) -> Self {
        Self {
            missing_fraction_threshold: threshold,
        }
    }

    /// Check every site; load reports are matched by site name
    pub fn check_sites(
        &self,
        sites: &[ObservationSeries],
        loads: &[LoadReport],
    ) -> QualityReport {
        let mut report = QualityReport {
            total_sites: sites.len(),
            total_rows: 0,
            violations: Vec::new(),
            site_statistics: BTreeMap::new(),
        };

        for series in sites {
            let load = loads.iter().find(|l| l.site == series.site());
            self.check_site(series, load, &mut report);
        }

        report
    }

    fn check_site(
        &self,
        series: &ObservationSeries,
        load: Option<&LoadReport>,
        report: &mut QualityReport,
    ) {
        let site = series.site().to_string();
        let mut stats = SiteStatistics {
            rows: series.len(),
            ..Default::default()
        };
        report.total_rows += series.len();

        if let Some(load) = load {
            stats.years_loaded = load.years_loaded.clone();
            stats.years_missing = load.years_missing.clone();
            stats.dropped_rows = load.dropped_rows();
            stats.unparsed_values = load.unparsed_values();

            for year in &load.years_missing {
                report.violations.push(QualityViolation {
                    site: site.clone(),
                    variable: None,
                    violation_type: ViolationType::MissingYear,
                    details: format!("no file for {}", year),
                });
            }
            if stats.unparsed_values > 0 {
                report.violations.push(QualityViolation {
                    site: site.clone(),
                    variable: None,
                    violation_type: ViolationType::UnparsedValues,
                    details: format!("{} unparseable cells read as missing", stats.unparsed_values),
                });
            }
        }

        for column in series.columns() {
            let fraction = if column.is_empty() {
                0.0
            } else {
                column.missing_count() as f64 / column.len() as f64
            };
            stats.missing_fraction.insert(column.name.clone(), fraction);

            // An all-missing column usually means the variable was never measured
            if fraction > self.missing_fraction_threshold && fraction < 1.0 {
                report.violations.push(QualityViolation {
                    site: site.clone(),
                    variable: Some(column.name.clone()),
                    violation_type: ViolationType::HighMissingFraction,
                    details: format!("{:.1}% of values missing", 100.0 * fraction),
                });
            }

            if let Some((_, min, max)) = VALID_RANGES.iter().find(|(name, _, _)| *name == column.name) {
                let outside = column
                    .values
                    .iter()
                    .filter(|v| !v.is_nan() && !(*min..=*max).contains(*v))
                    .count();
                if outside > 0 {
                    report.violations.push(QualityViolation {
                        site: site.clone(),
                        variable: Some(column.name.clone()),
                        violation_type: ViolationType::OutOfRange,
                        details: format!(
                            "{} values outside valid range [{}, {}]",
                            outside, min, max
                        ),
                    });
                }
            }
        }

        report.site_statistics.insert(site, stats);
    }

    /// Generate a summary report
    pub fn generate_summary(&self, report: &QualityReport) -> String {
        let mut summary = String::new();

        summary.push_str("=== Data Quality Report ===\n");
        summary.push_str(&format!("Sites: {}\n", report.total_sites));
        summary.push_str(&format!("Half-hourly rows: {}\n", report.total_rows));

        for (site, stats) in &report.site_statistics {
            summary.push_str(&format!(
                "\n{}: {} rows, years loaded {:?}, years missing {:?}, {} rows dropped\n",
                site, stats.rows, stats.years_loaded, stats.years_missing, stats.dropped_rows
            ));
        }

        summary.push_str(&format!("\nViolations: {}\n", report.violations.len()));

        if !report.violations.is_empty() {
            summary.push_str("\nTop 10 Violations:\n");
            for (i, violation) in report.violations.iter().take(10).enumerate() {
                summary.push_str(&format!(
                    "  {}. {} {}: {}\n",
                    i + 1,
                    violation.site,
                    violation.variable.as_deref().unwrap_or("-"),
                    violation.details
                ));
            }
        }

        summary
    }
}

impl Default for IntegrityChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Column;
    use chrono::{Duration, NaiveDate};

    fn series() -> ObservationSeries {
        let start = NaiveDate::from_ymd_opt(2010, 1, 1)
            .unwrap()
            .and_hms_opt(0, 30, 0)
            .unwrap();
        let step = Duration::minutes(30);
        ObservationSeries::new(
            "US-Seg",
            step,
            (0..4).map(|i| start + step * i).collect(),
            vec![
                Column::new("TA_F", vec![10.0, 75.0, f64::NAN, 11.0]),
                Column::new("RH_F", vec![f64::NAN, f64::NAN, f64::NAN, 40.0]),
                Column::new("SW_OUT", vec![f64::NAN; 4]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_check_flags_ranges_and_gaps() {
        let checker = IntegrityChecker::new();
        let report = checker.check_sites(&[series()], &[]);

        assert_eq!(report.total_sites, 1);
        assert_eq!(report.total_rows, 4);

        let kinds: Vec<_> = report
            .violations
            .iter()
            .map(|v| (v.variable.clone().unwrap_or_default(), v.violation_type))
            .collect();
        assert!(kinds.contains(&("TA_F".to_string(), ViolationType::OutOfRange)));
        assert!(kinds.contains(&("RH_F".to_string(), ViolationType::HighMissingFraction)));
        // Never-measured columns are not flagged
        assert!(!kinds.iter().any(|(v, _)| v == "SW_OUT"));

        let stats = &report.site_statistics["US-Seg"];
        assert_eq!(stats.missing_fraction["TA_F"], 0.25);
    }

    #[test]
    fn test_summary_mentions_sites() {
        let checker = IntegrityChecker::new();
        let report = checker.check_sites(&[series()], &[]);
        let summary = checker.generate_summary(&report);

        assert!(summary.contains("US-Seg"));
        assert!(summary.contains("Violations: 2"));
    }
}
