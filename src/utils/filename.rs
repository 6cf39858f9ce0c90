use crate::models::Frequency;
use std::path::{Path, PathBuf};

/// Resampled table file name: `{site}_{freq}_aflx.csv`
pub fn resampled_filename(output_dir: &Path, site: &str, frequency: Frequency) -> PathBuf {
    output_dir.join(format!("{}_{}_aflx.csv", site, frequency.file_tag()))
}

/// Per-day-of-year statistics file: `{site}_{var}_climatology.csv`
pub fn climatology_filename(output_dir: &Path, site: &str, variable: &str) -> PathBuf {
    output_dir.join(format!("{}_{}_climatology.csv", site, variable))
}

pub fn anomaly_filename(output_dir: &Path, site: &str, variable: &str) -> PathBuf {
    output_dir.join(format!("{}_{}_anomaly.csv", site, variable))
}

/// Normalized half-hourly table written by the `load` command
pub fn half_hourly_filename(output_dir: &Path, site: &str) -> PathBuf {
    output_dir.join(format!("{}_halfhourly_aflx.csv", site))
}

/// All sites' annual tables in one file: `annual_fluxes.csv`, or
/// `wateryear_fluxes.csv` when years are water years
pub fn stacked_annual_filename(output_dir: &Path, water_year: bool) -> PathBuf {
    let prefix = if water_year { "wateryear" } else { "annual" };
    output_dir.join(format!("{}_fluxes.csv", prefix))
}
