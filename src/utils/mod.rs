pub mod constants;
pub mod filename;
pub mod progress;
pub mod raster;

pub use constants::*;
pub use filename::{anomaly_filename, climatology_filename, half_hourly_filename, resampled_filename};
pub use progress::ProgressReporter;
pub use raster::RasterGrid;
