/// Canonical half-hourly step, in seconds
pub const HALF_HOUR_SECONDS: i64 = 1800;
pub const HALF_HOUR_SECONDS_F64: f64 = 1800.0;

/// Missing value sentinel used by Ameriflux files
pub const MISSING_SENTINEL: f64 = -9999.0;
pub const MISSING_SENTINEL_STR: &str = "-9999";
pub const MISSING_NA_STR: &str = "NA";

/// Rows dated before this year are treated as corrupt
pub const DEFAULT_LOWER_BOUND_YEAR: i32 = 2006;
/// Year assigned to legacy rows whose year field disagrees with the file year
pub const LEGACY_SENTINEL_YEAR: i32 = 1955;
/// First year written in the modern (ISO timestamp) file layout
pub const FIRST_MODERN_SCHEMA_YEAR: i32 = 2009;

/// File layout shared by both schemas: preamble, header, units, data
pub const PREAMBLE_LINES: usize = 3;
pub const UNITS_ROWS: usize = 1;

/// File name variants
pub const GAPFILLED_TAG: &str = "gapfilled";
pub const WITH_GAPS_TAG: &str = "with_gaps";
pub const AFLX_EXTENSION: &str = "txt";

/// Carbon flux conversion: umol CO2 m-2 s-1 to g C m-2 per half hour
pub const CARBON_MOLAR_MASS: f64 = 12.011;
pub const MICRO: f64 = 1.0e-6;

/// Daytime threshold on incoming shortwave radiation (W/m2)
pub const DAYTIME_SW_THRESHOLD: f64 = 5.0;

/// Priestley-Taylor parameters
pub const PRIESTLEY_TAYLOR_ALPHA: f64 = 1.26;
pub const PSYCHROMETRIC_CONSTANT: f64 = 0.066;

/// Water year offsets (days added to the calendar timestamp)
pub const WATER_YEAR_NOV_OFFSET: i64 = 61;
pub const WATER_YEAR_OCT_OFFSET: i64 = 91;

/// Output column names
pub const ET_COLUMN: &str = "ET_mm_dayint";
pub const PET_COLUMN: &str = "PET_mm_dayint";
pub const CARBON_UPTAKE_COLUMN: &str = "hrs_C_uptake";
pub const DEGREE_DAYS_COLUMN: &str = "degree_days";
pub const DEGREE_DAYS_RANGE_COLUMN: &str = "degree_days_range";

/// Processing defaults
pub const DEFAULT_OUTPUT_DIR: &str = "processed_data";

/// Default canonical variable names
pub const TA_F: &str = "TA_F";
pub const SW_IN_F: &str = "SW_IN_F";
pub const H_F: &str = "H_F";
pub const FC_F: &str = "FC_F";
