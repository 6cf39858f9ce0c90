use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProcessingError, Result};
use crate::utils::constants::{
    AFLX_EXTENSION, FIRST_MODERN_SCHEMA_YEAR, GAPFILLED_TAG, LEGACY_SENTINEL_YEAR, WITH_GAPS_TAG,
};

/// Source column -> canonical variable for the pre-2009 file layout
const LEGACY_COLUMN_MAP: &[(&str, &str)] = &[
    ("FC", "FC_F"),
    ("Rg", "SW_IN_F"),
    ("Rg_out", "SW_OUT"),
    ("Rlong_in", "LW_IN"),
    ("Rlong_out", "LW_OUT"),
    ("VPD", "VPD_F"),
    ("RH", "RH_F"),
    ("PRECIP", "P_F"),
    ("TA", "TA_F"),
    ("RE", "RECO"),
    ("FC_flag", "FC_F_FLAG"),
    ("H", "H_F"),
    ("LE", "LE_F"),
    ("RNET", "RNET_F"),
];

/// Modern files already use canonical names
const MODERN_COLUMN_MAP: &[(&str, &str)] = &[];

const MODERN_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y%m%d%H%M",
    "%m/%d/%Y %H:%M",
];

/// Layout of an Ameriflux-style half-hourly file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSchema {
    /// (year, day-of-year, hhmm) timestamp columns and legacy variable names
    Legacy,
    /// One ISO-like timestamp column and canonical variable names
    Modern,
}

impl FileSchema {
    pub fn for_year(year: i32) -> Self {
        if year < FIRST_MODERN_SCHEMA_YEAR {
            FileSchema::Legacy
        } else {
            FileSchema::Modern
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FileSchema::Legacy => "legacy",
            FileSchema::Modern => "modern",
        }
    }

    /// Number of leading columns that make up the timestamp
    pub fn timestamp_columns(&self) -> usize {
        match self {
            FileSchema::Legacy => 3,
            FileSchema::Modern => 1,
        }
    }

    pub fn column_map(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            FileSchema::Legacy => LEGACY_COLUMN_MAP,
            FileSchema::Modern => MODERN_COLUMN_MAP,
        }
    }

    /// Canonical name for a source column; unknown columns pass through
    pub fn canonical_name(&self, source: &str) -> String {
        let source = source.trim();
        self.column_map()
            .iter()
            .find(|(from, _)| *from == source)
            .map(|(_, to)| to.to_string())
            .unwrap_or_else(|| source.to_string())
    }

    /// Parse the timestamp fields of one data row
    pub fn parse_timestamp(&self, fields: &[&str], expected_year: i32) -> Result<NaiveDateTime> {
        if fields.len() < self.timestamp_columns() {
            return Err(ProcessingError::InvalidFormat(format!(
                "Expected {} timestamp fields for the {} schema, got {}",
                self.timestamp_columns(),
                self.name(),
                fields.len()
            )));
        }

        match self {
            FileSchema::Legacy => parse_legacy_timestamp(fields[0], fields[1], fields[2], expected_year),
            FileSchema::Modern => parse_modern_timestamp(fields[0]),
        }
    }
}

impl std::fmt::Display for FileSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How the loader picks a schema for each year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaSelection {
    #[default]
    Auto,
    Legacy,
    Modern,
}

impl SchemaSelection {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(SchemaSelection::Auto),
            "legacy" | "old" => Ok(SchemaSelection::Legacy),
            "modern" | "new" => Ok(SchemaSelection::Modern),
            _ => Err(ProcessingError::Config(format!(
                "Unknown schema selection: '{}'",
                s
            ))),
        }
    }

    pub fn resolve(&self, year: i32) -> FileSchema {
        match self {
            SchemaSelection::Auto => FileSchema::for_year(year),
            SchemaSelection::Legacy => FileSchema::Legacy,
            SchemaSelection::Modern => FileSchema::Modern,
        }
    }
}

/// Gap-filled or raw variant of a site-year file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileVariant {
    Gapfilled,
    WithGaps,
}

impl FileVariant {
    pub fn from_gapfilled(gapfilled: bool) -> Self {
        if gapfilled {
            FileVariant::Gapfilled
        } else {
            FileVariant::WithGaps
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            FileVariant::Gapfilled => GAPFILLED_TAG,
            FileVariant::WithGaps => WITH_GAPS_TAG,
        }
    }

    /// e.g. `US-Seg_2010_gapfilled.txt`
    pub fn file_name(&self, site: &str, year: i32) -> String {
        format!("{}_{}_{}.{}", site, year, self.tag(), AFLX_EXTENSION)
    }
}

/// Anchor at December 31st of the previous year, then add the day of year
/// and time of day. A year field that disagrees with the file's year marks
/// a corrupt trailing row and is sent to the sentinel year, as is a day or
/// time offset too large to represent.
fn parse_legacy_timestamp(
    year: &str,
    doy: &str,
    hhmm: &str,
    expected_year: i32,
) -> Result<NaiveDateTime> {
    let mut year = parse_integer(year, "year")?;
    if year != i64::from(expected_year) {
        year = i64::from(LEGACY_SENTINEL_YEAR);
    }
    let doy = parse_integer(doy, "day of year")?;
    let hhmm = parse_integer(hhmm, "hhmm")?;

    let anchor = legacy_anchor(year)?;
    let offset = Duration::try_days(doy)
        .zip(Duration::try_hours(hhmm / 100))
        .zip(Duration::try_minutes(hhmm % 100))
        .and_then(|((days, hours), minutes)| days.checked_add(&hours)?.checked_add(&minutes));

    match offset.and_then(|o| anchor.checked_add_signed(o)) {
        Some(timestamp) => Ok(timestamp),
        None => {
            debug!(doy, hhmm, "legacy date offset out of range, row sent to sentinel year");
            legacy_anchor(i64::from(LEGACY_SENTINEL_YEAR))
        }
    }
}

fn legacy_anchor(year: i64) -> Result<NaiveDateTime> {
    i32::try_from(year - 1)
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, 12, 31))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ProcessingError::InvalidFormat(format!("Invalid year: {}", year)))
}

fn parse_modern_timestamp(field: &str) -> Result<NaiveDateTime> {
    let field = field.trim().trim_matches('"');

    MODERN_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(field, fmt).ok())
        .ok_or_else(|| {
            ProcessingError::InvalidFormat(format!("Invalid timestamp: '{}'", field))
        })
}

/// Integer fields sometimes come through as "2007.0"
fn parse_integer(field: &str, what: &str) -> Result<i64> {
    let field = field.trim();
    field
        .parse::<i64>()
        .or_else(|_| {
            field
                .parse::<f64>()
                .map_err(|_| ())
                .and_then(|v| if v.fract() == 0.0 { Ok(v as i64) } else { Err(()) })
        })
        .map_err(|_| ProcessingError::InvalidFormat(format!("Invalid {}: '{}'", what, field)))
}
