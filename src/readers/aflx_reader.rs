use crate::error::{ProcessingError, Result};
use crate::models::{Column, RawTable};
use crate::readers::schema::FileSchema;
use crate::utils::constants::{MISSING_SENTINEL, PREAMBLE_LINES, UNITS_ROWS};
use memmap2::Mmap;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

/// Counts gathered while parsing one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileReadStats {
    pub data_rows: usize,
    pub blank_rows: usize,
    pub unparsed_values: usize,
}

/// Reader for one Ameriflux-style site-year file
pub struct AflxReader {
    use_mmap: bool,
}

impl AflxReader {
    pub fn new() -> Self {
        Self { use_mmap: false }
    }

    pub fn with_mmap(use_mmap: bool) -> Self {
        Self { use_mmap }
    }

    /// Read a site-year file into a raw table with canonical column names
    pub fn read_file(
        &self,
        path: &Path,
        site: &str,
        year: i32,
        schema: FileSchema,
    ) -> Result<(RawTable, FileReadStats)> {
        debug!(path = %path.display(), %schema, "parsing file");
        let content = self.read_content(path)?;
        self.parse_content(&content, site, year, schema)
            .map_err(|e| match e {
                ProcessingError::InvalidFormat(msg) => {
                    ProcessingError::InvalidFormat(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })
    }

    fn read_content(&self, path: &Path) -> Result<String> {
        if self.use_mmap {
            let file = File::open(path)?;
            let mmap = unsafe { Mmap::map(&file)? };
            Ok(decode(&mmap, path))
        } else {
            let bytes = std::fs::read(path)?;
            Ok(decode(&bytes, path))
        }
    }

    /// Parse file content: preamble lines, a header line, a units line, then data
    pub fn parse_content(
        &self,
        content: &str,
        site: &str,
        year: i32,
        schema: FileSchema,
    ) -> Result<(RawTable, FileReadStats)> {
        let body = skip_lines(content, PREAMBLE_LINES);
        let header_line = body.lines().next().unwrap_or("");
        let delimiter = if header_line.contains('\t') && !header_line.contains(',') {
            b'\t'
        } else {
            b','
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());

        let headers = reader.headers()?.clone();
        let ts_cols = schema.timestamp_columns();
        if headers.len() <= ts_cols {
            return Err(ProcessingError::InvalidFormat(format!(
                "Header has {} columns, expected more than {} for the {} schema",
                headers.len(),
                ts_cols,
                schema
            )));
        }

        // Map source names to canonical names
        let names: Vec<String> = headers
            .iter()
            .skip(ts_cols)
            .map(|h| schema.canonical_name(h))
            .collect();
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(ProcessingError::InvalidFormat(format!(
                    "Column '{}' appears twice after mapping to canonical names",
                    name
                )));
            }
        }

        // The csv reader drops empty lines itself, so count them here
        let mut stats = FileReadStats {
            blank_rows: body
                .lines()
                .skip(1 + UNITS_ROWS)
                .filter(|line| line.trim_end_matches('\r').is_empty())
                .count(),
            ..Default::default()
        };
        let mut index = Vec::new();
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

        for record in reader.records().skip(UNITS_ROWS) {
            let record = record?;

            // Rows of bare delimiters reach us as all-empty records
            if record.iter().all(|f| f.is_empty()) {
                stats.blank_rows += 1;
                continue;
            }

            let ts_fields: Vec<&str> = record.iter().take(ts_cols).collect();
            let timestamp = schema.parse_timestamp(&ts_fields, year)?;
            index.push(timestamp);

            for (i, column) in values.iter_mut().enumerate() {
                let field = record.get(ts_cols + i).unwrap_or("");
                column.push(parse_value(field, &mut stats));
            }
            stats.data_rows += 1;
        }

        if stats.unparsed_values > 0 {
            warn!(
                site,
                year,
                count = stats.unparsed_values,
                "unparseable values treated as missing"
            );
        }

        let columns = names
            .into_iter()
            .zip(values)
            .map(|(name, values)| Column::new(name, values))
            .collect();

        Ok((RawTable::new(site, index, columns), stats))
    }
}

impl Default for AflxReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Old files were written on Windows; fall back to cp1252 for them
fn decode(bytes: &[u8], path: &Path) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            debug!(path = %path.display(), "file is not UTF-8, decoding as Windows-1252");
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}

fn skip_lines(content: &str, count: usize) -> &str {
    let offset: usize = content
        .split_inclusive('\n')
        .take(count)
        .map(|line| line.len())
        .sum();
    &content[offset..]
}

fn parse_value(field: &str, stats: &mut FileReadStats) -> f64 {
    let field = field.trim_matches('"');
    if field.is_empty() || field.eq_ignore_ascii_case("nan") || field.eq_ignore_ascii_case("na") {
        return f64::NAN;
    }

    match field.parse::<f64>() {
        Ok(v) if v == MISSING_SENTINEL => f64::NAN,
        Ok(v) => v,
        Err(_) => {
            stats.unparsed_values += 1;
            f64::NAN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const LEGACY_FILE: &str = "\
Sitename: US-Seg
Location: Sevilleta grassland
Generated 2009-03-01
YEAR,DOY,HRMIN,FC,Rg,TA,RE,H,LE
-,-,-,umol/m2/s,W/m2,deg C,umol/m2/s,W/m2,W/m2
2007,1,30,1.5,0,-2.1,0.8,-10,2
2007,1,100,-9999,0,-2.3,0.7,-12,1
2007,1,130,bad,0,-2.4,0.7,-11,1

0,0,0,0,0,0,0,0,0
";

    #[test]
    fn test_parse_legacy_content() {
        let reader = AflxReader::new();
        let (table, stats) = reader
            .parse_content(LEGACY_FILE, "US-Seg", 2007, FileSchema::Legacy)
            .unwrap();

        assert_eq!(
            table.column_names(),
            vec!["FC_F", "SW_IN_F", "TA_F", "RECO", "H_F", "LE_F"]
        );
        assert_eq!(table.len(), 4);
        assert_eq!(stats.data_rows, 4);
        assert_eq!(stats.blank_rows, 1);
        assert_eq!(stats.unparsed_values, 1);

        let first = NaiveDate::from_ymd_opt(2007, 1, 1)
            .unwrap()
            .and_hms_opt(0, 30, 0)
            .unwrap();
        assert_eq!(table.index[0], first);
        assert_eq!(table.columns[0].values[0], 1.5);
        assert!(table.columns[0].values[1].is_nan());
        assert!(table.columns[0].values[2].is_nan());

        // Trailing row of zeros lands in the sentinel year
        assert_eq!(table.index[3].date(), NaiveDate::from_ymd_opt(1954, 12, 31).unwrap());
    }

    #[test]
    fn test_blank_and_delimiter_only_rows_counted() {
        let content = "a\nb\nc\nTIMESTAMP,FC_F\n-,-\n\
2010-01-01 00:30,1.0\n\
\r\n\
,\n\
\n\
2010-01-01 01:00,2.0\n";

        let (table, stats) = AflxReader::new()
            .parse_content(content, "US-Ses", 2010, FileSchema::Modern)
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(stats.data_rows, 2);
        assert_eq!(stats.blank_rows, 3);
    }

    #[test]
    fn test_parse_modern_tab_delimited() {
        let content = "a\nb\nc\n\
TIMESTAMP\tFC_F\tLE_F\n\
-\tumol/m2/s\tW/m2\n\
2010-01-01 00:30\t0.5\t-9999\n";

        let reader = AflxReader::new();
        let (table, _) = reader
            .parse_content(content, "US-Ses", 2010, FileSchema::Modern)
            .unwrap();

        assert_eq!(table.column_names(), vec!["FC_F", "LE_F"]);
        assert_eq!(table.columns[0].values, vec![0.5]);
        assert!(table.columns[1].values[0].is_nan());
    }

    #[test]
    fn test_invalid_timestamp_is_an_error() {
        let content = "a\nb\nc\nTIMESTAMP,FC_F\n-,-\nnot-a-date,1.0\n";
        let reader = AflxReader::new();
        let result = reader.parse_content(content, "US-Ses", 2010, FileSchema::Modern);
        assert!(matches!(result, Err(ProcessingError::InvalidFormat(_))));
    }

    #[test]
    fn test_read_file_with_mmap_and_latin1_bytes() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"site\nunits in \xb0C\nline3\n")?;
        temp_file.write_all(b"TIMESTAMP,TA_F\n-,\xb0C\n2010-01-01 00:30:00,4.5\n")?;

        let reader = AflxReader::with_mmap(true);
        let (table, stats) =
            reader.read_file(temp_file.path(), "US-Ses", 2010, FileSchema::Modern)?;

        assert_eq!(stats.data_rows, 1);
        assert_eq!(table.columns[0].values, vec![4.5]);
        Ok(())
    }
}
