use crate::error::Result;
use crate::models::{Column, DatedSeries, ObservationSeries, ResampledTable};
use crate::processors::climatology::ClimatologyTable;
use crate::utils::constants::{MISSING_NA_STR, MISSING_SENTINEL_STR};
use chrono::{Local, NaiveDateTime};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A table that can be written as CSV: one index column, then data columns
pub trait TabularData {
    fn index_header(&self) -> &'static str;

    fn index_labels(&self) -> Vec<String>;

    fn table_columns(&self) -> Cow<'_, [Column]>;
}

impl TabularData for ObservationSeries {
    fn index_header(&self) -> &'static str {
        "timestamp"
    }

    fn index_labels(&self) -> Vec<String> {
        self.index()
            .iter()
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .collect()
    }

    fn table_columns(&self) -> Cow<'_, [Column]> {
        Cow::Borrowed(self.columns())
    }
}

impl TabularData for ResampledTable {
    fn index_header(&self) -> &'static str {
        "date"
    }

    fn index_labels(&self) -> Vec<String> {
        let format = self.frequency().label_format();
        self.index()
            .iter()
            .map(|d| d.format(format).to_string())
            .collect()
    }

    fn table_columns(&self) -> Cow<'_, [Column]> {
        Cow::Borrowed(self.columns())
    }
}

impl TabularData for ClimatologyTable {
    fn index_header(&self) -> &'static str {
        "doy"
    }

    fn index_labels(&self) -> Vec<String> {
        self.doy().iter().map(|d| d.to_string()).collect()
    }

    fn table_columns(&self) -> Cow<'_, [Column]> {
        Cow::Owned(self.columns())
    }
}

impl TabularData for DatedSeries {
    fn index_header(&self) -> &'static str {
        "date"
    }

    fn index_labels(&self) -> Vec<String> {
        self.dates
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect()
    }

    fn table_columns(&self) -> Cow<'_, [Column]> {
        Cow::Owned(vec![Column::new(self.name.clone(), self.values.clone())])
    }
}

/// Provenance lines written above the CSV header
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataBlock {
    pub site: String,
    pub generated_at: NaiveDateTime,
    pub generator: String,
    pub revision: Option<String>,
}

impl MetadataBlock {
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            generated_at: Local::now().naive_local(),
            generator: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            revision: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Site: {}", self.site),
            format!("Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S")),
            format!("Generator: {}", self.generator),
        ];
        if let Some(revision) = &self.revision {
            lines.push(format!("Revision: {}", revision));
        }
        lines
    }
}

pub struct CsvWriter {
    missing_value: String,
    precision: Option<usize>,
    metadata: Option<MetadataBlock>,
}

impl CsvWriter {
    pub fn new() -> Self {
        Self {
            missing_value: MISSING_SENTINEL_STR.to_string(),
            precision: None,
            metadata: None,
        }
    }

    /// Write missing cells as `NA` instead of `-9999`
    pub fn with_na_missing(mut self, use_na: bool) -> Self {
        let missing = if use_na { MISSING_NA_STR } else { MISSING_SENTINEL_STR };
        self.missing_value = missing.to_string();
        self
    }

    pub fn with_missing_value(mut self, missing_value: impl Into<String>) -> Self {
        self.missing_value = missing_value.into();
        self
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_metadata(mut self, metadata: Option<MetadataBlock>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn write<T: TabularData>(&self, table: &T, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        self.write_to(table, BufWriter::new(file))
    }

    pub fn write_to<T: TabularData, W: Write>(&self, table: &T, mut out: W) -> Result<()> {
        if let Some(metadata) = &self.metadata {
            for line in metadata.lines() {
                writeln!(out, "{}", line)?;
            }
        }

        let columns = table.table_columns();
        let mut writer = csv::Writer::from_writer(out);

        let mut header = Vec::with_capacity(columns.len() + 1);
        header.push(table.index_header().to_string());
        header.extend(columns.iter().map(|c| c.name.clone()));
        writer.write_record(&header)?;

        let mut row = Vec::with_capacity(columns.len() + 1);
        for (i, label) in table.index_labels().into_iter().enumerate() {
            row.clear();
            row.push(label);
            row.extend(columns.iter().map(|c| self.format_value(c.values[i])));
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Stack several sites' tables into one file, one block per site, with
    /// a trailing `site` column. Columns are the union of all tables in
    /// first-seen order; a table lacking a column writes missing cells.
    pub fn write_stacked(&self, tables: &[&ResampledTable], path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        self.write_stacked_to(tables, BufWriter::new(file))
    }

    pub fn write_stacked_to<W: Write>(&self, tables: &[&ResampledTable], out: W) -> Result<()> {
        let mut names: Vec<&str> = Vec::new();
        for table in tables {
            for name in table.column_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        let mut writer = csv::Writer::from_writer(out);
        let mut header = Vec::with_capacity(names.len() + 2);
        header.push("date");
        header.extend(names.iter().copied());
        header.push("site");
        writer.write_record(&header)?;

        let mut row = Vec::with_capacity(names.len() + 2);
        for table in tables {
            let format = table.frequency().label_format();
            let columns: Vec<Option<&Column>> = names.iter().map(|n| table.column(n)).collect();

            for (i, period) in table.index().iter().enumerate() {
                row.clear();
                row.push(period.format(format).to_string());
                row.extend(columns.iter().map(|c| match c {
                    Some(column) => self.format_value(column.values[i]),
                    None => self.missing_value.clone(),
                }));
                row.push(table.site().to_string());
                writer.write_record(&row)?;
            }
        }

        writer.flush()?;
        Ok(())
    }

    fn format_value(&self, value: f64) -> String {
        if value.is_nan() {
            self.missing_value.clone()
        } else if let Some(precision) = self.precision {
            format!("{:.*}", precision, value)
        } else {
            value.to_string()
        }
    }
}

impl Default for CsvWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Frequency;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn monthly() -> ResampledTable {
        ResampledTable::new(
            "US-Vcm",
            Frequency::Monthly,
            vec![
                NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2012, 2, 1).unwrap(),
            ],
            vec![
                Column::new("P_F_sum", vec![12.5, f64::NAN]),
                Column::new("TA_F_avg", vec![-1.25, 2.0]),
            ],
        )
        .unwrap()
    }

    fn render(writer: &CsvWriter, table: &impl TabularData) -> String {
        let mut buffer = Vec::new();
        writer.write_to(table, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_write_monthly_table() {
        let text = render(&CsvWriter::new(), &monthly());
        assert_eq!(
            text,
            "date,P_F_sum,TA_F_avg\n2012-01,12.5,-1.25\n2012-02,-9999,2\n"
        );
    }

    #[test]
    fn test_na_missing_and_precision() {
        let writer = CsvWriter::new().with_na_missing(true).with_precision(1);
        let text = render(&writer, &monthly());
        assert!(text.contains("2012-02,NA,2.0"));
    }

    #[test]
    fn test_metadata_block_precedes_header() {
        let metadata = MetadataBlock {
            site: "US-Vcm".to_string(),
            generated_at: NaiveDate::from_ymd_opt(2016, 3, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            generator: "flux-processor 0.1.0".to_string(),
            revision: Some("abc123".to_string()),
        };
        let writer = CsvWriter::new().with_metadata(Some(metadata));
        let text = render(&writer, &monthly());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Site: US-Vcm");
        assert_eq!(lines[1], "Generated: 2016-03-01 09:00:00");
        assert_eq!(lines[3], "Revision: abc123");
        assert_eq!(lines[4], "date,P_F_sum,TA_F_avg");
    }

    #[test]
    fn test_write_stacked_annual_tables() {
        let year = |y| NaiveDate::from_ymd_opt(y, 1, 1).unwrap();
        let seg = ResampledTable::new(
            "US-Seg",
            Frequency::Annual,
            vec![year(2009), year(2010)],
            vec![
                Column::new("GPP_g_int", vec![410.5, 388.0]),
                Column::new("P_F_sum", vec![230.0, f64::NAN]),
            ],
        )
        .unwrap();
        let ses = ResampledTable::new(
            "US-Ses",
            Frequency::Annual,
            vec![year(2010)],
            vec![
                Column::new("GPP_g_int", vec![301.25]),
                Column::new("ET_mm_int", vec![250.0]),
            ],
        )
        .unwrap();

        let mut buffer = Vec::new();
        CsvWriter::new()
            .write_stacked_to(&[&seg, &ses], &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert_eq!(
            text,
            "date,GPP_g_int,P_F_sum,ET_mm_int,site\n\
2009,410.5,230,-9999,US-Seg\n\
2010,388,-9999,-9999,US-Seg\n\
2010,301.25,-9999,250,US-Ses\n"
        );
    }

    #[test]
    fn test_write_file_creates_directories() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("out").join("US-Vcm_monthly_aflx.csv");
        CsvWriter::new().write(&monthly(), &path)?;

        let text = std::fs::read_to_string(&path)?;
        assert!(text.starts_with("date,"));
        Ok(())
    }
}
