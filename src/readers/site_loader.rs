use crate::error::{ProcessingError, Result};
use crate::models::{Column, ObservationSeries, RawTable, CANONICAL_VARIABLES};
use crate::processors::time_grid::{GridNormalizer, NormalizeReport, TimeGrid};
use crate::readers::aflx_reader::{AflxReader, FileReadStats};
use crate::readers::schema::{FileSchema, FileVariant, SchemaSelection};
use crate::utils::constants::DEFAULT_LOWER_BOUND_YEAR;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-file outcome of a load
#[derive(Debug, Clone, Serialize)]
pub struct FileLoadSummary {
    pub year: i32,
    pub path: PathBuf,
    pub schema: FileSchema,
    pub stats: FileReadStats,
    pub normalize: NormalizeReport,
}

/// What happened while loading one site
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub site: String,
    pub start_year: i32,
    pub end_year: i32,
    pub years_loaded: Vec<i32>,
    pub years_missing: Vec<i32>,
    pub files: Vec<FileLoadSummary>,
    pub span: NormalizeReport,
}

impl LoadReport {
    fn new(site: &str, start_year: i32, end_year: i32) -> Self {
        Self {
            site: site.to_string(),
            start_year,
            end_year,
            years_loaded: Vec::new(),
            years_missing: Vec::new(),
            files: Vec::new(),
            span: NormalizeReport::default(),
        }
    }

    pub fn unparsed_values(&self) -> usize {
        self.files.iter().map(|f| f.stats.unparsed_values).sum()
    }

    pub fn dropped_rows(&self) -> usize {
        self.files
            .iter()
            .map(|f| f.normalize.below_bound + f.normalize.off_grid)
            .sum()
    }
}

/// Loads multi-year half-hourly tables for a site
pub struct SiteLoader {
    base_path: PathBuf,
    variant: FileVariant,
    schema: SchemaSelection,
    lower_bound_year: i32,
    reader: AflxReader,
}

impl SiteLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            variant: FileVariant::Gapfilled,
            schema: SchemaSelection::Auto,
            lower_bound_year: DEFAULT_LOWER_BOUND_YEAR,
            reader: AflxReader::new(),
        }
    }

    pub fn with_variant(mut self, variant: FileVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_schema(mut self, schema: SchemaSelection) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_lower_bound_year(mut self, year: i32) -> Self {
        self.lower_bound_year = year;
        self
    }

    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.reader = AflxReader::with_mmap(use_mmap);
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Where the file for `site` and `year` is expected
    pub fn file_path(&self, site: &str, year: i32) -> PathBuf {
        self.base_path.join(self.variant.file_name(site, year))
    }

    /// Load every year in `start_year..=end_year` for a site
    pub fn load(
        &self,
        site: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<(ObservationSeries, LoadReport)> {
        let files: Vec<(i32, PathBuf)> = (start_year..=end_year)
            .map(|year| (year, self.file_path(site, year)))
            .collect();
        self.load_files(site, &files, start_year, end_year)
    }

    /// Load an explicit list of (year, path) files and normalize the result
    /// onto the `start_year..=end_year` span
    pub fn load_files(
        &self,
        site: &str,
        files: &[(i32, PathBuf)],
        start_year: i32,
        end_year: i32,
    ) -> Result<(ObservationSeries, LoadReport)> {
        let span = TimeGrid::half_hourly_span(start_year, end_year)?;
        let mut report = LoadReport::new(site, start_year, end_year);
        let mut parts = Vec::new();

        for (year, path) in files {
            if !path.exists() {
                warn!(site, year, path = %path.display(), "file not found, year will be missing");
                report.years_missing.push(*year);
                continue;
            }

            let (series, summary) = self.load_year(site, *year, path)?;
            report.years_loaded.push(*year);
            report.files.push(summary);
            parts.push(series);
        }

        if parts.is_empty() {
            warn!(site, start_year, end_year, "no files found, returning an empty table");
            let series = GridNormalizer::empty(site, &span, CANONICAL_VARIABLES)?;
            report.span = NormalizeReport {
                expected: span.len(),
                ..Default::default()
            };
            return Ok((series, report));
        }

        let combined = concat_years(site, parts)?;
        let normalizer = GridNormalizer::with_lower_bound_year(start_year)?;
        let (series, span_report) = normalizer.normalize(&combined, &span)?;
        report.span = span_report;

        info!(
            site,
            years = report.years_loaded.len(),
            missing = report.years_missing.len(),
            rows = series.len(),
            "site loaded"
        );
        Ok((series, report))
    }

    fn load_year(
        &self,
        site: &str,
        year: i32,
        path: &Path,
    ) -> Result<(ObservationSeries, FileLoadSummary)> {
        let schema = self.schema.resolve(year);
        let (table, stats) = self.reader.read_file(path, site, year, schema)?;

        let grid = TimeGrid::half_hourly_year(year)?;
        let normalizer = GridNormalizer::with_lower_bound_year(self.lower_bound_year)?;
        let (series, normalize) = normalizer.normalize(&table, &grid)?;

        debug!(
            site,
            year,
            %schema,
            rows = stats.data_rows,
            retained = normalize.retained,
            "year normalized"
        );

        let summary = FileLoadSummary {
            year,
            path: path.to_path_buf(),
            schema,
            stats,
            normalize,
        };
        Ok((series, summary))
    }
}

/// Stack yearly tables in chronological order. Columns are the union of all
/// parts in first-seen order; a part lacking a column contributes missing
/// values. Any timestamp seen twice is an integrity error.
pub fn concat_years(site: &str, mut parts: Vec<ObservationSeries>) -> Result<RawTable> {
    parts.sort_by_key(|p| p.first_timestamp());

    let mut names: Vec<String> = Vec::new();
    for part in &parts {
        for name in part.column_names() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }

    let total: usize = parts.iter().map(|p| p.len()).sum();
    let mut index = Vec::with_capacity(total);
    let mut seen = HashSet::with_capacity(total);
    let mut values: Vec<Vec<f64>> = vec![Vec::with_capacity(total); names.len()];

    for part in &parts {
        for timestamp in part.index() {
            if !seen.insert(*timestamp) {
                return Err(ProcessingError::DuplicateTimestamp {
                    site: site.to_string(),
                    timestamp: *timestamp,
                });
            }
        }
        index.extend_from_slice(part.index());

        for (name, column) in names.iter().zip(values.iter_mut()) {
            match part.column(name) {
                Some(c) => column.extend_from_slice(&c.values),
                None => column.extend(std::iter::repeat(f64::NAN).take(part.len())),
            }
        }
    }

    let columns = names
        .into_iter()
        .zip(values)
        .map(|(name, values)| Column::new(name, values))
        .collect();
    Ok(RawTable::new(site, index, columns))
}

/// One column per site holding `variable`, over the sites' shared index.
/// A site without the variable contributes an all-missing column.
pub fn variable_by_site(series: &[ObservationSeries], variable: &str) -> Result<ObservationSeries> {
    let first = series.first().ok_or_else(|| {
        ProcessingError::MissingData(format!("No sites given for variable {}", variable))
    })?;

    let mut columns = Vec::with_capacity(series.len());
    for site in series {
        if site.index() != first.index() {
            return Err(ProcessingError::IndexMismatch(format!(
                "Site {} does not share the index of site {}",
                site.site(),
                first.site()
            )));
        }

        let column = match site.column(variable) {
            Some(c) => Column::new(site.site(), c.values.clone()),
            None => {
                warn!(site = site.site(), variable, "variable absent, column left missing");
                Column::missing(site.site(), site.len())
            }
        };
        columns.push(column);
    }

    ObservationSeries::new(variable, first.step(), first.index().to_vec(), columns)
}
