use crate::error::{ProcessingError, Result};
use crate::models::{Frequency, ObservationSeries, ResampledTable, VariableGroups};
use crate::processors::corrections::Corrections;
use crate::processors::depth_groups::DepthGroups;
use crate::processors::derived::{self, Extremum, PEAK_DAYFRAC_SUFFIX};
use crate::processors::period_index::Aggregation;
use crate::processors::resampler::Resampler;
use crate::processors::water_year::WaterYearCalendar;
use crate::readers::{LoadReport, SiteLoader};
use crate::utils::constants::{
    CARBON_UPTAKE_COLUMN, DEGREE_DAYS_COLUMN, DEGREE_DAYS_RANGE_COLUMN, FC_F, TA_F,
};
use crate::utils::progress::ProgressReporter;
use rayon::prelude::*;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Daily peak-time columns added when derived metrics are on
const PEAK_VARIABLES: &[(&str, Extremum)] = &[
    ("GPP", Extremum::Max),
    (FC_F, Extremum::Min),
    ("RECO", Extremum::Min),
];

/// Everything one site goes through: load, corrections, depth groups,
/// derived columns, then one resampled table per frequency
pub struct SitePipeline {
    loader: SiteLoader,
    start_year: i32,
    end_year: i32,
    frequencies: Vec<Frequency>,
    groups: VariableGroups,
    resampler: Resampler,
    corrections: Corrections,
    depth_groups: DepthGroups,
    water_year: Option<WaterYearCalendar>,
    derived: bool,
}

impl SitePipeline {
    pub fn new(loader: SiteLoader, start_year: i32, end_year: i32) -> Self {
        Self {
            loader,
            start_year,
            end_year,
            frequencies: vec![Frequency::Daily],
            groups: VariableGroups::default(),
            resampler: Resampler::new(),
            corrections: Corrections::new(),
            depth_groups: DepthGroups::default(),
            water_year: None,
            derived: false,
        }
    }

    pub fn with_frequencies(mut self, frequencies: Vec<Frequency>) -> Self {
        self.frequencies = frequencies;
        self
    }

    pub fn with_groups(mut self, groups: VariableGroups) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_resampler(mut self, resampler: Resampler) -> Self {
        self.resampler = resampler;
        self
    }

    pub fn with_corrections(mut self, corrections: Corrections) -> Self {
        self.corrections = corrections;
        self
    }

    pub fn with_depth_groups(mut self, depth_groups: DepthGroups) -> Self {
        self.depth_groups = depth_groups;
        self
    }

    /// Annual tables are built on water years instead of calendar years
    pub fn with_water_year(mut self, water_year: Option<WaterYearCalendar>) -> Self {
        self.water_year = water_year;
        self
    }

    pub fn with_derived(mut self, derived: bool) -> Self {
        self.derived = derived;
        self
    }

    pub fn years(&self) -> (i32, i32) {
        (self.start_year, self.end_year)
    }

    /// Load and correct a site, without resampling
    pub fn load(&self, site: &str) -> Result<(ObservationSeries, LoadReport)> {
        let (series, load) = self.loader.load(site, self.start_year, self.end_year)?;
        let series = self.corrections.apply(series)?;
        let series = if self.depth_groups.is_empty() {
            series
        } else {
            self.depth_groups.apply(series)?
        };
        Ok((series, load))
    }

    pub fn run(&self, site: &str) -> Result<SiteOutput> {
        let (mut series, load) = self.load(site)?;
        let mut groups = self.groups.clone();

        if self.derived && series.has_column(FC_F) {
            let uptake = derived::carbon_uptake_hours(&series, FC_F)?;
            series = series.with_column(uptake)?;
            groups.sums.push(CARBON_UPTAKE_COLUMN.to_string());
        }

        let mut tables = Vec::with_capacity(self.frequencies.len());
        for frequency in &self.frequencies {
            let source = match (frequency, &self.water_year) {
                (Frequency::Annual, Some(calendar)) => Cow::Owned(calendar.shift_series(&series)),
                _ => Cow::Borrowed(&series),
            };

            let table = self.resampler.resample(&source, *frequency, &groups)?;
            let table = if self.derived {
                self.add_derived(&source, table, &groups)?
            } else {
                table
            };
            tables.push(table);
        }

        info!(site, tables = tables.len(), "site pipeline finished");
        Ok(SiteOutput {
            site: site.to_string(),
            series,
            load,
            tables,
        })
    }

    /// Daily tables get the daily metrics directly. Coarser tables get the
    /// same metrics computed per day and rolled up.
    fn add_derived(
        &self,
        series: &ObservationSeries,
        table: ResampledTable,
        groups: &VariableGroups,
    ) -> Result<ResampledTable> {
        let mut table = match table.frequency() {
            Frequency::Daily => self.daily_metrics(series, table, groups)?,
            frequency => {
                let daily = self.resampler.resample(series, Frequency::Daily, groups)?;
                let daily = self.daily_metrics(series, daily, groups)?;
                self.roll_up_daily(&daily, frequency, table)?
            }
        };

        let carbon = |v: &str| format!("{}_g_int", v);
        if table.column(&carbon("GPP")).is_some() && table.column(&carbon("RECO")).is_some() {
            let column = derived::ratio(&table, &carbon("GPP"), &carbon("RECO"), "GPP_over_RE")?;
            table = table.with_column(column)?;
        }

        Ok(table)
    }

    fn daily_metrics(
        &self,
        series: &ObservationSeries,
        mut daily: ResampledTable,
        groups: &VariableGroups,
    ) -> Result<ResampledTable> {
        if groups.min_max.iter().any(|v| v == TA_F) {
            let (dd, range) = derived::degree_days(
                &daily,
                &format!("{}_min", TA_F),
                &format!("{}_max", TA_F),
                0.0,
            )?;
            daily = daily.with_column(dd)?.with_column(range)?;
        }

        for (variable, extremum) in PEAK_VARIABLES {
            if series.has_column(variable) {
                let peaks = derived::peak_dayfrac(
                    series,
                    variable,
                    *extremum,
                    self.resampler.bin_convention(),
                )?;
                daily = daily.join(peaks)?;
            }
        }

        Ok(daily)
    }

    /// Join period sums of daily degree days and period means of the other
    /// daily metrics onto `table`
    fn roll_up_daily(
        &self,
        daily: &ResampledTable,
        frequency: Frequency,
        mut table: ResampledTable,
    ) -> Result<ResampledTable> {
        let uptake = format!("{}_sum", CARBON_UPTAKE_COLUMN);
        let tmin = format!("{}_min", TA_F);
        let tmax = format!("{}_max", TA_F);

        let mut sums = Vec::new();
        let mut means = Vec::new();
        for name in daily.column_names() {
            if name == DEGREE_DAYS_COLUMN {
                sums.push(name);
            } else if name == DEGREE_DAYS_RANGE_COLUMN
                || name == uptake
                || name == tmin
                || name == tmax
                || name.ends_with(PEAK_DAYFRAC_SUFFIX)
            {
                means.push(name);
            }
        }

        for (aggregation, columns) in [(Aggregation::Sum, sums), (Aggregation::Mean, means)] {
            if !columns.is_empty() {
                let rolled = self.resampler.rollup(daily, frequency, aggregation, &columns)?;
                table = table.join(rolled)?;
            }
        }

        Ok(table)
    }
}

/// Result of one site's pipeline
#[derive(Debug, Clone)]
pub struct SiteOutput {
    pub site: String,
    pub series: ObservationSeries,
    pub load: LoadReport,
    pub tables: Vec<ResampledTable>,
}

/// Completed sites keyed by name, plus the sites that failed
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub completed: BTreeMap<String, SiteOutput>,
    pub failed: Vec<(String, ProcessingError)>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs independent site pipelines on a thread pool
pub struct BatchProcessor {
    max_workers: usize,
}

impl BatchProcessor {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    /// Run every site; a failing site is reported and the rest continue
    pub fn process_sites(
        &self,
        pipeline: &SitePipeline,
        sites: &[String],
        progress: Option<&ProgressReporter>,
    ) -> Result<BatchOutcome> {
        let processed_count = Arc::new(AtomicUsize::new(0));

        if let Some(p) = progress {
            p.set_message(&format!("Processing {} sites...", sites.len()));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .build()
            .map_err(|e| ProcessingError::Config(e.to_string()))?;

        let results: Vec<(String, Result<SiteOutput>)> = pool.install(|| {
            sites
                .par_iter()
                .map(|site| {
                    let result = pipeline.run(site);

                    let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(p) = progress {
                        p.update(count as u64);
                    }

                    (site.clone(), result)
                })
                .collect()
        });

        let mut outcome = BatchOutcome::default();
        for (site, result) in results {
            match result {
                Ok(output) => {
                    outcome.completed.insert(site, output);
                }
                Err(e) => {
                    error!(site = %site, error = %e, "site failed");
                    outcome.failed.push((site, e));
                }
            }
        }

        if let Some(p) = progress {
            p.finish_with_message(&format!(
                "Processed {} sites ({} failed)",
                outcome.completed.len(),
                outcome.failed.len()
            ));
        }

        Ok(outcome)
    }
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VariableGroup;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn write_year(dir: &std::path::Path, site: &str, year: i32) {
        let mut content =
            String::from("a\nb\nc\nTIMESTAMP,FC_F,GPP,RECO,TA_F,P_F\n-,-,-,-,-,-\n");
        content.push_str(&format!("{}-01-01 12:00,-2.0,3.0,1.0,5.0,0.2\n", year));
        content.push_str(&format!("{}-01-01 12:30,1.0,1.0,1.0,9.0,0.0\n", year));
        fs::write(dir.join(format!("{}_{}_gapfilled.txt", site, year)), content).unwrap();
    }

    fn pipeline(dir: &TempDir) -> SitePipeline {
        let groups = VariableGroups::empty()
            .with_group(VariableGroup::CarbonFlux, &["FC_F", "GPP", "RECO"])
            .with_group(VariableGroup::MinMax, &["TA_F"])
            .with_group(VariableGroup::Sum, &["P_F"]);

        SitePipeline::new(SiteLoader::new(dir.path()), 2010, 2010)
            .with_groups(groups)
            .with_frequencies(vec![Frequency::Daily, Frequency::Monthly])
            .with_derived(true)
    }

    #[test]
    fn test_pipeline_with_derived_columns() {
        let dir = TempDir::new().unwrap();
        write_year(dir.path(), "US-Seg", 2010);

        let output = pipeline(&dir).run("US-Seg").unwrap();
        assert_eq!(output.tables.len(), 2);

        let daily = &output.tables[0];
        assert_eq!(daily.len(), 365);
        let jan1 = daily.index()[0];
        assert_eq!(daily.value_at("hrs_C_uptake_sum", jan1), Some(0.5));
        assert_eq!(daily.value_at("degree_days", jan1), Some(7.0));
        assert_eq!(daily.value_at("degree_days_range", jan1), Some(2.0));
        assert!(daily.column("GPP_peak_dayfrac").is_some());
        let ratio = daily.value_at("GPP_over_RE", jan1).unwrap();
        assert!((ratio - 2.0).abs() < 1e-12);

        let monthly = &output.tables[1];
        assert_eq!(monthly.len(), 12);
        assert!(monthly.column("degree_days").is_none());
        assert!(monthly.column("GPP_over_RE").is_some());
    }

    #[test]
    fn test_monthly_rolls_up_daily_metrics() {
        let dir = TempDir::new().unwrap();
        write_year(dir.path(), "US-Seg", 2010);

        let output = pipeline(&dir).run("US-Seg").unwrap();
        let monthly = &output.tables[1];
        let jan = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        let feb = NaiveDate::from_ymd_opt(2010, 2, 1).unwrap();

        // Only January 1st has data, so January sums one day of degree days
        assert_eq!(monthly.value_at("degree_days_sum", jan), Some(7.0));
        assert!(monthly.value_at("degree_days_sum", feb).unwrap().is_nan());
        assert_eq!(monthly.value_at("degree_days_range_avg", jan), Some(2.0));
        assert_eq!(monthly.value_at("TA_F_max_avg", jan), Some(9.0));
        assert_eq!(monthly.value_at("TA_F_min_avg", jan), Some(5.0));
        assert_eq!(monthly.value_at("hrs_C_uptake_sum_avg", jan), Some(0.5));
        assert!(monthly.column("GPP_peak_dayfrac_avg").is_some());
        assert!(monthly.column("FC_F_peak_dayfrac_avg").is_some());
    }

    #[test]
    fn test_water_year_annual_rolls_up_shifted_days() {
        let dir = TempDir::new().unwrap();
        write_year(dir.path(), "US-Seg", 2010);

        let output = pipeline(&dir)
            .with_frequencies(vec![Frequency::Annual])
            .with_water_year(Some(WaterYearCalendar::november_start()))
            .run("US-Seg")
            .unwrap();

        let annual = &output.tables[0];
        assert_eq!(annual.frequency(), Frequency::Annual);
        let total: f64 = annual
            .values("degree_days_sum")
            .unwrap()
            .iter()
            .filter(|v| !v.is_nan())
            .sum();
        assert_eq!(total, 7.0);
    }

    #[test]
    fn test_failed_site_does_not_stop_batch() {
        let dir = TempDir::new().unwrap();
        write_year(dir.path(), "US-Seg", 2010);
        // Second site lacks every requested variable
        fs::write(
            dir.path().join("US-Ses_2010_gapfilled.txt"),
            "a\nb\nc\nTIMESTAMP,WS\n-,-\n2010-01-01 12:00,1.0\n",
        )
        .unwrap();

        let sites = vec!["US-Seg".to_string(), "US-Ses".to_string()];
        let outcome = BatchProcessor::new(2)
            .process_sites(&pipeline(&dir), &sites, None)
            .unwrap();

        assert!(outcome.completed.contains_key("US-Seg"));
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "US-Ses");
        assert!(!outcome.is_complete());
    }
}
