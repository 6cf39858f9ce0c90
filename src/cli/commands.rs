use crate::cli::args::{Cli, Commands, SiteArgs};
use crate::config::PipelineConfig;
use crate::error::{ProcessingError, Result};
use crate::logging;
use crate::models::{Frequency, ResampledTable};
use crate::processors::{
    BatchOutcome, BatchProcessor, ClimatologyTable, IntegrityChecker, QualityReport,
    SitePipeline, WaterYearCalendar,
};
use crate::utils::filename::{
    anomaly_filename, climatology_filename, half_hourly_filename, resampled_filename,
    stacked_annual_filename,
};
use crate::utils::constants::MISSING_NA_STR;
use crate::utils::progress::ProgressReporter;
use crate::writers::{CsvWriter, MetadataBlock};
use std::path::Path;
use tracing::{info, warn};

pub async fn run(cli: Cli) -> Result<()> {
    logging::init(cli.verbose, cli.log_file.as_deref())?;

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if cli.na {
        config.missing_value = MISSING_NA_STR.to_string();
    }

    match cli.command {
        Commands::Load { ref sites } => {
            apply_site_args(&mut config, sites)?;
            // No frequencies: the pipeline stops after loading
            let pipeline = config
                .pipeline()?
                .with_frequencies(Vec::new())
                .with_derived(false);

            println!("Loading {} sites...", config.sites.len());
            let outcome = run_batch(pipeline, &config, &cli).await?;

            for (site, output) in &outcome.completed {
                let path = half_hourly_filename(&config.output_dir, site);
                csv_writer(&config, &cli, site).write(&output.series, &path)?;
                println!("{}: {} half-hourly rows -> {}", site, output.series.len(), path.display());
            }

            finish(&outcome, &cli)?;
        }

        Commands::Resample {
            ref sites,
            ref frequencies,
            water_year_offset,
            derived,
        } => {
            apply_site_args(&mut config, sites)?;
            if !frequencies.is_empty() {
                config.frequencies = frequencies.clone();
            }
            config.derived |= derived;

            let mut pipeline = config.pipeline()?;
            if let Some(offset) = water_year_offset {
                pipeline = pipeline.with_water_year(Some(WaterYearCalendar::new(offset)?));
            }
            let water_year = water_year_offset.is_some() || config.water_year.is_some();

            println!(
                "Resampling {} sites to {}...",
                config.sites.len(),
                config.frequencies.join(", ")
            );
            let outcome = run_batch(pipeline, &config, &cli).await?;

            for (site, output) in &outcome.completed {
                let writer = csv_writer(&config, &cli, site);
                for table in &output.tables {
                    let path = resampled_filename(&config.output_dir, site, table.frequency());
                    writer.write(table, &path)?;
                    println!("{}: {} {} rows -> {}", site, table.len(), table.frequency(), path.display());
                }
            }

            let annual: Vec<&ResampledTable> = outcome
                .completed
                .values()
                .flat_map(|o| o.tables.iter())
                .filter(|t| t.frequency() == Frequency::Annual)
                .collect();
            if !annual.is_empty() {
                let path = stacked_annual_filename(&config.output_dir, water_year);
                CsvWriter::new()
                    .with_missing_value(config.missing_value.clone())
                    .write_stacked(&annual, &path)?;
                println!("{} sites stacked -> {}", annual.len(), path.display());
            }

            finish(&outcome, &cli)?;
        }

        Commands::Climatology {
            ref sites,
            ref variable,
            ref frequency,
            normalize,
        } => {
            apply_site_args(&mut config, sites)?;
            let frequency = Frequency::parse(frequency)?;
            let pipeline = config.pipeline()?.with_frequencies(vec![frequency]);

            println!("Computing {} climatology for {} sites...", variable, config.sites.len());
            let outcome = run_batch(pipeline, &config, &cli).await?;

            for (site, output) in &outcome.completed {
                let Some(table) = output.tables.first() else {
                    continue;
                };
                let series = table.series(variable)?;
                let climatology = ClimatologyTable::from_series(&series)?;
                let anomalies = climatology.anomalies(&series, normalize);

                let clim_path = climatology_filename(&config.output_dir, site, variable);
                let anom_path = anomaly_filename(&config.output_dir, site, variable);
                let writer = csv_writer(&config, &cli, site);
                writer.write(&climatology, &clim_path)?;
                writer.write(&anomalies, &anom_path)?;

                info!(site = %site, years = climatology.years().len(), "climatology written");
                println!(
                    "{}: {} years -> {}, {}",
                    site,
                    climatology.years().len(),
                    clim_path.display(),
                    anom_path.display()
                );
            }

            finish(&outcome, &cli)?;
        }

        Commands::Validate {
            ref sites,
            missing_threshold,
        } => {
            apply_site_args(&mut config, sites)?;
            let pipeline = config
                .pipeline()?
                .with_frequencies(Vec::new())
                .with_derived(false);

            println!("Validating {} sites...", config.sites.len());
            let outcome = run_batch(pipeline, &config, &cli).await?;

            let checker = IntegrityChecker::with_missing_threshold(missing_threshold);
            let report = quality_report(&checker, &outcome);
            println!("\n{}", checker.generate_summary(&report));

            if report.violations.is_empty() && outcome.is_complete() {
                println!("✅ All sites passed validation checks");
            } else {
                println!("⚠️  Found {} validation issues", report.violations.len());
            }

            report_failures(&outcome);
            if let Some(path) = &cli.report {
                write_report(&report, path)?;
            }
        }
    }

    Ok(())
}

fn apply_site_args(config: &mut PipelineConfig, args: &SiteArgs) -> Result<()> {
    if !args.sites.is_empty() {
        config.sites = args.sites.clone();
    }
    if let Some(year) = args.start_year {
        config.start_year = year;
    }
    if let Some(year) = args.end_year {
        config.end_year = year;
    }
    if let Some(path) = &args.flux_path {
        config.flux_path = path.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if args.with_gaps {
        config.gapfilled = false;
    }
    config.check()
}

/// Run the pipeline for every configured site off the async runtime
async fn run_batch(pipeline: SitePipeline, config: &PipelineConfig, cli: &Cli) -> Result<BatchOutcome> {
    let sites = config.sites.clone();
    let max_workers = cli.max_workers;
    let silent = cli.quiet;

    let outcome = tokio::task::spawn_blocking(move || {
        let progress = ProgressReporter::new(sites.len() as u64, "Processing sites...", silent);
        BatchProcessor::new(max_workers).process_sites(&pipeline, &sites, Some(&progress))
    })
    .await??;

    info!(
        completed = outcome.completed.len(),
        failed = outcome.failed.len(),
        "batch finished"
    );
    Ok(outcome)
}

fn csv_writer(config: &PipelineConfig, cli: &Cli, site: &str) -> CsvWriter {
    let metadata = cli.metadata.then(|| match &cli.revision {
        Some(revision) => MetadataBlock::new(site).with_revision(revision.clone()),
        None => MetadataBlock::new(site),
    });
    CsvWriter::new()
        .with_missing_value(config.missing_value.clone())
        .with_metadata(metadata)
}

fn quality_report(checker: &IntegrityChecker, outcome: &BatchOutcome) -> QualityReport {
    let (series, loads): (Vec<_>, Vec<_>) = outcome
        .completed
        .values()
        .map(|o| (o.series.clone(), o.load.clone()))
        .unzip();
    checker.check_sites(&series, &loads)
}

fn write_report(report: &QualityReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    println!("Quality report written to {}", path.display());
    Ok(())
}

fn report_failures(outcome: &BatchOutcome) {
    for (site, error) in &outcome.failed {
        warn!(site = %site, error = %error, "site skipped");
        println!("❌ {}: {}", site, error);
    }
}

/// Print failures, write the optional report, and fail if no site succeeded
fn finish(outcome: &BatchOutcome, cli: &Cli) -> Result<()> {
    report_failures(outcome);

    if let Some(path) = &cli.report {
        let report = quality_report(&IntegrityChecker::new(), outcome);
        write_report(&report, path)?;
    }

    if outcome.completed.is_empty() && !outcome.failed.is_empty() {
        return Err(ProcessingError::MissingData(format!(
            "all {} sites failed",
            outcome.failed.len()
        )));
    }

    println!("Processing complete!");
    Ok(())
}
