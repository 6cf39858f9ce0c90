use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::Parser;
use flux_processor::cli::{run, Cli};
use flux_processor::models::{DatedSeries, Frequency, VariableGroup, VariableGroups};
use flux_processor::processors::resampler::CARBON_FACTOR;
use flux_processor::processors::{BatchProcessor, ClimatologyTable, Resampler, SitePipeline};
use flux_processor::readers::SiteLoader;
use flux_processor::writers::CsvWriter;
use flux_processor::ProcessingError;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SITE: &str = "US-Seg";

fn ts(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(hh, mm, 0)
        .unwrap()
}

/// 2008 in the legacy layout: January 1st fully observed plus one row
/// whose year column disagrees with the file name.
fn write_legacy_2008(dir: &Path) {
    let mut content = String::from(
        "Site: US-Seg\nLegacy Ameriflux file\nline 3\nYEAR,DOY,HRMIN,FC,TA,PRECIP\nyr,doy,hhmm,umol/m2/s,deg C,mm\n",
    );
    for i in 1..=48 {
        let minutes = i * 30;
        let hhmm = (minutes / 60) * 100 + minutes % 60;
        content.push_str(&format!("2008,1,{},2.0,-3.0,0\n", hhmm));
    }
    content.push_str("2007,366,0,99.0,99.0,99\n");
    fs::write(dir.join(format!("{}_2008_gapfilled.txt", SITE)), content).unwrap();
}

/// 2009 in the modern layout: January 1st fully observed
fn write_modern_2009(dir: &Path) {
    let mut content = String::from(
        "Site: US-Seg\nAmeriflux file\nline 3\nTIMESTAMP,FC_F,TA_F,P_F\n-,umol/m2/s,deg C,mm\n",
    );
    let start = ts(2009, 1, 1, 0, 30);
    for i in 0..48 {
        let stamp = start + Duration::minutes(30 * i);
        let precip = if i == 10 { 1.5 } else { 0.0 };
        content.push_str(&format!(
            "{},1.0,5.0,{}\n",
            stamp.format("%Y-%m-%d %H:%M"),
            precip
        ));
    }
    fs::write(dir.join(format!("{}_2009_gapfilled.txt", SITE)), content).unwrap();
}

fn groups() -> VariableGroups {
    VariableGroups::empty()
        .with_group(VariableGroup::CarbonFlux, &["FC_F"])
        .with_group(VariableGroup::Average, &["TA_F"])
        .with_group(VariableGroup::Sum, &["P_F"])
}

#[test]
fn test_mixed_schema_span_is_canonical() {
    let dir = TempDir::new().unwrap();
    write_legacy_2008(dir.path());
    write_modern_2009(dir.path());

    let (series, report) = SiteLoader::new(dir.path()).load(SITE, 2008, 2009).unwrap();

    assert_eq!(series.len(), (366 + 365) * 48);
    assert_eq!(series.first_timestamp(), Some(ts(2008, 1, 1, 0, 30)));
    assert_eq!(series.last_timestamp(), Some(ts(2010, 1, 1, 0, 0)));
    assert_eq!(series.step(), Duration::minutes(30));
    assert_eq!(report.years_loaded, vec![2008, 2009]);

    // Legacy names are mapped onto the modern ones
    assert!(series.has_column("FC_F"));
    assert!(series.has_column("TA_F"));
    assert!(!series.has_column("FC"));

    // The mismatched legacy row is dropped, not merged into 2008
    let ta = series.values("TA_F").unwrap();
    assert!(ta.iter().all(|v| v.is_nan() || *v < 50.0));
    assert!(report.dropped_rows() >= 1);
}

#[test]
fn test_resample_daily_and_annual() {
    let dir = TempDir::new().unwrap();
    write_legacy_2008(dir.path());
    write_modern_2009(dir.path());

    let pipeline = SitePipeline::new(SiteLoader::new(dir.path()), 2008, 2009)
        .with_groups(groups())
        .with_frequencies(vec![Frequency::Daily, Frequency::Annual]);
    let output = pipeline.run(SITE).unwrap();

    let daily = &output.tables[0];
    assert_eq!(daily.len(), 366 + 365);
    let jan1_2009 = NaiveDate::from_ymd_opt(2009, 1, 1).unwrap();
    let carbon = daily.value_at("FC_F_g_int", jan1_2009).unwrap();
    assert!((carbon - 48.0 * CARBON_FACTOR).abs() < 1e-9);
    assert_eq!(daily.value_at("TA_F_avg", jan1_2009), Some(5.0));
    assert_eq!(daily.value_at("P_F_sum", jan1_2009), Some(1.5));

    // Days with no observations stay missing
    let jan2_2009 = NaiveDate::from_ymd_opt(2009, 1, 2).unwrap();
    assert!(daily.value_at("FC_F_g_int", jan2_2009).unwrap().is_nan());

    let annual = &output.tables[1];
    assert_eq!(annual.len(), 2);
    let y2008 = annual.value_at("FC_F_g_int", annual.index()[0]).unwrap();
    assert!((y2008 - 96.0 * CARBON_FACTOR).abs() < 1e-9);
}

#[test]
fn test_duplicate_year_is_an_integrity_error() {
    let dir = TempDir::new().unwrap();
    write_modern_2009(dir.path());
    let original = dir.path().join(format!("{}_2009_gapfilled.txt", SITE));
    let resubmitted = dir.path().join(format!("{}_2009_resubmitted.txt", SITE));
    fs::copy(&original, &resubmitted).unwrap();

    let loader = SiteLoader::new(dir.path());
    let err = loader
        .load_files(SITE, &[(2009, original), (2009, resubmitted)], 2009, 2009)
        .unwrap_err();
    assert!(matches!(err, ProcessingError::DuplicateTimestamp { .. }));
    assert!(err.is_data_integrity());
}

#[test]
fn test_site_without_files_completes_all_missing() {
    let dir = TempDir::new().unwrap();
    write_modern_2009(dir.path());

    let pipeline = SitePipeline::new(SiteLoader::new(dir.path()), 2009, 2009).with_groups(groups());
    let sites = vec![SITE.to_string(), "US-Ses".to_string()];
    let outcome = BatchProcessor::new(2)
        .process_sites(&pipeline, &sites, None)
        .unwrap();

    assert!(outcome.is_complete());
    let empty = &outcome.completed["US-Ses"];
    assert_eq!(empty.load.years_missing, vec![2009]);
    assert_eq!(empty.series.len(), 365 * 48);
    let daily = &empty.tables[0];
    assert_eq!(daily.len(), 365);
    assert!(daily.values("FC_F_g_int").unwrap().iter().all(|v| v.is_nan()));
}

#[test]
fn test_missing_variable_is_reported() {
    let dir = TempDir::new().unwrap();
    write_modern_2009(dir.path());

    let groups = groups().with_group(VariableGroup::LatentHeat, &["LE_F"]);
    let pipeline = SitePipeline::new(SiteLoader::new(dir.path()), 2009, 2009)
        .with_groups(groups)
        .with_resampler(Resampler::new());

    let err = pipeline.run(SITE).unwrap_err();
    assert!(matches!(err, ProcessingError::MissingVariable { .. }));
}

#[test]
fn test_daily_csv_output() {
    let dir = TempDir::new().unwrap();
    write_modern_2009(dir.path());

    let pipeline = SitePipeline::new(SiteLoader::new(dir.path()), 2009, 2009).with_groups(groups());
    let output = pipeline.run(SITE).unwrap();

    let path = dir.path().join("out").join("daily.csv");
    CsvWriter::new().write(&output.tables[0], &path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "date,FC_F_g_int,TA_F_avg,P_F_sum");
    assert!(lines[1].starts_with("2009-01-01,"));
    assert_eq!(lines[2], "2009-01-02,-9999,-9999,-9999");
    assert_eq!(lines.len(), 366);
}

#[test]
fn test_climatology_of_three_years() {
    let dates = vec![
        NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2011, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
    ];
    let series = DatedSeries::new("GPP_g_int", dates, vec![1.0, 2.0, 3.0]);

    let table = ClimatologyTable::from_series(&series).unwrap();
    assert_eq!(table.years(), &[2010, 2011, 2012]);
    assert_eq!(table.mean()[0], 2.0);
    assert_eq!(table.stdev()[0], 1.0);
    assert!((table.stderr()[0] - 1.0 / 2f64.sqrt()).abs() < 1e-12);
    assert!(table.mean()[1].is_nan());

    let anomalies = table.anomalies(&series, false);
    assert_eq!(anomalies.values, vec![-1.0, 0.0, 1.0]);

    let mut buffer = Vec::new();
    CsvWriter::new().write_to(&table, &mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    assert!(text.starts_with("doy,2010,2011,2012,allyr_mean,allyr_stdev"));
}

#[tokio::test]
async fn test_cli_resample_writes_tables() {
    let dir = TempDir::new().unwrap();
    write_modern_2009(dir.path());

    let config = dir.path().join("pipeline.toml");
    fs::write(
        &config,
        r#"
[groups]
carbon_fluxes = ["FC_F"]
averages = ["TA_F"]
sums = ["P_F"]
"#,
    )
    .unwrap();

    let out = dir.path().join("processed");
    let cli = Cli::try_parse_from([
        "flux-processor",
        "--quiet",
        "--config",
        config.to_str().unwrap(),
        "resample",
        "--site",
        SITE,
        "--start-year",
        "2009",
        "--end-year",
        "2009",
        "--flux-path",
        dir.path().to_str().unwrap(),
        "--output-dir",
        out.to_str().unwrap(),
        "--freq",
        "monthly",
    ])
    .unwrap();

    run(cli).await.unwrap();

    let text = fs::read_to_string(out.join(format!("{}_monthly_aflx.csv", SITE))).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "date,FC_F_g_int,TA_F_avg,P_F_sum");
    assert_eq!(lines.len(), 13);
    assert!(lines[1].starts_with("2009-01,"));
}

#[tokio::test]
async fn test_cli_water_year_annual_stacked_with_revision() {
    let dir = TempDir::new().unwrap();
    write_modern_2009(dir.path());

    let config = dir.path().join("pipeline.toml");
    fs::write(
        &config,
        r#"
[groups]
averages = ["TA_F"]
sums = ["P_F"]
"#,
    )
    .unwrap();

    let out = dir.path().join("processed");
    let cli = Cli::try_parse_from([
        "flux-processor",
        "--quiet",
        "--metadata",
        "--revision",
        "r1234",
        "--config",
        config.to_str().unwrap(),
        "resample",
        "--site",
        SITE,
        "--start-year",
        "2009",
        "--end-year",
        "2009",
        "--flux-path",
        dir.path().to_str().unwrap(),
        "--output-dir",
        out.to_str().unwrap(),
        "--freq",
        "annual",
        "--water-year-offset",
        "61",
    ])
    .unwrap();

    run(cli).await.unwrap();

    // January 1st lands in March after the shift; the span's tail spills into 2010
    let stacked = fs::read_to_string(out.join("wateryear_fluxes.csv")).unwrap();
    let lines: Vec<&str> = stacked.lines().collect();
    assert_eq!(
        lines,
        vec![
            "date,TA_F_avg,P_F_sum,site",
            "2009,5,1.5,US-Seg",
            "2010,-9999,-9999,US-Seg",
        ]
    );

    let per_site = fs::read_to_string(out.join(format!("{}_annual_aflx.csv", SITE))).unwrap();
    assert!(per_site.starts_with("Site: US-Seg\n"));
    assert!(per_site.contains("Revision: r1234\n"));
}
