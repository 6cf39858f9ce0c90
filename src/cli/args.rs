use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flux-processor")]
#[command(about = "Ameriflux half-hourly flux data loader and resampler")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, action = ArgAction::Count, help = "Increase log verbosity (-v, -vv, -vvv)")]
    pub verbose: u8,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Pipeline configuration file (TOML)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = num_cpus::get())]
    pub max_workers: usize,

    #[arg(long, global = true, help = "Write a JSON data-quality report to this path")]
    pub report: Option<PathBuf>,

    #[arg(long, global = true, help = "Write missing values as NA instead of -9999")]
    pub na: bool,

    #[arg(long, global = true, help = "Write a metadata block above each CSV header")]
    pub metadata: bool,

    #[arg(long, global = true, requires = "metadata", help = "Source revision recorded in the metadata block")]
    pub revision: Option<String>,

    #[arg(short, long, global = true, help = "Hide progress bars")]
    pub quiet: bool,
}

/// Overrides for the site selection in the configuration file
#[derive(Args, Debug, Clone, Default)]
pub struct SiteArgs {
    #[arg(short, long = "site", help = "Site to process (repeatable) [default: from config]")]
    pub sites: Vec<String>,

    #[arg(long)]
    pub start_year: Option<i32>,

    #[arg(long)]
    pub end_year: Option<i32>,

    #[arg(long, help = "Directory holding the site-year files")]
    pub flux_path: Option<PathBuf>,

    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long, help = "Read the with-gaps files instead of the gap-filled ones")]
    pub with_gaps: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load site files and write the normalized half-hourly tables
    Load {
        #[command(flatten)]
        sites: SiteArgs,
    },

    /// Resample sites to daily, monthly or annual tables
    Resample {
        #[command(flatten)]
        sites: SiteArgs,

        #[arg(short, long = "freq", help = "Output frequency (repeatable) [default: from config]")]
        frequencies: Vec<String>,

        #[arg(long, help = "Build annual tables on water years shifted by this many days")]
        water_year_offset: Option<i64>,

        #[arg(long, help = "Add derived metrics (degree days, peak times, GPP/RE)")]
        derived: bool,
    },

    /// Day-of-year climatology and anomalies of one resampled variable
    Climatology {
        #[command(flatten)]
        sites: SiteArgs,

        #[arg(long, help = "Resampled column, e.g. GPP_g_int or TA_F_avg")]
        variable: String,

        #[arg(short, long = "freq", default_value = "daily")]
        frequency: String,

        #[arg(long, help = "Divide anomalies by the day-of-year mean")]
        normalize: bool,
    },

    /// Load sites and report data-quality problems without writing tables
    Validate {
        #[command(flatten)]
        sites: SiteArgs,

        #[arg(long, default_value_t = 0.5, help = "Flag columns with more missing values than this fraction")]
        missing_threshold: f64,
    },
}
