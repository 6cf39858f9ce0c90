use crate::error::{ProcessingError, Result};
use crate::models::{BinConvention, EtInputs, Frequency, VariableGroups};
use crate::processors::{
    Corrections, DepthGroups, MaskPeriod, Resampler, SitePipeline, WaterYearCalendar,
};
use crate::readers::{FileVariant, SchemaSelection, SiteLoader};
use crate::utils::constants::{
    DEFAULT_LOWER_BOUND_YEAR, DEFAULT_OUTPUT_DIR, MISSING_NA_STR, MISSING_SENTINEL_STR,
    WATER_YEAR_NOV_OFFSET,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Prefix of environment overrides, e.g. `FLUX__START_YEAR=2010`
pub const ENV_PREFIX: &str = "FLUX";

/// Pipeline configuration, read from a TOML file and the environment.
///
/// Every field has a default, so an empty file reproduces the standard
/// daily export for the seven New Mexico sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory holding `{site}_{year}_{variant}.txt` files
    #[serde(default = "default_flux_path")]
    pub flux_path: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_sites")]
    #[validate(length(min = 1))]
    pub sites: Vec<String>,

    #[serde(default = "default_start_year")]
    #[validate(range(min = 1950, max = 2100))]
    pub start_year: i32,

    #[serde(default = "default_end_year")]
    #[validate(range(min = 1950, max = 2100))]
    pub end_year: i32,

    #[serde(default = "default_true")]
    pub gapfilled: bool,

    /// `auto`, `legacy` or `modern`
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Missing-value marker written to CSV output
    #[serde(default = "default_missing_value")]
    pub missing_value: String,

    #[serde(default = "default_lower_bound_year")]
    pub lower_bound_year: i32,

    #[serde(default)]
    pub bin_convention: BinConvention,

    #[serde(default = "default_frequencies")]
    pub frequencies: Vec<String>,

    #[serde(default)]
    pub derived: bool,

    #[serde(default)]
    pub groups: VariableGroups,

    #[serde(default)]
    pub et: EtInputs,

    #[serde(default)]
    pub depth_groups: Vec<DepthGroupConfig>,

    #[serde(default)]
    pub water_year: Option<WaterYearConfig>,

    #[serde(default)]
    pub corrections: Vec<MaskPeriod>,
}

/// One named group of columns averaged row-wise into a new column.
///
/// Stored as a list rather than a table so that column names keep
/// their case through the configuration layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepthGroupConfig {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaterYearConfig {
    #[serde(default = "default_water_year_offset")]
    pub offset_days: i64,
}

fn default_flux_path() -> PathBuf {
    PathBuf::from("Ameriflux_files")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}
fn default_sites() -> Vec<String> {
    ["Seg", "Ses", "Wjs", "Mpj", "Mpg", "Vcp", "Vcm"]
        .iter()
        .map(|s| format!("US-{}", s))
        .collect()
}
fn default_start_year() -> i32 {
    2007
}
fn default_end_year() -> i32 {
    2014
}
fn default_true() -> bool {
    true
}
fn default_schema() -> String {
    "auto".to_string()
}
fn default_missing_value() -> String {
    MISSING_SENTINEL_STR.to_string()
}
fn default_lower_bound_year() -> i32 {
    DEFAULT_LOWER_BOUND_YEAR
}
fn default_frequencies() -> Vec<String> {
    vec!["daily".to_string()]
}
fn default_water_year_offset() -> i64 {
    WATER_YEAR_NOV_OFFSET
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            flux_path: default_flux_path(),
            output_dir: default_output_dir(),
            sites: default_sites(),
            start_year: default_start_year(),
            end_year: default_end_year(),
            gapfilled: true,
            schema: default_schema(),
            missing_value: default_missing_value(),
            lower_bound_year: default_lower_bound_year(),
            bin_convention: BinConvention::default(),
            frequencies: default_frequencies(),
            derived: false,
            groups: VariableGroups::default(),
            et: EtInputs::default(),
            depth_groups: Vec::new(),
            water_year: None,
            corrections: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load from an optional TOML file, then apply `FLUX__*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("sites")
                .with_list_parse_key("frequencies")
                .try_parsing(true),
        );

        let config: PipelineConfig = builder.build()?.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Field validation plus the cross-field rules
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if self.start_year > self.end_year {
            return Err(ProcessingError::Config(format!(
                "start_year {} is after end_year {}",
                self.start_year, self.end_year
            )));
        }
        self.groups.validate_disjoint()?;
        self.schema_selection()?;
        self.frequency_list()?;
        self.water_year_calendar()?;
        self.depth_group_map()?;
        Ok(())
    }

    pub fn schema_selection(&self) -> Result<SchemaSelection> {
        SchemaSelection::parse(&self.schema)
    }

    pub fn frequency_list(&self) -> Result<Vec<Frequency>> {
        self.frequencies.iter().map(|f| Frequency::parse(f)).collect()
    }

    pub fn water_year_calendar(&self) -> Result<Option<WaterYearCalendar>> {
        self.water_year
            .map(|w| WaterYearCalendar::new(w.offset_days))
            .transpose()
    }

    pub fn depth_group_map(&self) -> Result<DepthGroups> {
        let mut groups = BTreeMap::new();
        for group in &self.depth_groups {
            if groups
                .insert(group.name.clone(), group.columns.clone())
                .is_some()
            {
                return Err(ProcessingError::Config(format!(
                    "Depth group '{}' is defined twice",
                    group.name
                )));
            }
        }
        Ok(DepthGroups::new(groups))
    }

    pub fn uses_na_missing(&self) -> bool {
        self.missing_value == MISSING_NA_STR
    }

    pub fn loader(&self) -> Result<SiteLoader> {
        Ok(SiteLoader::new(&self.flux_path)
            .with_variant(FileVariant::from_gapfilled(self.gapfilled))
            .with_schema(self.schema_selection()?)
            .with_lower_bound_year(self.lower_bound_year))
    }

    /// Build the per-site pipeline described by this configuration
    pub fn pipeline(&self) -> Result<SitePipeline> {
        let resampler = Resampler::new()
            .with_bin_convention(self.bin_convention)
            .with_et_inputs(self.et.clone());

        Ok(SitePipeline::new(self.loader()?, self.start_year, self.end_year)
            .with_frequencies(self.frequency_list()?)
            .with_groups(self.groups.clone())
            .with_resampler(resampler)
            .with_corrections(Corrections::from_masks(&self.corrections))
            .with_depth_groups(self.depth_group_map()?)
            .with_water_year(self.water_year_calendar()?)
            .with_derived(self.derived))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_reproduce_daily_export() {
        let config = PipelineConfig::default();
        assert!(config.check().is_ok());
        assert_eq!(config.sites.len(), 7);
        assert_eq!(config.frequency_list().unwrap(), vec![Frequency::Daily]);
        assert_eq!(config.groups.carbon_fluxes, vec!["GPP", "RECO", "FC_F"]);
        assert!(!config.uses_na_missing());
    }

    #[test]
    fn test_load_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
flux_path = "/data/aflx"
sites = ["US-Seg"]
start_year = 2009
end_year = 2011
missing_value = "NA"
frequencies = ["daily", "annual"]

[groups]
carbon_fluxes = ["GPP"]
sums = ["P_F"]

[water_year]
offset_days = 91

[[depth_groups]]
name = "SWC_shallow"
columns = ["SWC_1", "SWC_2"]

[[corrections]]
variable = "FC_F"
start = "2010-05-01T00:00:00"
end = "2010-05-02T00:00:00"
site = "US-Seg"
"#,
        );

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.flux_path, PathBuf::from("/data/aflx"));
        assert_eq!(config.start_year, 2009);
        assert!(config.uses_na_missing());
        assert_eq!(
            config.frequency_list().unwrap(),
            vec![Frequency::Daily, Frequency::Annual]
        );
        assert!(config.groups.latent_heat.is_empty());
        assert_eq!(
            config.water_year_calendar().unwrap().map(|c| c.offset_days()),
            Some(91)
        );
        assert!(config
            .depth_group_map()
            .unwrap()
            .groups()
            .contains_key("SWC_shallow"));
        assert_eq!(config.corrections.len(), 1);
        assert!(config.pipeline().is_ok());
    }

    #[test]
    fn test_overlapping_groups_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[groups]
averages = ["TA_F"]
min_max = ["TA_F"]
"#,
        );

        let err = PipelineConfig::load(Some(&path)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_year_order_and_schema_checked() {
        let config = PipelineConfig {
            start_year: 2012,
            end_year: 2010,
            ..Default::default()
        };
        assert!(config.check().is_err());

        let config = PipelineConfig {
            schema: "toa5".to_string(),
            ..Default::default()
        };
        assert!(config.check().is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "startyear = 2009\n");
        assert!(PipelineConfig::load(Some(&path)).is_err());
    }
}
