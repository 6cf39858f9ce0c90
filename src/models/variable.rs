use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ProcessingError, Result};
use crate::utils::constants::{H_F, SW_IN_F, TA_F};

/// Canonical variable names shared by every file schema.
///
/// A year with no source file is still given these columns so that
/// concatenated tables have the same width whatever was on disk.
pub const CANONICAL_VARIABLES: &[&str] = &[
    "FC_F", "FC_F_FLAG", "GPP", "RECO", "LE_F", "H_F", "SW_IN_F", "SW_OUT", "LW_IN", "LW_OUT",
    "RNET_F", "TA_F", "RH_F", "VPD_F", "P_F", "PA", "WS", "WD", "CO2",
];

/// Transform applied to a variable when resampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableGroup {
    CarbonFlux,
    LatentHeat,
    Average,
    MinMax,
    Sum,
    Integrate,
}

impl VariableGroup {
    pub fn name(&self) -> &'static str {
        match self {
            VariableGroup::CarbonFlux => "carbon-flux",
            VariableGroup::LatentHeat => "latent-heat-flux",
            VariableGroup::Average => "average",
            VariableGroup::MinMax => "min-max",
            VariableGroup::Sum => "sum",
            VariableGroup::Integrate => "raw-integrate",
        }
    }
}

/// Partition of variable names into resampling groups.
///
/// Groups left out of a deserialized table are empty; the standard
/// grouping only applies when no table is given at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableGroups {
    #[serde(default)]
    pub carbon_fluxes: Vec<String>,
    #[serde(default)]
    pub latent_heat: Vec<String>,
    #[serde(default)]
    pub averages: Vec<String>,
    #[serde(default)]
    pub min_max: Vec<String>,
    #[serde(default)]
    pub sums: Vec<String>,
    #[serde(default)]
    pub integrals: Vec<String>,
}

impl Default for VariableGroups {
    /// The grouping used for the standard daily flux export
    fn default() -> Self {
        Self {
            carbon_fluxes: to_strings(&["GPP", "RECO", "FC_F"]),
            latent_heat: to_strings(&["LE_F"]),
            averages: to_strings(&["TA_F", "RH_F", "SW_IN_F", "RNET_F", "VPD_F"]),
            min_max: Vec::new(),
            sums: to_strings(&["P_F"]),
            integrals: Vec::new(),
        }
    }
}

impl VariableGroups {
    pub fn empty() -> Self {
        Self {
            carbon_fluxes: Vec::new(),
            latent_heat: Vec::new(),
            averages: Vec::new(),
            min_max: Vec::new(),
            sums: Vec::new(),
            integrals: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: VariableGroup, names: &[&str]) -> Self {
        let names = to_strings(names);
        match group {
            VariableGroup::CarbonFlux => self.carbon_fluxes = names,
            VariableGroup::LatentHeat => self.latent_heat = names,
            VariableGroup::Average => self.averages = names,
            VariableGroup::MinMax => self.min_max = names,
            VariableGroup::Sum => self.sums = names,
            VariableGroup::Integrate => self.integrals = names,
        }
        self
    }

    /// Every (group, variable) pair, in group order
    pub fn assignments(&self) -> Vec<(VariableGroup, &str)> {
        let groups = [
            (VariableGroup::CarbonFlux, &self.carbon_fluxes),
            (VariableGroup::LatentHeat, &self.latent_heat),
            (VariableGroup::Average, &self.averages),
            (VariableGroup::MinMax, &self.min_max),
            (VariableGroup::Sum, &self.sums),
            (VariableGroup::Integrate, &self.integrals),
        ];

        groups
            .into_iter()
            .flat_map(|(group, names)| names.iter().map(move |n| (group, n.as_str())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments().is_empty()
    }

    /// A variable may belong to one group per resampling call
    pub fn validate_disjoint(&self) -> Result<()> {
        let mut owner: HashMap<&str, VariableGroup> = HashMap::new();

        for (group, name) in self.assignments() {
            if let Some(previous) = owner.insert(name, group) {
                return Err(ProcessingError::Config(format!(
                    "Variable '{}' is assigned to both the {} and {} groups",
                    name,
                    previous.name(),
                    group.name()
                )));
            }
        }

        Ok(())
    }
}

/// Auxiliary inputs of the ET/PET transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EtInputs {
    pub air_temperature: String,
    pub shortwave_in: String,
    pub sensible_heat: String,
}

impl Default for EtInputs {
    fn default() -> Self {
        Self {
            air_temperature: TA_F.to_string(),
            shortwave_in: SW_IN_F.to_string(),
            sensible_heat: H_F.to_string(),
        }
    }
}

fn to_strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
