pub mod frequency;
pub mod resampled;
pub mod series;
pub mod site;
pub mod variable;

pub use frequency::{BinConvention, Frequency};
pub use resampled::{DatedSeries, ResampledTable};
pub use series::{Column, ObservationSeries, RawTable};
pub use site::SiteLocation;
pub use variable::{EtInputs, VariableGroup, VariableGroups, CANONICAL_VARIABLES};
