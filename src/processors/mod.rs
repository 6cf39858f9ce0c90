pub mod batch_processor;
pub mod climatology;
pub mod corrections;
pub mod depth_groups;
pub mod derived;
pub mod evapotranspiration;
pub mod integrity_checker;
pub mod period_index;
pub mod resampler;
pub mod time_grid;
pub mod water_year;

pub use batch_processor::{BatchOutcome, BatchProcessor, SiteOutput, SitePipeline};
pub use climatology::ClimatologyTable;
pub use corrections::{Corrections, MaskPeriod, SeriesCorrection};
pub use depth_groups::DepthGroups;
pub use derived::Extremum;
pub use evapotranspiration::{EtCalculator, EtSummary};
pub use integrity_checker::{IntegrityChecker, QualityReport, QualityViolation, SiteStatistics, ViolationType};
pub use period_index::{Aggregation, PeriodIndex};
pub use resampler::Resampler;
pub use time_grid::{GridNormalizer, NormalizeReport, TimeGrid};
pub use water_year::{Season, WaterYearCalendar, WaterYearLabel};
