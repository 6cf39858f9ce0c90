pub mod aflx_reader;
pub mod schema;
pub mod site_loader;
pub mod site_reader;

pub use aflx_reader::{AflxReader, FileReadStats};
pub use schema::{FileSchema, FileVariant, SchemaSelection};
pub use site_loader::{concat_years, variable_by_site, FileLoadSummary, LoadReport, SiteLoader};
pub use site_reader::SiteReader;
