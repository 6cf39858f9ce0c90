use chrono::NaiveDateTime;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Duplicate timestamp {timestamp} in series for site {site}")]
    DuplicateTimestamp {
        site: String,
        timestamp: NaiveDateTime,
    },

    #[error("Variable '{variable}' not found in table for site {site}")]
    MissingVariable { site: String, variable: String },

    #[error("Index mismatch: {0}")]
    IndexMismatch(String),

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl ProcessingError {
    /// Integrity and configuration errors abort a site's pipeline; callers
    /// running many sites use this to tell them apart from I/O trouble.
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, ProcessingError::DuplicateTimestamp { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProcessingError::Config(_)
                | ProcessingError::ConfigFile(_)
                | ProcessingError::Validation(_)
                | ProcessingError::MissingVariable { .. }
        )
    }
}
