use thiserror::Error;

/// Errors that cross crate boundaries.
///
/// `is_infrastructure` is the switch the run controller uses while
/// processing records: infrastructure errors end the run in `Failed`, any
/// other error a record raises is counted against that record and skipped.
#[derive(Debug, Error)]
pub enum VerdantError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Store error: {0}")]
    Store(String),

    /// The store refused one record's values; nothing of it was written.
    #[error("Rejected by store: {0}")]
    Rejected(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Security policy violation: {0}")]
    Security(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VerdantError {
    /// True for failures that must halt a run rather than skip a record.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            VerdantError::Cache(_)
                | VerdantError::Checkpoint(_)
                | VerdantError::Io(_)
                | VerdantError::Store(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VerdantError>;
