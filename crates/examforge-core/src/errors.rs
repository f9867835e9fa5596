use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the core. Config problems get their own variant so the
/// CLI can map them to a distinct exit code.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("validation failure: {0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("denied: {0}")]
    Denied(String),

    #[error("external dependency failure: {0}")]
    External(String),

    #[error("insufficient inventory: topic '{topic}' level {bloom} needs {needed}, have {available}")]
    InsufficientInventory {
        topic: String,
        bloom: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }
}
