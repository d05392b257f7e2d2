use thiserror::Error;

/// Failure classification surfaced by the index and pipeline APIs.
///
/// `IndexNotBuilt` and `PersistenceFormatMismatch` are the two fatal
/// conditions; everything recoverable (embedding failures, rerank parse
/// failures, empty results) is handled inside the components and never
/// reaches this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("system not ready: vector index has not been built or loaded")]
    IndexNotBuilt,

    #[error("index bundle is missing or inconsistent: {0}")]
    PersistenceFormatMismatch(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("duplicate assessment id in catalog: {0}")]
    DuplicateId(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl Error {
    /// True for errors that mean "set the system up first" rather than
    /// "this request was bad".
    pub fn is_setup_error(&self) -> bool {
        matches!(self, Self::IndexNotBuilt | Self::PersistenceFormatMismatch(_) | Self::InvalidConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
