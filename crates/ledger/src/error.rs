use thiserror::Error;

/// Errors from submission validation and storage
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Invalid record: {field}: {reason}")]
    InvalidRecord { field: &'static str, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored record is unreadable: {0}")]
    Corrupted(String),
}

impl SubmitError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        SubmitError::InvalidRecord {
            field,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind, used in relay error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::InvalidRecord { .. } => "invalid_record",
            SubmitError::Database(_) | SubmitError::Io(_) | SubmitError::Corrupted(_) => {
                "store_failure"
            }
        }
    }

    /// Whether the caller sent something wrong, as opposed to a store failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SubmitError::InvalidRecord { .. })
    }
}

pub type Result<T> = std::result::Result<T, SubmitError>;
