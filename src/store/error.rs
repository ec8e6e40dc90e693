use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist. Kept apart from every other failure so a
    /// flaky lookup is never mistaken for absence.
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("{op} {key} failed: {message}")]
    Backend {
        op: &'static str,
        key: String,
        message: String,
    },

    #[error("invalid cursor on {key}: {reason}")]
    InvalidCursor { key: String, reason: String },

    #[error("storage request cancelled")]
    Cancelled,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
