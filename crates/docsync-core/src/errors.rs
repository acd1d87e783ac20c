//! Error types for the docsync core library.

/// Top-level error enum for the docsync core library.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Not a repository: {0}")]
    NotARepository(String),

    #[error("Missing content: {0}")]
    MissingContent(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Diff error: {0}")]
    Diff(String),

    #[error("Operation {operation_id} failed: {message}")]
    Operation {
        operation_id: String,
        message: String,
    },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Fatal errors abort a whole update cycle; everything else is recorded
    /// and the cycle carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::NotARepository(_) | SyncError::MissingContent(_) | SyncError::Cancelled
        )
    }
}

#[cfg(feature = "python")]
impl From<SyncError> for pyo3::PyErr {
    fn from(err: SyncError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
        match &err {
            SyncError::Io(_) => PyIOError::new_err(err.to_string()),
            SyncError::InvalidInput(_)
            | SyncError::MissingContent(_)
            | SyncError::Diff(_)
            | SyncError::Json(_) => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
