use std::path::PathBuf;

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use campwatch_storage::error::StorageError;
/// use std::path::PathBuf;
///
/// let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
/// let err = StorageError::LogCorruption {
///     path: PathBuf::from("data/alert_log.json"),
///     source,
/// };
/// assert!(err.to_string().contains("alert_log.json"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The persisted alert log exists but cannot be parsed. History is never
    /// silently reset; the caller decides whether to start over.
    #[error("Storage: alert log at {} is corrupt: {source}", path.display())]
    LogCorruption {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A snapshot, rule or exclusion file is not in the expected shape.
    #[error("Storage: invalid {what} file {}: {source}", path.display())]
    InvalidSource {
        what: &'static str,
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Reading or writing a file failed.
    #[error("Storage: I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serializing data for writing failed.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn is_log_corruption(&self) -> bool {
        matches!(self, Self::LogCorruption { .. })
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
