use thiserror::Error;

/// Errors related to the core functionality of the URL shortener service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid short token: {0}")]
    InvalidShortToken(String),
    #[error("invalid token length {requested}: must be between 1 and {max}")]
    InvalidTokenLength { requested: usize, max: usize },
}

/// Errors produced by storage backends.
///
/// A duplicate long URL is not an error; it is reported through
/// [`StoreOutcome::Duplicate`](crate::StoreOutcome::Duplicate).
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short token not found: {0}")]
    NotFound(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage i/o failed: {0}")]
    Io(String),
    #[error("transaction failed: {0}")]
    Transaction(String),
    #[error("storage misconfigured: {0}")]
    Config(String),
}

impl StorageError {
    /// Returns `true` for failures of the backend itself, as opposed to a
    /// lookup miss or a construction-time misconfiguration.
    pub fn is_backend_error(&self) -> bool {
        !matches!(self, StorageError::NotFound(_) | StorageError::Config(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<CoreError> for StorageError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTokenLength { .. } => StorageError::Config(err.to_string()),
            CoreError::InvalidShortToken(_) => StorageError::InvalidData(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("empty batch")]
    EmptyBatch,
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_classification() {
        assert!(!StorageError::NotFound("abc".into()).is_backend_error());
        assert!(!StorageError::Config("no dsn".into()).is_backend_error());
        assert!(StorageError::Query("syntax".into()).is_backend_error());
        assert!(StorageError::Io("disk full".into()).is_backend_error());
        assert!(StorageError::Transaction("commit".into()).is_backend_error());
    }

    #[test]
    fn io_errors_convert_to_io_variant() {
        let err: StorageError = std::io::Error::other("boom").into();
        assert!(matches!(err, StorageError::Io(ref msg) if msg == "boom"));
    }

    #[test]
    fn invalid_length_is_a_config_error() {
        let err: StorageError = CoreError::InvalidTokenLength {
            requested: 40,
            max: 22,
        }
        .into();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn invalid_token_is_invalid_data() {
        let err: StorageError = CoreError::InvalidShortToken("abc def".into()).into();
        assert!(matches!(err, StorageError::InvalidData(_)));
        assert!(err.is_backend_error());
    }
}
