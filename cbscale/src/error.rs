use thiserror::Error;

/// Main error type for cluster-side operations
#[derive(Error, Debug)]
pub enum Error {
    /// The host inventory contained no hosts
    #[error("Host inventory is empty")]
    EmptyInventory,

    /// Invalid layout or configuration; raised before any cluster mutation
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A topology, bucket, index or user management call failed
    #[error("External call `{command}` failed: {message}")]
    ExternalCall { command: String, message: String },

    /// A write targeted a key that already exists
    #[error("Document conflict: key {key:?} already exists")]
    DocumentConflict { key: String },

    /// A single database call exceeded its bound
    #[error("Operation timed out: {operation} after {timeout_ms}ms")]
    OperationTimeout { operation: String, timeout_ms: u64 },

    /// Waiting on an external tool failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
    pub fn external(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalCall {
            command: command.into(),
            message: message.into(),
        }
    }
    pub fn conflict(key: impl Into<String>) -> Self {
        Self::DocumentConflict { key: key.into() }
    }
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::OperationTimeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Whether a create call failed only because the entity is already there.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::ExternalCall { message, .. } if message.contains("already exists"))
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::DocumentConflict { .. })
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::OperationTimeout { .. })
    }
}

/// Result type alias for cluster-side operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_detection() {
        let err = Error::external(
            "bucket-create",
            "ERROR: name - Bucket with given name already exists",
        );
        assert!(err.is_already_exists());
        assert!(!Error::external("bucket-create", "ERROR: ramQuota too small").is_already_exists());
        assert!(!Error::conflict("0").is_already_exists());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::timeout("insert 7", 10_000).to_string(),
            "Operation timed out: insert 7 after 10000ms"
        );
        assert_eq!(
            Error::conflict("0").to_string(),
            "Document conflict: key \"0\" already exists"
        );
    }

    #[test]
    fn test_wait_failure_is_io_error() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Interrupted, "wait failed").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "I/O error: wait failed");
    }
}
