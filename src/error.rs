//! WolfLease Error Types

use thiserror::Error;

/// Result type alias for WolfLease operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfLease error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Lease store errors
    #[error("Lease {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("Lease conflict: {0}")]
    Conflict(String),

    #[error("Lease store error{}: {message}", fmt_status(.status))]
    Store { status: Option<u16>, message: String },

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Callback errors
    #[error("Callback failed: {0}")]
    Callback(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl Error {
    /// Build a not-found error for the given lease coordinates
    pub fn not_found(namespace: &str, name: &str) -> Self {
        Error::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// HTTP-style status code carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::NotFound { .. } => Some(404),
            Error::Conflict(_) => Some(409),
            Error::Store { status, .. } => *status,
            _ => None,
        }
    }

    /// Check if this error means the lease does not exist
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Check if this error is a write conflict
    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(409)
    }

    /// Check if this error is retryable at the election retry cadence
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Config(_) | Error::ConfigParse(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store {
            status: None,
            message: format!("SQLite error: {}", e),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Error::Store {
                status: Some(status.as_u16()),
                message: e.to_string(),
            },
            None => Error::Network(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::not_found("default", "leader").status_code(), Some(404));
        assert_eq!(Error::Conflict("stale".into()).status_code(), Some(409));
        assert_eq!(
            Error::Store { status: Some(503), message: "unavailable".into() }.status_code(),
            Some(503)
        );
        assert_eq!(Error::Network("refused".into()).status_code(), None);
    }

    #[test]
    fn test_store_status_counts_as_not_found() {
        let err = Error::Store { status: Some(404), message: "gone".into() };
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_retryable() {
        assert!(Error::Conflict("stale".into()).is_retryable());
        assert!(Error::Network("timeout".into()).is_retryable());
        assert!(!Error::Config("bad".into()).is_retryable());
        assert!(Error::Callback("on_start_leading panicked".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = Error::Store { status: Some(500), message: "boom".into() };
        assert_eq!(err.to_string(), "Lease store error (500): boom");
        let err = Error::Store { status: None, message: "boom".into() };
        assert_eq!(err.to_string(), "Lease store error: boom");
    }
}
