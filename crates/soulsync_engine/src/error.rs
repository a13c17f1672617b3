//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur inside the sync engine.
///
/// These never cross the public [`SyncService`](crate::SyncService) boundary;
/// each operation maps them onto its safe failure value.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Backend URL or API key is missing.
    #[error("cloud backend is not configured")]
    NotConfigured,

    /// The operation requires an active session.
    #[error("no active session")]
    NotSignedIn,

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The backend answered with an error status.
    #[error("backend error ({status}): {message}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Error message from the backend.
        message: String,
    },

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Protocol data could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] soulsync_protocol::ProtocolError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(String),

    /// Local session storage failed.
    #[error("session store error: {0}")]
    SessionStore(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error is likely transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Backend { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Codec(err.to_string())
        } else if err.is_builder() {
            SyncError::transport_fatal(err.to_string())
        } else {
            SyncError::transport_retryable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid url").is_retryable());
        assert!(SyncError::Backend {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(SyncError::Backend {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!SyncError::Backend {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!SyncError::NotSignedIn.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotConfigured;
        assert_eq!(err.to_string(), "cloud backend is not configured");

        let err = SyncError::Backend {
            status: 401,
            message: "JWT expired".into(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("JWT expired"));
    }
}
