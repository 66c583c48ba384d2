//! Error types for the HTTP-RPC client.
//!
//! Every invocation ends in exactly one of these errors or a value. The
//! variants group into four families (see [`ErrorKind`]) so callers can tell
//! "the arguments could not be sent" from "the server rejected the call" from
//! "the server's answer was unreadable".

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the HTTP-RPC client.
#[derive(Debug, Error)]
pub enum RpcError {
    // Encoding errors (raised before any network I/O)
    #[error("Argument '{parameter}' cannot be encoded: {reason}")]
    UnsupportedArgumentShape { parameter: String, reason: String },

    #[error("Failed to read attachment '{parameter}' from {path:?}: {message}")]
    AttachmentRead {
        parameter: String,
        path: Option<PathBuf>,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Transport errors
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    // Protocol errors (non-2xx status)
    #[error("Server returned {status}{}", .message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    Protocol { status: u16, message: Option<String> },

    // Decode errors (2xx status, unreadable body)
    #[error("Failed to decode response: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Usage errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Expected {expected}, found {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Result type alias for HTTP-RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Coarse classification of an [`RpcError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Arguments or attachments could not be encoded. Nothing was sent.
    Encoding,
    /// Connection, TLS or timeout failure.
    Transport,
    /// The server answered with a non-2xx status.
    Protocol,
    /// The server answered 2xx but the body could not be parsed.
    Decode,
    /// Misconfiguration or misuse of the client API.
    Usage,
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Decode {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RpcError {
    /// Create an attachment read error with path context.
    pub fn attachment_read(
        parameter: impl Into<String>,
        path: Option<PathBuf>,
        err: std::io::Error,
    ) -> Self {
        RpcError::AttachmentRead {
            parameter: parameter.into(),
            path,
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::UnsupportedArgumentShape { .. } | RpcError::AttachmentRead { .. } => {
                ErrorKind::Encoding
            }
            RpcError::Transport { .. } | RpcError::Timeout(_) => ErrorKind::Transport,
            RpcError::Protocol { .. } => ErrorKind::Protocol,
            RpcError::Decode { .. } => ErrorKind::Decode,
            RpcError::Config { .. }
            | RpcError::Validation { .. }
            | RpcError::TypeMismatch { .. } => ErrorKind::Usage,
        }
    }

    /// HTTP status carried by a protocol error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RpcError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the server refused the call for lack of valid credentials.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self.status_code(), Some(401) | Some(407))
    }
}
