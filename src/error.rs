//! Error types for the DropLite client.

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Every failure the client surfaces to a caller.
///
/// Payloads are plain strings so one outcome can be cloned out to every
/// waiter of a coalesced list refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The request never completed (connection refused, reset, body read failure).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body was not the expected envelope.
    #[error("failed to parse server response: {0}")]
    Parse(String),

    /// Operation attempted against a file in the wrong state.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Rejected user selection (nothing selected, missing file, too large).
    #[error("invalid selection: {0}")]
    Validation(String),

    #[error("delete already in progress for {0}")]
    DeleteInProgress(String),

    #[error("no active session token")]
    MissingCredential,

    /// A list refresh failed; delivered to every consumer waiting on it.
    #[error("failed to fetch file list: {0}")]
    Fetch(Box<ClientError>),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Text suitable for showing to a user.
    ///
    /// HTTP failures yield the server's own message (or the operation
    /// fallback) without the status prefix.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// HTTP status for server-side failures, looking through `Fetch`.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::Fetch(inner) => inner.status(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err.to_string())
    }
}
