//! Mimir error types

use std::time::Duration;

/// Taxonomy class of a [`MimirError`].
///
/// Concrete variants stay specific (so callers can match on
/// `AuthenticationFailed` or `RateLimited`), while `kind()` answers the
/// coarser question the cache and harness care about: retry, abort, or
/// report to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed caller input. Fails fast.
    InvalidInput,
    /// Credentials, model names, provider/dimension mismatch. Surfaced to the operator.
    Configuration,
    /// Rate limit or transport failure. Retried by the upstream client.
    TransientUpstream,
    /// Upstream still failing after the retry budget.
    UpstreamUnavailable,
    /// I/O, serialisation, corrupted cache state.
    Internal,
}

/// Mimir error types
#[derive(Debug, thiserror::Error)]
pub enum MimirError {
    // Caller input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    // Upstream/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("empty response from model")]
    EmptyResponse,

    #[error("upstream unavailable after {attempts} attempts: {last_error}")]
    UpstreamUnavailable { attempts: u32, last_error: String },

    /// The embedder failed; the upstream model was never reached.
    #[error("embedding failed: {0}")]
    Embedding(#[source] Box<MimirError>),

    // Data and storage errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("cache store error: {0}")]
    Store(String),
}

impl MimirError {
    /// Taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::Dataset(_) => ErrorKind::InvalidInput,
            Self::Configuration(_)
            | Self::DimensionMismatch { .. }
            | Self::AuthenticationFailed
            | Self::UnsupportedModel(_) => ErrorKind::Configuration,
            // 4xx other than 408/429 means the request itself is wrong;
            // retrying will not change the answer.
            Self::Api { status, .. } if is_transient_status(*status) => {
                ErrorKind::TransientUpstream
            }
            Self::Api { .. } => ErrorKind::Configuration,
            Self::Http(_) | Self::RateLimited { .. } | Self::EmptyResponse => {
                ErrorKind::TransientUpstream
            }
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::Embedding(inner) => inner.kind(),
            Self::Json(_) | Self::Io(_) | Self::Store(_) => ErrorKind::Internal,
        }
    }

    /// Whether a retry might succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientUpstream
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether this error came from the embedder rather than the upstream model.
    pub fn is_embedding_failure(&self) -> bool {
        matches!(self, Self::Embedding(_))
    }

    /// Errors that invalidate a whole sweep configuration rather than one row.
    pub fn is_fatal_to_configuration(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration | ErrorKind::Internal)
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

impl From<csv::Error> for MimirError {
    fn from(err: csv::Error) -> Self {
        MimirError::Dataset(err.to_string())
    }
}

impl From<reqwest::Error> for MimirError {
    fn from(err: reqwest::Error) -> Self {
        MimirError::Http(err.to_string())
    }
}

/// Result type alias for Mimir operations
pub type Result<T> = std::result::Result<T, MimirError>;
