//! Shared Error Types
//!
//! This module defines the error taxonomy for the sync engine. Fetch failures
//! are classified into a typed discriminant at the HTTP boundary so that
//! downstream policy (retry windows, circuit breaking, per-trip error codes)
//! never depends on inspecting provider error text.
//!
//! # Error Categories
//!
//! - `FetchError` - a classified remote fetch failure (`FetchErrorKind`)
//! - `SyncError` - top-level error for every sync operation
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and can be safely shared across task boundaries.
use thiserror::Error;

/// Classification of a remote fetch failure.
///
/// Produced once, at the fetch boundary, from the HTTP status code and the
/// response decoding outcome. Rate limiting gets its own variant because it
/// escalates into the backfill circuit breaker instead of ordinary retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The provider answered HTTP 429
    RateLimited,
    /// Any other non-2xx HTTP status
    Http(u16),
    /// The response body could not be decoded into the expected shape
    Malformed,
    /// Transport-level failure (connect, timeout) or an unclassifiable error
    Unknown,
}

impl FetchErrorKind {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            s => Self::Http(s),
        }
    }

    /// Stable error code recorded against individual trips
    pub fn code(&self) -> String {
        match self {
            Self::RateLimited => "RATE_LIMITED".to_string(),
            Self::Http(status) => format!("HTTP_{}", status),
            Self::Malformed => "INVALID_RESPONSE".to_string(),
            Self::Unknown => "UNKNOWN_ERROR".to_string(),
        }
    }

    /// Whether this failure is a rate-limit signature
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// A failed remote fetch with its classification and diagnostic message.
///
/// The message is carried for logging and `SyncState.error` only; it is never
/// used for classification.
#[derive(Debug, Error, Clone)]
#[error("{}: {message}", .kind.code())]
pub struct FetchError {
    /// Typed classification produced at the fetch boundary
    pub kind: FetchErrorKind,
    /// Human-readable diagnostic message
    pub message: String,
}

impl FetchError {
    /// Create a new fetch error
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a malformed-response error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Malformed, message)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::new(FetchErrorKind::Malformed, format!("decode error: {}", err))
        } else if let Some(status) = err.status() {
            Self::new(
                FetchErrorKind::from_status(status.as_u16()),
                err.to_string(),
            )
        } else {
            Self::new(FetchErrorKind::Unknown, format!("network error: {}", err))
        }
    }
}

/// Top-level error type for sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote fetch failed and the failure is fatal to the sync call
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Local store failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization or deserialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation was cancelled through its `CancelToken`
    #[error("sync cancelled")]
    Cancelled,

    /// The resource coordinator was asked to handle a kind it does not own
    #[error("resource kind '{0}' is not handled by the resource coordinator")]
    UnsupportedResource(&'static str),
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
