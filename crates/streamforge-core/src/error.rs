//! Unified error type for streamforge.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status via [`Error::http_status`] and a
//! machine-readable code via [`Error::code`].

use std::fmt;

/// Unified error type covering all failure modes in streamforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request data (usually a stream key) failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "stream").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A conflicting resource already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Admission control rejected a new stream.
    #[error("Maximum {limit} concurrent streams allowed")]
    StreamLimitExceeded {
        /// The configured concurrency ceiling.
        limit: usize,
    },

    /// No encode profile is registered under this name.
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    /// The encoding worker failed to start or crashed.
    #[error("Transcoding error: {0}")]
    Transcoding(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::NotFound { .. } => 404,
            Error::Conflict(_) => 409,
            Error::StreamLimitExceeded { .. } => 429,
            Error::UnknownProfile(_) => 400,
            Error::Transcoding(_) => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Machine-readable error code surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Unauthorized(_) => "AUTHENTICATION_ERROR",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::StreamLimitExceeded { .. } => "STREAM_LIMIT_EXCEEDED",
            Error::UnknownProfile(_) => "UNKNOWN_PROFILE",
            Error::Transcoding(_) => "TRANSCODING_ERROR",
            Error::Io { .. } | Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this is an unexpected failure whose details should not leak
    /// to external callers.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Io { .. } | Error::Internal(_))
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Transcoding`].
    pub fn transcoding(message: impl fmt::Display) -> Self {
        Error::Transcoding(message.to_string())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
