//! Unified error type for the cadenza application.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for HTTP handlers to derive a status code via
//! [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in cadenza.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "media", "segment").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller lacks permission for the requested resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The resource exists but is not ready yet; the caller should retry.
    ///
    /// Expected under load, not exceptional: a segment that has not been
    /// produced within the wait bound lands here and maps to HTTP 503.
    #[error("Not ready: {0}")]
    Unavailable(String),

    /// An external transcoder executable could not be located or started.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A process-chain step failed mid-stream.
    #[error("Chain error [{step}]: {message}")]
    Chain {
        /// The chain step that failed.
        step: String,
        /// Human-readable error description.
        message: String,
    },

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
            Error::NotFound { .. } => 404,
            Error::Forbidden(_) => 403,
            Error::Validation(_) => 400,
            Error::Unavailable(_) => 503,
            Error::Tool { .. } => 502,
            Error::Chain { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Chain`].
    pub fn chain(step: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Chain {
            step: step.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
