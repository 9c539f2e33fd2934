//! Error taxonomy shared across the daemon.
//!
//! Every error surfaced to an HTTP caller or a tool-call result carries a
//! stable machine-readable `code()` in addition to its `Display` message,
//! mirroring the error-code-plus-message split used throughout the crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Malformed or missing input (bad JSON, bad cursor format, unknown enum).
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Paginated read past the head of an evicted ring.
pub const CURSOR_EXPIRED: &str = "CURSOR_EXPIRED";
/// Requested resource does not exist.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Unexpected internal error; details are redacted before reaching a caller.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Feature or dependency not available in this build/runtime.
pub const NOT_AVAILABLE: &str = "NOT_AVAILABLE";

/// Top-level error type returned by read-path operations (`CaptureStore`
/// queries, the `/sync` and `/clear` HTTP handlers).
#[derive(Debug, Error)]
pub enum GasolineError {
    /// Required parameter missing, wrong type, or a cursor that fails to parse.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// A cursor referred to a sequence below the live ring's minimum and the
    /// caller did not opt into `restart_on_eviction`.
    #[error(
        "cursor expired (buffer overflow). Requested sequence {requested}, oldest available {oldest}"
    )]
    CursorExpired {
        /// The sequence the caller's cursor pointed at.
        requested: i64,
        /// The oldest sequence still live in the ring.
        oldest: i64,
    },

    /// Requested resource (buffer name, command id, session) does not exist.
    #[error("{message}")]
    NotFound {
        /// Human-readable message.
        message: String,
    },

    /// Internal error. Detail is redacted before crossing the HTTP boundary.
    #[error("{message}")]
    Internal {
        /// Description (not shown to callers; see [`GasolineError::to_error_body`]).
        message: String,
    },

    /// Feature not available in this build or runtime (e.g. no browser service).
    #[error("{message}")]
    NotAvailable {
        /// Description.
        message: String,
    },

    /// Domain-specific error with an arbitrary stable code and structured details.
    #[error("{message}")]
    Custom {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
        /// Optional structured details (e.g. lost-entry range on restart).
        details: Option<Value>,
    },
}

/// Wire-format error body, matching the `{error, detail}` / `{code, message,
/// details}` envelopes used across the HTTP and tool-call surfaces.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl GasolineError {
    /// Convenience constructor for a malformed-cursor error.
    #[must_use]
    pub fn invalid_cursor(detail: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: format!("invalid cursor format: {}", detail.into()),
        }
    }

    /// Machine-readable error code for this variant.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::CursorExpired { .. } => CURSOR_EXPIRED,
            Self::NotFound { .. } => NOT_FOUND,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::NotAvailable { .. } => NOT_AVAILABLE,
            Self::Custom { code, .. } => code,
        }
    }

    /// The HTTP status this error maps to on the read path.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidParams { .. } => 400,
            Self::CursorExpired { .. } => 410,
            Self::NotFound { .. } => 404,
            Self::NotAvailable { .. } => 503,
            Self::Internal { .. } | Self::Custom { .. } => 500,
        }
    }

    /// Convert to the wire-format error body. Internal-error messages are
    /// redacted: the daemon must not expose internal exceptions raw to the
    /// agent.
    #[must_use]
    pub fn to_error_body(&self) -> ErrorBody {
        let message = match self {
            Self::Internal { .. } => "internal error".to_owned(),
            other => other.to_string(),
        };
        ErrorBody {
            code: self.code().to_owned(),
            message,
            details: match self {
                Self::Custom { details, .. } => details.clone(),
                _ => None,
            },
        }
    }
}
