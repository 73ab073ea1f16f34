//! Error types
//!
//! `DispatchError` covers everything the router itself can answer with an
//! error body; `ConfigError` covers start-up failures.

use hyper::StatusCode;
use thiserror::Error;

use crate::routing::HandlerId;

/// Per-request failures produced by the router (never by a handler)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Image not found: {0}")]
    StaticFileNotFound(String),

    #[error("Handler not configured: {0}")]
    HandlerNotConfigured(HandlerId),

    #[error("Upstream {handler} unavailable: {reason}")]
    UpstreamUnavailable { handler: HandlerId, reason: String },

    #[error("Upstream {0} timed out")]
    UpstreamTimeout(HandlerId),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Failed to read request body: {0}")]
    BadRequestBody(String),
}

impl DispatchError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::RouteNotFound(_) | Self::StaticFileNotFound(_) => StatusCode::NOT_FOUND,
            Self::HandlerNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequestBody(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// JSON error body, e.g. `{"error":"Route not found: /x"}`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

/// Start-up failures: bad configuration or unusable route table
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("cors.allowed_origins must contain at least one origin")]
    NoAllowedOrigins,

    #[error("invalid CORS origin '{0}'")]
    InvalidOrigin(String),

    #[error("invalid upstream for handler '{handler}': {reason}")]
    InvalidUpstream { handler: HandlerId, reason: String },

    #[error("invalid route pattern: {0}")]
    RoutePattern(#[from] regex::Error),

    #[error("invalid listen address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },
}
