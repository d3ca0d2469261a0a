//! # Error model
//!
//! ## Design
//!
//! One error enum carries every failure in the fetch → decode → emit chain,
//! instead of ad-hoc string errors per loader. `thiserror` keeps the messages
//! readable while callers can still match on the variant.
//!
//! ## Implementation
//!
//! - Payloads are plain strings: the transport and decoder engines are
//!   external, their own error types never leak past this boundary.
//! - `code()` / `stage()` give stable identifiers for the failure message that
//!   the dispatcher emits back to the caller.

/// Unified error for loaders, transport and decoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("resource limit: {0}")]
    ResourceLimit(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("worker error: {0}")]
    Worker(String),
}

impl LoadError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Http { .. } => "http",
            Self::Timeout(_) => "timeout",
            Self::ResourceLimit(_) => "resource_limit",
            Self::Decode(_) => "decode",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Worker(_) => "worker",
        }
    }

    /// Pipeline stage the error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::Http { .. } | Self::Timeout(_) | Self::ResourceLimit(_) => {
                "fetch"
            }
            Self::Decode(_) => "decode",
            Self::InvalidRequest(_) | Self::Worker(_) => "dispatch",
        }
    }
}
