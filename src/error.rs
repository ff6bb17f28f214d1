//! Construction-time and collaborator error types.
//!
//! Per-request failures are values carried inside a [`crate::protocol::Reply`]
//! (§7 of the spec: "errors are values, not exceptions"); the error types
//! here are for the things Rust itself needs a `Result` for — building a
//! route tree from JSON, wiring a destination to a missing pool, or a
//! collaborator (the upstream pool) failing to connect.

use thiserror::Error;

/// Failures building a route tree, whether from JSON config or
/// programmatically.
#[derive(Debug, Error)]
pub enum RouteBuildError {
    #[error("unknown route type: {0}")]
    UnknownRouteType(String),

    #[error("route config is malformed: {0}")]
    MalformedConfig(#[from] serde_json::Error),

    #[error("destination route refers to unknown pool: {0}")]
    UnknownPool(String),

    #[error("invalid shadow key range: lo={lo} must be <= hi={hi}")]
    InvalidShadowRange { lo: u64, hi: u64 },

    #[error("invalid shadow key fraction range: [{lo}, {hi}) must satisfy 0.0 <= lo <= hi <= 1.0")]
    InvalidKeyFractionRange { lo: f64, hi: f64 },
}

/// Failures reported by the `UpstreamPool` collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool is not connected")]
    NotConnected,

    #[error("pool transport error: {0}")]
    Transport(String),
}

/// Failures operating on a [`crate::context::RequestContext`] outside its
/// allowed state transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("context has already been processed")]
    AlreadyProcessed,

    #[error("operation not available on a recording context")]
    NotAvailable,
}
