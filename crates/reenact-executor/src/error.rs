//! Executor error types.

use reenact_core::Platform;

/// Unified error type for workflow execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// One strategy attempt failed; the caller moves on to the next.
    #[error("strategy `{strategy}` failed: {reason}")]
    StrategyFailed { strategy: String, reason: String },

    /// No adapter is registered for the platform a goal needs.
    #[error("no adapter available for platform {platform:?}")]
    AdapterUnavailable { platform: Platform },

    /// A goal needs the perception oracle but none is configured.
    #[error("perception oracle required but not configured")]
    OracleUnavailable,

    /// The oracle call itself failed.
    #[error("oracle call failed: {reason}")]
    OracleFailed { reason: String },

    /// Rate limiter timed out before granting a call slot.
    #[error("rate limit wait exceeded for `{name}`")]
    RateLimited { name: String },

    /// Configuration could not be read or parsed.
    #[error("config error at {path}: {reason}")]
    Config { path: String, reason: String },

    /// An error propagated from the core model crate.
    #[error("model error: {0}")]
    Core(#[from] reenact_core::CoreError),
}

/// Convenience alias used throughout the executor crate.
pub type Result<T> = std::result::Result<T, ExecutorError>;
