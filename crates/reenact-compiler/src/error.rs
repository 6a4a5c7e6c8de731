//! Compiler error types.

/// Unified error type for goal inference.
#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    /// The trace holds no steps to compile.
    #[error("trace `{session_id}` has no steps")]
    EmptyTrace { session_id: String },

    /// The sequence oracle failed; callers degrade to the heuristic pass.
    #[error("sequence oracle failed: {reason}")]
    OracleFailed { reason: String },

    /// An error propagated from the core model crate.
    #[error("model error: {0}")]
    Core(#[from] reenact_core::CoreError),
}

/// Convenience alias used throughout the compiler crate.
pub type Result<T> = std::result::Result<T, CompilerError>;
