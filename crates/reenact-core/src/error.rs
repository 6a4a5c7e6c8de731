//! Core error types.
//!
//! Everything in the model layer surfaces errors through [`CoreError`].

/// Unified error type for the core model crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A workflow document could not be read or written.
    #[error("io error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation failed for a model value.
    #[error("validation error: {reason}")]
    Validation { reason: String },
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
