//! Executor configuration.

use std::path::Path;

use reenact_core::RateLimitConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, Result};

/// Tunables for workflow execution, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Upper bound on adaptive fallback iterations per goal.
    pub agent_max_iterations: u32,

    /// Pause between retry rounds, in milliseconds.
    pub retry_pause_ms: u64,

    /// Rate limiter timeout for one oracle call, in milliseconds.
    pub oracle_wait_ms: u64,

    /// Refuse warning-tier actions too.
    pub strict_safety: bool,

    /// Scroll distance used by scroll-and-extract strategies, in pixels.
    pub scroll_step: i32,

    /// Screen bounds; oracle-located coordinates are clamped to these.
    pub screen_width: i32,
    pub screen_height: i32,

    /// Shared limiter settings for all oracle calls.
    pub rate_limit: RateLimitConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            agent_max_iterations: 5,
            retry_pause_ms: 1000,
            oracle_wait_ms: 30_000,
            strict_safety: false,
            scroll_step: 600,
            screen_width: 1920,
            screen_height: 1080,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ExecutorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ExecutorError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ExecutorError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn defaults_are_sane() {
        let config = ExecutorConfig::default();
        assert_eq!(config.agent_max_iterations, 5);
        assert!(!config.strict_safety);
        assert_eq!(config.rate_limit.calls_per_minute, 30);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("executor.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "agent_max_iterations = 8").unwrap();
        writeln!(file, "strict_safety = true").unwrap();
        writeln!(file, "[rate_limit]").unwrap();
        writeln!(file, "calls_per_minute = 10").unwrap();

        let config = ExecutorConfig::from_file(&path).unwrap();
        assert_eq!(config.agent_max_iterations, 8);
        assert!(config.strict_safety);
        assert_eq!(config.rate_limit.calls_per_minute, 10);
        // Untouched fields keep their defaults.
        assert_eq!(config.retry_pause_ms, 1000);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = ExecutorConfig::from_file("/nonexistent/executor.toml");
        assert!(matches!(result, Err(ExecutorError::Config { .. })));
    }
}
