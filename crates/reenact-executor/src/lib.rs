//! Goal-driven workflow replay.
//!
//! Consumes a compiled [`reenact_core::GoalWorkflow`] and achieves its
//! goals in order: substitute parameters into a working copy, then for each
//! goal try ranked strategies across retry rounds, verifying success
//! criteria after every attempt.  Real UIs are only touched through the
//! [`adapter::PlatformAdapter`] seam; vision and reasoning go through
//! [`oracle::PerceptionOracle`] behind a shared rate limiter; every
//! replayed input passes the [`safety::SafetyGuard`].

pub mod adapter;
pub mod config;
pub mod error;
pub mod executor;
pub mod oracle;
pub mod safety;

pub use adapter::PlatformAdapter;
pub use config::ExecutorConfig;
pub use error::{ExecutorError, Result};
pub use executor::{GoalExecutor, GoalResult, RunState, WorkflowResult};
pub use oracle::{OracleAction, PageClass, PerceptionOracle};
pub use safety::{SafetyCheck, SafetyGuard};
