//! Trace-to-workflow compiler.
//!
//! Turns a recorded [`reenact_core::ActionTrace`] into a persisted
//! [`reenact_core::GoalWorkflow`].  The pipeline is three pure passes plus
//! the builders:
//!
//! 1. [`analysis`] annotates the whole sequence (focus clicks, navigation
//!    intent) and folds merged steps into their targets.
//! 2. [`inferrer`] builds one goal per remaining step from its observed
//!    outcome, templating detected parameters as `{{name}}` placeholders.
//! 3. [`consolidate`] drops noise goals in a single rolling fold.
//!
//! An optional [`analysis::SequenceOracle`] can replace the heuristic
//! annotation pass; its failure degrades compilation, never fails it.

pub mod analysis;
pub mod consolidate;
pub mod error;
pub mod inferrer;

pub use analysis::{SequenceOracle, StepAnnotation, StepOutcome};
pub use error::{CompilerError, Result};
pub use inferrer::GoalInferrer;
