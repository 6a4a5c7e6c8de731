//! Core data model for reenact.
//!
//! Reenact turns a one-time human demonstration of a UI task into a
//! parameterized automation that replays with new input values despite UI
//! drift.  This crate holds the shared vocabulary of that pipeline:
//!
//! ```text
//! record ──> ActionTrace ──> compiler ──> GoalWorkflow ──> executor ──> WorkflowResult
//!                                           (persisted,
//!                                            reusable)
//! ```
//!
//! ## Modules
//!
//! - [`trace`] -- the recorded demonstration: classified steps, voice
//!   context, parameter candidates.
//! - [`goal`] -- goal steps, strategies, success criteria, and the
//!   persisted workflow document.
//! - [`template`] -- `{{name}}` placeholder substitution.
//! - [`ratelimit`] -- the shared sliding-window limiter for oracle calls.
//! - [`error`] -- core error types.

pub mod error;
pub mod goal;
pub mod ratelimit;
pub mod template;
pub mod trace;

pub use error::{CoreError, Result};
pub use goal::{
    ExtractionSchema, FieldSpec, GoalStep, GoalType, GoalWorkflow, NavigationIntent, Platform,
    Strategy, SuccessCriteria,
};
pub use ratelimit::{RateLimitConfig, RateLimitStats, RateLimiter};
pub use trace::{
    ActionTrace, BoundaryReason, ElementRef, ExtractionSchemas, ParameterCandidate, ParameterHint,
    ParameterSource, StepIntent, TraceStep, VoiceContext,
};
