//! Recorded-demonstration input types.
//!
//! A demonstration arrives as an [`ActionTrace`]: an ordered sequence of
//! intent-classified steps produced by the (external) recorder and
//! segmenter, plus voice-derived context and detected parameter candidates.
//! The compiler consumes these; nothing here is mutated after recording.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::goal::Platform;

// ---------------------------------------------------------------------------
// Step classification
// ---------------------------------------------------------------------------

/// Intent classification of one recorded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepIntent {
    Search,
    Select,
    Navigate,
    Write,
    Extract,
    Save,
    LaunchApp,
}

/// Why the segmenter ended this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryReason {
    Submit,
    AppSwitch,
    Navigation,
    Select,
    Save,
    FocusChange,
}

// ---------------------------------------------------------------------------
// Elements & steps
// ---------------------------------------------------------------------------

/// Descriptor of an element the user clicked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(i32, i32)>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility_role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility_name: Option<String>,
}

/// One classified step of the recorded demonstration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub id: String,
    pub step_number: u32,

    /// Seconds from session start.
    pub start_ts: f64,
    pub end_ts: f64,

    pub intent: StepIntent,

    #[serde(default = "default_step_confidence")]
    pub confidence: f64,

    pub boundary_reason: BoundaryReason,

    pub platform: Platform,
    pub app_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_after: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub typed_values: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clicked_elements: Vec<ElementRef>,

    /// Logical shortcut names recorded during the step ("copy", "paste",
    /// "save", ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyboard_shortcuts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_transcript: Option<String>,
}

fn default_step_confidence() -> f64 {
    0.5
}

impl TraceStep {
    /// All typed text combined into one string.
    pub fn combined_typed_text(&self) -> String {
        self.typed_values.join(" ")
    }

    pub fn has_typing(&self) -> bool {
        !self.typed_values.is_empty()
    }

    pub fn has_shortcut(&self, name: &str) -> bool {
        self.keyboard_shortcuts.iter().any(|s| s == name)
    }
}

// ---------------------------------------------------------------------------
// Voice & parameter context
// ---------------------------------------------------------------------------

/// One value the narration mentioned, with its semantic type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterHint {
    pub value: String,

    /// E.g. "cuisine", "location", "query".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_type: Option<String>,
}

/// Context distilled from voice narration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceContext {
    /// Overall task goal, if the user stated one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_goal: Option<String>,

    /// Field names the user asked to extract.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extraction_hints: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter_hints: Vec<ParameterHint>,
}

/// Where a parameter candidate was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSource {
    TypedText,
    Voice,
}

/// A value detected as likely-parameterizable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterCandidate {
    /// The literal value as it appeared.
    pub value: String,

    /// Suggested parameter name, e.g. "query", "location", "site_filter".
    pub suggested_name: String,

    pub confidence: f64,

    pub source: ParameterSource,
}

// ---------------------------------------------------------------------------
// Action trace
// ---------------------------------------------------------------------------

/// The complete interpreted recording the compiler consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTrace {
    pub session_id: String,

    #[serde(default)]
    pub steps: Vec<TraceStep>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_context: Option<VoiceContext>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter_candidates: Vec<ParameterCandidate>,
}

impl ActionTrace {
    /// Candidates at or above a confidence threshold.
    pub fn confident_parameters(&self, threshold: f64) -> Vec<&ParameterCandidate> {
        self.parameter_candidates
            .iter()
            .filter(|p| p.confidence >= threshold)
            .collect()
    }

    /// Load a trace from a JSON document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Extraction field descriptions keyed by page/step, as enriched by the
/// external vision pass.  Maps a schema key to field name → spec.
pub type ExtractionSchemas = BTreeMap<String, crate::goal::ExtractionSchema>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_typed_text_joins_values() {
        let step = TraceStep {
            id: "s1".into(),
            step_number: 1,
            start_ts: 0.0,
            end_ts: 2.0,
            intent: StepIntent::Search,
            confidence: 0.9,
            boundary_reason: BoundaryReason::Submit,
            platform: Platform::Browser,
            app_name: "Chrome".into(),
            window_title: None,
            url_before: Some("https://google.com".into()),
            url_after: None,
            typed_values: vec!["best bars".into(), "in delhi".into()],
            clicked_elements: vec![],
            keyboard_shortcuts: vec![],
            voice_transcript: None,
        };
        assert_eq!(step.combined_typed_text(), "best bars in delhi");
        assert!(step.has_typing());
        assert!(!step.has_shortcut("copy"));
    }

    #[test]
    fn confident_parameters_filters_by_threshold() {
        let trace = ActionTrace {
            session_id: "sess".into(),
            steps: vec![],
            voice_context: None,
            parameter_candidates: vec![
                ParameterCandidate {
                    value: "delhi".into(),
                    suggested_name: "location".into(),
                    confidence: 0.9,
                    source: ParameterSource::TypedText,
                },
                ParameterCandidate {
                    value: "maybe".into(),
                    suggested_name: "noise".into(),
                    confidence: 0.2,
                    source: ParameterSource::Voice,
                },
            ],
        };
        let confident = trace.confident_parameters(0.5);
        assert_eq!(confident.len(), 1);
        assert_eq!(confident[0].suggested_name, "location");
    }
}
