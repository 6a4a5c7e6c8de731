//! Goal-oriented workflow model.
//!
//! A recorded demonstration is compiled into goals, not literal actions.
//! Each [`GoalStep`] carries success criteria and an ordered set of
//! strategies; the executor tries strategies until the criteria hold, which
//! is what makes replay robust against moved buttons and changed layouts.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::template;

// ---------------------------------------------------------------------------
// Platform & goal type
// ---------------------------------------------------------------------------

/// Where a goal executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Browser,
    Desktop,
}

/// High-level goal categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    /// Get to a specific page or state.
    Navigate,
    /// Submit a search query.
    Search,
    /// Pull data from the current page.
    Extract,
    /// Click something / choose from options.
    Select,
    /// Type content.
    Write,
    /// Persist data (save shortcut).
    Save,
    /// Open or activate an application.
    Launch,
    /// Execute a keyboard shortcut.
    Shortcut,
}

/// How strictly a navigation goal is tied to the recorded destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationIntent {
    /// The user named a target site; replay must land on that domain.
    SpecificSite,
    /// Any relevant result is acceptable.
    AnyResult,
    /// The user just clicked the first result.
    FirstResult,
}

// ---------------------------------------------------------------------------
// Success criteria
// ---------------------------------------------------------------------------

/// How to know a goal was achieved.
///
/// All specified predicates must hold, except `timeout_success`, which
/// short-circuits to always-true regardless of the other fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriteria {
    /// The URL must contain this substring (may hold a `{{name}}` placeholder).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_contains: Option<String>,

    /// The URL must match this regex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,

    /// The URL just needs to differ from where the goal started.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub url_changed: bool,

    /// The page must be classified as this type (e.g. "detail_page").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_type: Option<String>,

    /// This text must be visible on the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_contains_text: Option<String>,

    /// This element (selector or description) must be visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_visible: Option<String>,

    /// Each of these named fields must have been extracted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extracted_fields: Vec<String>,

    /// At least this many fields must have been extracted.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub min_extracted_count: usize,

    /// This application must be active (desktop).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_active: Option<String>,

    /// Unconditional success once the settle delay has elapsed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timeout_success: bool,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl SuccessCriteria {
    /// True when no predicate is set at all.
    pub fn is_empty(&self) -> bool {
        self.url_contains.is_none()
            && self.url_pattern.is_none()
            && !self.url_changed
            && self.page_type.is_none()
            && self.page_contains_text.is_none()
            && self.element_visible.is_none()
            && self.extracted_fields.is_empty()
            && self.min_extracted_count == 0
            && self.app_active.is_none()
            && !self.timeout_success
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// One concrete, independently-triable method for achieving a goal.
///
/// Strategies are attempted in strictly descending `priority` order.
/// Coordinate strategies are always assigned the lowest priority by
/// convention, since raw positions are the least durable signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Canonical strategy name (e.g. "search_input", "coordinates").
    pub name: String,

    /// Higher is tried first.
    pub priority: u32,

    /// CSS selector to target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Visible text to find and click.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_match: Option<String>,

    /// ARIA role to target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Natural-language description for the perception oracle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_description: Option<String>,

    /// Raw screen position fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(i32, i32)>,

    /// Literal value to type (may hold a `{{name}}` placeholder).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_value: Option<String>,

    /// Press Enter after typing.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub submit_after: bool,

    /// Key combination, e.g. "command+v".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut_keys: Option<String>,

    /// Only applicable on this platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_platform: Option<Platform>,

    /// Only applicable when the current URL contains this substring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_url_pattern: Option<String>,

    /// Desktop accessibility role of the target element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility_role: Option<String>,

    /// Desktop accessibility name of the target element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility_name: Option<String>,
}

impl Strategy {
    /// Shorthand for a named strategy with just a priority.
    pub fn named(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            ..Self::default()
        }
    }

    /// Whether this strategy may run on the given platform.
    pub fn applies_to(&self, platform: Platform) -> bool {
        self.requires_platform.is_none_or(|p| p == platform)
    }
}

// ---------------------------------------------------------------------------
// Goal step
// ---------------------------------------------------------------------------

/// One unit of intent in a workflow.
///
/// Success is determined by [`SuccessCriteria`], never by mere action
/// completion.  A step with no strategies and `fallback_to_agent = false`
/// can never be satisfied; [`GoalStep::validate`] rejects that shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalStep {
    /// Stable identifier, derived from the source trace step.
    pub id: String,

    /// Monotonically increasing position in the workflow.
    pub step_number: u32,

    pub goal_type: GoalType,

    /// Human-readable description (may hold `{{name}}` placeholders).
    pub description: String,

    pub platform: Platform,

    /// The application the goal targets.
    pub app_name: String,

    /// URL pattern where this goal starts, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url_pattern: Option<String>,

    #[serde(default)]
    pub success_criteria: SuccessCriteria,

    #[serde(default)]
    pub strategies: Vec<Strategy>,

    /// Named parameters; values may hold `{{name}}` placeholders.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,

    /// Fields to extract on this step, if it is an extraction goal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_schema: Option<ExtractionSchema>,

    /// Content template for write/paste goals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Whether the adaptive agent loop may run after all strategies fail.
    #[serde(default)]
    pub fallback_to_agent: bool,

    /// Natural-language goal prompt for the agent fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_goal_prompt: Option<String>,

    /// Inference confidence in [0, 1].
    #[serde(default = "default_confidence")]
    pub confidence: f64,

    /// Failure of an optional goal does not abort the workflow.
    #[serde(default)]
    pub optional: bool,

    /// Number of retry rounds over the strategy list.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound for waits within one strategy attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Settle delay after each strategy's side effect, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// The click was a listing→detail transition; replay must land on a
    /// detail page, and the pre-check may consult the page classifier.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub expects_detail_page: bool,

    /// How strictly a navigation goal is tied to the recorded destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_intent: Option<NavigationIntent>,
}

fn default_confidence() -> f64 {
    1.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_settle_delay_ms() -> u64 {
    500
}

impl GoalStep {
    /// Create a minimal goal step; the builders in the compiler fill in the
    /// rest.
    pub fn new(
        id: impl Into<String>,
        step_number: u32,
        goal_type: GoalType,
        description: impl Into<String>,
        platform: Platform,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            step_number,
            goal_type,
            description: description.into(),
            platform,
            app_name: app_name.into(),
            source_url_pattern: None,
            success_criteria: SuccessCriteria::default(),
            strategies: Vec::new(),
            parameters: BTreeMap::new(),
            extraction_schema: None,
            template: None,
            fallback_to_agent: false,
            agent_goal_prompt: None,
            confidence: 1.0,
            optional: false,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            expects_detail_page: false,
            navigation_intent: None,
        }
    }

    /// Strategies in strictly descending priority order.
    ///
    /// The sort is stable, so equal priorities keep their declaration order
    /// and repeated runs attempt strategies identically.
    pub fn ordered_strategies(&self) -> Vec<&Strategy> {
        let mut ordered: Vec<&Strategy> = self.strategies.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));
        ordered
    }

    /// Strategies applicable to a platform, in priority order.
    pub fn strategies_for_platform(&self, platform: Platform) -> Vec<&Strategy> {
        self.ordered_strategies()
            .into_iter()
            .filter(|s| s.applies_to(platform))
            .collect()
    }

    /// Reject goal shapes that can never be satisfied.
    pub fn validate(&self) -> Result<()> {
        if self.strategies.is_empty() && !self.fallback_to_agent {
            return Err(CoreError::Validation {
                reason: format!(
                    "goal `{}` has no strategies and no agent fallback",
                    self.id
                ),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Extraction schema
// ---------------------------------------------------------------------------

/// What one extracted field looks like on the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// What the field means.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Where/how the field appears visually.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_hint: Option<String>,

    /// Example value from the demonstration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// Field name → specification, for one extraction.
pub type ExtractionSchema = BTreeMap<String, FieldSpec>;

// ---------------------------------------------------------------------------
// Goal workflow
// ---------------------------------------------------------------------------

/// An ordered, persisted, parameterized sequence of goal steps.
///
/// Produced once by the compiler and persisted as an immutable template.
/// At execution time it is parameter-substituted into a working copy; the
/// working copy is mutated during the run, the persisted template never.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalWorkflow {
    pub id: Uuid,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Parameter name → default/example value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,

    #[serde(default)]
    pub steps: Vec<GoalStep>,

    /// Union of all per-step extraction schemas.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extraction_schema: ExtractionSchema,

    /// The recording session this workflow was compiled from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_from_session: Option<String>,

    /// Whether voice narration informed the compilation.
    #[serde(default)]
    pub voice_analyzed: bool,

    /// Whether a vision oracle enriched the compilation.
    #[serde(default)]
    pub vision_enriched: bool,

    pub created_at: DateTime<Utc>,
}

impl GoalWorkflow {
    /// Create an empty workflow with a fresh id.
    pub fn new(name: impl Into<String>, steps: Vec<GoalStep>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            parameters: BTreeMap::new(),
            steps,
            extraction_schema: BTreeMap::new(),
            created_from_session: None,
            voice_analyzed: false,
            vision_enriched: false,
            created_at: Utc::now(),
        }
    }

    /// Names of the parameters this workflow accepts.
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters.keys().map(String::as_str).collect()
    }

    /// All field names the workflow will extract.
    pub fn extraction_fields(&self) -> Vec<String> {
        let mut fields = BTreeSet::new();
        for step in &self.steps {
            if let Some(schema) = &step.extraction_schema {
                fields.extend(schema.keys().cloned());
            }
        }
        fields.into_iter().collect()
    }

    /// Produce a working copy with every `{{name}}` placeholder replaced.
    ///
    /// Substitution is textual and case-sensitive, applied to step
    /// descriptions, templates, agent prompts, parameter values, and the
    /// text-bearing strategy fields.  Placeholders for names absent from
    /// `values` are left untouched.
    pub fn substitute_parameters(&self, values: &BTreeMap<String, String>) -> Self {
        let mut copy = self.clone();

        for step in &mut copy.steps {
            step.description = template::substitute(&step.description, values);
            template::substitute_opt(&mut step.template, values);
            template::substitute_opt(&mut step.agent_goal_prompt, values);
            template::substitute_opt(&mut step.success_criteria.url_contains, values);

            for value in step.parameters.values_mut() {
                *value = template::substitute(value, values);
            }

            for strategy in &mut step.strategies {
                template::substitute_opt(&mut strategy.visual_description, values);
                template::substitute_opt(&mut strategy.text_match, values);
                template::substitute_opt(&mut strategy.input_value, values);
            }
        }

        copy
    }

    /// Fill a content template with previously extracted data.
    pub fn fill_template(template_str: &str, extracted: &BTreeMap<String, String>) -> String {
        template::substitute(template_str, extracted)
    }

    /// Persist the workflow as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| CoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(workflow_id = %self.id, path = %path.display(), "workflow saved");
        Ok(())
    }

    /// Load a workflow from a JSON document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
