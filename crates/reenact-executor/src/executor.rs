//! Goal-driven workflow execution.
//!
//! The executor replays a compiled workflow by *achieving goals*, not by
//! replaying actions.  For each goal it tries the ranked strategies across
//! retry rounds, verifies success criteria after every attempt, and only
//! then moves on.  When every strategy is exhausted an optional adaptive
//! loop asks the perception oracle for one action at a time, bounded by
//! configuration.  Steps run strictly in order; extracted data flows
//! forward through [`RunState`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reenact_core::{
    GoalStep, GoalType, GoalWorkflow, Platform, RateLimiter, Strategy, SuccessCriteria,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::PlatformAdapter;
use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, Result};
use crate::oracle::{OracleAction, PerceptionOracle};
use crate::safety::SafetyGuard;

/// Name recorded when a goal's criteria already held before any attempt.
const ALREADY_SATISFIED: &str = "already_satisfied";

/// Deterministic re-phrasings appended to visual descriptions on retry
/// rounds, so repeated oracle lookups do not repeat a failed fixation.
const RETRY_VARIANTS: &[&str] = &[
    "",
    "; look further down the page",
    "; consider partially visible or differently labeled elements",
];

// ---------------------------------------------------------------------------
// Run state & results
// ---------------------------------------------------------------------------

/// Mutable state threaded through one workflow run.
#[derive(Debug, Default)]
pub struct RunState {
    /// All fields extracted so far; later extractions overwrite by name.
    pub extracted: BTreeMap<String, String>,

    /// Fields from the most recent extraction only.
    pub last_extracted: BTreeMap<String, String>,

    pub current_platform: Option<Platform>,
    pub current_app: Option<String>,
}

/// Outcome of one goal.
#[derive(Debug, Clone, Serialize)]
pub struct GoalResult {
    pub goal_id: String,
    pub achieved: bool,

    /// Name of the strategy that satisfied the criteria.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<String>,

    /// Strategy attempts, including attempts refused by the safety guard.
    pub attempts: u32,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extracted_data: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub fallback_used: bool,
    pub duration_ms: u64,
}

impl GoalResult {
    fn new(goal_id: impl Into<String>) -> Self {
        Self {
            goal_id: goal_id.into(),
            achieved: false,
            strategy_used: None,
            attempts: 0,
            extracted_data: BTreeMap::new(),
            error: None,
            fallback_used: false,
            duration_ms: 0,
        }
    }
}

/// Outcome of one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub success: bool,

    pub steps_total: usize,
    pub steps_executed: usize,
    pub steps_failed: usize,

    pub step_results: Vec<GoalResult>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extracted_data: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,

    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Strategy dispatch
// ---------------------------------------------------------------------------

/// How a strategy is carried out, derived from its canonical name and
/// populated fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrategyKind {
    ActivateApp,
    LaunchApp,
    ShortcutPress,
    Extract,
    ScrollExtract,
    FillSelector,
    RoleType,
    LocateType,
    TypeFocused,
    ClickSelector,
    ClickText,
    ClickRole,
    ClickVisual,
    ClickCoordinates,
}

fn strategy_kind(strategy: &Strategy, goal: &GoalStep) -> Option<StrategyKind> {
    match strategy.name.as_str() {
        "activate_app" => return Some(StrategyKind::ActivateApp),
        "launch_app" => return Some(StrategyKind::LaunchApp),
        "scroll_extract" => return Some(StrategyKind::ScrollExtract),
        _ => {}
    }
    if goal.goal_type == GoalType::Extract {
        return Some(StrategyKind::Extract);
    }
    if strategy.shortcut_keys.is_some() {
        return Some(StrategyKind::ShortcutPress);
    }
    if strategy.input_value.is_some() {
        if strategy.selector.is_some() {
            return Some(StrategyKind::FillSelector);
        }
        if strategy.accessibility_role.is_some() {
            return Some(StrategyKind::RoleType);
        }
        if strategy.visual_description.is_some() {
            return Some(StrategyKind::LocateType);
        }
        return Some(StrategyKind::TypeFocused);
    }
    if strategy.selector.is_some() {
        return Some(StrategyKind::ClickSelector);
    }
    if strategy.text_match.is_some() {
        return Some(StrategyKind::ClickText);
    }
    if strategy.role.is_some() || strategy.accessibility_role.is_some() {
        return Some(StrategyKind::ClickRole);
    }
    if strategy.visual_description.is_some() {
        return Some(StrategyKind::ClickVisual);
    }
    if strategy.coordinates.is_some() {
        return Some(StrategyKind::ClickCoordinates);
    }
    None
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Replays compiled workflows against platform adapters.
pub struct GoalExecutor {
    browser: Option<Arc<dyn PlatformAdapter>>,
    desktop: Option<Arc<dyn PlatformAdapter>>,
    oracle: Option<Arc<dyn PerceptionOracle>>,
    limiter: Arc<RateLimiter>,
    guard: SafetyGuard,
    config: ExecutorConfig,
}

impl GoalExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new("oracle", config.rate_limit.clone()));
        let guard = SafetyGuard::new(config.strict_safety);
        Self {
            browser: None,
            desktop: None,
            oracle: None,
            limiter,
            guard,
            config,
        }
    }

    pub fn with_browser(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.browser = Some(adapter);
        self
    }

    pub fn with_desktop(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.desktop = Some(adapter);
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn PerceptionOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    fn adapter_for(&self, platform: Platform) -> Result<&Arc<dyn PlatformAdapter>> {
        let adapter = match platform {
            Platform::Browser => self.browser.as_ref(),
            Platform::Desktop => self.desktop.as_ref(),
        };
        adapter.ok_or(ExecutorError::AdapterUnavailable { platform })
    }

    // -- workflow ---------------------------------------------------------

    /// Run a workflow with the given parameter values.
    ///
    /// Provided values override the workflow's recorded defaults.  The
    /// persisted workflow itself is never mutated; all substitution happens
    /// on a working copy.
    pub async fn execute(
        &self,
        workflow: &GoalWorkflow,
        params: &BTreeMap<String, String>,
    ) -> Result<WorkflowResult> {
        let started = std::time::Instant::now();

        let mut values = workflow.parameters.clone();
        values.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        let working = workflow.substitute_parameters(&values);

        info!(
            workflow_id = %working.id,
            name = %working.name,
            steps = working.steps.len(),
            "workflow run started"
        );

        let mut state = RunState::default();
        let mut step_results = Vec::new();
        let mut errors = Vec::new();
        let mut success = true;

        for goal in &working.steps {
            goal.validate()?;
            let result = self.achieve(goal, &mut state).await;

            if !result.achieved {
                let reason = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "criteria never satisfied".to_string());
                if goal.optional {
                    warn!(goal_id = %goal.id, reason = %reason, "optional goal failed, continuing");
                    step_results.push(result);
                    continue;
                }
                errors.push(format!("goal `{}` failed: {reason}", goal.id));
                step_results.push(result);
                success = false;
                break;
            }
            step_results.push(result);
        }

        let steps_failed = step_results.iter().filter(|r| !r.achieved).count();
        let result = WorkflowResult {
            workflow_id: working.id,
            workflow_name: working.name.clone(),
            success,
            steps_total: working.steps.len(),
            steps_executed: step_results.len(),
            steps_failed,
            step_results,
            extracted_data: state.extracted,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            workflow_id = %result.workflow_id,
            success = result.success,
            extracted = result.extracted_data.len(),
            "workflow run finished"
        );
        Ok(result)
    }

    // -- single goal ------------------------------------------------------

    /// Try to achieve one goal, mutating the run state.
    pub async fn achieve(&self, goal: &GoalStep, state: &mut RunState) -> GoalResult {
        let started = std::time::Instant::now();
        let mut result = GoalResult::new(&goal.id);

        info!(
            goal_id = %goal.id,
            goal_type = ?goal.goal_type,
            description = %goal.description,
            "achieving goal"
        );

        if let Err(e) = self.ensure_context(goal, state).await {
            result.error = Some(e.to_string());
            result.duration_ms = started.elapsed().as_millis() as u64;
            return result;
        }

        let start_url = self.read_url(goal.platform).await;

        if self.pre_satisfied(goal, state).await {
            info!(goal_id = %goal.id, "goal already satisfied, no action taken");
            result.achieved = true;
            result.strategy_used = Some(ALREADY_SATISFIED.to_string());
            result.duration_ms = started.elapsed().as_millis() as u64;
            return result;
        }

        'rounds: for round in 0..goal.max_retries {
            if round > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.retry_pause_ms)).await;
            }

            for strategy in goal.strategies_for_platform(goal.platform) {
                if !self.url_guard_passes(strategy, goal.platform).await {
                    debug!(strategy = %strategy.name, "url guard not met, skipping");
                    continue;
                }

                if let Some(reason) = self.safety_refusal(goal, strategy) {
                    // A refused attempt still counts toward the bound.
                    result.attempts += 1;
                    result.error = Some(reason.clone());
                    warn!(goal_id = %goal.id, strategy = %strategy.name, reason = %reason, "strategy refused");
                    continue;
                }

                result.attempts += 1;
                debug!(
                    goal_id = %goal.id,
                    strategy = %strategy.name,
                    round,
                    attempt = result.attempts,
                    "trying strategy"
                );

                match self.attempt(goal, strategy, round, state).await {
                    Ok(()) => {
                        tokio::time::sleep(Duration::from_millis(goal.settle_delay_ms)).await;
                        match self
                            .criteria_met(goal, &goal.success_criteria, state, start_url.as_deref())
                            .await
                        {
                            Ok(true) => {
                                result.achieved = true;
                                result.strategy_used = Some(strategy.name.clone());
                                result.error = None;
                                break 'rounds;
                            }
                            Ok(false) => {
                                result.error = Some(format!(
                                    "criteria not met after `{}`",
                                    strategy.name
                                ));
                            }
                            Err(e) => {
                                result.error = Some(e.to_string());
                            }
                        }
                    }
                    Err(e) => {
                        debug!(strategy = %strategy.name, error = %e, "strategy failed");
                        result.error = Some(e.to_string());
                    }
                }
            }
        }

        if !result.achieved && goal.fallback_to_agent {
            result.fallback_used = true;
            match self
                .agent_fallback(goal, state, start_url.as_deref())
                .await
            {
                Ok(true) => {
                    result.achieved = true;
                    result.strategy_used = Some("agent_fallback".to_string());
                    result.error = None;
                }
                Ok(false) => {}
                Err(e) => result.error = Some(e.to_string()),
            }
        }

        result.extracted_data = state.last_extracted.clone();
        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            goal_id = %goal.id,
            achieved = result.achieved,
            attempts = result.attempts,
            strategy = result.strategy_used.as_deref().unwrap_or("none"),
            "goal finished"
        );
        result
    }

    /// Bring the right platform and app to the front before a goal runs.
    async fn ensure_context(&self, goal: &GoalStep, state: &mut RunState) -> Result<()> {
        if goal.platform == Platform::Desktop
            && goal.goal_type != GoalType::Launch
            && state.current_app.as_deref() != Some(goal.app_name.as_str())
        {
            let adapter = self.adapter_for(Platform::Desktop)?;
            if !adapter.is_app_active(&goal.app_name).await? {
                debug!(app = %goal.app_name, "activating app for goal context");
                adapter.activate_app(&goal.app_name).await?;
            }
        }
        state.current_platform = Some(goal.platform);
        state.current_app = Some(goal.app_name.clone());
        Ok(())
    }

    async fn read_url(&self, platform: Platform) -> Option<String> {
        let adapter = self.adapter_for(platform).ok()?;
        adapter.current_url().await.ok().flatten()
    }

    async fn url_guard_passes(&self, strategy: &Strategy, platform: Platform) -> bool {
        let Some(pattern) = &strategy.requires_url_pattern else {
            return true;
        };
        match self.read_url(platform).await {
            Some(url) => url.to_lowercase().contains(&pattern.to_lowercase()),
            None => false,
        }
    }

    /// Reason this strategy must not run, if the guard refuses it.
    fn safety_refusal(&self, goal: &GoalStep, strategy: &Strategy) -> Option<String> {
        if let Some(keys) = &strategy.shortcut_keys {
            let check = self.guard.check_shortcut(keys);
            if !check.allowed {
                return check.reason;
            }
        }
        if let Some(value) = &strategy.input_value {
            let check = self.guard.check_typed_text(&goal.app_name, value);
            if !check.allowed {
                return check.reason;
            }
        }
        None
    }

    // -- pre-check --------------------------------------------------------

    /// Whether the goal's criteria already hold, using only read-only
    /// observations.  `url_changed` and `timeout_success` can only be
    /// judged relative to an action, so they are ignored here; the check
    /// fires when at least one of the remaining predicates is verifiable
    /// and every verifiable one holds.
    async fn pre_satisfied(&self, goal: &GoalStep, state: &RunState) -> bool {
        let criteria = &goal.success_criteria;
        if criteria.is_empty() {
            return false;
        }

        let mut verifiable = false;

        if let Some(target) = effective_url_target(criteria, goal) {
            verifiable = true;
            match self.read_url(goal.platform).await {
                Some(url) if url.to_lowercase().contains(&target.to_lowercase()) => {}
                _ => return false,
            }
        }

        if let Some(app) = &criteria.app_active {
            verifiable = true;
            let Ok(adapter) = self.adapter_for(goal.platform) else {
                return false;
            };
            match adapter.is_app_active(app).await {
                Ok(true) => {}
                _ => return false,
            }
        }

        // Extraction predicates are checked against the accumulated run
        // store, so a re-entered workflow skips extractions it already has.
        if criteria.min_extracted_count > 0 {
            verifiable = true;
            if state.extracted.len() < criteria.min_extracted_count {
                return false;
            }
        }
        if !criteria.extracted_fields.is_empty() {
            verifiable = true;
            if !criteria
                .extracted_fields
                .iter()
                .all(|f| state.extracted.contains_key(f))
            {
                return false;
            }
        }

        if goal.expects_detail_page {
            if let Some(oracle) = &self.oracle {
                verifiable = true;
                let Ok(adapter) = self.adapter_for(goal.platform) else {
                    return false;
                };
                let Ok(text) = adapter.page_text().await else {
                    return false;
                };
                let url = self.read_url(goal.platform).await;
                if !self
                    .limiter
                    .acquire(Duration::from_millis(self.config.oracle_wait_ms))
                    .await
                {
                    return false;
                }
                match oracle.classify_page(&text, url.as_deref()).await {
                    Ok(class) if class.is_detail_page => {}
                    _ => return false,
                }
            }
        }

        verifiable
    }

    // -- criteria ---------------------------------------------------------

    /// Evaluate success criteria as a conjunction.
    ///
    /// Empty criteria and `timeout_success` short-circuit to success; a
    /// `url_contains` that substitutes to empty or still holds an unknown
    /// placeholder is skipped rather than failed.
    async fn criteria_met(
        &self,
        goal: &GoalStep,
        criteria: &SuccessCriteria,
        state: &RunState,
        start_url: Option<&str>,
    ) -> Result<bool> {
        if criteria.is_empty() || criteria.timeout_success {
            return Ok(true);
        }

        let current_url = self.read_url(goal.platform).await;

        if criteria.url_changed {
            match (&current_url, start_url) {
                (Some(now), Some(start)) if now != start => {}
                (Some(_), None) => {}
                _ => return Ok(false),
            }
        }

        if let Some(target) = effective_url_target(criteria, goal) {
            match &current_url {
                Some(url) if url.to_lowercase().contains(&target.to_lowercase()) => {}
                _ => return Ok(false),
            }
        }

        if let Some(pattern) = &criteria.url_pattern {
            match regex::Regex::new(pattern) {
                Ok(re) => match &current_url {
                    Some(url) if re.is_match(url) => {}
                    _ => return Ok(false),
                },
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "invalid url_pattern, skipping check");
                }
            }
        }

        if let Some(text) = &criteria.page_contains_text {
            let adapter = self.adapter_for(goal.platform)?;
            let page = adapter.page_text().await?;
            if !page.to_lowercase().contains(&text.to_lowercase()) {
                return Ok(false);
            }
        }

        if let Some(target) = &criteria.element_visible {
            let adapter = self.adapter_for(goal.platform)?;
            if !adapter.element_visible(target).await? {
                return Ok(false);
            }
        }

        if let Some(expected) = &criteria.page_type {
            let Some(oracle) = &self.oracle else {
                return Ok(false);
            };
            let adapter = self.adapter_for(goal.platform)?;
            let page = adapter.page_text().await?;
            if !self
                .limiter
                .acquire(Duration::from_millis(self.config.oracle_wait_ms))
                .await
            {
                return Err(ExecutorError::RateLimited {
                    name: "oracle".into(),
                });
            }
            let class = oracle
                .classify_page(&page, current_url.as_deref())
                .await?;
            let matches = class.page_type == *expected
                || (expected == "detail_page" && class.is_detail_page)
                || (expected == "list_page" && class.is_list_page);
            if !matches {
                return Ok(false);
            }
        }

        if let Some(app) = &criteria.app_active {
            let adapter = self.adapter_for(goal.platform)?;
            if !adapter.is_app_active(app).await? {
                return Ok(false);
            }
        }

        if criteria.min_extracted_count > 0
            && state.last_extracted.len() < criteria.min_extracted_count
        {
            return Ok(false);
        }
        if !criteria.extracted_fields.is_empty()
            && !criteria
                .extracted_fields
                .iter()
                .all(|f| state.last_extracted.contains_key(f))
        {
            return Ok(false);
        }

        Ok(true)
    }

    // -- strategy attempts ------------------------------------------------

    async fn attempt(
        &self,
        goal: &GoalStep,
        strategy: &Strategy,
        round: u32,
        state: &mut RunState,
    ) -> Result<()> {
        let Some(kind) = strategy_kind(strategy, goal) else {
            return Err(ExecutorError::StrategyFailed {
                strategy: strategy.name.clone(),
                reason: "no executable target".into(),
            });
        };

        let adapter = self.adapter_for(goal.platform)?;

        match kind {
            StrategyKind::ActivateApp => {
                adapter.activate_app(&goal.app_name).await?;
                state.current_app = Some(goal.app_name.clone());
            }
            StrategyKind::LaunchApp => {
                adapter.launch_app(&goal.app_name).await?;
                state.current_app = Some(goal.app_name.clone());
            }
            StrategyKind::ShortcutPress => {
                // Paste goals resolve their content template from the run's
                // extraction store and type it, so replay does not depend on
                // clipboard state from the recording.
                if let (Some(template), true) = (&goal.template, is_paste_strategy(strategy)) {
                    let content = self.resolve_content(template, state);
                    adapter.type_text(&content, false).await?;
                } else if let Some(keys) = &strategy.shortcut_keys {
                    adapter.press_shortcut(keys).await?;
                }
            }
            StrategyKind::Extract | StrategyKind::ScrollExtract => {
                if kind == StrategyKind::ScrollExtract {
                    adapter.scroll(self.config.scroll_step).await?;
                }
                self.run_extraction(goal, state).await?;
            }
            StrategyKind::FillSelector => {
                let (selector, value) = (
                    strategy.selector.as_deref().unwrap_or_default(),
                    self.resolve_content(strategy.input_value.as_deref().unwrap_or_default(), state),
                );
                adapter.fill(selector, &value).await?;
                if strategy.submit_after {
                    adapter.press_shortcut("enter").await?;
                }
            }
            StrategyKind::RoleType => {
                adapter
                    .click_role(
                        strategy.accessibility_role.as_deref().unwrap_or_default(),
                        strategy.accessibility_name.as_deref(),
                    )
                    .await?;
                let value =
                    self.resolve_content(strategy.input_value.as_deref().unwrap_or_default(), state);
                adapter.type_text(&value, strategy.submit_after).await?;
            }
            StrategyKind::LocateType => {
                let (x, y) = self.locate(goal, strategy, round).await?;
                adapter.click(x, y).await?;
                let value =
                    self.resolve_content(strategy.input_value.as_deref().unwrap_or_default(), state);
                adapter.type_text(&value, strategy.submit_after).await?;
            }
            StrategyKind::TypeFocused => {
                let value =
                    self.resolve_content(strategy.input_value.as_deref().unwrap_or_default(), state);
                adapter.type_text(&value, strategy.submit_after).await?;
            }
            StrategyKind::ClickSelector => {
                adapter
                    .click_selector(strategy.selector.as_deref().unwrap_or_default())
                    .await?;
            }
            StrategyKind::ClickText => {
                adapter
                    .click_text(strategy.text_match.as_deref().unwrap_or_default())
                    .await?;
            }
            StrategyKind::ClickRole => {
                let role = strategy
                    .role
                    .as_deref()
                    .or(strategy.accessibility_role.as_deref())
                    .unwrap_or_default();
                adapter
                    .click_role(role, strategy.accessibility_name.as_deref())
                    .await?;
            }
            StrategyKind::ClickVisual => {
                let (x, y) = self.locate(goal, strategy, round).await?;
                adapter.click(x, y).await?;
            }
            StrategyKind::ClickCoordinates => {
                let (x, y) = strategy.coordinates.ok_or_else(|| {
                    ExecutorError::StrategyFailed {
                        strategy: strategy.name.clone(),
                        reason: "coordinates strategy without coordinates".into(),
                    }
                })?;
                adapter.click(x, y).await?;
            }
        }
        Ok(())
    }

    /// Find an element via the oracle, diversifying the description across
    /// retry rounds.
    async fn locate(
        &self,
        goal: &GoalStep,
        strategy: &Strategy,
        round: u32,
    ) -> Result<(i32, i32)> {
        let oracle = self.oracle.as_ref().ok_or(ExecutorError::OracleUnavailable)?;
        let adapter = self.adapter_for(goal.platform)?;

        let base = strategy.visual_description.as_deref().unwrap_or_default();
        let variant = RETRY_VARIANTS[(round as usize).min(RETRY_VARIANTS.len() - 1)];
        let description = format!("{base}{variant}");

        let screenshot = adapter.screenshot().await?;
        if !self
            .limiter
            .acquire(Duration::from_millis(self.config.oracle_wait_ms))
            .await
        {
            return Err(ExecutorError::RateLimited {
                name: "oracle".into(),
            });
        }
        let (x, y) = oracle
            .locate_element(&description, &screenshot)
            .await?
            .ok_or_else(|| ExecutorError::StrategyFailed {
                strategy: strategy.name.clone(),
                reason: format!("no element matching: {description}"),
            })?;
        Ok((
            x.clamp(0, self.config.screen_width - 1),
            y.clamp(0, self.config.screen_height - 1),
        ))
    }

    /// Extract fields and merge them into the run state.  Later fields
    /// overwrite earlier ones of the same name.
    async fn run_extraction(&self, goal: &GoalStep, state: &mut RunState) -> Result<()> {
        let oracle = self.oracle.as_ref().ok_or(ExecutorError::OracleUnavailable)?;
        let adapter = self.adapter_for(goal.platform)?;
        let page = adapter.page_text().await?;

        if !self
            .limiter
            .acquire(Duration::from_millis(self.config.oracle_wait_ms))
            .await
        {
            return Err(ExecutorError::RateLimited {
                name: "oracle".into(),
            });
        }
        let fields = oracle
            .extract_fields(goal.extraction_schema.as_ref(), &page)
            .await?;

        info!(goal_id = %goal.id, fields = fields.len(), "extraction complete");
        state.last_extracted = fields.clone();
        state.extracted.extend(fields);
        Ok(())
    }

    /// Fill a content template from the run's extraction store.
    ///
    /// `{{extracted_content}}` expands to a formatted dump of the most
    /// recent extraction (or the whole store when none is recent).
    fn resolve_content(&self, template: &str, state: &RunState) -> String {
        let mut values = state.extracted.clone();
        let source = if state.last_extracted.is_empty() {
            &state.extracted
        } else {
            &state.last_extracted
        };
        let dump = source
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n");
        values.insert("extracted_content".to_string(), dump);
        GoalWorkflow::fill_template(template, &values)
    }

    // -- adaptive fallback ------------------------------------------------

    /// One-action-at-a-time oracle loop, bounded by configuration.  Every
    /// proposed action passes the same safety guard as strategies do.
    async fn agent_fallback(
        &self,
        goal: &GoalStep,
        state: &mut RunState,
        start_url: Option<&str>,
    ) -> Result<bool> {
        let Some(oracle) = self.oracle.clone() else {
            return Ok(false);
        };
        let adapter = self.adapter_for(goal.platform)?;
        let prompt = goal
            .agent_goal_prompt
            .clone()
            .unwrap_or_else(|| goal.description.clone());

        info!(goal_id = %goal.id, "entering adaptive fallback");

        for iteration in 0..self.config.agent_max_iterations {
            let page = adapter.page_text().await?;
            let screenshot = adapter.screenshot().await?;

            if !self
                .limiter
                .acquire(Duration::from_millis(self.config.oracle_wait_ms))
                .await
            {
                return Err(ExecutorError::RateLimited {
                    name: "oracle".into(),
                });
            }
            let action = oracle.next_action(&prompt, &page, &screenshot).await?;
            debug!(goal_id = %goal.id, iteration, action = ?action, "fallback action");

            match action {
                OracleAction::Done => break,
                OracleAction::Click { x, y } => adapter.click(x, y).await?,
                OracleAction::Type { text, submit } => {
                    let check = self.guard.check_typed_text(&goal.app_name, &text);
                    if !check.allowed {
                        warn!(
                            goal_id = %goal.id,
                            reason = check.reason.as_deref().unwrap_or(""),
                            "fallback action refused, asking for another"
                        );
                        continue;
                    }
                    adapter.type_text(&text, submit).await?;
                }
                OracleAction::Scroll { dy } => adapter.scroll(dy).await?,
                OracleAction::Shortcut { keys } => {
                    let check = self.guard.check_shortcut(&keys);
                    if !check.allowed {
                        warn!(
                            goal_id = %goal.id,
                            reason = check.reason.as_deref().unwrap_or(""),
                            "fallback action refused, asking for another"
                        );
                        continue;
                    }
                    adapter.press_shortcut(&keys).await?;
                }
            }

            tokio::time::sleep(Duration::from_millis(goal.settle_delay_ms)).await;
            if self
                .criteria_met(goal, &goal.success_criteria, state, start_url)
                .await?
            {
                return Ok(true);
            }
        }

        // One last check; the final action may have landed after Done.
        self.criteria_met(goal, &goal.success_criteria, state, start_url)
            .await
    }
}

fn is_paste_strategy(strategy: &Strategy) -> bool {
    strategy
        .shortcut_keys
        .as_deref()
        .is_some_and(|k| k.to_lowercase().ends_with("+v"))
}

/// The `url_contains` target after parameter fill, or `None` when it is
/// empty or still holds an unresolved placeholder.
fn effective_url_target(criteria: &SuccessCriteria, goal: &GoalStep) -> Option<String> {
    let raw = criteria.url_contains.as_deref()?;
    let filled = reenact_core::template::substitute(raw, &goal.parameters);
    if filled.trim().is_empty() || reenact_core::template::has_placeholder(&filled) {
        return None;
    }
    Some(filled)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
