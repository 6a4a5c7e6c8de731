//! Goal inference engine.
//!
//! Converts a recorded, intent-classified trace into goal-oriented steps by
//! looking at *outcomes*, not just actions: what URL a click led to, what
//! data was copied, which app became active.  Each goal carries success
//! criteria and several ranked strategies so replay can survive UI drift.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use reenact_core::{
    ActionTrace, ExtractionSchema, ExtractionSchemas, GoalStep, GoalType, GoalWorkflow,
    NavigationIntent, ParameterCandidate, Platform, StepIntent, Strategy, SuccessCriteria,
    TraceStep, VoiceContext,
};
use tracing::{debug, info, warn};

use crate::analysis::{
    self, SequenceOracle, StepAnnotation, StepOutcome, analyze_outcome, fold_merged_steps,
    heuristic_annotations,
};
use crate::consolidate;
use crate::error::{CompilerError, Result};

/// Parameter candidates below this confidence are ignored for templating.
const PARAMETER_CONFIDENCE_FLOOR: f64 = 0.5;

// ---------------------------------------------------------------------------
// Parameter templating
// ---------------------------------------------------------------------------

/// Replaces detected parameter values in typed text with `{{name}}`
/// placeholders, longest value first so a short value never clobbers part
/// of a longer one.
struct TemplateMaker {
    /// (lowercased value, parameter name), sorted by descending value length.
    by_value: Vec<(String, String)>,
}

impl TemplateMaker {
    fn new(candidates: &[ParameterCandidate]) -> Self {
        let mut by_value: Vec<(String, String)> = candidates
            .iter()
            .filter(|c| c.confidence >= PARAMETER_CONFIDENCE_FLOOR)
            .map(|c| (c.value.to_lowercase(), c.suggested_name.clone()))
            .collect();
        by_value.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { by_value }
    }

    /// Build a template and the example values it was built from.
    ///
    /// Matching is case-insensitive; the original-case text is preserved as
    /// the example value.  Only the first occurrence of each value is
    /// replaced.
    fn templatize(&self, text: &str) -> (String, BTreeMap<String, String>) {
        let mut template = text.to_string();
        let mut params = BTreeMap::new();

        for (value_lower, name) in &self.by_value {
            let template_lower = template.to_lowercase();
            if let Some(idx) = template_lower.find(value_lower.as_str()) {
                let end = idx + value_lower.len();
                if !template.is_char_boundary(idx) || !template.is_char_boundary(end) {
                    continue;
                }
                let original = template[idx..end].to_string();
                let placeholder = format!("{{{{{name}}}}}");
                template.replace_range(idx..end, &placeholder);
                debug!(value = %original, placeholder = %placeholder, "templatized");
                params.insert(name.clone(), original);
            }
        }

        (template, params)
    }

    /// Example value recorded for a parameter name, if any.
    fn value_for(&self, name: &str) -> Option<&str> {
        self.by_value
            .iter()
            .find(|(_, n)| n == name)
            .map(|(v, _)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Text heuristics
// ---------------------------------------------------------------------------

static LABEL_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\s]+\s*:\s*$").expect("label regex"));
static LABEL_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\s]+\s*[-|=:]\s*$").expect("separator regex"));

/// Whether typed text is a structural label (typed literally, never
/// templated): ends with a colon, or is short text plus a separator.
fn is_label_text(text: &str) -> bool {
    let stripped = text.trim();
    if stripped.len() <= 1 {
        return false;
    }
    stripped.ends_with(':')
        || LABEL_COLON.is_match(stripped)
        || (stripped.len() < 30 && LABEL_SEPARATOR.is_match(stripped))
}

/// Path fragment that confirms a search submitted on a recognized engine.
fn search_path_hint(url: Option<&str>) -> Option<&'static str> {
    let url = url?;
    if url.contains("google.") {
        Some("/search")
    } else if url.contains("bing.") {
        Some("/search")
    } else if url.contains("duckduckgo.") {
        Some("q=")
    } else {
        None
    }
}

/// URL shapes that mark list/search pages.
const LIST_URL_PATTERNS: &[&str] = &[
    "/search",
    "/results",
    "/restaurants",
    "/hotels",
    "/products",
    "/listings",
    "/places",
    "/bars",
    "/cafes",
    "/shops",
    "q=",
    "query=",
    "search?",
    "?s=",
    "/collection",
    "/category",
];

/// Ordinal of this click among the consecutive clicks preceding it.
fn click_ordinal(steps: &[TraceStep], index: usize) -> &'static str {
    const ORDINALS: [&str; 5] = ["first", "second", "third", "fourth", "fifth"];
    let count = steps[..index]
        .iter()
        .rev()
        .take_while(|s| s.intent == StepIntent::Select)
        .count();
    ORDINALS[count.min(4)]
}

/// Is this click a listing→detail transition?  True when the click starts
/// on a list-shaped URL or is followed within two steps by an extraction.
fn is_listing_click(step: &TraceStep, index: usize, steps: &[TraceStep]) -> bool {
    let url = step.url_before.as_deref().unwrap_or("").to_lowercase();
    let on_list_page = LIST_URL_PATTERNS.iter().any(|p| url.contains(p));

    let followed_by_extract = steps
        .iter()
        .skip(index + 1)
        .take(2)
        .any(|next| next.intent == StepIntent::Extract || next.has_shortcut("copy"));

    on_list_page || followed_by_extract
}

/// Did this navigation follow a search whose query held a parameterized
/// site filter?  If so, the success criterion stays dynamic.
fn is_from_site_filtered_search(
    steps: &[TraceStep],
    index: usize,
    templates: &TemplateMaker,
) -> bool {
    let Some(site_value) = templates.value_for("site_filter") else {
        return false;
    };
    steps[..index]
        .iter()
        .rev()
        .find(|s| s.intent == StepIntent::Search)
        .is_some_and(|search| {
            search
                .combined_typed_text()
                .to_lowercase()
                .contains(site_value)
        })
}

// ---------------------------------------------------------------------------
// Inferrer
// ---------------------------------------------------------------------------

/// Infers high-level goals from a recorded trace.
///
/// Pipeline: annotate the whole sequence (oracle or heuristic), fold merged
/// steps, build one goal per remaining step from its outcome, then run the
/// consolidation fold to drop noise.
#[derive(Default)]
pub struct GoalInferrer {
    oracle: Option<Arc<dyn SequenceOracle>>,
}

impl GoalInferrer {
    pub fn new() -> Self {
        Self { oracle: None }
    }

    /// Use a reasoning oracle for sequence annotation, with the heuristic
    /// pass as fallback.
    pub fn with_oracle(oracle: Arc<dyn SequenceOracle>) -> Self {
        Self {
            oracle: Some(oracle),
        }
    }

    /// Compile a whole trace into a persisted workflow document.
    pub async fn compile(
        &self,
        trace: &ActionTrace,
        schemas: &ExtractionSchemas,
        name: &str,
    ) -> Result<GoalWorkflow> {
        if trace.steps.is_empty() {
            return Err(CompilerError::EmptyTrace {
                session_id: trace.session_id.clone(),
            });
        }

        let goals = self
            .infer(
                &trace.steps,
                trace.voice_context.as_ref(),
                schemas,
                &trace.parameter_candidates,
            )
            .await?;

        let mut workflow = GoalWorkflow::new(name, goals);
        workflow.created_from_session = Some(trace.session_id.clone());
        workflow.voice_analyzed = trace.voice_context.is_some();
        workflow.vision_enriched = !schemas.is_empty();

        for candidate in trace.confident_parameters(PARAMETER_CONFIDENCE_FLOOR) {
            workflow
                .parameters
                .insert(candidate.suggested_name.clone(), candidate.value.clone());
        }
        for schema in schemas.values() {
            for (field, spec) in schema {
                workflow
                    .extraction_schema
                    .insert(field.clone(), spec.clone());
            }
        }

        info!(
            workflow_id = %workflow.id,
            steps = workflow.steps.len(),
            parameters = workflow.parameters.len(),
            "trace compiled"
        );
        Ok(workflow)
    }

    /// Convert classified steps into goal-oriented steps.
    pub async fn infer(
        &self,
        steps: &[TraceStep],
        voice: Option<&VoiceContext>,
        schemas: &ExtractionSchemas,
        candidates: &[ParameterCandidate],
    ) -> Result<Vec<GoalStep>> {
        let templates = TemplateMaker::new(candidates);

        // Pass 1: annotate the whole sequence.
        let annotations = match &self.oracle {
            Some(oracle) => match oracle.annotate(steps, voice).await {
                Ok(annotations) => annotations,
                Err(e) => {
                    warn!(error = %e, "sequence oracle failed, using heuristic analysis");
                    heuristic_annotations(steps, voice)
                }
            },
            None => heuristic_annotations(steps, voice),
        };

        // Pass 2: fold merged steps into their targets.
        let folded = fold_merged_steps(steps, &annotations);

        let mut goals = Vec::new();
        for (i, step) in folded.iter().enumerate() {
            let next_steps = &folded[i + 1..];
            let outcome = analyze_outcome(step, next_steps);
            let annotation = annotations.get(&step.id).cloned().unwrap_or_default();

            // Shortcuts bundled into an app-switch event happened in the
            // previous app; split them out first.
            if step.boundary_reason == reenact_core::BoundaryReason::AppSwitch
                && (step.has_shortcut("paste") || step.has_shortcut("save"))
            {
                let prev_app = i.checked_sub(1).map(|p| folded[p].app_name.clone());
                goals.extend(bundled_shortcut_goals(step, prev_app.as_deref()));
            }

            if let Some(goal) =
                build_goal(step, i, &folded, &outcome, &annotation, schemas, &templates)
            {
                info!(
                    step = step.step_number,
                    goal_type = ?goal.goal_type,
                    description = %goal.description,
                    "goal inferred"
                );
                goals.push(goal);
            }
        }

        let before = goals.len();
        let goals = consolidate::consolidate(goals);
        if goals.len() < before {
            info!(before, after = goals.len(), "goals consolidated");
        }

        Ok(goals)
    }
}

// ---------------------------------------------------------------------------
// Per-goal-type builders
// ---------------------------------------------------------------------------

fn build_goal(
    step: &TraceStep,
    index: usize,
    steps: &[TraceStep],
    outcome: &StepOutcome,
    annotation: &StepAnnotation,
    schemas: &ExtractionSchemas,
    templates: &TemplateMaker,
) -> Option<GoalStep> {
    match step.intent {
        StepIntent::Search if step.has_typing() => Some(search_goal(step, templates)),
        StepIntent::Select if outcome.domain_changed => Some(navigation_goal(
            step, index, steps, outcome, annotation, templates,
        )),
        StepIntent::Select => Some(select_goal(step, index, steps, outcome)),
        StepIntent::Extract => Some(extract_goal(step, schemas)),
        _ if step.has_shortcut("copy") => Some(extract_goal(step, schemas)),
        StepIntent::Write => Some(write_goal(step, templates)),
        StepIntent::Save => Some(save_goal(step)),
        StepIntent::LaunchApp => Some(launch_goal(step, outcome)),
        _ if outcome.app_changed => Some(launch_goal(step, outcome)),
        _ if !step.clicked_elements.is_empty() => Some(generic_click_goal(step)),
        _ => None,
    }
}

fn search_goal(step: &TraceStep, templates: &TemplateMaker) -> GoalStep {
    let original_query = step.combined_typed_text();
    let (template, mut params) = templates.templatize(&original_query);
    if params.is_empty() {
        params.insert("query".to_string(), original_query.clone());
    }

    let strategies = vec![
        Strategy {
            name: "engine_search".into(),
            priority: 100,
            selector: Some("textarea[name=\"q\"], input[name=\"q\"]".into()),
            input_value: Some(template.clone()),
            submit_after: true,
            requires_url_pattern: Some("google.".into()),
            ..Strategy::default()
        },
        Strategy {
            name: "search_input".into(),
            priority: 80,
            selector: Some("input[type=\"search\"], [role=\"searchbox\"], [role=\"combobox\"]".into()),
            input_value: Some(template.clone()),
            submit_after: true,
            ..Strategy::default()
        },
        Strategy {
            name: "oracle_find_search".into(),
            priority: 50,
            visual_description: Some("search input box or search field".into()),
            input_value: Some(template.clone()),
            submit_after: true,
            ..Strategy::default()
        },
    ];

    let mut goal = GoalStep::new(
        format!("goal_{}", step.id),
        step.step_number,
        GoalType::Search,
        format!("Search for: {}", truncate(&template, 50)),
        step.platform,
        &step.app_name,
    );
    goal.source_url_pattern = analysis::url_to_pattern(step.url_before.as_deref());
    goal.success_criteria = SuccessCriteria {
        url_changed: true,
        url_contains: search_path_hint(step.url_before.as_deref()).map(str::to_string),
        ..SuccessCriteria::default()
    };
    goal.strategies = strategies;
    goal.parameters = params;
    goal.template = Some(template.clone());
    goal.fallback_to_agent = true;
    goal.agent_goal_prompt = Some(format!("Find the search box and search for: {template}"));
    goal
}

fn navigation_goal(
    step: &TraceStep,
    index: usize,
    steps: &[TraceStep],
    outcome: &StepOutcome,
    annotation: &StepAnnotation,
    templates: &TemplateMaker,
) -> GoalStep {
    let intent = annotation
        .navigation_intent
        .unwrap_or(NavigationIntent::AnyResult);
    let target_site = annotation.target_site.clone();
    let target_domain = outcome.new_domain.clone();
    let site_filtered = is_from_site_filtered_search(steps, index, templates);

    let mut strategies = Vec::new();
    if intent == NavigationIntent::SpecificSite && (target_site.is_some() || site_filtered) {
        let target = target_site
            .clone()
            .or_else(|| target_domain.clone())
            .unwrap_or_default();
        strategies.push(Strategy {
            name: "oracle_target_domain".into(),
            priority: 80,
            visual_description: Some(format!(
                "clickable link or search result that leads to {target}"
            )),
            ..Strategy::default()
        });
    } else {
        strategies.push(Strategy {
            name: "oracle_generic_result".into(),
            priority: 80,
            visual_description: Some("clickable search result link in the main content area".into()),
            ..Strategy::default()
        });
    }

    let ordinal = click_ordinal(steps, index);
    strategies.push(Strategy {
        name: "oracle_ordinal".into(),
        priority: 60,
        visual_description: Some(format!("{ordinal} search result link in the main content area")),
        ..Strategy::default()
    });
    strategies.push(Strategy {
        name: "oracle_any_result".into(),
        priority: 40,
        visual_description: Some("any clickable search result link, not in header or sidebar".into()),
        ..Strategy::default()
    });
    if let Some(coords) = first_coordinates(step) {
        strategies.push(Strategy {
            name: "coordinates".into(),
            priority: 10,
            coordinates: Some(coords),
            ..Strategy::default()
        });
    }

    let mut parameters = BTreeMap::new();
    let (criteria, description, prompt) = match intent {
        NavigationIntent::SpecificSite if site_filtered => {
            if let Some(site) = &target_site {
                parameters.insert("site_filter".to_string(), site.clone());
            }
            (
                SuccessCriteria {
                    url_contains: Some("{{site_filter}}".into()),
                    url_changed: true,
                    ..SuccessCriteria::default()
                },
                "Navigate to {{site_filter}} result".to_string(),
                "Click on a search result from the specified site".to_string(),
            )
        }
        NavigationIntent::SpecificSite => {
            let target = target_site.clone().or_else(|| target_domain.clone());
            (
                SuccessCriteria {
                    url_contains: target.clone(),
                    url_changed: true,
                    ..SuccessCriteria::default()
                },
                format!(
                    "Navigate to {} result",
                    target.as_deref().unwrap_or("search")
                ),
                format!(
                    "Click on a search result from {}",
                    target.as_deref().unwrap_or("the target site")
                ),
            )
        }
        // Any/first result: only the URL needs to change, no domain
        // constraint.
        NavigationIntent::AnyResult | NavigationIntent::FirstResult => (
            SuccessCriteria {
                url_changed: true,
                ..SuccessCriteria::default()
            },
            "Navigate to a search result".to_string(),
            "Click on any relevant search result link".to_string(),
        ),
    };

    let mut goal = GoalStep::new(
        format!("goal_{}", step.id),
        step.step_number,
        GoalType::Navigate,
        description,
        step.platform,
        &step.app_name,
    );
    goal.source_url_pattern = analysis::url_to_pattern(step.url_before.as_deref());
    goal.success_criteria = criteria;
    goal.strategies = strategies;
    goal.parameters = parameters;
    goal.fallback_to_agent = true;
    goal.agent_goal_prompt = Some(prompt);
    goal.navigation_intent = Some(intent);
    goal
}

fn select_goal(
    step: &TraceStep,
    index: usize,
    steps: &[TraceStep],
    outcome: &StepOutcome,
) -> GoalStep {
    let listing_click = is_listing_click(step, index, steps);

    let mut strategies = Vec::new();
    if listing_click {
        strategies.push(Strategy {
            name: "oracle_click_listing".into(),
            priority: 80,
            visual_description: Some(
                "clickable listing card, item, or result that leads to a detail page; \
                 scroll to find listings if needed"
                    .into(),
            ),
            ..Strategy::default()
        });
    }
    let ordinal = click_ordinal(steps, index);
    strategies.push(Strategy {
        name: "oracle_visual".into(),
        priority: 50,
        visual_description: Some(format!("{ordinal} clickable element in the content area")),
        ..Strategy::default()
    });
    if let Some(coords) = first_coordinates(step) {
        strategies.push(Strategy {
            name: "coordinates".into(),
            priority: 10,
            coordinates: Some(coords),
            ..Strategy::default()
        });
    }

    let mut goal = GoalStep::new(
        format!("goal_{}", step.id),
        step.step_number,
        GoalType::Select,
        String::new(),
        step.platform,
        &step.app_name,
    );
    goal.source_url_pattern = analysis::url_to_pattern(step.url_before.as_deref());
    goal.strategies = strategies;
    goal.fallback_to_agent = true;

    if listing_click && outcome.url_changed {
        // A detail page must actually load; waiting out the clock is not
        // success here.
        goal.description = "Click on a listing to view details".into();
        goal.success_criteria = SuccessCriteria {
            url_changed: true,
            timeout_success: false,
            ..SuccessCriteria::default()
        };
        goal.expects_detail_page = true;
        goal.agent_goal_prompt = Some(
            "Find and click on a listing card or item to open its detail page; \
             scroll down if needed"
                .into(),
        );
    } else {
        // The click may have no externally observable effect (a toggle),
        // so a timeout counts as success.
        goal.description = format!("Click element in {}", step.app_name);
        goal.success_criteria = SuccessCriteria {
            timeout_success: true,
            url_changed: outcome.url_changed,
            ..SuccessCriteria::default()
        };
        goal.agent_goal_prompt = Some("Click on the interactive element".into());
    }
    goal
}

fn extract_goal(step: &TraceStep, schemas: &ExtractionSchemas) -> GoalStep {
    let schema: Option<ExtractionSchema> = schemas
        .get(&step.id)
        .cloned()
        .or_else(|| schemas.values().next().cloned());

    let mut goal = GoalStep::new(
        format!("goal_{}", step.id),
        step.step_number,
        GoalType::Extract,
        "Extract data from current page",
        step.platform,
        &step.app_name,
    );
    goal.source_url_pattern = analysis::url_to_pattern(step.url_before.as_deref());
    goal.success_criteria = SuccessCriteria {
        min_extracted_count: 1,
        ..SuccessCriteria::default()
    };
    goal.strategies = vec![Strategy {
        name: "oracle_extract".into(),
        priority: 100,
        visual_description: Some("structured data visible on the page".into()),
        ..Strategy::default()
    }];
    goal.extraction_schema = schema;
    goal.fallback_to_agent = false;
    goal
}

fn write_goal(step: &TraceStep, templates: &TemplateMaker) -> GoalStep {
    if step.has_shortcut("paste") {
        return paste_goal(step, None);
    }

    let original_text = step.combined_typed_text();

    if is_label_text(&original_text) {
        let mut goal = GoalStep::new(
            format!("goal_{}", step.id),
            step.step_number,
            GoalType::Write,
            format!("Type label: {}", truncate(&original_text, 30)),
            step.platform,
            &step.app_name,
        );
        goal.success_criteria = SuccessCriteria {
            timeout_success: true,
            ..SuccessCriteria::default()
        };
        // Labels are typed literally, never templated.
        goal.strategies = vec![Strategy {
            name: "focused_type".into(),
            priority: 100,
            input_value: Some(original_text),
            ..Strategy::default()
        }];
        goal.fallback_to_agent = false;
        return goal;
    }

    let (template, mut params) = templates.templatize(&original_text);
    if params.is_empty() {
        params.insert("text".to_string(), original_text.clone());
    }

    let mut strategies = Vec::new();
    match step.platform {
        Platform::Desktop => {
            if let Some(elem) = step.clicked_elements.first() {
                if elem.accessibility_role.is_some() {
                    strategies.push(Strategy {
                        name: "accessibility_type".into(),
                        priority: 90,
                        accessibility_role: elem.accessibility_role.clone(),
                        accessibility_name: elem.accessibility_name.clone(),
                        input_value: Some(template.clone()),
                        ..Strategy::default()
                    });
                }
            }
            strategies.push(Strategy {
                name: "focused_type".into(),
                priority: 70,
                input_value: Some(template.clone()),
                ..Strategy::default()
            });
            strategies.push(Strategy {
                name: "oracle_find_input".into(),
                priority: 50,
                visual_description: Some("text input field or text area".into()),
                input_value: Some(template.clone()),
                ..Strategy::default()
            });
        }
        Platform::Browser => {
            if let Some(selector) = step
                .clicked_elements
                .first()
                .and_then(|e| e.selector.clone())
            {
                strategies.push(Strategy {
                    name: "selector_type".into(),
                    priority: 100,
                    selector: Some(selector),
                    input_value: Some(template.clone()),
                    ..Strategy::default()
                });
            }
            strategies.push(Strategy {
                name: "focused_type".into(),
                priority: 70,
                input_value: Some(template.clone()),
                ..Strategy::default()
            });
        }
    }

    let mut goal = GoalStep::new(
        format!("goal_{}", step.id),
        step.step_number,
        GoalType::Write,
        format!("Type: {}", truncate(&template, 30)),
        step.platform,
        &step.app_name,
    );
    goal.success_criteria = SuccessCriteria {
        timeout_success: true,
        ..SuccessCriteria::default()
    };
    goal.strategies = strategies;
    goal.parameters = params;
    goal.template = Some(template.clone());
    goal.fallback_to_agent = true;
    goal.agent_goal_prompt = Some(format!(
        "Find a text input and type: {}",
        truncate(&template, 50)
    ));
    goal
}

fn paste_goal(step: &TraceStep, app_override: Option<&str>) -> GoalStep {
    let app = app_override.unwrap_or(&step.app_name);
    let mut goal = GoalStep::new(
        format!("goal_{}_paste", step.id),
        step.step_number,
        GoalType::Shortcut,
        format!("Paste extracted content in {app}"),
        Platform::Desktop,
        app,
    );
    goal.success_criteria = SuccessCriteria {
        timeout_success: true,
        ..SuccessCriteria::default()
    };
    goal.strategies = vec![Strategy {
        name: "paste_content".into(),
        priority: 100,
        shortcut_keys: Some("command+v".into()),
        ..Strategy::default()
    }];
    // Resolved from the accumulated extraction store at execution time.
    goal.template = Some("{{extracted_content}}".into());
    goal.fallback_to_agent = false;
    goal
}

fn save_goal(step: &TraceStep) -> GoalStep {
    save_goal_for_app(step, &step.app_name)
}

fn save_goal_for_app(step: &TraceStep, app: &str) -> GoalStep {
    let mut goal = GoalStep::new(
        format!("goal_{}_save", step.id),
        step.step_number,
        GoalType::Save,
        format!("Save document in {app}"),
        Platform::Desktop,
        app,
    );
    goal.success_criteria = SuccessCriteria {
        timeout_success: true,
        ..SuccessCriteria::default()
    };
    goal.strategies = vec![Strategy {
        name: "save_shortcut".into(),
        priority: 100,
        shortcut_keys: Some("command+s".into()),
        ..Strategy::default()
    }];
    goal.fallback_to_agent = false;
    goal
}

fn launch_goal(step: &TraceStep, outcome: &StepOutcome) -> GoalStep {
    let target_app = outcome
        .new_app
        .clone()
        .unwrap_or_else(|| step.app_name.clone());

    let mut goal = GoalStep::new(
        format!("goal_{}", step.id),
        step.step_number,
        GoalType::Launch,
        format!("Switch to {target_app}"),
        Platform::Desktop,
        &target_app,
    );
    goal.success_criteria = SuccessCriteria {
        app_active: Some(target_app),
        ..SuccessCriteria::default()
    };
    goal.strategies = vec![
        Strategy::named("activate_app", 100),
        Strategy::named("launch_app", 50),
    ];
    goal.fallback_to_agent = false;
    goal
}

fn generic_click_goal(step: &TraceStep) -> GoalStep {
    let mut strategies = Vec::new();
    if let Some(elem) = step.clicked_elements.first() {
        if let Some(selector) = &elem.selector {
            strategies.push(Strategy {
                name: "selector_click".into(),
                priority: 100,
                selector: Some(selector.clone()),
                ..Strategy::default()
            });
        }
        if let Some(text) = &elem.text {
            strategies.push(Strategy {
                name: "text_click".into(),
                priority: 80,
                text_match: Some(truncate(text, 50)),
                ..Strategy::default()
            });
        }
        if let Some(coords) = elem.coordinates {
            strategies.push(Strategy {
                name: "coordinates".into(),
                priority: 20,
                coordinates: Some(coords),
                ..Strategy::default()
            });
        }
    }
    strategies.push(Strategy {
        name: "oracle_visual".into(),
        priority: 50,
        visual_description: Some("interactive element to click".into()),
        ..Strategy::default()
    });

    let mut goal = GoalStep::new(
        format!("goal_{}", step.id),
        step.step_number,
        GoalType::Select,
        format!("Click in {}", step.app_name),
        step.platform,
        &step.app_name,
    );
    goal.success_criteria = SuccessCriteria {
        timeout_success: true,
        ..SuccessCriteria::default()
    };
    goal.strategies = strategies;
    goal.fallback_to_agent = true;
    goal.agent_goal_prompt = Some("Click on the element".into());
    goal
}

/// Paste/save shortcuts recorded as part of an app-switch event happened in
/// the previous app; emit separate goals attributed there.
fn bundled_shortcut_goals(step: &TraceStep, prev_app: Option<&str>) -> Vec<GoalStep> {
    let mut goals = Vec::new();
    let app = prev_app.unwrap_or(&step.app_name);

    if step.has_shortcut("paste") {
        info!(app = %app, "bundled paste goal split out");
        goals.push(paste_goal(step, Some(app)));
    }
    if step.has_shortcut("save") {
        info!(app = %app, "bundled save goal split out");
        goals.push(save_goal_for_app(step, app));
    }
    goals
}

fn first_coordinates(step: &TraceStep) -> Option<(i32, i32)> {
    step.clicked_elements.first().and_then(|e| e.coordinates)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use reenact_core::{BoundaryReason, ElementRef, FieldSpec, ParameterSource};

    fn trace_step(id: &str, number: u32, intent: StepIntent) -> TraceStep {
        TraceStep {
            id: id.into(),
            step_number: number,
            start_ts: number as f64 * 10.0,
            end_ts: number as f64 * 10.0 + 2.0,
            intent,
            confidence: 0.8,
            boundary_reason: BoundaryReason::Select,
            platform: Platform::Browser,
            app_name: "Chrome".into(),
            window_title: None,
            url_before: Some("https://www.google.com".into()),
            url_after: None,
            typed_values: vec![],
            clicked_elements: vec![],
            keyboard_shortcuts: vec![],
            voice_transcript: None,
        }
    }

    fn candidate(value: &str, name: &str, confidence: f64) -> ParameterCandidate {
        ParameterCandidate {
            value: value.into(),
            suggested_name: name.into(),
            confidence,
            source: ParameterSource::TypedText,
        }
    }

    #[test]
    fn templatize_replaces_longest_value_first() {
        let maker = TemplateMaker::new(&[
            candidate("delhi", "location", 0.9),
            candidate("best bars in delhi", "query", 0.9),
        ]);
        let (template, params) = maker.templatize("best bars in delhi zomato");
        // The long value wins; "delhi" never clobbers part of it.
        assert_eq!(template, "{{query}} zomato");
        assert_eq!(params["query"], "best bars in delhi");
        assert!(!params.contains_key("location"));
    }

    #[test]
    fn templatize_preserves_original_case() {
        let maker = TemplateMaker::new(&[candidate("delhi", "location", 0.9)]);
        let (template, params) = maker.templatize("Best Bars In Delhi");
        assert_eq!(template, "Best Bars In {{location}}");
        assert_eq!(params["location"], "Delhi");
    }

    #[test]
    fn templatize_ignores_low_confidence_candidates() {
        let maker = TemplateMaker::new(&[candidate("delhi", "location", 0.3)]);
        let (template, params) = maker.templatize("bars in delhi");
        assert_eq!(template, "bars in delhi");
        assert!(params.is_empty());
    }

    #[test]
    fn label_text_detected() {
        assert!(is_label_text("Restaurant name:"));
        assert!(is_label_text("Rating: "));
        assert!(is_label_text("Address -"));
        assert!(!is_label_text("best bars in delhi"));
        assert!(!is_label_text(":"));
    }

    #[test]
    fn search_goal_carries_template_and_url_criteria() {
        let mut step = trace_step("s1", 1, StepIntent::Search);
        step.typed_values = vec!["best bars in delhi".into()];
        let maker = TemplateMaker::new(&[candidate("best bars in delhi", "query", 0.9)]);

        let goal = search_goal(&step, &maker);
        assert_eq!(goal.goal_type, GoalType::Search);
        assert_eq!(goal.template.as_deref(), Some("{{query}}"));
        assert!(goal.success_criteria.url_changed);
        assert_eq!(goal.success_criteria.url_contains.as_deref(), Some("/search"));

        let names: Vec<&str> = goal
            .ordered_strategies()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["engine_search", "search_input", "oracle_find_search"]);
        for strategy in &goal.strategies {
            assert_eq!(strategy.input_value.as_deref(), Some("{{query}}"));
        }
    }

    #[test]
    fn any_result_navigation_has_no_domain_constraint() {
        let mut step = trace_step("s2", 2, StepIntent::Select);
        step.clicked_elements = vec![ElementRef {
            coordinates: Some((300, 400)),
            ..ElementRef::default()
        }];
        let outcome = StepOutcome {
            url_changed: true,
            domain_changed: true,
            new_domain: Some("zomato.com".into()),
            new_url: Some("https://zomato.com/delhi".into()),
            ..StepOutcome::default()
        };
        let annotation = StepAnnotation {
            navigation_intent: Some(NavigationIntent::AnyResult),
            ..StepAnnotation::default()
        };
        let maker = TemplateMaker::new(&[]);
        let steps = vec![step.clone()];

        let goal = navigation_goal(&step, 0, &steps, &outcome, &annotation, &maker);
        assert_eq!(goal.goal_type, GoalType::Navigate);
        assert!(goal.success_criteria.url_changed);
        assert!(goal.success_criteria.url_contains.is_none());
        assert_eq!(goal.navigation_intent, Some(NavigationIntent::AnyResult));
        // Coordinates are always the lowest-priority fallback.
        let ordered = goal.ordered_strategies();
        assert_eq!(ordered.last().unwrap().name, "coordinates");
    }

    #[test]
    fn specific_site_navigation_requires_target_domain() {
        let step = trace_step("s2", 2, StepIntent::Select);
        let outcome = StepOutcome {
            url_changed: true,
            domain_changed: true,
            new_domain: Some("zomato.com".into()),
            ..StepOutcome::default()
        };
        let annotation = StepAnnotation {
            navigation_intent: Some(NavigationIntent::SpecificSite),
            target_site: Some("zomato".into()),
            ..StepAnnotation::default()
        };
        let maker = TemplateMaker::new(&[]);
        let steps = vec![step.clone()];

        let goal = navigation_goal(&step, 0, &steps, &outcome, &annotation, &maker);
        assert_eq!(goal.success_criteria.url_contains.as_deref(), Some("zomato"));
        assert_eq!(
            goal.navigation_intent,
            Some(NavigationIntent::SpecificSite)
        );
        assert_eq!(goal.ordered_strategies()[0].name, "oracle_target_domain");
    }

    #[test]
    fn site_filtered_navigation_uses_placeholder_criteria() {
        let mut search = trace_step("s1", 1, StepIntent::Search);
        search.typed_values = vec!["best bars in delhi zomato".into()];
        let click = trace_step("s2", 2, StepIntent::Select);
        let steps = vec![search, click.clone()];

        let outcome = StepOutcome {
            url_changed: true,
            domain_changed: true,
            new_domain: Some("zomato.com".into()),
            ..StepOutcome::default()
        };
        let annotation = StepAnnotation {
            navigation_intent: Some(NavigationIntent::SpecificSite),
            target_site: Some("zomato".into()),
            ..StepAnnotation::default()
        };
        let maker = TemplateMaker::new(&[candidate("zomato", "site_filter", 0.9)]);

        let goal = navigation_goal(&click, 1, &steps, &outcome, &annotation, &maker);
        assert_eq!(
            goal.success_criteria.url_contains.as_deref(),
            Some("{{site_filter}}")
        );
        assert_eq!(goal.parameters.get("site_filter").map(String::as_str), Some("zomato"));
    }

    #[test]
    fn listing_click_requires_navigation() {
        let mut click = trace_step("s1", 1, StepIntent::Select);
        click.url_before = Some("https://zomato.com/delhi/bars?q=best".into());
        let mut extract = trace_step("s2", 2, StepIntent::Extract);
        extract.keyboard_shortcuts = vec!["copy".into()];
        let steps = vec![click.clone(), extract];

        let outcome = StepOutcome {
            url_changed: true,
            ..StepOutcome::default()
        };
        let goal = select_goal(&click, 0, &steps, &outcome);
        assert!(goal.expects_detail_page);
        assert!(goal.success_criteria.url_changed);
        assert!(!goal.success_criteria.timeout_success);
        assert_eq!(goal.ordered_strategies()[0].name, "oracle_click_listing");
    }

    #[test]
    fn plain_click_accepts_timeout() {
        let mut click = trace_step("s1", 1, StepIntent::Select);
        click.url_before = Some("https://example.com/settings".into());
        let steps = vec![click.clone()];

        let goal = select_goal(&click, 0, &steps, &StepOutcome::default());
        assert!(!goal.expects_detail_page);
        assert!(goal.success_criteria.timeout_success);
    }

    #[test]
    fn extract_goal_requires_minimum_fields() {
        let step = trace_step("s1", 1, StepIntent::Extract);
        let schemas: ExtractionSchemas = BTreeMap::from([(
            "s1".to_string(),
            BTreeMap::from([("rating".to_string(), FieldSpec::default())]),
        )]);

        let goal = extract_goal(&step, &schemas);
        assert_eq!(goal.goal_type, GoalType::Extract);
        assert_eq!(goal.success_criteria.min_extracted_count, 1);
        assert!(!goal.fallback_to_agent);
        assert!(goal.extraction_schema.is_some());
        assert_eq!(goal.strategies.len(), 1);
    }

    #[test]
    fn label_write_is_literal() {
        let mut step = trace_step("s1", 1, StepIntent::Write);
        step.platform = Platform::Desktop;
        step.app_name = "Notes".into();
        step.typed_values = vec!["Restaurant name:".into()];
        let maker = TemplateMaker::new(&[candidate("restaurant", "subject", 0.9)]);

        let goal = write_goal(&step, &maker);
        assert!(goal.template.is_none());
        assert!(goal.parameters.is_empty());
        assert_eq!(
            goal.strategies[0].input_value.as_deref(),
            Some("Restaurant name:")
        );
        assert!(!goal.fallback_to_agent);
    }

    #[test]
    fn write_goal_templates_detected_parameters() {
        let mut step = trace_step("s1", 1, StepIntent::Write);
        step.platform = Platform::Desktop;
        step.app_name = "Notes".into();
        step.typed_values = vec!["notes about delhi".into()];
        let maker = TemplateMaker::new(&[candidate("delhi", "location", 0.9)]);

        let goal = write_goal(&step, &maker);
        assert_eq!(goal.template.as_deref(), Some("notes about {{location}}"));
        assert_eq!(goal.parameters["location"], "delhi");
    }

    #[test]
    fn paste_write_becomes_shortcut_goal() {
        let mut step = trace_step("s1", 1, StepIntent::Write);
        step.platform = Platform::Desktop;
        step.app_name = "Notes".into();
        step.keyboard_shortcuts = vec!["paste".into()];
        let maker = TemplateMaker::new(&[]);

        let goal = write_goal(&step, &maker);
        assert_eq!(goal.goal_type, GoalType::Shortcut);
        assert_eq!(goal.template.as_deref(), Some("{{extracted_content}}"));
        assert_eq!(
            goal.strategies[0].shortcut_keys.as_deref(),
            Some("command+v")
        );
    }

    #[test]
    fn bundled_shortcuts_attributed_to_previous_app() {
        let mut step = trace_step("s3", 3, StepIntent::LaunchApp);
        step.boundary_reason = BoundaryReason::AppSwitch;
        step.app_name = "Chrome".into();
        step.keyboard_shortcuts = vec!["paste".into(), "save".into()];

        let goals = bundled_shortcut_goals(&step, Some("Notes"));
        assert_eq!(goals.len(), 2);
        assert_eq!(goals[0].goal_type, GoalType::Shortcut);
        assert_eq!(goals[0].app_name, "Notes");
        assert_eq!(goals[1].goal_type, GoalType::Save);
        assert_eq!(goals[1].app_name, "Notes");
    }

    #[tokio::test]
    async fn infer_builds_goals_end_to_end() {
        // search → focus-click-free result click → extract → app switch with
        // bundled paste.
        let mut search = trace_step("s1", 1, StepIntent::Search);
        search.typed_values = vec!["best bars in delhi".into()];
        search.url_before = Some("https://www.google.com".into());

        let mut click = trace_step("s2", 2, StepIntent::Select);
        click.url_before = Some("https://www.google.com/search?q=best+bars".into());
        click.clicked_elements = vec![ElementRef {
            coordinates: Some((200, 300)),
            ..ElementRef::default()
        }];

        let mut landed = trace_step("s3", 3, StepIntent::Extract);
        landed.url_before = Some("https://zomato.com/delhi/bars".into());
        landed.keyboard_shortcuts = vec!["copy".into()];

        let mut switch = trace_step("s4", 4, StepIntent::LaunchApp);
        switch.platform = Platform::Desktop;
        switch.app_name = "Notes".into();
        switch.boundary_reason = BoundaryReason::AppSwitch;
        switch.keyboard_shortcuts = vec!["paste".into()];

        let steps = vec![search, click, landed, switch];
        let candidates = vec![candidate("best bars in delhi", "query", 0.9)];

        let inferrer = GoalInferrer::new();
        let goals = inferrer
            .infer(&steps, None, &BTreeMap::new(), &candidates)
            .await
            .unwrap();

        let types: Vec<GoalType> = goals.iter().map(|g| g.goal_type).collect();
        assert!(types.contains(&GoalType::Search));
        assert!(types.contains(&GoalType::Navigate));
        assert!(types.contains(&GoalType::Extract));
        assert!(types.contains(&GoalType::Shortcut));

        let search_goal = goals
            .iter()
            .find(|g| g.goal_type == GoalType::Search)
            .unwrap();
        assert_eq!(search_goal.template.as_deref(), Some("{{query}}"));

        // No site named anywhere: the navigate goal must not pin a domain.
        let nav_goal = goals
            .iter()
            .find(|g| g.goal_type == GoalType::Navigate)
            .unwrap();
        assert!(nav_goal.success_criteria.url_contains.is_none());
        assert_eq!(nav_goal.navigation_intent, Some(NavigationIntent::AnyResult));
    }

    #[tokio::test]
    async fn compile_builds_workflow_with_parameters() {
        let mut search = trace_step("s1", 1, StepIntent::Search);
        search.typed_values = vec!["sushi in tokyo".into()];

        let trace = ActionTrace {
            session_id: "session-9".into(),
            steps: vec![search],
            voice_context: None,
            parameter_candidates: vec![candidate("sushi in tokyo", "query", 0.9)],
        };

        let inferrer = GoalInferrer::new();
        let workflow = inferrer
            .compile(&trace, &BTreeMap::new(), "sushi-lookup")
            .await
            .unwrap();

        assert_eq!(workflow.name, "sushi-lookup");
        assert_eq!(workflow.created_from_session.as_deref(), Some("session-9"));
        assert_eq!(workflow.parameters["query"], "sushi in tokyo");
        assert!(!workflow.steps.is_empty());
    }

    #[tokio::test]
    async fn compile_rejects_empty_trace() {
        let trace = ActionTrace {
            session_id: "empty".into(),
            steps: vec![],
            voice_context: None,
            parameter_candidates: vec![],
        };
        let inferrer = GoalInferrer::new();
        let result = inferrer.compile(&trace, &BTreeMap::new(), "nothing").await;
        assert!(matches!(result, Err(CompilerError::EmptyTrace { .. })));
    }
}
