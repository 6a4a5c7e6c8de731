//! Step-sequence pre-analysis.
//!
//! Before goals are built, the whole recorded sequence is annotated in one
//! pure pass: which clicks are focus clicks (to be merged into the typing
//! that follows), and what each navigation click's intent was (a specific
//! site the user named, or just "any good result").  An external reasoning
//! oracle may produce the annotations; when it is unavailable or fails, a
//! heuristic using the same time-gap/same-app/keyword rules takes over.
//!
//! A second pure pass then folds merged steps into their targets, producing
//! a new immutable step list; no skip-set is mutated mid-iteration.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reenact_core::{NavigationIntent, StepIntent, TraceStep, VoiceContext};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

/// Sites whose appearance in a query signals site-targeted navigation.
const SITE_INDICATORS: &[&str] = &[
    "zomato",
    "yelp",
    "youtube",
    "amazon",
    "flipkart",
    "swiggy",
    "booking.com",
    "tripadvisor",
    "google maps",
];

/// Click-to-type merges only apply within this gap.
const FOCUS_CLICK_MAX_GAP_SECS: f64 = 2.0;

/// Per-step intent annotation produced by pass 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepAnnotation {
    /// The click only focused an input before typing; merge it away.
    pub is_focus_click: bool,

    /// For navigation clicks: how tied the user was to the destination.
    pub navigation_intent: Option<NavigationIntent>,

    /// Domain the user named, when intent is site-specific.
    pub target_site: Option<String>,

    /// The step emits no goal of its own.
    pub skip: bool,

    /// Step id this step's content folds into.
    pub merge_into: Option<String>,
}

/// Whole-sequence intent annotation, usually backed by a reasoning model.
///
/// Best-effort: an error degrades compilation to
/// [`heuristic_annotations`], it never fails it.
#[async_trait]
pub trait SequenceOracle: Send + Sync {
    async fn annotate(
        &self,
        steps: &[TraceStep],
        voice: Option<&VoiceContext>,
    ) -> Result<BTreeMap<String, StepAnnotation>>;
}

// ---------------------------------------------------------------------------
// Heuristic pass
// ---------------------------------------------------------------------------

/// Annotate the sequence with time-gap/same-app/keyword rules.
///
/// Pure function of the whole sequence: no shared state is mutated while
/// iterating.
pub fn heuristic_annotations(
    steps: &[TraceStep],
    voice: Option<&VoiceContext>,
) -> BTreeMap<String, StepAnnotation> {
    let mut annotations = BTreeMap::new();

    for (i, step) in steps.iter().enumerate() {
        let next = steps.get(i + 1);

        let mut annotation = StepAnnotation::default();

        if step.intent == StepIntent::Select {
            if let Some(next) = next {
                let gap = next.start_ts - step.end_ts;
                let same_app = step.app_name == next.app_name;
                let next_types = matches!(next.intent, StepIntent::Search | StepIntent::Write)
                    && next.has_typing();
                if same_app && next_types && gap < FOCUS_CLICK_MAX_GAP_SECS {
                    annotation.is_focus_click = true;
                    annotation.skip = true;
                    annotation.merge_into = Some(next.id.clone());
                }
            }

            if !annotation.is_focus_click {
                let (intent, site) = classify_navigation(steps, i, voice);
                annotation.navigation_intent = Some(intent);
                annotation.target_site = site;
            }
        }

        annotations.insert(step.id.clone(), annotation);
    }

    annotations
}

/// Decide whether a click navigates to a site the user explicitly wanted.
///
/// Evidence: the most recent search query names a site, or the voice
/// narration does.  Defaults generously to [`NavigationIntent::AnyResult`].
fn classify_navigation(
    steps: &[TraceStep],
    index: usize,
    voice: Option<&VoiceContext>,
) -> (NavigationIntent, Option<String>) {
    let query = steps[..index]
        .iter()
        .rev()
        .find(|s| s.intent == StepIntent::Search && s.has_typing())
        .map(|s| s.combined_typed_text().to_lowercase())
        .unwrap_or_default();

    for site in SITE_INDICATORS {
        if query.contains(site) {
            return (NavigationIntent::SpecificSite, Some((*site).to_string()));
        }
    }

    if let Some(voice) = voice {
        let mut spoken = voice.task_goal.clone().unwrap_or_default().to_lowercase();
        for hint in &voice.parameter_hints {
            spoken.push(' ');
            spoken.push_str(&hint.value.to_lowercase());
        }
        for site in SITE_INDICATORS {
            if spoken.contains(site) {
                return (NavigationIntent::SpecificSite, Some((*site).to_string()));
            }
        }
    }

    (NavigationIntent::AnyResult, None)
}

// ---------------------------------------------------------------------------
// Merge fold (pass 2)
// ---------------------------------------------------------------------------

/// Fold skipped steps into their merge targets, producing a new list.
///
/// A folded focus click contributes its clicked-element descriptors to the
/// target, so selector-based strategies can still be built from them.
pub fn fold_merged_steps(
    steps: &[TraceStep],
    annotations: &BTreeMap<String, StepAnnotation>,
) -> Vec<TraceStep> {
    // Collect per-target element contributions first.
    let mut contributions: BTreeMap<String, Vec<reenact_core::ElementRef>> = BTreeMap::new();
    for step in steps {
        if let Some(annotation) = annotations.get(&step.id) {
            if annotation.skip {
                if let Some(target) = &annotation.merge_into {
                    contributions
                        .entry(target.clone())
                        .or_default()
                        .extend(step.clicked_elements.iter().cloned());
                }
            }
        }
    }

    steps
        .iter()
        .filter(|step| !annotations.get(&step.id).is_some_and(|a| a.skip))
        .map(|step| {
            let mut step = step.clone();
            if let Some(extra) = contributions.get(&step.id) {
                let mut merged = extra.clone();
                merged.append(&mut step.clicked_elements);
                step.clicked_elements = merged;
            }
            step
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Outcome analysis
// ---------------------------------------------------------------------------

/// What observably happened after a step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub url_changed: bool,
    pub new_url: Option<String>,
    pub new_domain: Option<String>,
    pub domain_changed: bool,
    pub app_changed: bool,
    pub new_app: Option<String>,
    pub data_extracted: bool,
}

/// Inspect the next 1–3 steps to see where a step led.
pub fn analyze_outcome(step: &TraceStep, next_steps: &[TraceStep]) -> StepOutcome {
    let mut outcome = StepOutcome::default();
    let current_domain = extract_domain(step.url_before.as_deref());

    for next in next_steps.iter().take(3) {
        if let (Some(next_url), Some(url)) = (&next.url_before, &step.url_before) {
            if next_url != url {
                outcome.url_changed = true;
                outcome.new_url = Some(next_url.clone());
                let next_domain = extract_domain(Some(next_url));
                if let (Some(next_domain), Some(current)) = (&next_domain, &current_domain) {
                    if next_domain != current {
                        outcome.domain_changed = true;
                    }
                }
                outcome.new_domain = next_domain;
                break;
            }
        }

        if next.app_name != step.app_name {
            outcome.app_changed = true;
            outcome.new_app = Some(next.app_name.clone());
            break;
        }

        if next.has_shortcut("copy") {
            outcome.data_extracted = true;
        }
    }

    outcome
}

/// Domain of a URL, without a leading `www.`.
pub fn extract_domain(url: Option<&str>) -> Option<String> {
    let parsed = url::Url::parse(url?).ok()?;
    let host = parsed.host_str()?;
    let domain = host.strip_prefix("www.").unwrap_or(host);
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_string())
    }
}

/// Domain + path form usable as a loose source-URL pattern.
pub fn url_to_pattern(url: Option<&str>) -> Option<String> {
    let domain = extract_domain(url)?;
    let parsed = url::Url::parse(url?).ok()?;
    match parsed.path() {
        "" | "/" => Some(domain),
        path => Some(format!("{domain}{path}")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
