//! Goal consolidation.
//!
//! Raw inference over-produces: focus clicks that slipped past merging,
//! repeated extracts of the same schema, app activations for apps already
//! in front.  This pass is a left-to-right fold over the goal list with a
//! small rolling context; each rule is a pure predicate over (goal,
//! context), so rules are testable in isolation and the fold never mutates
//! a collection it is iterating.

use reenact_core::{GoalStep, GoalType, Strategy};
use tracing::debug;

/// Two selects within this distance (per axis) count as the same target.
const SAME_TARGET_PIXELS: i32 = 50;

/// Writes at or below this many characters carry no durable intent.
const TRIVIAL_WRITE_CHARS: usize = 2;

// ---------------------------------------------------------------------------
// Rolling context
// ---------------------------------------------------------------------------

/// What the fold remembers about goals it has already kept.
#[derive(Debug, Default)]
struct RollingContext {
    /// Schema key sets of kept extract goals.
    kept_extract_schemas: Vec<Vec<String>>,

    /// App targeted by the most recent kept launch goal.
    last_launch_app: Option<String>,

    /// (app, description, coordinates) of the most recent kept select goal.
    last_select: Option<(String, String, Option<(i32, i32)>)>,

    /// The previous kept goal, whatever its type.
    prev: Option<GoalStep>,
}

impl RollingContext {
    fn record(&mut self, goal: &GoalStep) {
        match goal.goal_type {
            GoalType::Extract => {
                self.kept_extract_schemas.push(schema_keys(goal));
            }
            GoalType::Launch => {
                self.last_launch_app = Some(goal.app_name.clone());
            }
            GoalType::Select => {
                self.last_select = Some((
                    goal.app_name.clone(),
                    goal.description.clone(),
                    first_strategy_coordinates(goal),
                ));
            }
            _ => {}
        }
        self.prev = Some(goal.clone());
    }
}

// ---------------------------------------------------------------------------
// Fold
// ---------------------------------------------------------------------------

/// Drop noise goals, preserving the order of everything kept.
pub fn consolidate(goals: Vec<GoalStep>) -> Vec<GoalStep> {
    let mut kept = Vec::with_capacity(goals.len());
    let mut ctx = RollingContext::default();

    for goal in goals {
        if let Some(reason) = drop_reason(&goal, &ctx) {
            debug!(goal_id = %goal.id, reason, "goal dropped by consolidation");
            continue;
        }
        ctx.record(&goal);
        kept.push(goal);
    }

    kept
}

/// First rule that says to drop this goal, if any.
fn drop_reason(goal: &GoalStep, ctx: &RollingContext) -> Option<&'static str> {
    if is_duplicate_extract(goal, ctx) {
        return Some("duplicate extract");
    }
    if is_spurious_select(goal) {
        return Some("spurious select");
    }
    if is_similar_select(goal, ctx) {
        return Some("similar select");
    }
    if is_redundant_launch(goal, ctx) {
        return Some("redundant launch");
    }
    if is_duplicate_navigate(goal, ctx) {
        return Some("duplicate navigate");
    }
    if is_trivial_write(goal) {
        return Some("trivial write");
    }
    if is_duplicate_paste(goal, ctx) {
        return Some("duplicate paste");
    }
    None
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// An extract whose schema keys were already covered by a kept extract.
fn is_duplicate_extract(goal: &GoalStep, ctx: &RollingContext) -> bool {
    if goal.goal_type != GoalType::Extract {
        return false;
    }
    let keys = schema_keys(goal);
    ctx.kept_extract_schemas.iter().any(|kept| *kept == keys)
}

/// A click we know nothing about: generic description, timeout-only
/// success, and no strategy that names a concrete target.
fn is_spurious_select(goal: &GoalStep) -> bool {
    goal.goal_type == GoalType::Select
        && goal.success_criteria.timeout_success
        && !goal.success_criteria.url_changed
        && !goal.expects_detail_page
        && !goal.strategies.iter().any(has_concrete_target)
}

/// A select on the same target as the previous kept select.
fn is_similar_select(goal: &GoalStep, ctx: &RollingContext) -> bool {
    if goal.goal_type != GoalType::Select {
        return false;
    }
    let Some((app, description, coords)) = &ctx.last_select else {
        return false;
    };
    if *app != goal.app_name {
        return false;
    }
    if !description.is_empty() && *description == goal.description {
        return true;
    }
    match (coords, first_strategy_coordinates(goal)) {
        (Some((x1, y1)), Some((x2, y2))) => {
            (x1 - x2).abs() <= SAME_TARGET_PIXELS && (y1 - y2).abs() <= SAME_TARGET_PIXELS
        }
        _ => false,
    }
}

/// A launch for an app that is already in front.
fn is_redundant_launch(goal: &GoalStep, ctx: &RollingContext) -> bool {
    if goal.goal_type != GoalType::Launch {
        return false;
    }
    if ctx.last_launch_app.as_deref() == Some(goal.app_name.as_str()) {
        return true;
    }
    ctx.prev
        .as_ref()
        .is_some_and(|prev| prev.app_name == goal.app_name)
}

/// A navigate to the same destination as the immediately preceding kept
/// goal.  Only adjacency counts; a later return to the same site is a
/// genuine step.
fn is_duplicate_navigate(goal: &GoalStep, ctx: &RollingContext) -> bool {
    if goal.goal_type != GoalType::Navigate {
        return false;
    }
    let Some(target) = &goal.success_criteria.url_contains else {
        return false;
    };
    ctx.prev.as_ref().is_some_and(|prev| {
        prev.goal_type == GoalType::Navigate
            && prev
                .success_criteria
                .url_contains
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(target))
    })
}

/// A write so short it was a stray keystroke, not content.
fn is_trivial_write(goal: &GoalStep) -> bool {
    if goal.goal_type != GoalType::Write {
        return false;
    }
    let content = goal
        .template
        .as_deref()
        .or_else(|| {
            goal.strategies
                .iter()
                .find_map(|s| s.input_value.as_deref())
        })
        .unwrap_or_default();
    content.trim().chars().count() <= TRIVIAL_WRITE_CHARS
}

/// A paste identical to the immediately preceding paste.
fn is_duplicate_paste(goal: &GoalStep, ctx: &RollingContext) -> bool {
    if goal.goal_type != GoalType::Shortcut || !is_paste(goal) {
        return false;
    }
    ctx.prev
        .as_ref()
        .is_some_and(|prev| is_paste(prev) && prev.template == goal.template)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_paste(goal: &GoalStep) -> bool {
    goal.strategies
        .iter()
        .any(|s| s.shortcut_keys.as_deref().is_some_and(|k| k.ends_with("+v")))
}

fn has_concrete_target(strategy: &Strategy) -> bool {
    strategy.selector.is_some()
        || strategy.text_match.is_some()
        || strategy.coordinates.is_some()
        || strategy.shortcut_keys.is_some()
        || strategy.input_value.is_some()
        || strategy.accessibility_name.is_some()
}

fn first_strategy_coordinates(goal: &GoalStep) -> Option<(i32, i32)> {
    goal.strategies.iter().find_map(|s| s.coordinates)
}

fn schema_keys(goal: &GoalStep) -> Vec<String> {
    goal.extraction_schema
        .as_ref()
        .map(|schema| schema.keys().cloned().collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use reenact_core::{FieldSpec, Platform, SuccessCriteria};
    use std::collections::BTreeMap;

    fn goal(id: &str, number: u32, goal_type: GoalType, app: &str) -> GoalStep {
        GoalStep::new(id, number, goal_type, format!("goal {id}"), Platform::Browser, app)
    }

    fn extract(id: &str, number: u32, fields: &[&str]) -> GoalStep {
        let mut g = goal(id, number, GoalType::Extract, "Chrome");
        g.extraction_schema = Some(
            fields
                .iter()
                .map(|f| (f.to_string(), FieldSpec::default()))
                .collect::<BTreeMap<_, _>>(),
        );
        g.strategies = vec![Strategy {
            name: "oracle_extract".into(),
            priority: 100,
            visual_description: Some("data on page".into()),
            ..Strategy::default()
        }];
        g
    }

    #[test]
    fn duplicate_extract_dropped_first_kept() {
        let goals = vec![
            extract("e1", 1, &["name", "rating"]),
            extract("e2", 2, &["name", "rating"]),
        ];
        let kept = consolidate(goals);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "e1");
    }

    #[test]
    fn extract_with_different_schema_kept() {
        let goals = vec![
            extract("e1", 1, &["name"]),
            extract("e2", 2, &["address"]),
        ];
        assert_eq!(consolidate(goals).len(), 2);
    }

    #[test]
    fn spurious_select_dropped() {
        let mut g = goal("s1", 1, GoalType::Select, "Chrome");
        g.success_criteria = SuccessCriteria {
            timeout_success: true,
            ..SuccessCriteria::default()
        };
        g.strategies = vec![Strategy {
            name: "oracle_visual".into(),
            priority: 50,
            visual_description: Some("first clickable element in the content area".into()),
            ..Strategy::default()
        }];
        g.fallback_to_agent = true;
        assert!(consolidate(vec![g]).is_empty());
    }

    #[test]
    fn select_with_coordinates_kept() {
        let mut g = goal("s1", 1, GoalType::Select, "Chrome");
        g.success_criteria = SuccessCriteria {
            timeout_success: true,
            ..SuccessCriteria::default()
        };
        g.strategies = vec![Strategy {
            name: "coordinates".into(),
            priority: 10,
            coordinates: Some((100, 200)),
            ..Strategy::default()
        }];
        assert_eq!(consolidate(vec![g]).len(), 1);
    }

    #[test]
    fn listing_select_never_spurious() {
        let mut g = goal("s1", 1, GoalType::Select, "Chrome");
        g.expects_detail_page = true;
        g.success_criteria = SuccessCriteria {
            url_changed: true,
            ..SuccessCriteria::default()
        };
        g.strategies = vec![Strategy {
            name: "oracle_click_listing".into(),
            priority: 80,
            visual_description: Some("listing card".into()),
            ..Strategy::default()
        }];
        assert_eq!(consolidate(vec![g]).len(), 1);
    }

    #[test]
    fn nearby_repeat_select_dropped() {
        let make = |id: &str, n: u32, x: i32, y: i32, desc: &str| {
            let mut g = goal(id, n, GoalType::Select, "Chrome");
            g.description = desc.into();
            g.success_criteria = SuccessCriteria {
                timeout_success: true,
                ..SuccessCriteria::default()
            };
            g.strategies = vec![Strategy {
                name: "coordinates".into(),
                priority: 10,
                coordinates: Some((x, y)),
                ..Strategy::default()
            }];
            g
        };
        let kept = consolidate(vec![
            make("s1", 1, 100, 200, "click A"),
            make("s2", 2, 120, 230, "click B"),
            make("s3", 3, 500, 600, "click C"),
        ]);
        let ids: Vec<&str> = kept.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s3"]);
    }

    #[test]
    fn redundant_launch_dropped() {
        let mut l1 = goal("l1", 1, GoalType::Launch, "Notes");
        l1.strategies = vec![Strategy::named("activate_app", 100)];
        let mut l2 = goal("l2", 2, GoalType::Launch, "Notes");
        l2.strategies = vec![Strategy::named("activate_app", 100)];

        let kept = consolidate(vec![l1, l2]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "l1");
    }

    #[test]
    fn launch_for_app_already_in_front_dropped() {
        let mut write = goal("w1", 1, GoalType::Write, "Notes");
        write.template = Some("some real content".into());
        write.strategies = vec![Strategy::named("focused_type", 100)];
        let mut launch = goal("l1", 2, GoalType::Launch, "Notes");
        launch.strategies = vec![Strategy::named("activate_app", 100)];

        let kept = consolidate(vec![write, launch]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "w1");
    }

    #[test]
    fn launch_for_new_app_kept() {
        let mut l1 = goal("l1", 1, GoalType::Launch, "Notes");
        l1.strategies = vec![Strategy::named("activate_app", 100)];
        let mut l2 = goal("l2", 2, GoalType::Launch, "Chrome");
        l2.strategies = vec![Strategy::named("activate_app", 100)];
        assert_eq!(consolidate(vec![l1, l2]).len(), 2);
    }

    #[test]
    fn duplicate_navigate_dropped_case_insensitive() {
        let make = |id: &str, n: u32, target: &str| {
            let mut g = goal(id, n, GoalType::Navigate, "Chrome");
            g.success_criteria = SuccessCriteria {
                url_contains: Some(target.into()),
                url_changed: true,
                ..SuccessCriteria::default()
            };
            g.strategies = vec![Strategy::named("oracle_target_domain", 80)];
            g
        };
        let kept = consolidate(vec![make("n1", 1, "Zomato.com"), make("n2", 2, "zomato.com")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "n1");
    }

    #[test]
    fn return_navigation_to_same_site_kept() {
        let nav = |id: &str, n: u32, target: &str| {
            let mut g = goal(id, n, GoalType::Navigate, "Chrome");
            g.success_criteria = SuccessCriteria {
                url_contains: Some(target.into()),
                url_changed: true,
                ..SuccessCriteria::default()
            };
            g.strategies = vec![Strategy::named("oracle_target_domain", 80)];
            g
        };
        let mut between = goal("w1", 2, GoalType::Write, "Chrome");
        between.template = Some("pani puri".into());
        between.strategies = vec![Strategy::named("focused_type", 100)];

        let kept = consolidate(vec![
            nav("n1", 1, "zomato.com"),
            between,
            nav("n2", 3, "zomato.com"),
        ]);
        let ids: Vec<&str> = kept.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "w1", "n2"]);
    }

    #[test]
    fn navigate_without_target_never_deduped() {
        let make = |id: &str, n: u32| {
            let mut g = goal(id, n, GoalType::Navigate, "Chrome");
            g.success_criteria = SuccessCriteria {
                url_changed: true,
                ..SuccessCriteria::default()
            };
            g.strategies = vec![Strategy::named("oracle_generic_result", 80)];
            g
        };
        assert_eq!(consolidate(vec![make("n1", 1), make("n2", 2)]).len(), 2);
    }

    #[test]
    fn trivial_write_dropped() {
        let mut g = goal("w1", 1, GoalType::Write, "Notes");
        g.template = Some("ab".into());
        g.strategies = vec![Strategy {
            name: "focused_type".into(),
            priority: 100,
            input_value: Some("ab".into()),
            ..Strategy::default()
        }];
        assert!(consolidate(vec![g]).is_empty());

        let mut g = goal("w2", 1, GoalType::Write, "Notes");
        g.template = Some("real content".into());
        g.strategies = vec![Strategy {
            name: "focused_type".into(),
            priority: 100,
            input_value: Some("real content".into()),
            ..Strategy::default()
        }];
        assert_eq!(consolidate(vec![g]).len(), 1);
    }

    #[test]
    fn back_to_back_identical_paste_dropped() {
        let make = |id: &str, n: u32| {
            let mut g = goal(id, n, GoalType::Shortcut, "Notes");
            g.template = Some("{{extracted_content}}".into());
            g.strategies = vec![Strategy {
                name: "paste_content".into(),
                priority: 100,
                shortcut_keys: Some("command+v".into()),
                ..Strategy::default()
            }];
            g
        };
        let kept = consolidate(vec![make("p1", 1), make("p2", 2)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "p1");
    }
}
