//! CLI entry point for reenact.
//!
//! This binary provides the `reenact` command with subcommands for
//! compiling recorded traces into workflows, inspecting workflows, and
//! dry-running them step by step.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reenact_compiler::GoalInferrer;
use reenact_core::{ActionTrace, ExtractionSchemas, GoalWorkflow};
use reenact_executor::{ExecutorConfig, SafetyGuard};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// reenact — record a UI task once, replay it with new inputs.
#[derive(Parser)]
#[command(
    name = "reenact",
    version,
    about = "reenact — compile recorded UI traces into replayable goal workflows",
    long_about = "Compiles a recorded, intent-classified UI trace into a goal-oriented \
                  workflow, then replays it by achieving goals with ranked strategies \
                  and success criteria instead of raw input events."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a recorded trace into a goal workflow.
    Compile {
        /// Path to the trace JSON document.
        trace: PathBuf,

        /// Where to write the compiled workflow.
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,

        /// Workflow name; defaults to the trace session id.
        #[arg(short, long)]
        name: Option<String>,

        /// Extraction schemas JSON (step id -> field -> spec).
        #[arg(long)]
        schemas: Option<PathBuf>,
    },

    /// Print a human-readable summary of a compiled workflow.
    Show {
        /// Path to the workflow JSON document.
        workflow: PathBuf,
    },

    /// List the parameters a workflow accepts, with recorded defaults.
    Params {
        /// Path to the workflow JSON document.
        workflow: PathBuf,
    },

    /// Walk a workflow's steps with parameters applied, without executing.
    DryRun {
        /// Path to the workflow JSON document.
        workflow: PathBuf,

        /// Parameter overrides as name=value pairs.
        #[arg(short, long, value_parser = parse_key_value)]
        param: Vec<(String, String)>,

        /// Executor config TOML; defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("info");

    let cli = Cli::parse();
    match cli.command {
        Commands::Compile {
            trace,
            output,
            name,
            schemas,
        } => cmd_compile(trace, output, name, schemas).await,
        Commands::Show { workflow } => cmd_show(workflow),
        Commands::Params { workflow } => cmd_params(workflow),
        Commands::DryRun {
            workflow,
            param,
            config,
        } => cmd_dry_run(workflow, param, config),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: compile
// ---------------------------------------------------------------------------

async fn cmd_compile(
    trace_path: PathBuf,
    output: PathBuf,
    name: Option<String>,
    schemas_path: Option<PathBuf>,
) -> Result<()> {
    let trace = ActionTrace::load(&trace_path)
        .with_context(|| format!("failed to load trace from {}", trace_path.display()))?;

    let schemas: ExtractionSchemas = match schemas_path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read schemas from {}", path.display()))?;
            serde_json::from_str(&text).context("failed to parse extraction schemas")?
        }
        None => BTreeMap::new(),
    };

    let name = name.unwrap_or_else(|| trace.session_id.clone());
    info!(session = %trace.session_id, steps = trace.steps.len(), "compiling trace");

    let inferrer = GoalInferrer::new();
    let workflow = inferrer.compile(&trace, &schemas, &name).await?;
    workflow.save(&output)?;

    println!(
        "compiled {} steps into {} goals -> {}",
        trace.steps.len(),
        workflow.steps.len(),
        output.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: show
// ---------------------------------------------------------------------------

fn cmd_show(path: PathBuf) -> Result<()> {
    let workflow = load_workflow(&path)?;

    println!("workflow: {} ({})", workflow.name, workflow.id);
    if let Some(description) = &workflow.description {
        println!("  {description}");
    }
    if let Some(session) = &workflow.created_from_session {
        println!("  compiled from session {session}");
    }
    println!("  created {}", workflow.created_at.to_rfc3339());
    println!();

    for step in &workflow.steps {
        println!(
            "  {:>3}. [{:?}/{:?}] {}",
            step.step_number, step.goal_type, step.platform, step.description
        );
        for strategy in step.ordered_strategies() {
            println!("       - {} (priority {})", strategy.name, strategy.priority);
        }
        if step.fallback_to_agent {
            println!("       - agent fallback enabled");
        }
    }

    let fields = workflow.extraction_fields();
    if !fields.is_empty() {
        println!();
        println!("  extracts: {}", fields.join(", "));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: params
// ---------------------------------------------------------------------------

fn cmd_params(path: PathBuf) -> Result<()> {
    let workflow = load_workflow(&path)?;

    if workflow.parameters.is_empty() {
        println!("workflow `{}` takes no parameters", workflow.name);
        return Ok(());
    }
    println!("parameters for `{}`:", workflow.name);
    for (name, default) in &workflow.parameters {
        println!("  {name} (recorded value: {default:?})");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: dry-run
// ---------------------------------------------------------------------------

fn cmd_dry_run(
    path: PathBuf,
    params: Vec<(String, String)>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let workflow = load_workflow(&path)?;
    let config = match config_path {
        Some(path) => ExecutorConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ExecutorConfig::default(),
    };
    let guard = SafetyGuard::new(config.strict_safety);

    let mut values = workflow.parameters.clone();
    values.extend(params);
    let working = workflow.substitute_parameters(&values);

    println!("dry run of `{}` with {} parameter(s):", working.name, values.len());
    for step in &working.steps {
        step.validate()?;
        println!(
            "  {:>3}. [{:?}] {} (app: {}, retries: {})",
            step.step_number, step.goal_type, step.description, step.app_name, step.max_retries
        );
        for strategy in step.ordered_strategies() {
            let detail = strategy
                .selector
                .as_deref()
                .or(strategy.visual_description.as_deref())
                .or(strategy.input_value.as_deref())
                .or(strategy.shortcut_keys.as_deref())
                .unwrap_or("");
            let verdict = strategy_verdict(&guard, &step.app_name, strategy);
            println!("       - {} {}{}", strategy.name, detail, verdict);
        }
    }
    println!("dry run complete; no actions were performed");
    Ok(())
}

/// What the safety guard would say about this strategy at run time.
fn strategy_verdict(
    guard: &SafetyGuard,
    app: &str,
    strategy: &reenact_core::Strategy,
) -> String {
    if let Some(keys) = &strategy.shortcut_keys {
        let check = guard.check_shortcut(keys);
        if !check.allowed {
            return format!("  [would be refused: {}]", check.reason.unwrap_or_default());
        }
    }
    if let Some(value) = &strategy.input_value {
        let check = guard.check_typed_text(app, value);
        if !check.allowed {
            return format!("  [would be refused: {}]", check.reason.unwrap_or_default());
        }
    }
    String::new()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_workflow(path: &PathBuf) -> Result<GoalWorkflow> {
    GoalWorkflow::load(path)
        .with_context(|| format!("failed to load workflow from {}", path.display()))
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("`{s}` is not in name=value form"))
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
