//! CLI subcommands: validate, plan, apply, destroy, status.

pub mod logging;

use crate::backend::BackendRegistry;
use crate::core::config::EngineConfig;
use crate::core::executor::Executor;
use crate::core::planner::Planner;
use crate::core::types::{Action, ContextLevel, Graph, Pipeline, StepState};
use crate::core::{graph, parser, state};
use crate::tripwire::eventlog;
use clap::Subcommand;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a graph and the engine configuration without applying
    Validate {
        /// Path to the desired graph
        #[arg(short, long, default_value = "graph.yaml")]
        file: PathBuf,

        /// Path to tessera.yaml
        #[arg(short, long, default_value = "tessera.yaml")]
        config: PathBuf,
    },

    /// Show the execution plan (diff desired graph vs persisted pipeline)
    Plan {
        /// Path to the desired graph
        #[arg(short, long, default_value = "graph.yaml")]
        file: PathBuf,

        /// Path to tessera.yaml
        #[arg(short, long, default_value = "tessera.yaml")]
        config: PathBuf,

        /// Pipeline name under the state directory
        #[arg(short, long, default_value = "default")]
        name: String,

        /// Planning scope: none, datacenter, environment, component
        #[arg(long, default_value = "none")]
        context: ContextLevel,
    },

    /// Reconcile resources to the desired graph
    Apply {
        /// Path to the desired graph
        #[arg(short, long, default_value = "graph.yaml")]
        file: PathBuf,

        /// Path to tessera.yaml
        #[arg(short, long, default_value = "tessera.yaml")]
        config: PathBuf,

        /// Pipeline name under the state directory
        #[arg(short, long, default_value = "default")]
        name: String,

        /// Planning scope: none, datacenter, environment, component
        #[arg(long, default_value = "none")]
        context: ContextLevel,

        /// Show the plan without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Tear down everything the persisted pipeline created
    Destroy {
        /// Path to tessera.yaml
        #[arg(short, long, default_value = "tessera.yaml")]
        config: PathBuf,

        /// Pipeline name under the state directory
        #[arg(short, long, default_value = "default")]
        name: String,

        /// Show the plan without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the persisted pipeline
    Status {
        /// Path to tessera.yaml
        #[arg(short, long, default_value = "tessera.yaml")]
        config: PathBuf,

        /// Pipeline name under the state directory
        #[arg(short, long, default_value = "default")]
        name: String,
    },
}

/// Dispatch a CLI command.
pub async fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Validate { file, config } => cmd_validate(&file, &config),
        Commands::Plan {
            file,
            config,
            name,
            context,
        } => cmd_plan(&file, &config, &name, context),
        Commands::Apply {
            file,
            config,
            name,
            context,
            dry_run,
        } => cmd_apply(&file, &config, &name, context, dry_run).await,
        Commands::Destroy {
            config,
            name,
            dry_run,
        } => cmd_destroy(&config, &name, dry_run).await,
        Commands::Status { config, name } => cmd_status(&config, &name),
    }
}

/// Load engine configuration; a missing file means defaults.
fn load_config(path: &Path) -> Result<EngineConfig, String> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(EngineConfig::default());
    }
    let config = parser::parse_config_file(path).map_err(|e| e.to_string())?;
    let errors = parser::validate_config(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err("invalid configuration".to_string())
}

/// Parse a graph and check it against the configuration.
fn load_graph(file: &Path, config: &EngineConfig) -> Result<Graph, String> {
    let graph = parser::parse_graph_file(file).map_err(|e| e.to_string())?;
    graph::validate_graph(&graph).map_err(|e| e.to_string())?;
    let errors = parser::validate_references(&graph, config);
    if errors.is_empty() {
        return Ok(graph);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(format!("{} validation error(s)", errors.len()))
}

fn cmd_validate(file: &Path, config_path: &Path) -> Result<(), String> {
    let config = load_config(config_path)?;
    let graph = load_graph(file, &config)?;
    println!(
        "OK: {} ({} nodes, {} edges, {} accounts)",
        file.display(),
        graph.nodes.len(),
        graph.edges.len(),
        config.accounts.len()
    );
    Ok(())
}

/// Load config, registry and the persisted "before" pipeline.
fn prepare(
    config_path: &Path,
    name: &str,
) -> Result<(EngineConfig, Arc<BackendRegistry>, Pipeline), String> {
    let config = load_config(config_path)?;
    let registry = Arc::new(BackendRegistry::from_config(&config));
    let before = state::load_pipeline(&config.state_dir, name).map_err(|e| e.to_string())?;
    Ok((config, registry, before))
}

fn plan_against(
    registry: &Arc<BackendRegistry>,
    before: &Pipeline,
    after: &Graph,
    context: ContextLevel,
) -> Result<Pipeline, String> {
    let planner = Planner::new(registry.clone());
    planner
        .plan(before, after, context)
        .map_err(|e| e.to_string())
}

fn cmd_plan(
    file: &Path,
    config_path: &Path,
    name: &str,
    context: ContextLevel,
) -> Result<(), String> {
    let (config, registry, before) = prepare(config_path, name)?;
    let graph = load_graph(file, &config)?;
    let pipeline = plan_against(&registry, &before, &graph, context)?;
    print_plan(name, &pipeline)
}

/// Display a plan to stdout, dependencies first.
fn print_plan(name: &str, pipeline: &Pipeline) -> Result<(), String> {
    let order = graph::execution_order(pipeline).map_err(|e| e.to_string())?;
    println!("Planning: {} ({} steps)", name, pipeline.steps.len());
    println!();
    for id in &order {
        let Some(step) = pipeline.step(id) else {
            continue;
        };
        println!("  {} {}", action_symbol(step.action), id);
    }

    let summary = pipeline.summary();
    println!();
    println!(
        "Plan: {} to add, {} to change, {} to destroy, {} unchanged.",
        summary.to_create, summary.to_update, summary.to_delete, summary.unchanged
    );
    Ok(())
}

fn action_symbol(action: Action) -> &'static str {
    match action {
        Action::Create => "+",
        Action::Update => "~",
        Action::Delete => "-",
        Action::NoOp => " ",
    }
}

async fn cmd_apply(
    file: &Path,
    config_path: &Path,
    name: &str,
    context: ContextLevel,
    dry_run: bool,
) -> Result<(), String> {
    let (config, registry, before) = prepare(config_path, name)?;
    let graph = load_graph(file, &config)?;
    let pipeline = plan_against(&registry, &before, &graph, context)?;
    print_plan(name, &pipeline)?;
    if dry_run {
        println!("Dry run: no changes applied.");
        return Ok(());
    }
    execute(config, registry, name, pipeline).await
}

/// Plan against an empty graph and apply: the compensating teardown.
async fn cmd_destroy(config_path: &Path, name: &str, dry_run: bool) -> Result<(), String> {
    let (config, registry, before) = prepare(config_path, name)?;
    let pipeline = plan_against(&registry, &before, &Graph::default(), ContextLevel::None)?;
    print_plan(name, &pipeline)?;
    if dry_run {
        println!("Dry run: nothing destroyed.");
        return Ok(());
    }
    execute(config, registry, name, pipeline).await
}

/// Run the pipeline, printing status transitions, and persist the result
/// whether or not it succeeded.
async fn execute(
    config: EngineConfig,
    registry: Arc<BackendRegistry>,
    name: &str,
    pipeline: Pipeline,
) -> Result<(), String> {
    let state_dir = config.state_dir.clone();
    let mut executor = Executor::new(config, registry).with_checkpoint(&state_dir, name);
    if executor.config().event_log {
        executor = executor.with_event_log(eventlog::event_log_path(&state_dir, name));
    }

    println!();
    let mut latest = pipeline.clone();
    let mut seen: HashMap<String, StepState> = pipeline
        .steps
        .iter()
        .map(|s| (s.id(), s.status.state))
        .collect();
    let mut failure = None;

    let mut snapshots = executor.stream(pipeline);
    while let Some(item) = snapshots.next().await {
        match item {
            Ok(snapshot) => {
                print_transitions(&snapshot, &mut seen);
                latest = snapshot;
            }
            Err(f) => {
                print_transitions(&f.pipeline, &mut seen);
                failure = Some(f.error);
                latest = f.pipeline;
            }
        }
    }

    state::save_pipeline(&state_dir, name, &latest).map_err(|e| e.to_string())?;

    let summary = latest.summary();
    println!();
    match failure {
        Some(e) => {
            println!("Apply stopped: {}", e);
            Err(e.to_string())
        }
        None => {
            println!(
                "Apply complete: {} created, {} updated, {} destroyed, {} unchanged.",
                summary.to_create, summary.to_update, summary.to_delete, summary.unchanged
            );
            Ok(())
        }
    }
}

fn print_transitions(pipeline: &Pipeline, seen: &mut HashMap<String, StepState>) {
    for step in &pipeline.steps {
        let id = step.id();
        let state = step.status.state;
        if seen.get(&id) == Some(&state) {
            continue;
        }
        match (&step.status.message, state) {
            (Some(message), StepState::Error) => println!("  {}: error: {}", id, message),
            _ => println!("  {}: {}", id, state),
        }
        seen.insert(id, state);
    }
}

fn cmd_status(config_path: &Path, name: &str) -> Result<(), String> {
    let config = load_config(config_path)?;
    let pipeline = state::load_pipeline(&config.state_dir, name).map_err(|e| e.to_string())?;
    if pipeline.is_empty() {
        println!("No state found. Run `tessera apply` first.");
        return Ok(());
    }

    println!("Pipeline: {} ({} steps)", name, pipeline.steps.len());
    for step in &pipeline.steps {
        let duration = match (step.status.start_time, step.status.end_time) {
            (Some(start), Some(end)) => {
                format!(" ({:.2}s)", end.saturating_sub(start) as f64 / 1000.0)
            }
            _ => String::new(),
        };
        println!(
            "    {}: {} [{}]{}",
            step.id(),
            step.status.state,
            step.action,
            duration
        );
        if let Some(ref message) = step.status.message {
            println!("      {}", message);
        }
    }
    Ok(())
}
