use anyhow::{Context, Result};
use shipline::action::{ActionConfig, ActionRegistry};
use shipline::cli::commands::{HistoryCommand, ListCommand, PlanCommand, RunCommand, ValidateCommand};
use shipline::cli::output::*;
use shipline::cli::{Cli, Command};
use shipline::core::{config::PipelineConfig, secret::EnvSecretStore, ExecutionStatus, Pipeline};
use shipline::execution::{plan, ExecutionEngine, ExecutionEvent};
#[cfg(feature = "sqlite")]
use shipline::persistence::SqliteExecutionStore;
use shipline::persistence::{create_summary, InMemoryPersistence, PersistenceBackend, RunSummary};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    let ok = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Plan(cmd) => plan_pipeline(cmd)?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::List(cmd) => list_pipelines(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Load a pipeline and apply `--var` overrides
fn load_pipeline(file: &str, overrides: &[(String, String)]) -> Result<Pipeline> {
    let config = PipelineConfig::from_file(file).context("Failed to load pipeline config")?;
    let mut pipeline = config.to_pipeline()?;

    for (key, value) in overrides {
        pipeline.variables.insert(key.clone(), value.clone());
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    Ok(pipeline)
}

async fn history_store() -> Result<Arc<dyn PersistenceBackend>> {
    #[cfg(feature = "sqlite")]
    {
        Ok(Arc::new(SqliteExecutionStore::with_default_path().await?))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

async fn run_pipeline(cmd: &RunCommand) -> Result<bool> {
    let mut pipeline = load_pipeline(&cmd.file, &cmd.variable)?;
    let run = cmd.event.to_run();

    println!("{} Loaded pipeline: {}", INFO, style(&pipeline.name).bold());
    if cmd.dry_run {
        println!("{} Dry run: no capability will be invoked", WARN);
    }

    // Set up persistence
    let store: Arc<dyn PersistenceBackend> = if cmd.no_history || cmd.dry_run {
        Arc::new(InMemoryPersistence::new())
    } else {
        history_store().await?
    };

    let registry = ActionRegistry::with_builtins(&ActionConfig::default())?;
    let engine = ExecutionEngine::new(registry, Arc::new(EnvSecretStore::new())).with_dry_run(cmd.dry_run);

    // Console output above a progress bar over stages
    let progress = create_progress_bar(pipeline.stages.len());
    let bar = progress.clone();
    engine
        .add_event_handler(move |event| {
            bar.println(format_execution_event(&event));
            match event {
                ExecutionEvent::StageSucceeded { .. }
                | ExecutionEvent::StageFailed { .. }
                | ExecutionEvent::StageSkipped { .. } => bar.inc(1),
                ExecutionEvent::RunCompleted { .. } => bar.finish_and_clear(),
                _ => {}
            }
        })
        .await;

    println!();
    let result = engine.execute(&mut pipeline, &run).await;
    progress.finish_and_clear();

    let status = match result {
        Ok(status) => status,
        Err(e) => {
            println!("\n{} {} {}", CROSS, style(&pipeline.name).bold(), style("failed").red());
            error!("{}", e);
            return Ok(false);
        }
    };

    // Save to history
    if !cmd.no_history && !cmd.dry_run {
        let summary = create_summary(&pipeline, &run);
        store.save_run(&summary).await?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&summary.run_id.to_string()[..8]).dim()
        );
    }

    println!("{}", style(separator()).dim());
    match status {
        ExecutionStatus::Completed => {
            println!(
                "{} {} completed {}",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green()
            );
            Ok(true)
        }
        ExecutionStatus::Skipped => {
            println!(
                "{} {} not triggered by {} on {}",
                SKIP,
                style(&pipeline.name).bold(),
                run.event(),
                style(run.branch()).cyan()
            );
            Ok(true)
        }
        _ => {
            println!("{} {} {}", CROSS, style(&pipeline.name).bold(), style("failed").red());
            Ok(false)
        }
    }
}

fn plan_pipeline(cmd: &PlanCommand) -> Result<bool> {
    let pipeline = load_pipeline(&cmd.file, &cmd.variable)?;
    let run = cmd.event.to_run();
    let plan = plan(&pipeline, &run);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{}", format_plan(&plan));
    }
    Ok(true)
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<bool> {
    println!("{} Validating pipeline...", INFO);

    let result = PipelineConfig::from_file(&cmd.file).and_then(|config| {
        let pipeline = config.to_pipeline()?;
        let registry = ActionRegistry::with_builtins(&ActionConfig::default())?;
        ExecutionEngine::new(registry, Arc::new(EnvSecretStore::new())).preflight(&pipeline)?;
        Ok((config, pipeline))
    });

    match result {
        Ok((config, pipeline)) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Stages: {}", style(pipeline.execution_order().join(" -> ")).cyan());
            println!(
                "  Steps: {}",
                style(pipeline.stages.values().map(|s| s.steps.len()).sum::<usize>()).cyan()
            );
            println!("  Variables: {}", style(pipeline.variables.len()).cyan());
            match pipeline.trigger.rules() {
                None => println!("  Trigger: {}", style("every event").dim()),
                Some(rules) => {
                    for rule in rules {
                        let branches: Vec<&str> = rule.branches.iter().map(|b| b.as_str()).collect();
                        let branches = if branches.is_empty() {
                            "any branch".to_string()
                        } else {
                            branches.join(", ")
                        };
                        println!("  Trigger: {} on {}", rule.event, style(branches).cyan());
                    }
                }
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(true)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            Ok(false)
        }
    }
}

async fn list_pipelines(cmd: &ListCommand) -> Result<bool> {
    let store = history_store().await?;
    let pipelines = store.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{} No pipelines found in history", INFO);
        return Ok(true);
    }

    if cmd.json {
        let mut json_data = Vec::new();
        for pipeline in &pipelines {
            let runs = store.list_runs(pipeline).await?;
            json_data.push(serde_json::json!({
                "name": pipeline,
                "run_count": runs.len(),
            }));
        }
        let data = serde_json::json!({ "pipelines": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    println!("{} Pipelines in history:", INFO);

    for pipeline_name in &pipelines {
        if cmd.with_counts {
            let runs = store.list_runs(pipeline_name).await?;
            let completed = runs.iter().filter(|r| r.status == ExecutionStatus::Completed).count();
            let failed = runs.iter().filter(|r| r.status == ExecutionStatus::Failed).count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(pipeline_name).bold(),
                style(runs.len()).cyan(),
                style(completed).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    Ok(true)
}

async fn show_history(cmd: &HistoryCommand) -> Result<bool> {
    let store = history_store().await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.details)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(true);
    }

    let mut runs = match &cmd.pipeline {
        Some(pipeline_name) => store.list_runs(pipeline_name).await?,
        None => {
            let mut all_runs = Vec::new();
            for pipeline in store.list_pipelines().await? {
                all_runs.extend(store.list_runs(&pipeline).await?);
            }
            all_runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all_runs
        }
    };
    runs.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(true);
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }

    Ok(true)
}

fn print_run_details(summary: &RunSummary, details: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Event: {} on {} ({})", summary.event, summary.git_ref, style(&summary.sha).dim());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Stages: {} total, {} succeeded, {} failed, {} skipped ({})",
        summary.total_stages,
        style(summary.succeeded_stages).green(),
        style(summary.failed_stages).red(),
        style(summary.skipped_stages).dim(),
        style(format!("{:.0}%", summary.progress * 100.0)).cyan()
    );

    if details {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
