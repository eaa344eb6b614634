//! CLI output formatting

use crate::{
    core::ExecutionStatus,
    execution::{ExecutionEvent, RunPlan},
    persistence::RunSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar over stages
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Horizontal rule spanning the terminal width
pub fn separator() -> String {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
    "─".repeat(width.min(120))
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Skipped => SKIP,
        ExecutionStatus::Pending => INFO,
    };

    format!(
        "{} {} - {} - {} {} - {} ({} ok, {} failed, {} skipped)",
        status_icon,
        style(short_id(&summary.run_id.to_string())).dim(),
        style(&summary.pipeline_name).bold(),
        summary.event,
        style(&summary.branch).cyan(),
        format_status(summary.status),
        summary.succeeded_stages,
        summary.failed_stages,
        summary.skipped_stages,
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunTriggered {
            run_id,
            pipeline_name,
            event,
            branch,
            total_stages,
        } => format!(
            "{} Running {} for {} on {} ({} stages, {})",
            ROCKET,
            style(pipeline_name).bold(),
            event,
            style(branch).cyan(),
            total_stages,
            style(short_id(&run_id.to_string())).dim()
        ),
        ExecutionEvent::RunNotTriggered {
            pipeline_name,
            event,
            branch,
            ..
        } => format!(
            "{} {} is not triggered by {} on {}",
            SKIP,
            style(pipeline_name).bold(),
            event,
            style(branch).cyan()
        ),
        ExecutionEvent::StageStarted { stage_id } => {
            format!("{} Stage {}", SPINNER, style(stage_id).cyan().bold())
        }
        ExecutionEvent::StageSkipped { stage_id, reason } => format!(
            "{} Stage {} skipped: {}",
            SKIP,
            style(stage_id).dim(),
            style(reason).dim()
        ),
        ExecutionEvent::StageSucceeded { stage_id } => {
            format!("{} Stage {}", CHECK, style(stage_id).green())
        }
        ExecutionEvent::StageFailed {
            stage_id,
            step,
            error,
        } => format!(
            "{} Stage {} failed at {}: {}",
            CROSS,
            style(stage_id).red(),
            style(step).bold(),
            style(error).dim()
        ),
        ExecutionEvent::StepStarted {
            stage_id,
            step,
            uses,
        } => format!(
            "   {} {}/{} ({})",
            SPINNER,
            style(stage_id).dim(),
            style(step).cyan(),
            style(uses).dim()
        ),
        ExecutionEvent::StepSucceeded { step, output, .. } => {
            format!("   {} {}: {}", CHECK, style(step).green(), format_output(output, 3))
        }
        ExecutionEvent::StepFailed { step, error, .. } => {
            format!("   {} {}: {}", CROSS, style(step).red(), style(error).dim())
        }
        ExecutionEvent::StepSkipped { step, reason, .. } => {
            format!("   {} {}: {}", SKIP, style(step).dim(), style(reason).dim())
        }
        ExecutionEvent::RunCompleted { run_id, status } => format!(
            "{} Run {} {}",
            INFO,
            style(short_id(&run_id.to_string())).dim(),
            format_status(*status)
        ),
    }
}

/// Format a plan for display
pub fn format_plan(plan: &RunPlan) -> String {
    let mut lines = vec![format!(
        "{} Plan for {} on {} ({})",
        INFO,
        style(&plan.pipeline).bold(),
        style(&plan.git_ref).cyan(),
        plan.event
    )];

    if !plan.triggered {
        lines.push(format!("{} Not triggered; nothing would run", SKIP));
    }

    for stage in &plan.stages {
        match &stage.reason {
            None => lines.push(format!("{} {}", CHECK, style(&stage.id).green().bold())),
            Some(reason) => lines.push(format!(
                "{} {} ({})",
                SKIP,
                style(&stage.id).dim(),
                style(reason).dim()
            )),
        }

        if !stage.runs {
            continue;
        }
        for step in &stage.steps {
            match &step.reason {
                None => lines.push(format!(
                    "   {} {} ({})",
                    CHECK,
                    style(&step.name).green(),
                    style(&step.uses).dim()
                )),
                Some(reason) => lines.push(format!(
                    "   {} {} ({})",
                    SKIP,
                    style(&step.name).dim(),
                    style(reason).dim()
                )),
            }
        }
    }

    lines.join("\n")
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

/// Format a duration as `1h 2m 3s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
