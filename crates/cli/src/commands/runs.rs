//! `orchestrator runs`: list, show and delete stored runs.

use chrono::Local;
use orchestrator_config::AppConfig;
use orchestrator_core::run::{Step, StepKind};
use orchestrator_gateway::open_store;
use orchestrator_store::{MAX_LIST_LIMIT, RunFilter};

pub async fn list(config: AppConfig, limit: u32) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&config).await?;
    let filter = RunFilter {
        limit: limit.clamp(1, MAX_LIST_LIMIT),
        ..RunFilter::default()
    };
    let runs = store.list_runs(&filter).await?;

    if runs.is_empty() {
        println!("No runs yet.");
        return Ok(());
    }

    let stats = store.run_stats().await?;
    println!(
        "Runs ({} total, {} completed, {} failed, {} running)",
        stats.total, stats.completed, stats.failed, stats.running
    );
    for run in runs {
        println!(
            "  {:<12} {:<8} {:<10} {}  [{}]",
            run.short_name(),
            run.created_at.with_timezone(&Local).format("%I:%M %p"),
            run.status.display_name(),
            truncate(&run.user_query, 60),
            run.id
        );
    }
    Ok(())
}

pub async fn show(config: AppConfig, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&config).await?;
    let run = store
        .get_run(id)
        .await?
        .ok_or_else(|| format!("Run '{id}' not found"))?;

    println!("{} ({})", run.short_name(), run.status.display_name());
    println!("   Query:   {}", run.user_query);
    println!(
        "   Started: {}",
        run.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(done) = run.completed_at {
        println!(
            "   Ended:   {}",
            done.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
    for step in &run.steps {
        println!("{}", format_step(step));
    }
    Ok(())
}

pub async fn delete(config: AppConfig, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&config).await?;
    if !store.delete_run(id).await? {
        return Err(format!("Run '{id}' not found").into());
    }
    println!("Deleted run {id}");
    Ok(())
}

/// One line per step: order, kind, then the kind-specific payload.
pub fn format_step(step: &Step) -> String {
    let body = match step.kind {
        StepKind::UserRequest | StepKind::AgentThought | StepKind::AgentResponse => {
            step.text().unwrap_or_default().to_string()
        }
        StepKind::ToolCall => {
            let params = step
                .params()
                .map(|p| match p.as_str() {
                    Some(raw) => raw.to_string(),
                    None => p.to_string(),
                })
                .unwrap_or_default();
            format!("{}({params})", step.tool_name().unwrap_or("?"))
        }
        StepKind::ToolResult => format!(
            "{} -> {}",
            step.tool_name().unwrap_or("?"),
            step.result().unwrap_or_default()
        ),
    };
    format!("  [{:>2}] {:<15} {body}", step.order, step.kind.as_str())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}
