//! Run inspection commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use switchboard_types::run::{Run, RunStatus};
use switchboard_types::step::{Step, StepPayload, ToolResultStatus};

use crate::state::AppState;

pub(crate) fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn run_status_cell(status: RunStatus) -> Cell {
    let color = match status {
        RunStatus::Pending | RunStatus::Streaming => Color::Yellow,
        RunStatus::Completed => Color::Green,
        RunStatus::Failed => Color::Red,
        RunStatus::Cancelled => Color::DarkGrey,
    };
    Cell::new(status).fg(color)
}

/// One-line human description of a step.
pub(crate) fn describe_step(step: &Step) -> String {
    match &step.payload {
        StepPayload::ModelCall { text } => text.clone(),
        StepPayload::ToolCall(call) => format!("{}({}) [{}]", call.tool_name, call.arguments, call.call_id),
        StepPayload::ToolCallResult(result) => {
            let outcome = match (&result.status, &result.error, &result.output) {
                (ToolResultStatus::Orphaned, _, _) => "orphaned: no result before the run ended".to_string(),
                (_, Some(error), _) => format!("error: {error}"),
                (_, None, Some(output)) => output.to_string(),
                (_, None, None) => "ok".to_string(),
            };
            match result.latency_ms {
                Some(ms) => format!("[{}] {outcome} ({ms} ms)", result.call_id),
                None => format!("[{}] {outcome}", result.call_id),
            }
        }
        StepPayload::Handoff(handoff) => format!(
            "{} -> {} (run {}): {}",
            handoff.source_agent_id, handoff.target_agent_id, handoff.child_run_id, handoff.reason
        ),
        StepPayload::Error { message } => message.clone(),
    }
}

pub(crate) fn runs_table(runs: &[Run]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Run").fg(Color::White),
        Cell::new("Agent").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Started").fg(Color::White),
        Cell::new("Input").fg(Color::White),
    ]);
    for run in runs {
        let input: String = run.input.chars().take(40).collect();
        table.add_row(vec![
            Cell::new(run.id).fg(Color::DarkGrey),
            Cell::new(&run.agent_id).fg(Color::Cyan),
            run_status_cell(run.status),
            Cell::new(format_time(&run.started_at)).fg(Color::DarkGrey),
            Cell::new(input).fg(Color::White),
        ]);
    }
    table
}

pub async fn list_runs(state: &AppState, thread_id: Uuid, json: bool) -> Result<()> {
    let runs = state.coordinator.list_runs(thread_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    println!();
    if runs.is_empty() {
        println!("  {}", style("No runs yet.").dim());
    } else {
        println!("{}", runs_table(&runs));
    }
    println!();
    Ok(())
}

/// Show a run and its steps, or (`events`) its replayed NDJSON stream.
pub async fn show_run(state: &AppState, run_id: Uuid, events: bool, json: bool) -> Result<()> {
    if events {
        for event in state.coordinator.replay(run_id).await? {
            print!("{}", event.to_ndjson_line()?);
        }
        return Ok(());
    }

    let detail = state.coordinator.get_run(run_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let run = &detail.run;
    println!();
    println!("  {}  {}", style("Run").bold(), style(run.id).cyan());
    println!("  {:<9}{}", "Thread", run.thread_id);
    println!("  {:<9}{}", "Agent", style(&run.agent_id).cyan());
    println!("  {:<9}{}", "Status", run.status);
    println!("  {:<9}{}", "Depth", run.depth);
    if let Some(parent) = run.parent_run_id {
        println!("  {:<9}{}", "Parent", parent);
    }
    println!("  {:<9}{}", "Started", format_time(&run.started_at));
    if let Some(ended) = &run.ended_at {
        println!("  {:<9}{}", "Ended", format_time(ended));
    }
    if let Some(error) = &run.error {
        println!("  {:<9}{}", "Error", style(error).red());
    }
    println!();

    if detail.steps.is_empty() {
        println!("  {}", style("No steps recorded.").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Detail").fg(Color::White),
    ]);
    for step in &detail.steps {
        let kind_color = match step.payload {
            StepPayload::Error { .. } => Color::Red,
            StepPayload::Handoff(_) => Color::Magenta,
            StepPayload::ModelCall { .. } => Color::White,
            _ => Color::Cyan,
        };
        table.add_row(vec![
            Cell::new(step.sequence).fg(Color::DarkGrey),
            Cell::new(step.kind()).fg(kind_color),
            Cell::new(describe_step(step)),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_types::step::{ToolCall, ToolResult};

    #[test]
    fn test_describe_tool_steps() {
        let run_id = Uuid::now_v7();
        let call = Step::new(
            run_id,
            0,
            StepPayload::ToolCall(ToolCall {
                call_id: "c1".to_string(),
                tool_name: "search_docs".to_string(),
                arguments: json!({"query": "vpn issue"}),
            }),
        );
        assert_eq!(describe_step(&call), r#"search_docs({"query":"vpn issue"}) [c1]"#);

        let orphan = Step::new(run_id, 1, StepPayload::ToolCallResult(ToolResult::orphaned("c1")));
        assert!(describe_step(&orphan).contains("orphaned"));

        let failed = Step::new(
            run_id,
            2,
            StepPayload::ToolCallResult(ToolResult {
                call_id: "c2".to_string(),
                output: None,
                error: Some("timeout".to_string()),
                latency_ms: Some(12),
                status: ToolResultStatus::Matched,
            }),
        );
        assert_eq!(describe_step(&failed), "[c2] error: timeout (12 ms)");
    }
}
