use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::json;

use crate::state::AppState;

/// List agents registered from `config.toml`.
pub fn list_agents(state: &AppState, json: bool) -> Result<()> {
    let agents: Vec<_> = state.coordinator.agents().list().collect();

    if json {
        let rows: Vec<_> = agents
            .iter()
            .map(|a| {
                json!({
                    "id": a.id,
                    "description": a.description,
                    "supports_cancellation": a.runtime.supports_cancellation(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if agents.is_empty() {
        println!();
        println!(
            "  {} No agents configured. Add [[agents]] entries to {}",
            style("i").blue().bold(),
            style(state.data_dir.join("config.toml").display()).yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Agent").fg(Color::White),
        Cell::new("Description").fg(Color::White),
        Cell::new("Cancellable").fg(Color::White),
    ]);
    for agent in &agents {
        let cancellable = if agent.runtime.supports_cancellation() {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&agent.id).fg(Color::Cyan),
            Cell::new(&agent.description).fg(Color::White),
            cancellable,
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
