//! Thread commands: create, list, show, rename, archive, delete.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use switchboard_types::thread::{Thread, ThreadStatus};

use super::run::{format_time, runs_table};
use crate::state::AppState;

fn status_cell(status: ThreadStatus) -> Cell {
    match status {
        ThreadStatus::Active => Cell::new("active").fg(Color::Green),
        ThreadStatus::Archived => Cell::new("archived").fg(Color::Yellow),
        ThreadStatus::Deleted => Cell::new("deleted").fg(Color::Red),
    }
}

fn title_of(thread: &Thread) -> String {
    let title = thread.title.as_deref().unwrap_or("(untitled)");
    if title.chars().count() > 40 {
        let head: String = title.chars().take(37).collect();
        format!("{head}...")
    } else {
        title.to_string()
    }
}

fn print_thread(thread: &Thread, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(thread)?);
        return Ok(());
    }
    println!();
    println!("  {}  {}", style("Thread").bold(), style(thread.id).cyan());
    println!("  {:<9}{}", "Agent", style(&thread.agent_id).cyan());
    println!("  {:<9}{}", "Title", title_of(thread));
    println!("  {:<9}{}", "Status", thread.status);
    println!("  {:<9}{}", "Created", format_time(&thread.created_at));
    println!("  {:<9}{}", "Updated", format_time(&thread.updated_at));
    Ok(())
}

pub async fn create_thread(state: &AppState, agent: &str, title: Option<String>, json: bool) -> Result<()> {
    let thread = state.threads.create_thread(agent, title).await?;
    if json {
        return print_thread(&thread, true);
    }
    println!();
    println!(
        "  {} Created thread {} for '{}'",
        style("✓").green().bold(),
        style(thread.id).cyan(),
        style(&thread.agent_id).cyan()
    );
    println!(
        "  Send a message with: {}",
        style(format!("swbd ask {} \"...\"", thread.id)).yellow()
    );
    println!();
    Ok(())
}

pub async fn list_threads(state: &AppState, agent: Option<&str>, json: bool) -> Result<()> {
    let threads = state.threads.list_threads(agent).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&threads)?);
        return Ok(());
    }

    if threads.is_empty() {
        println!();
        println!(
            "  {} No threads yet. Create one with: {}",
            style("i").blue().bold(),
            style("swbd thread create <agent>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Id").fg(Color::White),
        Cell::new("Title").fg(Color::White),
        Cell::new("Agent").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);
    for thread in &threads {
        table.add_row(vec![
            Cell::new(thread.id).fg(Color::DarkGrey),
            Cell::new(title_of(thread)).fg(Color::Cyan),
            Cell::new(&thread.agent_id).fg(Color::White),
            status_cell(thread.status),
            Cell::new(format_time(&thread.updated_at)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} thread{}",
        style(threads.len()).bold(),
        if threads.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

pub async fn show_thread(state: &AppState, id: Uuid, json: bool) -> Result<()> {
    let thread = state.threads.get_thread(id).await?;
    let runs = state.coordinator.list_runs(id).await?;

    if json {
        let value = serde_json::json!({ "thread": thread, "runs": runs });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_thread(&thread, false)?;
    println!();
    if runs.is_empty() {
        println!("  {}", style("No runs yet.").dim());
    } else {
        println!("{}", runs_table(&runs));
    }
    println!();
    Ok(())
}

pub async fn rename_thread(state: &AppState, id: Uuid, title: &str, json: bool) -> Result<()> {
    let thread = state.threads.rename(id, title).await?;
    report(&thread, "Renamed", json)
}

/// Archive, unarchive, or soft-delete.
pub async fn set_status(state: &AppState, id: Uuid, status: ThreadStatus, json: bool) -> Result<()> {
    let (thread, verb) = match status {
        ThreadStatus::Archived => (state.threads.archive(id).await?, "Archived"),
        ThreadStatus::Active => (state.threads.unarchive(id).await?, "Reactivated"),
        ThreadStatus::Deleted => (state.threads.delete(id).await?, "Deleted"),
    };
    report(&thread, verb, json)
}

fn report(thread: &Thread, verb: &str, json: bool) -> Result<()> {
    if json {
        return print_thread(thread, true);
    }
    println!(
        "  {} {verb} thread {} ({})",
        style("✓").green().bold(),
        style(thread.id).cyan(),
        title_of(thread)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_of_truncates_long_titles() {
        let mut thread = Thread::new("it-support", None);
        assert_eq!(title_of(&thread), "(untitled)");
        thread.title = Some("é".repeat(50));
        let shown = title_of(&thread);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), 40);
    }
}
