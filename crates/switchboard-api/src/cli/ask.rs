//! `swbd ask`: run one turn in-process and print its events as they
//! arrive. Ctrl+C requests cancellation and keeps reading until the run
//! reports its final status.

use std::io::Write;

use anyhow::{Result, bail};
use console::style;
use uuid::Uuid;

use switchboard_types::event::RunEvent;
use switchboard_types::run::RunStatus;
use switchboard_types::step::StepPayload;

use super::run::describe_step;
use crate::state::AppState;

pub async fn ask(state: &AppState, thread_id: Uuid, message: &str, json: bool) -> Result<()> {
    let started = state.coordinator.start_run(thread_id, message).await?;
    let root = started.run.id;
    let mut stream = started.stream;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;

    let mut printer = EventPrinter::new(root, json);
    loop {
        tokio::select! {
            event = stream.next_event() => match event {
                Some(event) => printer.print(&event)?,
                None => break,
            },
            signal = &mut ctrl_c, if !cancel_requested => {
                cancel_requested = true;
                if signal.is_ok() {
                    state.coordinator.cancel_run(root).await?;
                    if !json {
                        eprintln!("\n  {} cancelling run {root}...", style("!").yellow().bold());
                    }
                }
            }
        }
    }

    let status = started.completion.await?;
    tracing::debug!(run_id = %root, %status, "ask finished");
    if status == RunStatus::Failed {
        bail!("run {root} failed");
    }
    Ok(())
}

/// Renders events either as raw NDJSON or as styled terminal output.
struct EventPrinter {
    root: Uuid,
    json: bool,
    /// Whether the cursor sits mid-line after streamed tokens.
    mid_line: bool,
}

impl EventPrinter {
    fn new(root: Uuid, json: bool) -> Self {
        Self {
            root,
            json,
            mid_line: false,
        }
    }

    fn print(&mut self, event: &RunEvent) -> Result<()> {
        let mut out = std::io::stdout().lock();
        if self.json {
            write!(out, "{}", event.to_ndjson_line()?)?;
            out.flush()?;
            return Ok(());
        }

        let nested = event.run_id() != self.root;
        match event {
            RunEvent::Token { text, .. } => {
                write!(out, "{text}")?;
                self.mid_line = true;
            }
            RunEvent::Trace { step, .. } => {
                self.end_line(&mut out)?;
                let marker = match step.payload {
                    StepPayload::ToolCall(_) => style("→ tool").cyan(),
                    StepPayload::ToolCallResult(_) => style("← result").cyan(),
                    StepPayload::Handoff(_) => style("↪ handoff").magenta(),
                    _ => style("·").dim(),
                };
                let indent = if nested { "    " } else { "  " };
                writeln!(out, "{indent}{marker} {}", style(describe_step(step)).dim())?;
            }
            RunEvent::Error { message, .. } => {
                self.end_line(&mut out)?;
                writeln!(out, "  {} {}", style("✗").red().bold(), style(message).red())?;
            }
            RunEvent::Done { run_id, status } => {
                self.end_line(&mut out)?;
                if nested {
                    writeln!(out, "    {}", style(format!("sub-run {run_id} {status}")).dim())?;
                } else {
                    let status_text = match status {
                        RunStatus::Completed => style(status.to_string()).green(),
                        RunStatus::Failed => style(status.to_string()).red(),
                        _ => style(status.to_string()).yellow(),
                    };
                    writeln!(out, "\n  {} {status_text}", style("done").bold())?;
                }
            }
        }
        out.flush()?;
        Ok(())
    }

    fn end_line(&mut self, out: &mut impl Write) -> Result<()> {
        if self.mid_line {
            writeln!(out)?;
            self.mid_line = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    #[tokio::test]
    async fn test_ask_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            &[("it-support", "{\"event\":\"token\",\"data\":{\"text\":\"hi\"}}\n{\"event\":\"run_end\"}\n")],
        )
        .await;
        let thread = state.threads.create_thread("it-support", None).await.unwrap();

        ask(&state, thread.id, "hello", true).await.unwrap();

        let runs = state.coordinator.list_runs(thread.id).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Completed);
        let thread = state.threads.get_thread(thread.id).await.unwrap();
        assert_eq!(thread.title.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_ask_reports_failed_run() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            &[("it-support", "{\"event\":\"error\",\"data\":{\"message\":\"model overloaded\"}}\n")],
        )
        .await;
        let thread = state.threads.create_thread("it-support", None).await.unwrap();

        let err = ask(&state, thread.id, "hello", true).await.unwrap_err();
        assert!(err.to_string().contains("failed"));
    }
}
