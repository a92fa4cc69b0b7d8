//! Switchboard CLI and REST API entry point.
//!
//! Binary name: `swbd`
//!
//! Parses CLI arguments, installs tracing, opens the database and agent
//! registry, then dispatches to a command handler or starts the server.

mod cli;
mod http;
mod state;

use anyhow::Context;
use clap::Parser;

use switchboard_observe::tracing_setup::{init_tracing, shutdown_tracing, verbosity_filter};
use switchboard_types::thread::ThreadStatus;

use cli::{Cli, Commands, RunCommand, ThreadCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(verbosity_filter(cli.verbose, cli.quiet), cli.otel) {
        eprintln!("warning: failed to initialize tracing: {e}");
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;
    let json = cli.json;

    match cli.command {
        Commands::Serve { port, host } => serve(state, &host, port).await?,

        Commands::Agents => cli::agent::list_agents(&state, json)?,

        Commands::Thread { action } => match action {
            ThreadCommand::Create { agent, title } => {
                cli::thread::create_thread(&state, &agent, title, json).await?;
            }
            ThreadCommand::List { agent } => {
                cli::thread::list_threads(&state, agent.as_deref(), json).await?;
            }
            ThreadCommand::Show { id } => cli::thread::show_thread(&state, id, json).await?,
            ThreadCommand::Rename { id, title } => {
                cli::thread::rename_thread(&state, id, &title, json).await?;
            }
            ThreadCommand::Archive { id } => {
                cli::thread::set_status(&state, id, ThreadStatus::Archived, json).await?;
            }
            ThreadCommand::Unarchive { id } => {
                cli::thread::set_status(&state, id, ThreadStatus::Active, json).await?;
            }
            ThreadCommand::Delete { id } => {
                cli::thread::set_status(&state, id, ThreadStatus::Deleted, json).await?;
            }
        },

        Commands::Ask { thread, message } => cli::ask::ask(&state, thread, &message, json).await?,

        Commands::Run { action } => match action {
            RunCommand::Show { run_id, events } => {
                cli::run::show_run(&state, run_id, events, json).await?;
            }
            RunCommand::List { thread } => cli::run::list_runs(&state, thread, json).await?,
        },
    }

    Ok(())
}

/// Recover runs a previous server left unfinished, then serve until
/// Ctrl+C or SIGTERM.
///
/// Recovery only happens here: a one-off CLI command sharing the database
/// with a live server must not fail the server's in-flight runs.
async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let recovered = state.coordinator.recover_interrupted_runs().await?;
    if recovered > 0 {
        tracing::warn!(recovered, "marked interrupted runs as failed");
    }

    tracing::info!(
        agents = state.coordinator.agents().len(),
        max_handoff_depth = state.config.max_handoff_depth,
        workers = state.config.persistence.workers,
        data_dir = %state.data_dir.display(),
        "engine ready"
    );

    let app = http::router::build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, "switchboard API listening");
    println!(
        "  {} Listening on {}",
        console::style("✓").green().bold(),
        console::style(format!("http://{addr}")).cyan()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM. A handler that cannot be installed never
/// fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
