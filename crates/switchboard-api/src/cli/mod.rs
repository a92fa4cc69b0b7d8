//! CLI command definitions for the `swbd` binary.

pub mod agent;
pub mod ask;
pub mod run;
pub mod thread;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Run agents, stream their traces, and inspect past runs.
#[derive(Parser)]
#[command(name = "swbd", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "SWITCHBOARD_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        #[arg(long, default_value = "3000")]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// List configured agents.
    Agents,

    /// Manage threads.
    Thread {
        #[command(subcommand)]
        action: ThreadCommand,
    },

    /// Send a message on a thread and stream the run's events.
    Ask {
        /// Thread id.
        thread: Uuid,

        /// The user message.
        message: String,
    },

    /// Inspect runs.
    Run {
        #[command(subcommand)]
        action: RunCommand,
    },
}

#[derive(Subcommand)]
pub enum ThreadCommand {
    /// Create a thread bound to an agent.
    Create {
        /// Agent id from config.toml.
        agent: String,

        #[arg(long)]
        title: Option<String>,
    },

    /// List threads, most recently active first.
    #[command(alias = "ls")]
    List {
        /// Only threads of this agent.
        #[arg(long)]
        agent: Option<String>,
    },

    /// Show a thread and its runs.
    Show { id: Uuid },

    Rename { id: Uuid, title: String },

    /// Archive a thread (no new runs).
    Archive { id: Uuid },

    /// Reactivate an archived thread.
    Unarchive { id: Uuid },

    /// Soft-delete a thread.
    #[command(alias = "rm")]
    Delete { id: Uuid },
}

#[derive(Subcommand)]
pub enum RunCommand {
    /// Show a run with its steps.
    Show {
        run_id: Uuid,

        /// Print the replayed event stream as NDJSON instead.
        #[arg(long)]
        events: bool,
    },

    /// List the runs of a thread.
    #[command(alias = "ls")]
    List { thread: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask() {
        let thread = Uuid::now_v7();
        let id = thread.to_string();
        let cli = Cli::try_parse_from(["swbd", "ask", id.as_str(), "vpn keeps dropping", "-v"]).unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Ask { thread: parsed, message } => {
                assert_eq!(parsed, thread);
                assert_eq!(message, "vpn keeps dropping");
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_parse_thread_create_with_title() {
        let cli = Cli::try_parse_from(["swbd", "thread", "create", "it-support", "--title", "VPN"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Thread {
                action: ThreadCommand::Create { ref agent, title: Some(ref title) }
            } if agent == "it-support" && title == "VPN"
        ));
    }

    #[test]
    fn test_invalid_uuid_rejected() {
        assert!(Cli::try_parse_from(["swbd", "run", "show", "nope"]).is_err());
    }
}
