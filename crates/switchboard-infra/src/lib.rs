//! Infrastructure layer for Switchboard.
//!
//! Contains implementations of the ports defined in `switchboard-core`:
//! the SQLite `RunStore`, the HTTP and script-file agent runtimes, and the
//! `config.toml` loader that wires agents into an `AgentRegistry`.

pub mod config;
pub mod runtime;
pub mod sqlite;
