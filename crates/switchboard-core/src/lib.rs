//! Agent execution and trace streaming engine for Switchboard.
//!
//! This crate defines the storage and runtime "ports" (the `RunStore` and
//! `AgentRuntime` traits) that the infrastructure layer implements, and the
//! engine built on them: trace extraction, the per-run step ledger, live
//! event streaming, the persistence gateway, handoff routing, and run
//! coordination. It depends only on `switchboard-types` -- never on
//! `switchboard-infra` or any database/IO crate.

pub mod handoff;
pub mod ledger;
pub mod persistence;
pub mod repository;
pub mod run;
pub mod runtime;
pub mod stream;
pub mod thread;
pub mod trace;
