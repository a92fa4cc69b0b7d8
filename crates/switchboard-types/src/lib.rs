//! Shared domain types for Switchboard.
//!
//! This crate contains the core domain types used across the engine:
//! Thread, Run, Step (and its tool/handoff payloads), the raw runtime event
//! shape, the client-facing stream event, configuration, and error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod run;
pub mod runtime;
pub mod step;
pub mod thread;
