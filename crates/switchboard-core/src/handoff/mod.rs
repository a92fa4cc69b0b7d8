//! Delegation of a turn from one agent to another as a sub-run.

pub mod arena;
pub mod router;

pub use arena::{RunArena, RunLink};
pub use router::{DelegationError, DelegationOutcome, HandoffRouter, SubRunExecutor};
