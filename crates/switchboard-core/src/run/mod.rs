//! Run lifecycle: busy leases, the execution pipeline, and the coordinator.

pub mod coordinator;
pub mod lease;
pub mod pipeline;
pub mod scope;

pub use coordinator::{RunCoordinator, StartedRun};
pub use lease::{ThreadLease, ThreadLeases};
pub use pipeline::RunPipeline;
pub use scope::RunScope;
