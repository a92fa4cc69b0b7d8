//! Storage port for threads, runs, and steps.

pub mod memory;
pub mod run_store;

pub use memory::InMemoryRunStore;
pub use run_store::RunStore;
