//! SQLite storage layer.
//!
//! The `RunStore` implementation backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod pool;
pub mod run_store;

pub use pool::DatabasePool;
pub use run_store::SqliteRunStore;
