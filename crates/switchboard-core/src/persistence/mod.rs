//! Process-wide persistence gateway.
//!
//! All engine writes go through [`PersistenceGateway`]: queued per run,
//! executed in submission order by a bounded worker pool, and retried on
//! transient storage errors.

pub mod gateway;
pub mod retry;

pub use gateway::{PersistenceGateway, WriteOp};
pub use retry::RetryPolicy;
