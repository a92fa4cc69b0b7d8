//! Per-run step ledger and the live trace hub it notifies.

pub mod hub;
pub mod step_ledger;

pub use hub::{TraceHub, TraceNotice};
pub use step_ledger::{LedgerError, StepLedger};
