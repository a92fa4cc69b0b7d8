//! Thread management.

pub mod service;

pub use service::{ThreadService, ThreadUpdate};
