//! Normalization of raw runtime events into typed step payloads.

pub mod extractor;

pub use extractor::{Extraction, HandoffRequest, TraceExtractor};
