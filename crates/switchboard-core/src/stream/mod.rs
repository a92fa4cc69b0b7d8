//! Client-facing event streams, live and replayed.

pub mod streamer;

pub use streamer::{EventStreamer, RunTrace};
