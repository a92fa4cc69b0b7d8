//! REST API under `/api/v1`.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
