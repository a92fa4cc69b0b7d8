//! Route handlers. Each parses path ids, calls into the engine, and wraps
//! the result in the response envelope.

pub mod agent;
pub mod run;
pub mod thread;

use uuid::Uuid;

use super::error::AppError;

/// Parse a path segment as a UUID (400 on failure).
pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, AppError> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("invalid id: '{raw}'")))
}

/// Request id and elapsed-time helper for one request.
pub(crate) struct RequestClock {
    pub request_id: String,
    started: std::time::Instant,
}

impl RequestClock {
    pub fn start() -> Self {
        Self {
            request_id: Uuid::now_v7().to_string(),
            started: std::time::Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uuid() {
        let id = Uuid::now_v7();
        assert_eq!(parse_uuid(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_uuid("not-a-uuid"), Err(AppError::Validation(_))));
    }
}
