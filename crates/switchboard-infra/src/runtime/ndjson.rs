//! Line framing for newline-delimited JSON bodies.

use switchboard_types::error::RuntimeError;
use switchboard_types::runtime::RawEvent;

/// Accumulates body chunks and yields complete lines.
///
/// A line may span any number of chunks; a chunk may hold many lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line (without the newline).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            lines.push(line);
        }
        lines
    }

    /// Whatever follows the last newline once the body has ended.
    pub fn finish(self) -> Option<Vec<u8>> {
        (!self.buffer.is_empty()).then_some(self.buffer)
    }
}

/// Decode one line into a raw event. Blank lines yield `None`.
pub fn parse_line(line: &[u8]) -> Result<Option<RawEvent>, RuntimeError> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(trimmed)
        .map(Some)
        .map_err(|e| RuntimeError::Decode(format!("{e}: {}", String::from_utf8_lossy(trimmed))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(br#"{"event":"tok"#).is_empty());
        let lines = buf.push(b"en\"}\n{\"event\":\"run_end\"}\n{\"ev");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], br#"{"event":"token"}"#.to_vec());
        assert_eq!(buf.finish(), Some(br#"{"ev"#.to_vec()));
    }

    #[test]
    fn test_finish_empty() {
        let mut buf = LineBuffer::new();
        buf.push(b"{}\n");
        assert!(buf.finish().is_none());
    }

    #[test]
    fn test_parse_line_handles_crlf_and_blank() {
        assert!(parse_line(b"  \r").unwrap().is_none());
        let event = parse_line(b"{\"event\":\"run_end\"}\r").unwrap().unwrap();
        assert_eq!(event.event, "run_end");
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        let err = parse_line(b"not json").unwrap_err();
        assert!(matches!(err, RuntimeError::Decode(ref m) if m.contains("not json")));
    }
}
