//! Incremental SSE line decoding.
//!
//! Each record on the wire is one `data: <json>` line. Chunks arrive on
//! arbitrary byte boundaries, so bytes are buffered until a `\n` and only
//! complete lines are decoded as UTF-8. A character split across two
//! chunks therefore decodes the same as if it had arrived whole.
//!
//! # Examples
//!
//! ```
//! use robotchat::stream::sse::{SseLineDecoder, record_payload};
//!
//! let mut decoder = SseLineDecoder::new();
//! assert!(decoder.push(b"data: {\"a\"").is_empty());
//! let lines = decoder.push(b":1}\r\n");
//! assert_eq!(lines, vec!["data: {\"a\":1}".to_string()]);
//! assert_eq!(record_payload(&lines[0]), Some("{\"a\":1}"));
//! ```

/// Prefix marking a record line.
pub const DATA_PREFIX: &str = "data: ";

/// Splits a byte stream into text lines.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.buffer);
                lines.push(decode_line(&raw));
            } else {
                self.buffer.push(byte);
            }
        }
        lines
    }

    /// Take the unterminated final line, if any. Call once the stream ends.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        Some(decode_line(&raw))
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// The JSON payload of a record line; `None` for anything else
/// (comments, `event:` fields, blank separators).
pub fn record_payload(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX)
}
