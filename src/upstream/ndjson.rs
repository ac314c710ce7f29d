//! Newline-delimited JSON decoding for the Ollama generate protocol.
//!
//! The upstream emits one JSON object per line:
//! ```text
//! {"model":"llama3","response":"4","done":false}
//! {"model":"llama3","response":"","done":true,"eval_count":2}
//! ```
//! Lines arrive split arbitrarily across network reads, so bytes are buffered
//! until a newline completes them. Lines that are blank are ignored; lines that
//! do not decode to a JSON object are logged and skipped.

use bytes::{Buf, BytesMut};
use serde_json::Value;
use tracing::error;

use crate::upstream::Chunk;

/// Incremental line splitter and decoder.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: BytesMut,
    skipped: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a slice of body bytes, returning every chunk completed by it.
    pub fn push(&mut self, data: &[u8]) -> Vec<Chunk> {
        self.buf.extend_from_slice(data);

        let mut chunks = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos);
            self.buf.advance(1);
            if let Some(chunk) = self.decode_line(&line) {
                chunks.push(chunk);
            }
        }
        chunks
    }

    /// Flush a trailing line that had no terminating newline.
    pub fn finish(&mut self) -> Option<Chunk> {
        if self.buf.is_empty() {
            return None;
        }
        let line = self.buf.split();
        self.decode_line(&line)
    }

    /// Number of malformed lines dropped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<Chunk> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_slice::<Value>(line) {
            Ok(Value::Object(chunk)) => Some(chunk),
            Ok(other) => {
                self.skipped += 1;
                error!(value = %other, "Upstream line is not a JSON object, skipping");
                None
            }
            Err(e) => {
                self.skipped += 1;
                error!(
                    line = %String::from_utf8_lossy(line),
                    "Failed to decode JSON: {e}"
                );
                None
            }
        }
    }
}

/// Message of a chunk that reports an upstream failure, e.g.
/// `{"error":"model runner has unexpectedly stopped"}`.
pub fn error_message(chunk: &Chunk) -> Option<&str> {
    chunk.get("error").and_then(|v| v.as_str())
}

/// Decode a fully buffered body.
pub fn decode_body(body: &[u8]) -> Vec<Chunk> {
    let mut decoder = LineDecoder::new();
    let mut chunks = decoder.push(body);
    chunks.extend(decoder.finish());
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_reads() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(br#"{"response":"He"#).is_empty());

        let chunks = decoder.push(b"llo\"}\n{\"response\":\" world\"}\n");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0]["response"], "Hello");
        assert_eq!(chunks[1]["response"], " world");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_multibyte_char_split_across_reads() {
        let line = "{\"response\":\"héllo\"}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = LineDecoder::new();
        assert!(decoder.push(&line[..split]).is_empty());
        let chunks = decoder.push(&line[split..]);
        assert_eq!(chunks[0]["response"], "héllo");
    }

    #[test]
    fn test_blank_and_crlf_lines() {
        let chunks = decode_body(b"\r\n{\"a\":1}\r\n\n   \n{\"b\":2}");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0]["a"], 1);
        assert_eq!(chunks[1]["b"], 2);
    }

    #[test]
    fn test_malformed_line_skipped() {
        let mut decoder = LineDecoder::new();
        let chunks = decoder.push(b"{\"a\":1}\n{broken\n[1,2]\n{\"a\":2}\n");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1]["a"], 2);
        assert_eq!(decoder.skipped(), 2);
    }

    #[test]
    fn test_error_line_detected() {
        let chunks = decode_body(b"{\"error\":\"model not found\"}\n{\"error\":null}\n");
        assert_eq!(error_message(&chunks[0]), Some("model not found"));
        assert_eq!(error_message(&chunks[1]), None);
    }

    #[test]
    fn test_empty_body() {
        assert!(decode_body(b"").is_empty());
    }
}
