//! In-band failures of the upstream chunk sequence.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::upstream::Chunk;

/// The terminal error item of a chunk sequence.
///
/// At most one of these is ever yielded per request, and it is always the last
/// item. Its `Display` text is the message carried to clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Every connection attempt failed at the transport level.
    #[error("Failed to connect to the Ollama server after multiple attempts")]
    ConnectionExhausted { attempts: u32 },

    /// The upstream answered with a non-200 status.
    #[error("Failed to get response: HTTP {0}")]
    HttpStatus(u16),

    /// The upstream reported a failure inside a 200 body.
    #[error("{0}")]
    Upstream(String),

    /// The response head arrived but reading the body failed.
    #[error("Upstream response interrupted: {0}")]
    Interrupted(String),

    /// The request could not be constructed.
    #[error("Failed to build upstream request: {0}")]
    Request(String),
}

impl UpstreamError {
    /// Wire form: `{"error": "<message>"}`.
    pub fn to_chunk(&self) -> Chunk {
        let mut chunk = Map::new();
        chunk.insert("error".to_string(), Value::String(self.to_string()));
        chunk
    }
}
