//! Client side of the Ollama generate protocol.
//!
//! - [`client`]: Attempt loop with connection-retry, yields a lazy chunk stream
//! - [`ndjson`]: Line-delimited JSON decoding
//! - [`request`]: The validated per-call generation request
//! - [`error`]: In-band terminal failures

pub mod client;
pub mod error;
pub mod ndjson;
pub mod request;

pub use client::{AttemptState, UpstreamClient};
pub use error::UpstreamError;
pub use request::{GenerationRequest, ValidationError};

/// One decoded line of upstream output. Fields are opaque to the relay.
pub type Chunk = serde_json::Map<String, serde_json::Value>;

/// An item of the chunk sequence: data, or the single terminal failure.
pub type ChunkResult = Result<Chunk, UpstreamError>;
