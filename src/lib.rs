//! ollama-relay: HTTP relay in front of an Ollama generation server.
//!
//! Forwards prompts to the upstream `/api/generate` endpoint and answers with
//! either one merged JSON object or a live SSE stream of the upstream's
//! line-delimited chunks. Connection failures are retried with a fixed delay;
//! every failure reaches the client as a single explicit error.

pub mod config;
pub mod server;
pub mod upstream;
