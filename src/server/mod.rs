//! HTTP side of the relay.
//!
//! - [`api`]: Routes, request types and handlers
//! - [`aggregate`]: Folding a chunk sequence into one JSON object
//! - [`streaming`]: SSE relay of a chunk sequence

pub mod aggregate;
pub mod api;
pub mod streaming;
