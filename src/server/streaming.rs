//! SSE (Server-Sent Events) relay of the chunk sequence.
//!
//! Each chunk becomes one `data:` event carrying its JSON encoding. An error
//! item is sent as `{"error": "..."}` and closes the stream; the HTTP status has
//! already been sent as 200 by then, so the failure stays in-band.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::upstream::{Chunk, ChunkResult};

fn chunk_event(chunk: &Chunk) -> Event {
    let data = serde_json::to_string(chunk).unwrap_or_default();
    Event::default().data(data)
}

/// Convert a chunk sequence into an SSE event stream.
pub fn chunks_to_sse_stream<S>(
    chunks: S,
    request_id: String,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static
where
    S: Stream<Item = ChunkResult> + Send + 'static,
{
    async_stream::stream! {
        let mut chunks = std::pin::pin!(chunks);
        let mut events = 0usize;

        while let Some(item) = chunks.next().await {
            events += 1;
            match item {
                Ok(chunk) => yield Ok(chunk_event(&chunk)),
                Err(e) => {
                    warn!(request_id, error = %e, "Relaying upstream error as final event");
                    yield Ok(chunk_event(&e.to_chunk()));
                    break;
                }
            }
        }

        info!(request_id, events, "Stream complete");
    }
}
