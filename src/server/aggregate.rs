//! Aggregation mode: fold the whole chunk sequence into one object.

use futures::Stream;
use tokio_stream::StreamExt;

use crate::upstream::{Chunk, ChunkResult, UpstreamError};

/// Merge every chunk's fields in arrival order; later chunks overwrite
/// same-named fields. The first error discards the partial result.
pub async fn aggregate<S>(chunks: S) -> Result<Chunk, UpstreamError>
where
    S: Stream<Item = ChunkResult>,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut merged = Chunk::new();

    while let Some(item) = chunks.next().await {
        merged.extend(item?);
    }

    Ok(merged)
}
