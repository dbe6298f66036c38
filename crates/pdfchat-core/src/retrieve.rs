//! Query-time retrieval: embed the query, search the index, join the hits.

use crate::embedding::{embed_query, Embedder, EmbeddingError};
use crate::index::{SearchHit, VectorIndex};

/// Default number of chunks returned per query.
pub const DEFAULT_TOP_K: usize = 3;

/// Separator placed between retrieved chunks in the context string.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Top-k hits for `query`, or nothing when no index has been built yet.
pub async fn retrieve_hits(
    index: Option<&dyn VectorIndex>,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
) -> Result<Vec<SearchHit>, EmbeddingError> {
    let Some(index) = index else {
        return Ok(Vec::new());
    };
    let query_vec = embed_query(embedder, query).await?;
    let hits = index.search(&query_vec, k);
    tracing::debug!(k, hits = hits.len(), "retrieved chunks");
    Ok(hits)
}

/// The text of the top-k chunks joined by a blank line.
///
/// Without an index this returns an empty string, not an error, so questions
/// asked before any upload still reach the model.
pub async fn retrieve_context(
    index: Option<&dyn VectorIndex>,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
) -> Result<String, EmbeddingError> {
    let hits = retrieve_hits(index, embedder, query, k).await?;
    Ok(join_hits(&hits))
}

pub fn join_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| h.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
