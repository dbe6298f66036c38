//! Vector index abstraction.
//!
//! An index is built once from `(Chunk, vector)` pairs and is read-only
//! afterwards. [`IndexBuilder`] and [`VectorIndex`] separate the two
//! capabilities so a brute-force index and an approximate-nearest-neighbour
//! library can be swapped without touching the session code.
//!
//! Implementations must be `Send + Sync` to live inside async sessions.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`build`](IndexBuilder::build) | Build a complete index from chunk/vector pairs |
//! | [`search`](VectorIndex::search) | Top-k nearest chunks for a query vector |
//! | [`len`](VectorIndex::len) | Number of indexed chunks |

pub mod flat;

use serde::Serialize;
use thiserror::Error;

use crate::models::Chunk;

pub use flat::{FlatIndex, FlatIndexBuilder};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexBuildError {
    #[error("no text chunks to index")]
    Empty,
    #[error("chunk {chunk} has a {got}-dimension vector, expected {expected}")]
    Dimension {
        chunk: usize,
        expected: usize,
        got: usize,
    },
}

/// A chunk returned by [`VectorIndex::search`] with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// A fully built, immutable similarity index.
pub trait VectorIndex: Send + Sync {
    /// Return at most `k` chunks ranked by similarity descending, ties
    /// broken by chunk order.
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds a [`VectorIndex`] from embedded chunks.
pub trait IndexBuilder: Send + Sync {
    /// Build an index over `entries`. The result is either complete or an
    /// error; there is no partially built state.
    fn build(&self, entries: Vec<(Chunk, Vec<f32>)>)
        -> Result<Box<dyn VectorIndex>, IndexBuildError>;
}
