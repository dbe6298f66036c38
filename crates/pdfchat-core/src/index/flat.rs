//! Brute-force in-memory [`VectorIndex`].
//!
//! Scores every stored vector against the query with cosine similarity.
//! Linear in the number of chunks, which is fine for a handful of PDFs.

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::models::Chunk;

use super::{IndexBuildError, IndexBuilder, SearchHit, VectorIndex};

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Flat index: a `Vec` of chunk/vector pairs in chunk order.
pub struct FlatIndex {
    entries: Vec<Entry>,
    dims: usize,
}

impl FlatIndex {
    pub fn build(entries: Vec<(Chunk, Vec<f32>)>) -> Result<Self, IndexBuildError> {
        let expected = match entries.first() {
            Some((_, v)) => v.len(),
            None => return Err(IndexBuildError::Empty),
        };
        let mut stored = Vec::with_capacity(entries.len());
        for (chunk, vector) in entries {
            if vector.len() != expected {
                return Err(IndexBuildError::Dimension {
                    chunk: chunk.index,
                    expected,
                    got: vector.len(),
                });
            }
            stored.push(Entry { chunk, vector });
        }
        stored.sort_by_key(|e| e.chunk.index);
        Ok(Self {
            entries: stored,
            dims: expected,
        })
    }

    /// Vector length every stored entry shares.
    pub fn dims(&self) -> usize {
        self.dims
    }
}

impl VectorIndex for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        // Every score would be 0.0; the ranking degrades to chunk order.
        if query.len() != self.dims {
            tracing::warn!(
                expected = self.dims,
                got = query.len(),
                "query vector dimension does not match index"
            );
        }
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();
        // Stable sort keeps chunk order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| SearchHit {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// [`IndexBuilder`] producing [`FlatIndex`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatIndexBuilder;

impl IndexBuilder for FlatIndexBuilder {
    fn build(
        &self,
        entries: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<Box<dyn VectorIndex>, IndexBuildError> {
        Ok(Box::new(FlatIndex::build(entries)?))
    }
}
