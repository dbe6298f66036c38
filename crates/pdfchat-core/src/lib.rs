//! # pdfchat core
//!
//! Runtime-free logic shared by the `pdfchat` application: page and chunk
//! models, the overlapping chunker, the embedding trait, the vector index,
//! retrieval, and prompt composition.
//!
//! This crate contains no tokio, HTTP, or PDF-parsing dependencies. Anything
//! that performs I/O lives in the application crate and plugs in through the
//! [`embedding::Embedder`] and [`index::IndexBuilder`] traits.
//!
//! ```text
//! PageRecord ──▶ chunk::split_pages ──▶ Chunk ──▶ Embedder ──▶ IndexBuilder
//!                                                                  │
//!   query ──▶ Embedder ──▶ VectorIndex::search ──▶ retrieve ◀──────┘
//!                                                   │
//!                                  prompt::compose_prompt
//! ```

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod prompt;
pub mod retrieve;
