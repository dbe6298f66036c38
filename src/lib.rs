//! # PDF Chat
//!
//! Ask questions about a set of PDF documents. Uploaded PDFs are split into
//! overlapping chunks, embedded, and indexed in memory; each question pulls
//! the most similar chunks into a prompt that is sent to an
//! OpenAI-compatible chat-completion endpoint (OpenRouter by default).
//!
//! ## Architecture
//!
//! ```text
//! build phase (once per session)
//! ┌──────────┐   ┌─────────┐   ┌─────────┐   ┌─────────┐
//! │ Extract  │──▶│  Chunk  │──▶│  Embed  │──▶│  Index  │
//! │ (pages)  │   │1000/200 │   │         │   │ (flat)  │
//! └──────────┘   └─────────┘   └─────────┘   └────┬────┘
//!                                                 │
//! query phase (per question)                      ▼
//! ┌──────────┐   ┌─────────┐   ┌────────────┐   ┌─────────┐
//! │ History  │◀──│Complete │◀──│   Prompt   │◀──│Retrieve │
//! │          │   │(HTTP)   │   │            │   │ top-3   │
//! └──────────┘   └─────────┘   └────────────┘   └─────────┘
//! ```
//!
//! The pure pieces (chunking, hash embeddings, the vector index, retrieval,
//! prompt composition) live in the `pdfchat-core` crate. This crate adds
//! the I/O: PDF parsing, HTTP clients, the session controller, the HTTP
//! server, and the `pdfchat` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENROUTER_API_KEY=sk-or-...
//! pdfchat ask --pdf paper.pdf "What is the main result?"
//! pdfchat chat --pdf a.pdf --pdf b.pdf     # interactive
//! pdfchat serve                            # HTTP API on 127.0.0.1:8501
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | PDF text extraction, per page |
//! | [`embedding`] | Embedding provider selection (hash, OpenAI, local) |
//! | [`completion`] | Chat-completion client and fallback rendering |
//! | [`session`] | Per-session build/query controller and registry |
//! | [`server`] | HTTP API |

pub mod completion;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod server;
pub mod session;
