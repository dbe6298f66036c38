//! Boundary-preferring text chunker with exact character overlap.
//!
//! Splits page text into windows of at most `chunk_size` characters. Each
//! window after the first starts `chunk_overlap` characters before the end
//! of the previous one, so stripping the overlap band from every window but
//! the first reconstructs the page text exactly.
//!
//! # Algorithm
//!
//! 1. Whitespace-only text produces no chunks.
//! 2. If the text remaining from the window start fits in `chunk_size`,
//!    emit it and stop.
//! 3. Otherwise pick the window end inside `(start + overlap, start + size]`,
//!    preferring, in order: after a paragraph break (`\n\n`), after a line
//!    break, after a sentence end (`. `, `! `, `? `), after whitespace, and
//!    finally a hard cut at `start + size`. The latest candidate of the
//!    first level that has one wins.
//! 4. The next window starts at `end - overlap`.
//!
//! Lengths and offsets are counted in `char`s, not bytes, so multi-byte
//! text never splits inside a code point.
//!
//! # Example
//!
//! ```rust
//! use pdfchat_core::chunk::{split_text, ChunkParams};
//!
//! let params = ChunkParams { chunk_size: 12, chunk_overlap: 4 };
//! let windows = split_text("one two three four five", params);
//! assert_eq!(windows[0].1, "one two ");
//! assert!(windows.iter().all(|(_, w)| w.chars().count() <= 12));
//! ```

use thiserror::Error;

use crate::models::{Chunk, PageRecord};

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive windows in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Break-point preference levels, highest priority first.
const SEPARATOR_LEVELS: &[&[&str]] = &[
    &["\n\n"],
    &["\n"],
    &[". ", "! ", "? "],
    &[" ", "\t"],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkParamsError {
    #[error("chunk_size must be > 0")]
    ZeroSize,
    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

impl ChunkParams {
    pub fn validate(&self) -> Result<(), ChunkParamsError> {
        if self.chunk_size == 0 {
            return Err(ChunkParamsError::ZeroSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkParamsError::OverlapTooLarge {
                size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }
}

/// Chunk every page, in order. Chunk indices are contiguous from 0 across
/// the whole batch.
///
/// `params` must satisfy [`ChunkParams::validate`].
pub fn split_pages(pages: &[PageRecord], params: ChunkParams) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for page in pages {
        for (start, text) in split_text(&page.text, params) {
            chunks.push(Chunk {
                index: chunks.len(),
                source: page.source.clone(),
                page: page.page,
                start,
                text,
            });
        }
    }
    tracing::debug!(pages = pages.len(), chunks = chunks.len(), "split pages");
    chunks
}

/// Split `text` into `(char_offset, window)` pairs.
///
/// `params` must satisfy [`ChunkParams::validate`].
pub fn split_text(text: &str, params: ChunkParams) -> Vec<(usize, String)> {
    debug_assert!(params.validate().is_ok());
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let size = params.chunk_size;
    let overlap = params.chunk_overlap;

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        if chars.len() - start <= size {
            windows.push((start, chars[start..].iter().collect()));
            break;
        }
        let end = find_break(&chars, start + overlap + 1, start + size);
        windows.push((start, chars[start..end].iter().collect()));
        start = end - overlap;
    }
    windows
}

/// Latest preferred break in `[min_end, max_end]`, or `max_end` if none.
fn find_break(chars: &[char], min_end: usize, max_end: usize) -> usize {
    for level in SEPARATOR_LEVELS {
        for end in (min_end..=max_end).rev() {
            if level.iter().any(|sep| ends_with(&chars[..end], sep)) {
                return end;
            }
        }
    }
    max_end
}

fn ends_with(chars: &[char], sep: &str) -> bool {
    let n = sep.chars().count();
    chars.len() >= n && chars[chars.len() - n..].iter().copied().eq(sep.chars())
}
