//! PDF text extraction, one [`PageRecord`] per page.
//!
//! Extraction runs entirely from memory, so nothing is written to disk.
//! A batch is all-or-nothing: the first document that fails to parse aborts
//! the whole batch and no pages are returned.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use pdfchat_core::models::{PageRecord, UploadedDocument};
use thiserror::Error;

/// Leading bytes every PDF file starts with.
const PDF_MAGIC: &[u8] = b"%PDF-";
/// How far into the file the header may appear (some writers prepend junk).
const MAGIC_SEARCH_WINDOW: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("failed to extract text from {filename}: {reason}")]
pub struct ExtractionError {
    pub filename: String,
    pub reason: String,
}

impl ExtractionError {
    fn new(filename: &str, reason: impl Into<String>) -> Self {
        Self {
            filename: filename.to_string(),
            reason: reason.into(),
        }
    }
}

/// Extract every page of every document, in upload order then page order.
pub fn extract_pages(docs: &[UploadedDocument]) -> Result<Vec<PageRecord>, ExtractionError> {
    let mut pages = Vec::new();
    for doc in docs {
        let texts = extract_pdf_pages(&doc.filename, &doc.bytes)?;
        tracing::debug!(file = %doc.filename, pages = texts.len(), "extracted pdf");
        pages.extend(texts.into_iter().enumerate().map(|(i, text)| PageRecord {
            source: doc.filename.clone(),
            page: i as u32 + 1,
            text,
        }));
    }
    Ok(pages)
}

/// Extract the text of each page of a single PDF.
pub fn extract_pdf_pages(filename: &str, bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::new(filename, "file is empty"));
    }
    let window = &bytes[..bytes.len().min(MAGIC_SEARCH_WINDOW)];
    if !window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        return Err(ExtractionError::new(filename, "not a PDF (missing %PDF- header)"));
    }

    // pdf-extract panics on some malformed inputs instead of returning an error.
    let result = catch_parser_panic(|| pdf_extract::extract_text_from_mem_by_pages(bytes));
    match result {
        Ok(Ok(pages)) if pages.is_empty() => {
            Err(ExtractionError::new(filename, "PDF has no pages"))
        }
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractionError::new(filename, e.to_string())),
        Err(msg) => Err(ExtractionError::new(
            filename,
            format!("PDF parser panicked: {}", msg),
        )),
    }
}

thread_local! {
    static QUIET_PANICS: Cell<bool> = const { Cell::new(false) };
}

static INSTALL_PANIC_HOOK: Once = Once::new();

/// Wrap the process panic hook once. Panics raised while a parser call is
/// in flight on the current thread are logged at debug level instead of
/// being printed to stderr; all others go to the previous hook.
fn install_quiet_panic_hook() {
    INSTALL_PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if QUIET_PANICS.with(Cell::get) {
                tracing::debug!(panic = %info, "pdf parser panicked");
            } else {
                previous(info);
            }
        }));
    });
}

/// Clears the quiet flag even when the parser unwinds.
struct QuietPanics;

impl QuietPanics {
    fn enter() -> Self {
        QUIET_PANICS.with(|q| q.set(true));
        QuietPanics
    }
}

impl Drop for QuietPanics {
    fn drop(&mut self) {
        QUIET_PANICS.with(|q| q.set(false));
    }
}

/// Run `f`, turning a panic into `Err` with the panic message.
fn catch_parser_panic<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    install_quiet_panic_hook();
    let _quiet = QuietPanics::enter();
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}
