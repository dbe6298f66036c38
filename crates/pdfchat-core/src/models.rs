//! Data types that flow through the build and query phases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document as received from the upload surface.
///
/// Only lives for the duration of the build phase; extraction consumes it.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// Extracted text of a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    /// Filename of the document the page came from.
    pub source: String,
    /// 1-based page number within `source`.
    pub page: u32,
    pub text: String,
}

/// A bounded window of page text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the batch, contiguous from 0 across all pages.
    pub index: usize,
    pub source: String,
    pub page: u32,
    /// Offset of the first character within the page text, in chars.
    pub start: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of a session's chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}
