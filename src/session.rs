//! Session controller.
//!
//! A [`Session`] owns one chat history and at most one fully built index.
//! Its lifecycle:
//!
//! ```text
//!   Empty ──upload──▶ Processing ──ok──▶ Ready ──ask──▶ Ready
//!     ▲                   │
//!     └──────failure──────┘
//! ```
//!
//! Uploads after the session is `Ready` are ignored (process-once policy).
//! A failed or cancelled build discards everything extracted so far and
//! returns the session to `Empty`. Query-phase failures never surface as errors: a
//! failed retrieval degrades to an empty context and a failed completion
//! to [`FALLBACK_REPLY`](crate::completion::FALLBACK_REPLY).
//!
//! [`SessionRegistry`] keeps independent sessions for the HTTP server, each
//! behind its own mutex.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use pdfchat_core::chunk::{split_pages, ChunkParams};
use pdfchat_core::embedding::{Embedder, EmbeddingError};
use pdfchat_core::index::{FlatIndexBuilder, IndexBuildError, IndexBuilder, VectorIndex};
use pdfchat_core::models::{ChatMessage, UploadedDocument};
use pdfchat_core::prompt::compose_prompt;
use pdfchat_core::retrieve::retrieve_context;

use crate::completion::{render_reply, CompletionBackend, OpenRouterClient};
use crate::config::{Config, API_KEY_ENV};
use crate::embedding::create_embedder;
use crate::extract::{extract_pages, ExtractionError};

/// Services shared by every session: models, index backend, and tuning.
pub struct Pipeline {
    pub embedder: Arc<dyn Embedder>,
    pub index_builder: Arc<dyn IndexBuilder>,
    pub completion: Arc<dyn CompletionBackend>,
    pub chunking: ChunkParams,
    pub top_k: usize,
}

impl Pipeline {
    /// Wire up the configured embedder, a flat index, and the OpenRouter client.
    pub fn from_config(config: &Config) -> Result<Self> {
        let Some(api_key) = config.api_key() else {
            bail!(
                "No completion API key configured. Set {} or completion.api_key.",
                API_KEY_ENV
            );
        };
        let completion = OpenRouterClient::new(&config.completion, api_key)?;
        tracing::info!(model = completion.model(), "completion backend ready");
        Ok(Self::new(
            create_embedder(&config.embedding)?,
            Arc::new(completion),
            config,
        ))
    }

    /// Build a pipeline around explicit backends, taking tuning from `config`.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn CompletionBackend>,
        config: &Config,
    ) -> Self {
        Self {
            embedder,
            index_builder: Arc::new(FlatIndexBuilder),
            completion,
            chunking: config.chunking.params(),
            top_k: config.retrieval.k,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Empty,
    Processing,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Processed {
        documents: usize,
        pages: usize,
        chunks: usize,
    },
    /// The session already has an index; the batch was ignored.
    AlreadyProcessed,
    NothingToProcess,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("failed to embed document text: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("failed to build index: {0}")]
    IndexBuild(#[from] IndexBuildError),
    #[error("question must not be empty")]
    EmptyQuery,
}

/// Snapshot of a session for display.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: Uuid,
    pub state: SessionState,
    pub processed: bool,
    pub documents: Vec<String>,
    pub chunks: usize,
    pub messages: usize,
}

pub struct Session {
    id: Uuid,
    state: SessionState,
    index: Option<Box<dyn VectorIndex>>,
    documents: Vec<String>,
    messages: Vec<ChatMessage>,
    pipeline: Arc<Pipeline>,
}

impl Session {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Empty,
            index: None,
            documents: Vec::new(),
            messages: Vec::new(),
            pipeline,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True iff an index is present and non-empty.
    pub fn is_processed(&self) -> bool {
        self.index.as_ref().is_some_and(|i| !i.is_empty())
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            id: self.id,
            state: self.state,
            processed: self.is_processed(),
            documents: self.documents.clone(),
            chunks: self.index.as_ref().map_or(0, |i| i.len()),
            messages: self.messages.len(),
        }
    }

    /// Extract, chunk, embed, and index a batch of uploads.
    pub async fn process_uploads(
        &mut self,
        docs: Vec<UploadedDocument>,
    ) -> Result<UploadOutcome, SessionError> {
        if self.state == SessionState::Ready {
            tracing::info!(session = %self.id, "documents already processed, ignoring upload");
            return Ok(UploadOutcome::AlreadyProcessed);
        }
        if docs.is_empty() {
            return Ok(UploadOutcome::NothingToProcess);
        }

        let names: Vec<String> = docs.iter().map(|d| d.filename.clone()).collect();
        let pipeline = self.pipeline.clone();
        let result = {
            let _processing = ProcessingGuard::enter(&mut self.state);
            build_index(&pipeline, docs).await
        };

        match result {
            Ok((index, pages)) => {
                let outcome = UploadOutcome::Processed {
                    documents: names.len(),
                    pages,
                    chunks: index.len(),
                };
                tracing::info!(session = %self.id, ?outcome, "documents processed");
                self.index = Some(index);
                self.documents = names;
                self.state = SessionState::Ready;
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "document processing failed");
                Err(e)
            }
        }
    }

    /// Answer a question and append the exchange to the history.
    ///
    /// Only a blank question is an error. The exchange is appended after the
    /// completion returns, so a cancelled call leaves the history untouched.
    pub async fn ask(&mut self, query: &str) -> Result<String, SessionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SessionError::EmptyQuery);
        }

        let context = match retrieve_context(
            self.index.as_deref(),
            self.pipeline.embedder.as_ref(),
            query,
            self.pipeline.top_k,
        )
        .await
        {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "retrieval failed, answering without context");
                String::new()
            }
        };

        let prompt = compose_prompt(query, &context);
        let reply = render_reply(self.pipeline.completion.complete(&prompt).await);

        self.messages.push(ChatMessage::user(query));
        self.messages.push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }
}

/// Holds a session in `Processing` and puts it back to `Empty` when dropped,
/// including when the upload future is cancelled mid-build.
struct ProcessingGuard<'a> {
    state: &'a mut SessionState,
}

impl<'a> ProcessingGuard<'a> {
    fn enter(state: &'a mut SessionState) -> Self {
        *state = SessionState::Processing;
        Self { state }
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        *self.state = SessionState::Empty;
    }
}

async fn build_index(
    pipeline: &Pipeline,
    docs: Vec<UploadedDocument>,
) -> Result<(Box<dyn VectorIndex>, usize), SessionError> {
    let pages = tokio::task::spawn_blocking(move || extract_pages(&docs))
        .await
        .map_err(|e| ExtractionError {
            filename: "<batch>".to_string(),
            reason: format!("extraction task failed: {}", e),
        })??;

    let chunks = split_pages(&pages, pipeline.chunking);
    if chunks.is_empty() {
        return Err(IndexBuildError::Empty.into());
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = pipeline.embedder.embed(&texts).await?;
    if vectors.len() != chunks.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: chunks.len(),
            got: vectors.len(),
        }
        .into());
    }

    let index = pipeline
        .index_builder
        .build(chunks.into_iter().zip(vectors).collect())?;
    Ok((index, pages.len()))
}

/// Independent sessions keyed by id.
pub struct SessionRegistry {
    pipeline: Arc<Pipeline>,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self) -> Uuid {
        let session = Session::new(self.pipeline.clone());
        let id = session.id();
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        tracing::debug!(session = %id, "session created");
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Discard a session. Returns false if it did not exist.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!(session = %id, "session discarded");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, FALLBACK_REPLY};
    use async_trait::async_trait;
    use pdfchat_core::embedding::HashEmbedder;
    use std::sync::Mutex as StdMutex;

    /// Records prompts and answers with a fixed reply or failure.
    struct ScriptedBackend {
        reply: Option<String>,
        prompts: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().ok_or(CompletionError::Api {
                status: 500,
                body: "boom".into(),
            })
        }
    }

    fn session_with(reply: Option<&str>) -> (Session, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend {
            reply: reply.map(str::to_string),
            prompts: StdMutex::new(Vec::new()),
        });
        let pipeline = Pipeline::new(
            Arc::new(HashEmbedder::default()),
            backend.clone(),
            &Config::default(),
        );
        (Session::new(Arc::new(pipeline)), backend)
    }

    #[tokio::test]
    async fn test_new_session_is_empty() {
        let (session, _) = session_with(Some("ok"));
        let status = session.status();
        assert_eq!(status.state, SessionState::Empty);
        assert!(!status.processed);
        assert_eq!(status.chunks, 0);
    }

    #[tokio::test]
    async fn test_ask_before_upload_uses_empty_context() {
        let (mut session, backend) = session_with(Some("no docs yet"));
        let reply = session.ask("What is this?").await.unwrap();
        assert_eq!(reply, "no docs yet");
        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("Context from PDFs:\n\n\nUser Question: What is this?"));
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_completion_appends_fallback() {
        let (mut session, _) = session_with(None);
        let reply = session.ask("hello").await.unwrap();
        assert_eq!(reply, FALLBACK_REPLY);
        let msgs = session.messages();
        assert_eq!(msgs[0].role, pdfchat_core::models::Role::User);
        assert_eq!(msgs[0].content, "hello");
        assert_eq!(msgs[1].content, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let (mut session, backend) = session_with(Some("x"));
        assert!(matches!(
            session.ask("   ").await,
            Err(SessionError::EmptyQuery)
        ));
        assert!(backend.prompts.lock().unwrap().is_empty());
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_bad_upload_returns_to_empty() {
        let (mut session, _) = session_with(Some("x"));
        let err = session
            .process_uploads(vec![UploadedDocument::new("x.pdf", b"nope".to_vec())])
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Extraction(_)));
        assert_eq!(session.state(), SessionState::Empty);
        assert!(!session.is_processed());
    }

    #[tokio::test]
    async fn test_empty_upload_is_noop() {
        let (mut session, _) = session_with(Some("x"));
        let outcome = session.process_uploads(Vec::new()).await.unwrap();
        assert_eq!(outcome, UploadOutcome::NothingToProcess);
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let (_, backend) = session_with(Some("x"));
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(HashEmbedder::default()),
            backend,
            &Config::default(),
        ));
        let registry = SessionRegistry::new(pipeline);
        let a = registry.create().await;
        let b = registry.create().await;
        assert_ne!(a, b);
        assert_eq!(registry.len().await, 2);

        registry.get(a).await.unwrap().lock().await.ask("q").await.unwrap();
        let b_session = registry.get(b).await.unwrap();
        assert!(b_session.lock().await.messages().is_empty());

        assert!(registry.remove(a).await);
        assert!(!registry.remove(a).await);
        assert!(registry.get(a).await.is_none());
    }
}
