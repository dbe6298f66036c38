//! Shared fixtures for integration tests: hand-built PDFs, an echoing
//! completion backend, and a mock chat-completion endpoint.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pdfchat::completion::{CompletionBackend, CompletionError};
use pdfchat::config::Config;
use pdfchat::session::Pipeline;
use pdfchat_core::embedding::HashEmbedder;

/// Minimal valid PDF with one text line per page.
///
/// Builds the body and then the xref table with correct byte offsets so
/// pdf-extract can parse it. Object layout: 1 catalog, 2 page tree,
/// 3 font, then a page object and its content stream for each page.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut offsets = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            pages.len()
        )
        .as_bytes(),
    );
    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, text) in pages.iter().enumerate() {
        let page_id = 4 + 2 * i;
        let content_id = page_id + 1;
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_id, content_id
            )
            .as_bytes(),
        );

        let stream = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", escape_pdf_string(text));
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                content_id,
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", offsets.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            offsets.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn escape_pdf_string(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// Replies with the prompt it was given, so tests can inspect what the
/// model would have seen.
#[derive(Default)]
pub struct EchoBackend {
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionBackend for EchoBackend {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(prompt.to_string())
    }
}

/// Pipeline with the offline hash embedder and the given backend.
pub fn pipeline_with(backend: Arc<dyn CompletionBackend>, config: &Config) -> Arc<Pipeline> {
    Arc::new(Pipeline::new(
        Arc::new(HashEmbedder::default()),
        backend,
        config,
    ))
}

/// Bind `app` to an ephemeral port and return its base URL.
pub async fn spawn_app(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Scripted chat-completion endpoint. Answers the n-th request with the
/// n-th status in `statuses` (the last one repeats). Any 2xx status carries
/// a well-formed completion body.
#[derive(Clone)]
pub struct MockCompletion {
    pub reply: String,
    pub statuses: Arc<Vec<u16>>,
    pub hits: Arc<AtomicUsize>,
    pub last_headers: Arc<Mutex<Option<HeaderMap>>>,
    pub last_body: Arc<Mutex<Option<serde_json::Value>>>,
}

impl MockCompletion {
    pub fn new(reply: &str, statuses: &[u16]) -> Self {
        Self {
            reply: reply.to_string(),
            statuses: Arc::new(statuses.to_vec()),
            hits: Arc::new(AtomicUsize::new(0)),
            last_headers: Arc::new(Mutex::new(None)),
            last_body: Arc::new(Mutex::new(None)),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Serve at `/api/v1/chat/completions` and return the full endpoint URL.
    pub async fn start(&self) -> String {
        let app = Router::new()
            .route("/api/v1/chat/completions", post(handle_mock_completion))
            .with_state(self.clone());
        format!("{}/api/v1/chat/completions", spawn_app(app).await)
    }
}

async fn handle_mock_completion(
    State(mock): State<MockCompletion>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let n = mock.hits.fetch_add(1, Ordering::SeqCst);
    *mock.last_headers.lock().unwrap() = Some(headers);
    *mock.last_body.lock().unwrap() = Some(body);

    let status = mock
        .statuses
        .get(n)
        .or(mock.statuses.last())
        .copied()
        .unwrap_or(200);
    if (200..300).contains(&status) {
        (
            StatusCode::from_u16(status).unwrap(),
            Json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": mock.reply } }]
            })),
        )
    } else {
        (
            StatusCode::from_u16(status).unwrap(),
            Json(serde_json::json!({ "error": { "message": "upstream failure" } })),
        )
    }
}
