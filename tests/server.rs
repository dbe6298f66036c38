//! HTTP API tests against a server bound to an ephemeral port.

mod common;

use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;

use common::{pdf_with_pages, pipeline_with, spawn_app, EchoBackend};
use pdfchat::config::Config;
use pdfchat::server::{router, AppState};

async fn start_server() -> String {
    let pipeline = pipeline_with(Arc::new(EchoBackend::default()), &Config::default());
    spawn_app(router(AppState::new(pipeline), 16 * 1024 * 1024)).await
}

async fn create_session(client: &reqwest::Client, base: &str) -> String {
    let resp = client
        .post(format!("{}/sessions", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

fn upload_body(files: &[(&str, Vec<u8>)]) -> Value {
    let files: Vec<Value> = files
        .iter()
        .map(|(name, bytes)| {
            json!({
                "filename": name,
                "content_base64": base64::engine::general_purpose::STANDARD.encode(bytes),
            })
        })
        .collect();
    json!({ "files": files })
}

#[tokio::test]
async fn test_health() {
    let base = start_server().await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_full_session_flow() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &base).await;

    let status: Value = client
        .get(format!("{}/sessions/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["state"], "empty");
    assert_eq!(status["processed"], false);

    let resp = client
        .post(format!("{}/sessions/{}/documents", base, id))
        .json(&upload_body(&[("sky.pdf", pdf_with_pages(&["The sky is blue."]))]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["outcome"], "processed");
    assert_eq!(outcome["pages"], 1);
    assert_eq!(outcome["chunks"], 1);

    let again: Value = client
        .post(format!("{}/sessions/{}/documents", base, id))
        .json(&upload_body(&[("other.pdf", pdf_with_pages(&["Other."]))]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["outcome"], "already_processed");

    let chat: Value = client
        .post(format!("{}/sessions/{}/chat", base, id))
        .json(&json!({ "message": "What color is the sky?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(chat["reply"].as_str().unwrap().contains("The sky is blue."));
    assert_eq!(chat["messages"].as_array().unwrap().len(), 2);
    assert_eq!(chat["messages"][0]["role"], "user");
    assert_eq!(chat["messages"][1]["role"], "assistant");

    let history: Value = client
        .get(format!("{}/sessions/{}/messages", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["messages"], chat["messages"]);

    let status: Value = client
        .get(format!("{}/sessions/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["state"], "ready");
    assert_eq!(status["documents"], json!(["sky.pdf"]));
    assert_eq!(status["messages"], 2);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let a = create_session(&client, &base).await;
    let b = create_session(&client, &base).await;
    assert_ne!(a, b);

    client
        .post(format!("{}/sessions/{}/chat", base, a))
        .json(&json!({ "message": "hello" }))
        .send()
        .await
        .unwrap();

    let history: Value = client
        .get(format!("{}/sessions/{}/messages", base, b))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["messages"], json!([]));
}

#[tokio::test]
async fn test_error_contract() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &base).await;

    let resp = client
        .post(format!("{}/sessions/{}/chat", base, id))
        .json(&json!({ "message": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/sessions/{}/documents", base, id))
        .json(&upload_body(&[("notes.txt", b"plain text".to_vec())]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "extraction_failed");
    assert!(body["error"]["message"].as_str().unwrap().contains("notes.txt"));

    let resp = client
        .post(format!("{}/sessions/{}/documents", base, id))
        .json(&json!({ "files": [{ "filename": "x.pdf", "content_base64": "!!not base64!!" }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let missing = uuid::Uuid::new_v4();
    let resp = client
        .get(format!("{}/sessions/{}", base, missing))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_delete_session() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &base).await;

    let resp = client
        .delete(format!("{}/sessions/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .delete(format!("{}/sessions/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{}/sessions/{}/chat", base, id))
        .json(&json!({ "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
