//! End-to-end tests for the ragachat pipeline.
//!
//! A local axum server stands in for the Cohere embedding endpoint and the
//! Gemini streaming endpoint, so these tests exercise the real HTTP clients,
//! retry, retrieval, persistence and the gateway together.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use http_body_util::BodyExt;
use ragachat_chat::{ChatRuntime, IngestOutcome};
use ragachat_config::{AppConfig, DEFAULT_FALLBACK_MESSAGE};
use ragachat_core::{ChatMessage, ChatStore, KnowledgeStore, NewMessage, SessionId};
use serde_json::{Value, json};
use tower::ServiceExt;

// ── Mock upstream services ───────────────────────────────────────────────

const VOCABULARY: [&str; 3] = ["java", "spring", "pasta"];

struct Upstream {
    /// Answer chunks streamed for every successful generation call.
    chunks: Vec<&'static str>,
    /// Generation calls that answer 503 before the first success.
    failures_left: AtomicUsize,
    generation_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl Upstream {
    fn new(chunks: Vec<&'static str>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            chunks,
            failures_left: AtomicUsize::new(failures),
            generation_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst)
    }
}

/// Bag-of-words over a three-word vocabulary, in Cohere's response shape.
async fn embed_handler(Json(body): Json<Value>) -> Json<Value> {
    let text = body["texts"][0].as_str().unwrap_or_default().to_lowercase();
    let vector: Vec<f32> = VOCABULARY
        .iter()
        .map(|word| {
            text.split(|c: char| !c.is_alphanumeric())
                .filter(|w| w == word)
                .count() as f32
        })
        .collect();
    Json(json!({ "id": "mock", "embeddings": [vector] }))
}

async fn generate_handler(
    State(upstream): State<Arc<Upstream>>,
    Json(body): Json<Value>,
) -> Response {
    upstream.generation_calls.fetch_add(1, Ordering::SeqCst);
    let prompt = body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    upstream.prompts.lock().unwrap().push(prompt);

    let failing = upstream
        .failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return (StatusCode::SERVICE_UNAVAILABLE, "overloaded").into_response();
    }

    let mut sse = String::new();
    for chunk in &upstream.chunks {
        let record = json!({
            "candidates": [{ "content": { "parts": [{ "text": chunk }], "role": "model" } }]
        });
        sse.push_str(&format!("data: {record}\r\n\r\n"));
    }
    // Closing record with no text, as the real endpoint sends.
    sse.push_str("data: {\"candidates\":[{\"finishReason\":\"STOP\"}]}\r\n\r\n");

    ([(header::CONTENT_TYPE, "text/event-stream")], sse).into_response()
}

async fn spawn_upstream(upstream: Arc<Upstream>) -> SocketAddr {
    let app = Router::new()
        .route("/v1/embed", post(embed_handler))
        .route("/v1beta/models/{*action}", post(generate_handler))
        .with_state(upstream);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config_for(addr: SocketAddr) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.backend = "memory".into();
    config.embedding.url = format!("http://{addr}/v1/embed");
    config.embedding.api_key = Some("test-embedding-key".into());
    config.generation.base_url = format!("http://{addr}");
    config.generation.api_key = Some("test-generation-key".into());
    config.generation.retry.initial_backoff_ms = 10;
    config.generation.retry.jitter = 0.0;
    config.retrieval.dimensions = VOCABULARY.len();
    config
}

async fn seed_knowledge(runtime: &ChatRuntime) {
    for (title, content) in [
        ("java.txt", "Java is a programming language."),
        ("spring.txt", "Spring Boot is built on Java."),
        ("pasta.txt", "Pasta cooks in salted water."),
    ] {
        let outcome = runtime.ingestor.ingest(title, content).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Inserted(_)));
    }
}

async fn ask(runtime: &ChatRuntime, session: SessionId, question: &str) -> Vec<ChatMessage> {
    let mut rx = runtime
        .orchestrator
        .add_message(session, "u1", question)
        .await
        .unwrap();
    let mut chunks = Vec::new();
    while let Some(event) = rx.recv().await {
        chunks.push(event.unwrap());
    }
    chunks
}

// ── E2E: Full RAG pipeline ───────────────────────────────────────────────

#[tokio::test]
async fn e2e_follow_up_question_uses_history_and_knowledge() {
    let upstream = Upstream::new(vec!["Spring Boot ", "is an opinionated ", "Java framework."], 0);
    let addr = spawn_upstream(upstream.clone()).await;
    let runtime = ChatRuntime::from_config(&config_for(addr)).await.unwrap();
    seed_knowledge(&runtime).await;

    let session = runtime
        .orchestrator
        .create_session("u1", "Session 1")
        .await
        .unwrap();
    let chat = &runtime.stores.chat;
    chat.append_message(NewMessage::question(session.id, "u1", "What is Java?"))
        .await
        .unwrap();
    chat.append_message(NewMessage::answer(
        session.id,
        "AI",
        "A programming language.",
        "",
    ))
    .await
    .unwrap();

    let chunks = ask(&runtime, session.id, "What is Spring Boot?").await;

    let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["Spring Boot ", "is an opinionated ", "Java framework."]
    );

    let prompts = upstream.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Conversation History:\nA programming language.\nWhat is Java?\n"));
    assert!(prompts[0].contains("Knowledge Base:\nSpring Boot is built on Java.\n"));
    assert!(!prompts[0].contains("Pasta"));
    assert!(prompts[0].contains("User's Current Question:\nWhat is Spring Boot?"));

    let page = runtime
        .orchestrator
        .messages(session.id, 0, 10)
        .await
        .unwrap();
    assert_eq!(page.total_elements, 4);
    let question = &page.content[2];
    assert_eq!(question.sender, "u1");
    assert_eq!(question.content, "What is Spring Boot?");
    assert!(question.retrieved_context.is_none());
    let answer = &page.content[3];
    assert_eq!(answer.sender, "AI");
    assert_eq!(answer.content, "Spring Boot is an opinionated Java framework.");
    assert_eq!(
        answer.retrieved_context.as_deref(),
        Some("Spring Boot is built on Java.")
    );
}

#[tokio::test]
async fn e2e_unavailable_generation_persists_fallback() {
    let upstream = Upstream::new(vec!["never sent"], usize::MAX);
    let addr = spawn_upstream(upstream.clone()).await;
    let runtime = ChatRuntime::from_config(&config_for(addr)).await.unwrap();

    let session = runtime.orchestrator.create_session("u1", "t").await.unwrap();
    let chunks = ask(&runtime, session.id, "Hello").await;

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, DEFAULT_FALLBACK_MESSAGE);
    assert_eq!(upstream.calls(), 4, "one attempt plus three retries");

    let page = runtime
        .orchestrator
        .messages(session.id, 0, 10)
        .await
        .unwrap();
    assert_eq!(page.total_elements, 2);
    assert_eq!(page.content[1].content, DEFAULT_FALLBACK_MESSAGE);
}

#[tokio::test]
async fn e2e_transient_failures_are_retried() {
    let upstream = Upstream::new(vec!["Recovered."], 2);
    let addr = spawn_upstream(upstream.clone()).await;
    let runtime = ChatRuntime::from_config(&config_for(addr)).await.unwrap();

    let session = runtime.orchestrator.create_session("u1", "t").await.unwrap();
    let chunks = ask(&runtime, session.id, "Hello").await;

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "Recovered.");
    assert_eq!(upstream.calls(), 3);
}

#[tokio::test]
async fn e2e_unknown_session_touches_nothing() {
    let upstream = Upstream::new(vec!["x"], 0);
    let addr = spawn_upstream(upstream.clone()).await;
    let runtime = ChatRuntime::from_config(&config_for(addr)).await.unwrap();

    let err = runtime
        .orchestrator
        .add_message(SessionId(999_999), "u1", "Hello")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn e2e_ingestion_is_idempotent() {
    let upstream = Upstream::new(vec![], 0);
    let addr = spawn_upstream(upstream).await;
    let runtime = ChatRuntime::from_config(&config_for(addr)).await.unwrap();
    seed_knowledge(&runtime).await;

    let again = runtime
        .ingestor
        .ingest("java.txt", "Something else entirely.")
        .await
        .unwrap();
    assert!(matches!(again, IngestOutcome::Skipped { .. }));
    assert_eq!(runtime.stores.knowledge.count_documents().await.unwrap(), 3);
}

// ── E2E: SQLite persistence ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_sqlite_history_survives_restart() {
    let upstream = Upstream::new(vec!["Persisted answer."], 0);
    let addr = spawn_upstream(upstream).await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = config_for(addr);
    config.database.backend = "sqlite".into();
    config.database.url = Some(dir.path().join("chat.sqlite").to_string_lossy().into_owned());

    let session_id = {
        let runtime = ChatRuntime::from_config(&config).await.unwrap();
        let session = runtime.orchestrator.create_session("u1", "t").await.unwrap();
        ask(&runtime, session.id, "Hello").await;
        session.id
    };

    let runtime = ChatRuntime::from_config(&config).await.unwrap();
    let page = runtime
        .orchestrator
        .messages(session_id, 0, 10)
        .await
        .unwrap();
    let contents: Vec<&str> = page.content.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["Hello", "Persisted answer."]);
}

// ── E2E: Gateway ─────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_gateway_streams_answer_over_sse() {
    let upstream = Upstream::new(vec!["Hel", "lo!"], 0);
    let addr = spawn_upstream(upstream).await;
    let config = config_for(addr);
    let runtime = ChatRuntime::from_config(&config).await.unwrap();
    let orchestrator = runtime.orchestrator.clone();

    let app = ragachat_gateway::build_router(
        Arc::new(ragachat_gateway::api_v1::ApiV1State { orchestrator }),
        config.gateway.max_body_bytes,
    );

    let create = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/chat/session")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            json!({ "userId": "u1", "title": "Session 1" }).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let session: Value = serde_json::from_slice(&body).unwrap();
    let id = session["id"].as_i64().unwrap();

    let ask = axum::http::Request::builder()
        .method("POST")
        .uri(format!("/api/v1/chat/session/{id}/messages"))
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            json!({ "sender": "u1", "content": "Hello" }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(ask).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let chunks: Vec<String> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str::<Value>(data).unwrap()["content"].to_string())
        .collect();
    assert_eq!(chunks, vec!["\"Hel\"", "\"lo!\""]);

    let page = runtime
        .orchestrator
        .messages(SessionId(id), 0, 10)
        .await
        .unwrap();
    assert_eq!(page.content[1].content, "Hello!");
}

#[tokio::test]
async fn e2e_config_defaults_and_validation() {
    let config = AppConfig::default();
    assert_eq!(config.retrieval.dimensions, 1024);
    assert!((config.retrieval.similarity_threshold - 0.20).abs() < f32::EPSILON);
    assert_eq!(config.retrieval.knowledge_top_n, 5);
    assert_eq!(config.retrieval.history_limit, 5);
    assert_eq!(config.generation.retry.max_retries, 3);
    assert!(config.validate().is_ok());

    let mut bad = AppConfig::default();
    bad.generation.provider = "nonexistent".into();
    assert!(bad.validate().is_err());
}
