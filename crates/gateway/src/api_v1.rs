//! HTTP API v1: chat sessions and their messages.
//!
//! Endpoints:
//!
//! - `POST   /api/v1/chat/session`                  Create a session (201)
//! - `GET    /api/v1/chat/session?userId=`          List a user's sessions
//! - `POST   /api/v1/chat/session/{id}/messages`    Ask a question, SSE stream of answer chunks
//! - `GET    /api/v1/chat/session/{id}/messages`    Page through messages (`page`, `size`)
//! - `PATCH  /api/v1/chat/session/{id}/rename`      Rename a session
//! - `PATCH  /api/v1/chat/session/{id}/favorite`    Mark or unmark as favorite
//! - `DELETE /api/v1/chat/session/{id}`             Delete a session and its messages (204)

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, patch},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use ragachat_chat::ChatOrchestrator;
use ragachat_core::{ChatMessage, Error, MessagePage, Session, SessionId};

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub orchestrator: Arc<ChatOrchestrator>,
}

pub type SharedApiState = Arc<ApiV1State>;

// ── Router ────────────────────────────────────────────────────────────────

pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route(
            "/api/v1/chat/session",
            get(list_sessions_handler).post(create_session_handler),
        )
        .route(
            "/api/v1/chat/session/{id}",
            delete(delete_session_handler),
        )
        .route(
            "/api/v1/chat/session/{id}/messages",
            get(list_messages_handler).post(add_message_handler),
        )
        .route("/api/v1/chat/session/{id}/rename", patch(rename_handler))
        .route("/api/v1/chat/session/{id}/favorite", patch(favorite_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub user_id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMessageRequest {
    pub sender: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub favorite: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: usize,
    #[serde(default = "default_page_size")]
    size: usize,
}

fn default_page_size() -> usize {
    10
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps domain errors onto status codes with a JSON body.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// ── Sessions ──────────────────────────────────────────────────────────────

async fn create_session_handler(
    State(state): State<SharedApiState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = state
        .orchestrator
        .create_session(&req.user_id, &req.title)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions_handler(
    State(state): State<SharedApiState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<Session>>, ApiError> {
    Ok(Json(
        state.orchestrator.sessions_for_user(&query.user_id).await?,
    ))
}

async fn rename_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(
        state
            .orchestrator
            .rename_session(SessionId(id), &req.title)
            .await?,
    ))
}

async fn favorite_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
    Json(req): Json<FavoriteRequest>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(
        state
            .orchestrator
            .set_favorite(SessionId(id), req.favorite)
            .await?,
    ))
}

async fn delete_session_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.delete_session(SessionId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Messages ──────────────────────────────────────────────────────────────

async fn list_messages_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<MessagePage>, ApiError> {
    Ok(Json(
        state
            .orchestrator
            .messages(SessionId(id), query.page, query.size)
            .await?,
    ))
}

/// Each chunk is one SSE event whose data is a transient `ChatMessage`.
/// A failure to persist the answer arrives as an `error` event.
async fn add_message_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
    Json(req): Json<AddMessageRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    info!(
        session_id = id,
        content_len = req.content.len(),
        "Chat message received"
    );

    let rx = state
        .orchestrator
        .add_message(SessionId(id), &req.sender, &req.content)
        .await?;

    let stream = ReceiverStream::new(rx).map(|event| Ok(to_sse_event(event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: Result<ChatMessage, Error>) -> SseEvent {
    match event {
        Ok(chunk) => SseEvent::default().data(serde_json::to_string(&chunk).unwrap_or_default()),
        Err(e) => {
            let body = ErrorResponse {
                error: e.to_string(),
            };
            SseEvent::default()
                .event("error")
                .data(serde_json::to_string(&body).unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use ragachat_chat::KnowledgeRetriever;
    use ragachat_core::{
        Embedder, EmbeddingError, EmbeddingVector, GenerationBackend, GenerationError,
        RecordReceiver,
    };
    use ragachat_providers::{GenerationClient, RetryPolicy};
    use ragachat_store::InMemoryStore;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    /// Every text embeds to the same vector.
    struct FlatEmbedder;

    #[async_trait]
    impl Embedder for FlatEmbedder {
        fn name(&self) -> &str {
            "flat"
        }

        async fn embed(&self, _text: &str) -> Result<EmbeddingVector, EmbeddingError> {
            Ok(EmbeddingVector::new(vec![1.0, 0.0, 0.0]))
        }
    }

    /// Streams the same chunks for every prompt.
    struct EchoBackend {
        chunks: Vec<&'static str>,
    }

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn open_stream(&self, _prompt: &str) -> Result<RecordReceiver, GenerationError> {
            let (tx, rx) = mpsc::channel(8);
            let chunks = self.chunks.clone();
            tokio::spawn(async move {
                for chunk in chunks {
                    let _ = tx.send(Ok(chunk.to_string())).await;
                }
            });
            Ok(rx)
        }
    }

    fn test_api_state() -> SharedApiState {
        let store = Arc::new(InMemoryStore::new());
        let retriever = KnowledgeRetriever::new(Arc::new(FlatEmbedder), store.clone());
        let generation = GenerationClient::new(Arc::new(EchoBackend {
            chunks: vec!["Spring Boot ", "is a framework."],
        }))
        .with_retry(RetryPolicy::none());
        Arc::new(ApiV1State {
            orchestrator: Arc::new(ChatOrchestrator::new(store, retriever, generation)),
        })
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn create(state: &SharedApiState, user: &str) -> Session {
        let response = v1_router(state.clone())
            .oneshot(json_request(
                "POST",
                "/api/v1/chat/session",
                serde_json::json!({ "userId": user, "title": "Session 1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    #[tokio::test]
    async fn create_and_list_sessions() {
        let state = test_api_state();
        let session = create(&state, "u1").await;
        assert_eq!(session.user_id, "u1");
        assert!(!session.favorite);

        let response = v1_router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/chat/session?userId=u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let sessions: Vec<Session> = body_json(response).await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session.id);
    }

    #[tokio::test]
    async fn add_message_streams_chunks_as_sse() {
        let state = test_api_state();
        let session = create(&state, "u1").await;

        let response = v1_router(state.clone())
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/chat/session/{}/messages", session.id),
                serde_json::json!({ "sender": "u1", "content": "What is Spring Boot?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        let chunks: Vec<ChatMessage> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "Spring Boot ");
        assert_eq!(chunks[0].sender, "AI");
        assert!(chunks[0].id.is_none());

        let page = state
            .orchestrator
            .messages(session.id, 0, 10)
            .await
            .unwrap();
        assert_eq!(page.total_elements, 2);
        assert_eq!(page.content[1].content, "Spring Boot is a framework.");
    }

    #[tokio::test]
    async fn add_message_to_unknown_session_is_404() {
        let response = v1_router(test_api_state())
            .oneshot(json_request(
                "POST",
                "/api/v1/chat/session/999999/messages",
                serde_json::json!({ "sender": "u1", "content": "Hello" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: ErrorResponse = body_json(response).await;
        assert!(body.error.contains("999999"));
    }

    #[tokio::test]
    async fn blank_content_is_400() {
        let state = test_api_state();
        let session = create(&state, "u1").await;
        let response = v1_router(state)
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/chat/session/{}/messages", session.id),
                serde_json::json!({ "sender": "u1", "content": "  " }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn message_pages_default_to_first_ten() {
        let state = test_api_state();
        let session = create(&state, "u1").await;

        let response = v1_router(state)
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/chat/session/{}/messages", session.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let page: MessagePage = body_json(response).await;
        assert_eq!(page.page, 0);
        assert_eq!(page.size, 10);
        assert!(page.content.is_empty());
    }

    #[tokio::test]
    async fn rename_and_favorite() {
        let state = test_api_state();
        let session = create(&state, "u1").await;

        let response = v1_router(state.clone())
            .oneshot(json_request(
                "PATCH",
                &format!("/api/v1/chat/session/{}/rename", session.id),
                serde_json::json!({ "title": "Spring questions" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let renamed: Session = body_json(response).await;
        assert_eq!(renamed.title, "Spring questions");

        let response = v1_router(state)
            .oneshot(json_request(
                "PATCH",
                &format!("/api/v1/chat/session/{}/favorite", session.id),
                serde_json::json!({ "favorite": true }),
            ))
            .await
            .unwrap();
        let favorite: Session = body_json(response).await;
        assert!(favorite.favorite);
        assert_eq!(favorite.title, "Spring questions");
    }

    #[tokio::test]
    async fn rename_unknown_session_is_404() {
        let response = v1_router(test_api_state())
            .oneshot(json_request(
                "PATCH",
                "/api/v1/chat/session/42/rename",
                serde_json::json!({ "title": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_session_then_404() {
        let state = test_api_state();
        let session = create(&state, "u1").await;
        let uri = format!("/api/v1/chat/session/{}", session.id);

        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .body(Body::empty())
                .unwrap()
        };

        let response = v1_router(state.clone()).oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = v1_router(state).oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
