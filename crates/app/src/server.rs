//! HTTP transport over `SessionEngine`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use services::{ChatResponse, EngineError, GenerationError, IngestReport, SessionEngine};
use study_core::model::{Mode, SessionId, SessionSnapshot};

#[derive(Clone)]
struct AppState {
    engine: Arc<SessionEngine>,
}

pub fn router(engine: Arc<SessionEngine>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sessions", post(create_session_handler))
        .route("/sessions/:id", get(snapshot_handler))
        .route("/sessions/:id/documents", post(documents_handler))
        .route("/sessions/:id/chat", post(chat_handler))
        .route("/sessions/:id/reset", post(reset_handler))
        .with_state(AppState { engine })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

//
// ─── REQUESTS & RESPONSES ──────────────────────────────────────────────────────
//

#[derive(Debug, Serialize, Deserialize)]
struct SessionCreated {
    session_id: SessionId,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DocumentUpload {
    Chunks { chunks: Vec<String> },
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    mode: Mode,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

/// Every failure leaves the server as a JSON `{error, kind}` body.
#[derive(Debug)]
enum ApiError {
    Engine(EngineError),
    InvalidSessionId(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::InvalidSessionId(raw) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: format!("session not found: {raw}"),
                    kind: "session_not_found",
                },
            ),
            ApiError::Engine(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    error!(error = %err, kind = err.kind(), "request failed");
                } else {
                    warn!(error = %err, kind = err.kind(), "request rejected");
                }
                (
                    status,
                    ErrorBody {
                        error: err.to_string(),
                        kind: err.kind(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidAnswerToken(_) => StatusCode::BAD_REQUEST,
        EngineError::MissingTopic | EngineError::EmptyDocument => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::NoActiveTest => StatusCode::CONFLICT,
        EngineError::TestGeneration(_) => StatusCode::BAD_GATEWAY,
        EngineError::Generation(GenerationError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Generation(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_id(raw: &str) -> Result<SessionId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::InvalidSessionId(raw.to_string()))
}

//
// ─── HANDLERS ──────────────────────────────────────────────────────────────────
//

async fn health_handler() -> &'static str {
    "OK"
}

async fn create_session_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = state.engine.create_session().await;
    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}

async fn snapshot_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.snapshot(id).await?))
}

async fn documents_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(upload): Json<DocumentUpload>,
) -> Result<Json<IngestReport>, ApiError> {
    let id = parse_id(&id)?;
    let report = match upload {
        DocumentUpload::Chunks { chunks } => state.engine.ingest_chunks(id, chunks).await?,
        DocumentUpload::Text { text } => state.engine.ingest_text(id, &text).await?,
    };
    Ok(Json(report))
}

async fn chat_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let id = parse_id(&id)?;
    let response = state
        .engine
        .handle(id, request.mode, &request.message)
        .await?;
    Ok(Json(response))
}

async fn reset_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionCreated>, ApiError> {
    let id = parse_id(&id)?;
    let session_id = state.engine.reset_session(id).await;
    Ok(Json(SessionCreated { session_id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use services::{EngineConfig, GenerationClient, Prompt};
    use storage::{InMemorySessionStore, SessionRepository};
    use study_core::time::fixed_clock;

    #[derive(Default)]
    struct QueuedClient(Mutex<VecDeque<Result<String, GenerationError>>>);

    #[async_trait]
    impl GenerationClient for QueuedClient {
        async fn generate(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("An explanation.".into()))
        }
    }

    fn app(replies: Vec<Result<String, GenerationError>>) -> Router {
        let config = EngineConfig {
            extract_topics: false,
            ..EngineConfig::default()
        };
        let engine = SessionEngine::new(
            fixed_clock(),
            config,
            Arc::new(InMemorySessionStore::new(fixed_clock())) as Arc<dyn SessionRepository>,
            Arc::new(QueuedClient(Mutex::new(replies.into()))) as Arc<dyn GenerationClient>,
        );
        router(Arc::new(engine))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create(app: &Router) -> String {
        let (status, body) = send(app, "POST", "/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn teach_chat_round_trip() {
        let app = app(vec![]);
        let id = create(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/sessions/{id}/chat"),
            Some(json!({"mode": "teach", "message": "Explain optics"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "An explanation.");
        assert_eq!(body["mode"], "teach");
        assert_eq!(body["session_id"], id.as_str());
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_are_not_found() {
        let app = app(vec![]);
        for id in ["not-a-uuid", "6f1c1d9e-3c2a-4e55-9a51-0d6f0b5c2d11"] {
            let (status, body) = send(&app, "GET", &format!("/sessions/{id}"), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["kind"], "session_not_found");
        }
    }

    #[tokio::test]
    async fn documents_accept_chunks_or_text() {
        let app = app(vec![]);
        let id = create(&app).await;
        let uri = format!("/sessions/{id}/documents");

        let (status, body) =
            send(&app, "POST", &uri, Some(json!({"chunks": ["Optics covers lenses."]}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chunks"], 1);

        let (status, body) = send(&app, "POST", &uri, Some(json!({"text": "   "}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "empty_document");
    }

    #[tokio::test]
    async fn generation_errors_map_to_gateway_statuses() {
        let app = app(vec![
            Err(GenerationError::Unavailable("rate limited".into())),
            Ok("no questions here".into()),
        ]);
        let id = create(&app).await;
        let uri = format!("/sessions/{id}/chat");

        let (status, body) =
            send(&app, "POST", &uri, Some(json!({"mode": "teach", "message": "x"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["kind"], "generation_unavailable");

        let (status, body) =
            send(&app, "POST", &uri, Some(json!({"mode": "test", "message": "Optics"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "test_generation_error");
    }

    #[tokio::test]
    async fn reset_returns_fresh_session() {
        let app = app(vec![]);
        let id = create(&app).await;

        let (status, body) = send(&app, "POST", &format!("/sessions/{id}/reset"), None).await;
        assert_eq!(status, StatusCode::OK);
        let fresh = body["session_id"].as_str().unwrap().to_string();
        assert_ne!(fresh, id);

        let (status, _) = send(&app, "GET", &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = send(&app, "GET", &format!("/sessions/{fresh}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "teach");
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = app(vec![]);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
