//! HTTP endpoints
//!
//! The pipeline's transport surface: a chat endpoint, its SSE streaming
//! twin, a health probe and an admin reindex trigger. Pipeline failures
//! come back as 200s with a user-readable answer; only malformed bodies
//! earn a 4xx.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use task_agent_agent::{ChatRequest, ChatResponse, PipelineEvent};

use crate::state::AppState;

/// Build the application router.
pub fn create_router(state: AppState, cors_enabled: bool) -> Router {
    let mut router = Router::new()
        .route("/task-manager/chat", post(chat))
        .route("/task-manager/chat-stream", get(chat_stream))
        .route("/task-manager/admin/reindex", post(reindex_all))
        .route("/health", get(health));

    if cors_enabled {
        router = router.layer(CorsLayer::permissive());
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Non-streaming chat.
async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Json<ChatResponse> {
    Json(state.pipeline.process(request).await)
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    query: String,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Streaming chat over server-sent events.
async fn chat_stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<PipelineEvent>(32);
    let request = ChatRequest {
        query: params.query,
        session_id: params.session_id,
    };

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        pipeline.process_stream(request, tx).await;
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Some((Ok(Event::default().data(data)), rx))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Trigger a full reindex and return its stats.
async fn reindex_all(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.indexer.index_all().await;
    Json(serde_json::to_value(&stats).unwrap_or_default())
}

/// Liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
