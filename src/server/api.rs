//! HTTP API for the desktop UI.
//!
//! Mirrors the app's request/response surface: list/load/unload/status/info
//! for the model lifecycle, chat turns with statistics, session aggregates,
//! and an SSE endpoint for the one-way notifications. Handlers convert every
//! component failure into a `{success: false, error}` body; nothing
//! propagates as a transport-level fault.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::sse::{KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::chat::coordinator::{ChatCoordinator, ChatEvent};
use crate::chat::stats::{ChatStats, SessionStats};
use crate::config::Config;
use crate::llama::LlamaRuntime;
use crate::model::catalog::ModelFile;
use crate::model::controller::{
    LoadProgress, ModelController, ModelInfo, ModelSlot, ModelStatus,
};
use crate::server::events::notification_stream;

/// Application state shared across handlers.
pub struct AppState {
    pub controller: ModelController,
    pub chat: ChatCoordinator,
    pub config: Arc<Config>,
    pub session_stats: RwLock<SessionStats>,
    pub progress_tx: broadcast::Sender<LoadProgress>,
    pub chat_tx: broadcast::Sender<ChatEvent>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the controller and coordinator around a shared model slot.
    pub fn new(runtime: Arc<dyn LlamaRuntime>, config: Arc<Config>) -> Self {
        let slot = Arc::new(ModelSlot::new());
        let (progress_tx, _) = broadcast::channel(64);
        let (chat_tx, _) = broadcast::channel(64);

        let controller = ModelController::new(
            runtime,
            config.clone(),
            slot.clone(),
            progress_tx.clone(),
        );
        let chat = ChatCoordinator::new(slot, config.clone(), chat_tx.clone());

        Self {
            controller,
            chat,
            config,
            session_stats: RwLock::new(SessionStats::default()),
            progress_tx,
            chat_tx,
            start_time: Instant::now(),
        }
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/models/load", post(load_model))
        .route("/v1/models/unload", post(unload_model))
        .route("/v1/models/status", get(model_status))
        .route("/v1/models/info", get(model_info))
        .route("/v1/models/directory", get(models_directory))
        .route("/v1/chat", post(send_message))
        .route("/v1/chat/stats", get(chat_stats))
        .route("/v1/chat/reset", post(chat_reset))
        .route("/v1/events", get(events))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        // The desktop UI renderer is a cross-origin client of this daemon.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ModelListResponse {
    pub models: Vec<ModelFile>,
}

#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct LoadModelResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnloadModelResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ModelInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelsDirectoryResponse {
    pub directory: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ChatStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub model: ModelStatus,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelListResponse> {
    // A scan failure degrades to an empty catalog; the UI treats both the
    // same way.
    let models = state.controller.list_available_models().unwrap_or_else(|err| {
        error!(error = %err, "Model listing failed");
        Vec::new()
    });
    Json(ModelListResponse { models })
}

async fn load_model(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoadModelRequest>,
) -> Json<LoadModelResponse> {
    match state.controller.load_model(&req.path).await {
        Ok(loaded) => Json(LoadModelResponse {
            success: true,
            model: Some(loaded.model),
            elapsed_ms: Some(loaded.elapsed_ms),
            error: None,
        }),
        Err(err) => Json(LoadModelResponse {
            success: false,
            model: None,
            elapsed_ms: None,
            error: Some(err.to_string()),
        }),
    }
}

async fn unload_model(State(state): State<Arc<AppState>>) -> Json<UnloadModelResponse> {
    match state.controller.unload_model().await {
        Ok(()) => Json(UnloadModelResponse {
            success: true,
            error: None,
        }),
        Err(err) => Json(UnloadModelResponse {
            success: false,
            error: Some(err.to_string()),
        }),
    }
}

async fn model_status(State(state): State<Arc<AppState>>) -> Json<ModelStatus> {
    Json(state.controller.status())
}

async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfoResponse> {
    match state.controller.model_info() {
        Ok(info) => Json(ModelInfoResponse {
            success: true,
            info: Some(info),
            error: None,
        }),
        Err(err) => Json(ModelInfoResponse {
            success: false,
            info: None,
            error: Some(err.to_string()),
        }),
    }
}

async fn models_directory(State(state): State<Arc<AppState>>) -> Json<ModelsDirectoryResponse> {
    Json(ModelsDirectoryResponse {
        directory: state.controller.models_directory().display().to_string(),
    })
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    match state.chat.send_message(&req.message).await {
        Ok(turn) => {
            state.session_stats.write().await.record_turn(&turn.stats);
            Json(ChatResponse {
                success: true,
                response: Some(turn.response),
                stats: Some(turn.stats),
                error: None,
            })
        }
        Err(err) => Json(ChatResponse {
            success: false,
            response: None,
            stats: None,
            error: Some(err.to_string()),
        }),
    }
}

async fn chat_stats(State(state): State<Arc<AppState>>) -> Json<SessionStats> {
    Json(state.session_stats.read().await.clone())
}

async fn chat_reset(State(state): State<Arc<AppState>>) -> Json<ResetResponse> {
    state.session_stats.write().await.reset();
    Json(ResetResponse { success: true })
}

async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>
{
    let stream = notification_stream(state.progress_tx.subscribe(), state.chat_tx.subscribe());
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        model: state.controller.status(),
    })
}
