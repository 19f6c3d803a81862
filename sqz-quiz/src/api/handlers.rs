//! HTTP request handlers

use super::AppContext;
use crate::catalog::{build_collection, CollectionQuery};
use crate::controller::QuizSnapshot;
use crate::error::QuizError;
use crate::session::AnswerOutcome;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqz_ap::{AudioError, Gesture};
use sqz_common::events::AudioStatus;
use sqz_common::CollectionItem;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    choice: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct InteractionRequest {
    #[serde(default)]
    gesture: Option<Gesture>,
}

#[derive(Debug, Serialize)]
pub struct InteractionResponse {
    granted: bool,
}

#[derive(Debug, Serialize)]
pub struct BgmToggleResponse {
    playing: bool,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    volume: f32,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    volume: Option<f32>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn status(code: StatusCode, message: impl Into<String>) -> ApiError {
    (
        code,
        Json(StatusResponse {
            status: message.into(),
        }),
    )
}

/// Map a quiz error to a status code
fn quiz_error(err: QuizError) -> ApiError {
    let code = match &err {
        QuizError::InvalidPhase(_) | QuizError::AlreadyAnswered | QuizError::NoCurrentQuestion => {
            StatusCode::CONFLICT
        }
        QuizError::InvalidChoice(_) => StatusCode::BAD_REQUEST,
        QuizError::QuestionBankLoad(_) | QuizError::EmptyBank | QuizError::Http(_) | QuizError::Io(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    status(code, format!("error: {}", err))
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "sqz-quiz".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
    })
}

// ============================================================================
// Asset Listings and Gallery
// ============================================================================

/// GET /api/sounds
pub async fn list_sounds(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<String>>, (StatusCode, Json<ErrorResponse>)> {
    ctx.source.list_sounds().await.map(Json).map_err(|e| {
        error!("Failed to list sounds: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to load sound files".to_string(),
            }),
        )
    })
}

/// GET /api/images
pub async fn list_images(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<String>>, (StatusCode, Json<ErrorResponse>)> {
    ctx.source.list_images().await.map(Json).map_err(|e| {
        error!("Failed to list images: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to load image files".to_string(),
            }),
        )
    })
}

async fn collection(ctx: &AppContext) -> crate::error::Result<Vec<CollectionItem>> {
    let images = ctx.source.list_images().await?;
    let sounds = ctx.source.list_sounds().await?;
    Ok(build_collection(&images, &sounds, &ctx.assets))
}

/// GET /api/collection?search=&category=
pub async fn get_collection(
    State(ctx): State<AppContext>,
    Query(query): Query<CollectionQuery>,
) -> (StatusCode, Json<Vec<CollectionItem>>) {
    match collection(&ctx).await {
        Ok(items) => (StatusCode::OK, Json(query.apply(items))),
        Err(e) => {
            error!("Failed to build collection: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Vec::new()))
        }
    }
}

/// POST /api/collection/:id/play - preview an item's sound
pub async fn play_collection_item(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let items = collection(&ctx)
        .await
        .map_err(|e| status(StatusCode::INTERNAL_SERVER_ERROR, format!("error: {}", e)))?;
    let item = items
        .into_iter()
        .find(|item| item.id == id)
        .ok_or_else(|| status(StatusCode::NOT_FOUND, format!("error: no item {}", id)))?;

    match ctx
        .coordinator
        .play_sound_effect(&item.audio_ref, ctx.effect_volume)
        .await
    {
        Ok(()) => {
            info!("Previewing {}", item.display_text);
            Ok(Json(StatusResponse {
                status: "playing".to_string(),
            }))
        }
        Err(AudioError::AutoplayBlocked) => Err(status(StatusCode::CONFLICT, "autoplay_blocked")),
        Err(e) => {
            warn!("Preview of {} failed: {}", item.audio_ref, e);
            Err(status(StatusCode::INTERNAL_SERVER_ERROR, format!("error: {}", e)))
        }
    }
}

// ============================================================================
// Quiz Endpoints
// ============================================================================

/// GET /api/quiz
pub async fn get_quiz(State(ctx): State<AppContext>) -> Json<QuizSnapshot> {
    Json(ctx.controller.snapshot())
}

/// POST /api/quiz/start
pub async fn start_quiz(State(ctx): State<AppContext>) -> Result<Json<QuizSnapshot>, ApiError> {
    ctx.controller.start().await.map(Json).map_err(quiz_error)
}

/// POST /api/quiz/answer
pub async fn answer(
    State(ctx): State<AppContext>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerOutcome>, ApiError> {
    ctx.controller
        .select_answer(&req.choice)
        .map(Json)
        .map_err(quiz_error)
}

/// POST /api/quiz/advance
pub async fn advance(State(ctx): State<AppContext>) -> Result<Json<QuizSnapshot>, ApiError> {
    ctx.controller.advance().await.map(Json).map_err(quiz_error)
}

/// POST /api/quiz/replay
pub async fn replay(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    ctx.controller.replay_sound().await.map_err(quiz_error)?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

/// POST /api/quiz/restart
pub async fn restart(State(ctx): State<AppContext>) -> Json<QuizSnapshot> {
    Json(ctx.controller.restart().await)
}

// ============================================================================
// Audio Endpoints
// ============================================================================

/// GET /api/audio
pub async fn get_audio(State(ctx): State<AppContext>) -> Json<AudioStatus> {
    Json(ctx.coordinator.status())
}

/// POST /api/audio/interaction - record a gesture, or grant outright without one
pub async fn record_interaction(
    State(ctx): State<AppContext>,
    body: Option<Json<InteractionRequest>>,
) -> Json<InteractionResponse> {
    let gate = ctx.coordinator.gate();
    let granted = match body.and_then(|Json(req)| req.gesture) {
        Some(gesture) => gate.record_gesture(gesture),
        None => {
            gate.set_user_interacted();
            true
        }
    };
    Json(InteractionResponse { granted })
}

/// POST /api/audio/bgm/toggle
pub async fn toggle_bgm(State(ctx): State<AppContext>) -> Json<BgmToggleResponse> {
    let playing = ctx.coordinator.toggle_bgm().await;
    Json(BgmToggleResponse { playing })
}

/// POST /api/audio/bgm/volume
pub async fn set_bgm_volume(
    State(ctx): State<AppContext>,
    Json(req): Json<VolumeRequest>,
) -> Result<Json<VolumeResponse>, StatusCode> {
    if !req.volume.is_finite() {
        return Err(StatusCode::BAD_REQUEST);
    }
    ctx.coordinator.adjust_bgm_volume(req.volume);
    Ok(Json(VolumeResponse {
        volume: ctx.coordinator.bgm_volume(),
    }))
}
