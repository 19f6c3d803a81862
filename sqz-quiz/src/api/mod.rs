//! HTTP control surface
//!
//! JSON endpoints for the quiz, the gallery and the audio coordinator, an SSE
//! stream of [`SqzEvent`](sqz_common::events::SqzEvent)s, and the asset
//! directories served as static files.

pub mod handlers;
pub mod sse;

use crate::controller::QuizController;
use crate::source::QuestionSource;
use axum::{
    routing::{get, post},
    Router,
};
use sqz_ap::AudioCoordinator;
use sqz_common::config::AssetConfig;
use sqz_common::events::EventBus;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub controller: QuizController,
    pub coordinator: AudioCoordinator,
    pub source: Arc<dyn QuestionSource>,
    pub events: Arc<EventBus>,
    pub assets: AssetConfig,
    /// Asset root; `/sound`, `/img` and `/bgm` are served from here
    pub root_folder: PathBuf,
    /// Volume for gallery previews
    pub effect_volume: f32,
}

/// Build the router with every route attached
pub fn router(ctx: AppContext) -> Router {
    let assets = ctx.assets.clone();
    let root = ctx.root_folder.clone();

    Router::new()
        .route("/health", get(handlers::health))
        // Asset listings and gallery
        .route("/api/sounds", get(handlers::list_sounds))
        .route("/api/images", get(handlers::list_images))
        .route("/api/collection", get(handlers::get_collection))
        .route("/api/collection/:id/play", post(handlers::play_collection_item))
        // Quiz
        .route("/api/quiz", get(handlers::get_quiz))
        .route("/api/quiz/start", post(handlers::start_quiz))
        .route("/api/quiz/answer", post(handlers::answer))
        .route("/api/quiz/advance", post(handlers::advance))
        .route("/api/quiz/replay", post(handlers::replay))
        .route("/api/quiz/restart", post(handlers::restart))
        // Audio
        .route("/api/audio", get(handlers::get_audio))
        .route("/api/audio/interaction", post(handlers::record_interaction))
        .route("/api/audio/bgm/toggle", post(handlers::toggle_bgm))
        .route("/api/audio/bgm/volume", post(handlers::set_bgm_volume))
        // SSE event stream
        .route("/events", get(sse::event_stream))
        .with_state(ctx)
        // Static assets
        .nest_service(&format!("/{}", assets.sound_dir), ServeDir::new(root.join(&assets.sound_dir)))
        .nest_service(&format!("/{}", assets.image_dir), ServeDir::new(root.join(&assets.image_dir)))
        .nest_service(&format!("/{}", assets.bgm_dir), ServeDir::new(root.join(&assets.bgm_dir)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind `port` on all interfaces and serve until `shutdown` resolves
pub async fn run(
    ctx: AppContext,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
