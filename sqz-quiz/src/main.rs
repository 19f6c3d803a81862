//! Sound quiz (sqz-quiz) - Main entry point
//!
//! Composition root: loads configuration, builds the audio coordinator and
//! the quiz controller, and serves the HTTP/SSE control surface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqz_ap::backend::{DeviceBackend, MemoryBackend};
use sqz_ap::{AudioBackend, AudioCoordinator, AutoplayGate, CoordinatorConfig};
use sqz_common::config::{default_config_path, load_toml_config, resolve_root_folder, DEFAULT_PORT};
use sqz_common::events::EventBus;
use sqz_quiz::api::{self, AppContext};
use sqz_quiz::{ControllerConfig, DirectorySource, HttpSource, QuestionSource, QuizController};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for sqz-quiz
#[derive(Parser, Debug)]
#[command(name = "sqz-quiz")]
#[command(about = "Sound quiz service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SQZ_PORT")]
    port: Option<u16>,

    /// Root folder containing the sound, img and bgm directories
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Play audio through the in-memory backend instead of an output device
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = load_toml_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    // Initialize tracing
    let default_filter = format!(
        "sqz_quiz={level},sqz_ap={level},sqz_common={level},tower_http=info",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "sqz-quiz {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );
    info!("Configuration: {}", config_path.display());

    let port = args.port.or(config.port).unwrap_or(DEFAULT_PORT);
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    info!("Root folder: {}", root_folder.display());

    let events = Arc::new(EventBus::default());

    let backend: Arc<dyn AudioBackend> = if args.headless {
        info!("Headless mode: audio is simulated");
        Arc::new(MemoryBackend::new())
    } else {
        match DeviceBackend::open(root_folder.clone(), config.audio.device_name.clone()) {
            Ok(device) => Arc::new(device),
            Err(e) => {
                warn!("No usable audio output ({}), falling back to simulated audio", e);
                Arc::new(MemoryBackend::new())
            }
        }
    };

    let primed = Arc::clone(&backend);
    let gate = Arc::new(
        AutoplayGate::new()
            .with_events(Arc::clone(&events))
            .with_primer(move || {
                let backend = Arc::clone(&primed);
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    runtime.spawn_blocking(move || {
                        if let Err(e) = backend.prime() {
                            warn!("Audio output unlock failed: {}", e);
                        }
                    });
                }
            }),
    );

    let coordinator = AudioCoordinator::new(
        backend,
        Arc::clone(&gate),
        Arc::clone(&events),
        CoordinatorConfig::from(&config.audio),
    );

    let source: Arc<dyn QuestionSource> = match &config.quiz.question_source_url {
        Some(url) => Arc::new(
            HttpSource::new(url.clone(), config.assets.clone()).context("Failed to create HTTP client")?,
        ),
        None => Arc::new(DirectorySource::new(root_folder.clone(), config.assets.clone())),
    };
    info!("Question source: {}", source.describe());

    let controller = QuizController::new(
        coordinator.clone(),
        Arc::clone(&source),
        Arc::clone(&events),
        ControllerConfig::new(&config.quiz, &config.audio, &config.assets),
    );

    if let Some(menu_bgm) = &config.assets.menu_bgm {
        controller.spawn_menu_bgm(menu_bgm, config.audio.bgm_volume);
    }

    let ctx = AppContext {
        controller: controller.clone(),
        coordinator: coordinator.clone(),
        source,
        events,
        assets: config.assets.clone(),
        root_folder,
        effect_volume: config.audio.effect_volume,
    };

    api::run(ctx, port, shutdown_signal())
        .await
        .with_context(|| format!("HTTP server on port {} failed", port))?;

    controller.shutdown();
    coordinator.stop_all().await;
    coordinator.stop_bgm();
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
