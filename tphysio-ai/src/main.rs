//! TPhysio Analyzer (tphysio-ai) - Main entry point
//!
//! HTTP service that accepts parsed training recordings and runs the
//! enrichment → metrics → AI analysis pipeline as background jobs.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tphysio_ai::services::{
    GeminiClient, JobOrchestrator, OpenElevationClient, OpenMeteoElevationClient,
    OpenMeteoWeatherClient,
};
use tphysio_ai::types::ElevationProvider;
use tphysio_ai::{build_router, AppState};
use tphysio_common::config::{resolve_toml_config, ElevationBackend};
use tphysio_common::events::EventBus;

/// Command-line arguments for tphysio-ai
#[derive(Parser, Debug)]
#[command(name = "tphysio-ai")]
#[command(about = "Training physiology analysis service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3001", env = "TPHYSIO_PORT")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "TPHYSIO_HOST")]
    host: IpAddr,

    /// TOML config file (defaults to the platform config directory)
    #[arg(short, long, env = "TPHYSIO_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config =
        resolve_toml_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TPhysio Analyzer (tphysio-ai) on {}:{}", args.host, args.port);

    let api_key = tphysio_ai::config::resolve_gemini_api_key(&toml_config)
        .context("Failed to resolve Gemini API key")?;

    let pipeline = &toml_config.pipeline;
    let providers = &toml_config.providers;
    let http_timeout = Duration::from_secs(pipeline.http_timeout_secs);

    let weather = Arc::new(
        OpenMeteoWeatherClient::new(
            providers.forecast_url.clone(),
            providers.archive_url.clone(),
            http_timeout,
        )
        .context("Failed to create weather client")?,
    );

    let elevation: Arc<dyn ElevationProvider> = match providers.elevation_backend {
        ElevationBackend::OpenElevation => Arc::new(
            OpenElevationClient::new(providers.open_elevation_url.clone(), http_timeout)
                .context("Failed to create elevation client")?,
        ),
        ElevationBackend::OpenMeteo => Arc::new(
            OpenMeteoElevationClient::new(providers.open_meteo_elevation_url.clone(), http_timeout)
                .context("Failed to create elevation client")?,
        ),
    };
    info!("Elevation provider: {}", elevation.name());

    let generator = Arc::new(
        GeminiClient::new(
            providers.gemini_base_url.clone(),
            api_key,
            Duration::from_secs(pipeline.generation_timeout_secs),
        )
        .context("Failed to create Gemini client")?,
    );
    info!("Model tiers: {}", pipeline.model_tiers.join(" → "));

    let event_bus = EventBus::new(1000);
    let orchestrator =
        JobOrchestrator::from_providers(weather, elevation, generator, pipeline, event_bus);

    let app = build_router(AppState::new(orchestrator.clone()));

    let addr = SocketAddr::new(args.host, args.port);
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            orchestrator.shutdown();
        })
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
