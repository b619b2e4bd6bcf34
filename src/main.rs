//! # Audio Relay Backend - Main Application Entry Point
//!
//! HTTP server that accepts raw audio buffers from remote microphone nodes,
//! classifies them through an external inference service, and relays the results
//! to an MQTT bus and an append-only CSV store.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **state**: shared application state and request metrics
//! - **audio**: waveform normalization (byte decode + spectral resampling)
//! - **classify**: the external classifier boundary and its label vocabulary
//! - **relay**: result sink, message-bus client and liveness heartbeat
//! - **ingest**: the normalize → classify → sink → publish orchestrator
//! - **handlers / health / middleware**: the HTTP surface
//!
//! Startup wires the pipeline once; per-request work shares it through
//! `web::Data`. The bus client is shut down exactly once on exit, whether the
//! process stops on a signal or normally.

mod audio;
mod classify;
mod config;
mod error;
mod handlers;
mod health;
mod ingest;
mod middleware;
mod relay;
mod state;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use audio::WaveformNormalizer;
use classify::{LabelMap, RemoteClassifier};
use config::AppConfig;
use ingest::IngestionService;
use relay::{BusClient, CsvResultSink, EventPublisher};
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown flag set by the signal handlers.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting audio-relay-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    // Classifier boundary: label vocabulary is loaded once at startup; refusing
    // to start without it is what lets /health report model_loaded afterwards
    let labels = LabelMap::from_path(&config.classifier.class_map_path)?;
    info!(
        labels = labels.len(),
        path = %config.classifier.class_map_path,
        "label vocabulary loaded"
    );

    let classifier = RemoteClassifier::new(
        config.classifier.endpoint_url.clone(),
        labels,
        Duration::from_secs(config.classifier.timeout_secs),
    )?;

    let sink = CsvResultSink::new(&config.storage.results_path);

    // One bus connection per process; the driver task it spawns owns reconnects
    let bus = BusClient::connect(&config.bus);

    // Heartbeat runs independently of request traffic and stops with the bus
    tokio::spawn(relay::run_heartbeat(
        bus.clone() as Arc<dyn EventPublisher>,
        Duration::from_secs(config.bus.heartbeat_interval_secs),
        bus.shutdown_watch(),
    ));

    let service = web::Data::new(IngestionService::new(
        WaveformNormalizer::new(config.classifier.target_samples),
        Arc::new(classifier),
        Arc::new(sink),
        bus.clone() as Arc<dyn EventPublisher>,
    ));
    let bus_data = web::Data::from(bus.clone());

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(service.clone())
            .app_data(bus_data.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::Telemetry)
            .route("/", web::get().to(health::index))
            .route("/health", web::get().to(health::health_check))
            .route("/upload", web::post().to(handlers::upload))
            .route("/predict", web::post().to(handlers::predict))
            .route("/esp-log", web::post().to(handlers::esp_log))
            .route("/log", web::post().to(handlers::device_log))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    // Scoped teardown: stops the heartbeat, flushes any in-flight publish and
    // closes the connection; a second call (e.g. another exit path) is a no-op
    bus.shutdown().await;

    info!("Server stopped gracefully");
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_relay_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and flip the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
