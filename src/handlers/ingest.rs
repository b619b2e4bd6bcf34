//! # Audio Ingestion Handlers
//!
//! The two raw-audio routes the microphone nodes post to:
//! - `/upload`: classify-and-relay. The full pipeline, plus a scratch copy of
//!   the raw body for offline inspection
//! - `/predict`: classify-only. No persistence, no bus publish

use crate::error::AppError;
use crate::ingest::IngestionService;
use crate::relay::save_latest_capture;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{info, warn};

/// POST /upload - raw audio bytes in, `"<label> (<confidence>)"` text out.
pub async fn upload(
    state: web::Data<AppState>,
    service: web::Data<IngestionService>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let capture_path = state.get_config().storage.latest_capture_path;
    if let Err(e) = save_latest_capture(&capture_path, &body).await {
        warn!(operation = "latest_capture", error = %e, "failed to save latest capture; continuing");
    }

    let classification = service.ingest(&body).await?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain")
        .body(format!(
            "{} ({:.2})",
            classification.label, classification.confidence
        )))
}

/// POST /predict - raw audio bytes in, `{"prediction": label}` out.
///
/// The label vocabulary is open-ended: only "bark" and "silence" get dedicated
/// log lines, everything else logs generically.
pub async fn predict(
    service: web::Data<IngestionService>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let classification = service.classify_only(&body).await?;

    match classification.label.to_lowercase().as_str() {
        "bark" => info!(confidence = classification.confidence, "bark detected"),
        "silence" => info!(confidence = classification.confidence, "silence detected"),
        other => info!(label = other, confidence = classification.confidence, "detected"),
    }

    Ok(HttpResponse::Ok().json(json!({ "prediction": classification.label })))
}
