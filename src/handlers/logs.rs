//! # Remote Node Log Handlers
//!
//! The microphone nodes report their own state through two channels: a
//! structured JSON report of what they heard (`/esp-log`) and free-form text
//! lines (`/log`). Both are write-only from the node's perspective; the server
//! just folds them into its structured log.

use crate::error::AppError;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Structured detection report posted by a node.
#[derive(Debug, Deserialize)]
pub struct NodeDetection {
    pub label: String,
    pub confidence: f32,
    pub volume: f32,
}

/// POST /esp-log - JSON `{label, confidence, volume}` in, `{"status":"ok"}` out.
pub async fn esp_log(report: web::Json<NodeDetection>) -> Result<HttpResponse, AppError> {
    info!(
        source = "esp32",
        label = %report.label,
        confidence = report.confidence,
        volume = report.volume,
        "node detection report"
    );

    Ok(HttpResponse::Ok().json(json!({ "status": "ok" })))
}

/// POST /log - raw UTF-8 text in, empty 200 out.
pub async fn device_log(body: web::Bytes) -> Result<HttpResponse, AppError> {
    let message = std::str::from_utf8(&body)
        .map_err(|e| AppError::InvalidInput(format!("log line is not valid UTF-8: {}", e)))?;

    info!(source = "esp32", message = %message.trim_end(), "node log line");

    Ok(HttpResponse::Ok().finish())
}
