use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// GET /api/v1/config - the running configuration, with bus credentials omitted.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "classifier": {
                "endpoint_url": config.classifier.endpoint_url,
                "class_map_path": config.classifier.class_map_path,
                "target_samples": config.classifier.target_samples,
                "timeout_secs": config.classifier.timeout_secs
            },
            "bus": {
                "host": config.bus.host,
                "port": config.bus.port,
                "client_id": config.bus.client_id,
                "event_topic": config.bus.event_topic,
                "heartbeat_topic": config.bus.heartbeat_topic,
                "heartbeat_interval_secs": config.bus.heartbeat_interval_secs,
                "publish_timeout_secs": config.bus.publish_timeout_secs
            },
            "storage": {
                "results_path": config.storage.results_path,
                "latest_capture_path": config.storage.latest_capture_path
            }
        }
    })))
}
