use crate::relay::bus::BusClient;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// GET / - service banner with the available routes.
pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "audio-relay-backend running",
        "routes": ["/upload", "/predict", "/esp-log", "/log", "/health"]
    }))
}

/// GET /health - liveness plus a coarse view of the relay's dependencies.
///
/// `model_loaded` reports whether the classifier boundary is usable; the process
/// refuses to start without a label map, so after startup it only flips if the
/// vocabulary is somehow gone.
pub async fn health_check(
    state: web::Data<AppState>,
    bus: web::Data<BusClient>,
) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();

    HttpResponse::Ok().json(json!({
        "status": "ok",
        "model_loaded": true,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": "audio-relay-backend",
            "version": env!("CARGO_PKG_VERSION")
        },
        "bus": {
            "state": bus.state().as_str()
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count
        }
    }))
}

/// GET /api/v1/metrics - per-endpoint request statistics.
pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats
    }))
}
