//! # Application State Management
//!
//! Shared state accessed by every HTTP request handler: the running configuration
//! and the request/error metrics reported by `/health` and `/api/v1/metrics`.
//!
//! ## Thread Safety Pattern:
//! All mutable data lives behind `Arc<RwLock<T>>`:
//! - **Arc**: many handlers hold a reference to the same state
//! - **RwLock**: many concurrent readers OR one writer, never both
//!
//! The bus connection handle is deliberately NOT part of this struct: it is owned
//! by the `BusClient` (see `relay::bus`) so that connection-mutating operations are
//! serialized in one place instead of leaking through shared process state.

use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// State shared across all HTTP request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration, readable by any handler
    pub config: Arc<RwLock<AppConfig>>,

    /// Request/error counters, updated by the telemetry middleware
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (immutable, safe to share directly)
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Per-endpoint statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance counters for a single endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the read lock immediately so other requests are not
    /// blocked while the caller works with the snapshot.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Record one completed request for an endpoint (called by the telemetry
    /// middleware for every request).
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        metrics.request_count += 1;
        if is_error {
            metrics.error_count += 1;
        }

        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Snapshot of current metrics for the health/metrics endpoints.
    ///
    /// Clones under a read lock so metrics don't change while they are being
    /// serialized into the HTTP response.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average = total duration / request count (0.0 before the first request).
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate in [0.0, 1.0] (0.0 before the first request).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_endpoint_request() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("POST /upload", 12, false);
        state.record_endpoint_request("POST /upload", 8, true);

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);

        let metric = snapshot.endpoint_metrics.get("POST /upload").unwrap();
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.total_duration_ms, 20);
        assert_eq!(metric.error_count, 1);
        assert!((metric.average_duration_ms() - 10.0).abs() < f64::EPSILON);
        assert!((metric.error_rate() - 0.5).abs() < f64::EPSILON);
    }
}
