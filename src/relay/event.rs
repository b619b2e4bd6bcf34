//! # Relay Events
//!
//! The units that leave the pipeline: one `ClassificationEvent` per successful
//! classification (published to the bus and appended to the result store) and the
//! periodic `HeartbeatEvent` for liveness monitoring.
//!
//! A `ClassificationEvent` is only ever constructed from a non-error
//! classification; a failed normalization or classification short-circuits before
//! any event exists, so no partial events can be recorded anywhere.

use crate::classify::Classification;
use chrono::{DateTime, Utc};
use serde_json::json;

/// One classification outcome, stamped at capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationEvent {
    pub label: String,
    /// Confidence in [0.0, 1.0]; scaled to 0-100 in the bus payload
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    /// RMS loudness of the normalized waveform in dBFS, when measurable
    pub volume_db: Option<f32>,
}

impl ClassificationEvent {
    /// Build an event from a classification result, stamped with the current time.
    pub fn from_classification(classification: &Classification, volume_db: Option<f32>) -> Self {
        Self {
            label: classification.label.clone(),
            confidence: classification.confidence,
            timestamp: Utc::now(),
            volume_db,
        }
    }

    /// Structured payload for the classification topic.
    ///
    /// Downstream automation consumers expect confidence on a 0-100 scale.
    pub fn bus_payload(&self) -> serde_json::Value {
        json!({
            "label": self.label,
            "confidence": self.confidence * 100.0,
            "volume_db": self.volume_db,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }

    /// One comma-separated record for the append-only store:
    /// ISO-8601 timestamp, label, confidence to 2 decimal places.
    pub fn csv_line(&self) -> String {
        format!(
            "{},{},{:.2}",
            self.timestamp.to_rfc3339(),
            self.label,
            self.confidence
        )
    }
}

/// Periodic liveness signal, generated independently of any request.
#[derive(Debug, Clone)]
pub struct HeartbeatEvent {
    pub timestamp: DateTime<Utc>,
}

impl HeartbeatEvent {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
        }
    }

    pub fn bus_payload(&self) -> serde_json::Value {
        json!({
            "status": "alive",
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> ClassificationEvent {
        ClassificationEvent {
            label: "bark".to_string(),
            confidence: 0.91,
            timestamp: "2025-06-01T12:00:00Z".parse().unwrap(),
            volume_db: Some(-18.5),
        }
    }

    #[test]
    fn test_bus_payload_scales_confidence_to_percent() {
        let payload = sample_event().bus_payload();
        assert_eq!(payload["label"], "bark");
        assert!((payload["confidence"].as_f64().unwrap() - 91.0).abs() < 1e-4);
        assert!(payload["volume_db"].as_f64().is_some());
        assert_eq!(payload["timestamp"], "2025-06-01T12:00:00+00:00");
    }

    #[test]
    fn test_bus_payload_volume_is_null_when_unmeasurable() {
        let mut event = sample_event();
        event.volume_db = None;
        assert!(event.bus_payload()["volume_db"].is_null());
    }

    #[test]
    fn test_csv_line_format() {
        let line = sample_event().csv_line();
        assert!(line.starts_with("2025-06-01T12:00:00+00:00,"));
        assert!(line.ends_with(",bark,0.91"));
    }

    #[test]
    fn test_heartbeat_payload() {
        let payload = HeartbeatEvent::now().bus_payload();
        assert_eq!(payload["status"], "alive");
        assert!(payload["timestamp"].is_string());
    }
}
