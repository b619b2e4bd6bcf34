//! # Ingestion Service
//!
//! The orchestrator: drives one raw-audio submission through
//! normalize → classify → sink append → bus publish, strictly in that order.
//!
//! ## Failure semantics:
//! - normalize or classify failing aborts the sequence; no event is built,
//!   nothing is appended or published
//! - sink and publish failures are logged and swallowed; the caller's contract
//!   is "was the audio classified", not "was it fully relayed"
//!
//! `/predict` uses `classify_only`, which deliberately skips persistence and
//! relay; it is a distinct operation, not a legacy duplicate of `ingest`.

use crate::audio::WaveformNormalizer;
use crate::classify::{Classification, Classify};
use crate::error::AppResult;
use crate::relay::{ClassificationEvent, EventPublisher, EventSink};
use std::sync::Arc;
use tracing::{error, info};

pub struct IngestionService {
    normalizer: WaveformNormalizer,
    classifier: Arc<dyn Classify>,
    sink: Arc<dyn EventSink>,
    bus: Arc<dyn EventPublisher>,
}

impl IngestionService {
    pub fn new(
        normalizer: WaveformNormalizer,
        classifier: Arc<dyn Classify>,
        sink: Arc<dyn EventSink>,
        bus: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            normalizer,
            classifier,
            sink,
            bus,
        }
    }

    /// Classify a raw buffer and relay the outcome (sink + bus).
    pub async fn ingest(&self, raw: &[u8]) -> AppResult<Classification> {
        let waveform = self.normalizer.normalize(raw)?;
        let classification = self.classifier.classify(&waveform).await?;

        info!(
            bytes = raw.len(),
            label = %classification.label,
            confidence = classification.confidence,
            "audio classified"
        );

        let event =
            ClassificationEvent::from_classification(&classification, volume_db(&waveform));

        // Independent best-effort side effects from here on: neither failure
        // changes the result already returned to the caller
        if let Err(e) = self.sink.append(&event).await {
            error!(operation = "sink_append", error = %e, "result sink write failed; relay continues");
        }

        if let Err(e) = self.bus.publish_event(&event).await {
            error!(operation = "bus_publish", error = %e, "bus publish failed; classification already succeeded");
        }

        Ok(classification)
    }

    /// Classify a raw buffer without persisting or relaying the result.
    pub async fn classify_only(&self, raw: &[u8]) -> AppResult<Classification> {
        let waveform = self.normalizer.normalize(raw)?;
        self.classifier.classify(&waveform).await
    }
}

/// RMS loudness of a waveform in dBFS; `None` for pure digital silence, where
/// the logarithm is undefined.
fn volume_db(waveform: &[f32]) -> Option<f32> {
    if waveform.is_empty() {
        return None;
    }

    let mean_square: f32 =
        waveform.iter().map(|&s| s * s).sum::<f32>() / waveform.len() as f32;
    let rms = mean_square.sqrt();

    if rms > 0.0 {
        Some(20.0 * rms.log10())
    } else {
        None
    }
}
