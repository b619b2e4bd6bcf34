//! # Classifier Boundary
//!
//! The classification model is an external collaborator: a black-box function over
//! a fixed-length waveform, reached over HTTP. The core treats the call as pure,
//! side-effect-free and potentially slow, bounds it with a timeout, and never
//! retries internally; a failed call surfaces as an ingestion failure.
//!
//! The `Classify` trait is the seam the ingestion service depends on, so tests can
//! substitute a deterministic stub without a running inference service.

use crate::classify::labels::LabelMap;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of classifying one waveform.
///
/// The label comes from an open-ended vocabulary; downstream code must not assume
/// a fixed closed set beyond the few labels it branches on directly.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub label: String,
    /// Confidence score in [0.0, 1.0]
    pub confidence: f32,
}

/// Boundary contract consumed by the ingestion service.
#[async_trait]
pub trait Classify: Send + Sync {
    async fn classify(&self, waveform: &[f32]) -> AppResult<Classification>;
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    waveform: &'a [f32],
}

/// Per-frame class scores returned by the inference service.
#[derive(Deserialize)]
struct ScoreResponse {
    scores: Vec<Vec<f32>>,
}

/// Classifier backed by an external inference service.
///
/// The service scores the waveform in overlapping frames and returns one score
/// vector per frame; this client averages the frames and maps the top class index
/// to its display name through the injected label table.
pub struct RemoteClassifier {
    http: reqwest::Client,
    endpoint: String,
    labels: LabelMap,
}

impl RemoteClassifier {
    pub fn new(endpoint: String, labels: LabelMap, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            labels,
        })
    }
}

#[async_trait]
impl Classify for RemoteClassifier {
    async fn classify(&self, waveform: &[f32]) -> AppResult<Classification> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&ScoreRequest { waveform })
            .send()
            .await
            .map_err(|e| AppError::Classification(format!("inference request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::Classification(format!("inference service error: {}", e)))?;

        let body: ScoreResponse = response
            .json()
            .await
            .map_err(|e| AppError::Classification(format!("malformed score response: {}", e)))?;

        let mean = mean_frame_scores(&body.scores)?;
        let (top_class, confidence) = argmax(&mean)?;

        let label = self
            .labels
            .name(top_class)
            .ok_or_else(|| {
                AppError::Classification(format!(
                    "class index {} outside label map of {} entries",
                    top_class,
                    self.labels.len()
                ))
            })?
            .to_string();

        Ok(Classification {
            label,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

/// Average per-frame score vectors into one score per class.
fn mean_frame_scores(frames: &[Vec<f32>]) -> AppResult<Vec<f32>> {
    let first = frames
        .first()
        .ok_or_else(|| AppError::Classification("no score frames returned".to_string()))?;

    let classes = first.len();
    if classes == 0 {
        return Err(AppError::Classification("empty score frame returned".to_string()));
    }

    let mut mean = vec![0.0f32; classes];
    for frame in frames {
        if frame.len() != classes {
            return Err(AppError::Classification(format!(
                "ragged score frames: {} vs {}",
                frame.len(),
                classes
            )));
        }
        for (acc, &score) in mean.iter_mut().zip(frame) {
            *acc += score;
        }
    }

    let count = frames.len() as f32;
    for acc in &mut mean {
        *acc /= count;
    }

    Ok(mean)
}

/// Index and value of the highest score.
fn argmax(scores: &[f32]) -> AppResult<(usize, f32)> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((i, s)),
        })
        .ok_or_else(|| AppError::Classification("empty score vector".to_string()))
}
