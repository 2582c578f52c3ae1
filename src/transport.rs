use crate::capture::Frame;
use crate::config::TransportConfig;
use crate::session::ScanMode;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::instrument;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network failure: {0}")]
    Network(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// The single best match the backend returned for one frame. Multi-detection
/// responses are not modeled; the backend already ranks by confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
    pub details: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Server-reported instantaneous rate. Display only; scheduling never reads
/// it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerMetrics {
    pub fps: Option<f32>,
}

/// Exactly one outcome is produced per submitted frame. `Skipped` is the
/// backend's load-shedding acknowledgement, not a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    Success {
        detection: Option<Detection>,
        metrics: Option<ServerMetrics>,
    },
    Skipped {
        frame_index: u64,
    },
    Failure(TransportError),
}

#[derive(Deserialize)]
struct DetectionBody {
    label: String,
    confidence: f32,
    bbox: [f32; 4],
    #[serde(default)]
    details: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Deserialize)]
struct MetricsBody {
    #[serde(default)]
    fps: Option<f32>,
}

#[derive(Deserialize)]
struct ResponseBody {
    #[serde(default)]
    skipped: Option<bool>,
    #[serde(default)]
    frame_idx: Option<u64>,
    #[serde(default)]
    best_match: Option<DetectionBody>,
    #[serde(default)]
    metrics: Option<MetricsBody>,
}

/// Frame submission seam. The scheduler and the manual-scan path depend on
/// this rather than on the concrete HTTP client so the loop can be driven
/// against a mock.
#[async_trait]
pub trait FrameTransport: Send + Sync {
    async fn submit(&self, frame: &Frame, mode: ScanMode) -> TransportOutcome;
}

pub struct TransportClient {
    client: reqwest::Client,
    base_url: String,
    predict_timeout: Duration,
    stream_timeout: Duration,
}

impl TransportClient {
    pub fn new(base_url: String, config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            predict_timeout: Duration::from_millis(config.predict_timeout_ms),
            stream_timeout: Duration::from_millis(config.stream_timeout_ms),
        })
    }

    async fn exchange(
        &self,
        path: &str,
        form: Form,
    ) -> Result<(reqwest::StatusCode, String), TransportError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok((status, body))
    }
}

#[async_trait]
impl FrameTransport for TransportClient {
    /// Submits one frame. Single attempt, no internal retry; the caller gets
    /// exactly one `TransportOutcome`. The deadline bounds the whole
    /// exchange, response body included; on expiry the in-flight request is
    /// dropped, which cancels it at the connection level.
    #[instrument(skip(self, frame), fields(mode = ?mode, frame_index = frame.index))]
    async fn submit(&self, frame: &Frame, mode: ScanMode) -> TransportOutcome {
        let (path, deadline) = match mode {
            ScanMode::Manual => ("/predict", self.predict_timeout),
            ScanMode::Auto => ("/stream", self.stream_timeout),
        };

        let file_part = match Part::stream(frame.bytes.clone())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
        {
            Ok(part) => part,
            Err(e) => {
                return TransportOutcome::Failure(TransportError::Network(format!(
                    "failed to build payload: {e}"
                )))
            }
        };

        let mut form = Form::new().part("file", file_part);
        if mode == ScanMode::Auto {
            if let Some(index) = frame.index {
                form = form.text("frame_idx", index.to_string());
            }
        }

        let (status, body) = match timeout(deadline, self.exchange(path, form)).await {
            Err(_) => return TransportOutcome::Failure(TransportError::Timeout),
            Ok(Err(e)) => return TransportOutcome::Failure(e),
            Ok(Ok(exchange)) => exchange,
        };

        if !status.is_success() {
            return TransportOutcome::Failure(TransportError::Server(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate(&body, 200)
            )));
        }

        decode_outcome(&body, frame.index)
    }
}

/// Maps a 2xx response body onto an outcome. Partial or garbled JSON is never
/// surfaced as success.
fn decode_outcome(body: &str, frame_index: Option<u64>) -> TransportOutcome {
    let parsed: ResponseBody = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => return TransportOutcome::Failure(TransportError::MalformedResponse(e.to_string())),
    };

    if parsed.skipped == Some(true) {
        return TransportOutcome::Skipped {
            frame_index: parsed.frame_idx.or(frame_index).unwrap_or(0),
        };
    }

    let detection = parsed.best_match.map(|m| Detection {
        label: m.label,
        confidence: m.confidence,
        bbox: m.bbox,
        details: m.details,
    });
    let metrics = parsed.metrics.map(|m| ServerMetrics { fps: m.fps });

    TransportOutcome::Success { detection, metrics }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
