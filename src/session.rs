use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::coordinate::cover_transform;
use crate::feedback::{FeedbackEmitter, FeedbackEvent};
use crate::transport::{Detection, TransportError, TransportOutcome};

pub const DIAGNOSTIC_LOG_CAPACITY: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scanning {
    Idle,
    Busy,
}

/// Detection box already projected into display space. Derived per result,
/// replaced wholesale, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub label: String,
}

/// Latest reconciled result. "No match" is a valid outcome, distinct from
/// "nothing scanned yet" (`None` at the state level).
#[derive(Debug, Clone, PartialEq)]
pub enum ScanResult {
    Match(Detection),
    NoMatch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

/// The single UI-observable state. Mutated only by the reconciliation steps
/// below and by explicit mode toggles; read as a snapshot after each
/// transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub mode: ScanMode,
    pub connectivity: Connectivity,
    pub scanning: Scanning,
    pub latest: Option<ScanResult>,
    pub overlay: Option<OverlayBox>,
    pub frame_counter: u64,
    pub measured_fps: f32,
    pub server_fps: Option<f32>,
    /// Most-recent-first, bounded at `DIAGNOSTIC_LOG_CAPACITY`.
    pub log: VecDeque<String>,
    /// Pending blocking alert; set only by manual-mode failures, consumed by
    /// the presentation layer via `take_alert`.
    pub alert: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            mode: ScanMode::Manual,
            connectivity: Connectivity::Online,
            scanning: Scanning::Idle,
            latest: None,
            overlay: None,
            frame_counter: 0,
            measured_fps: 0.0,
            server_fps: None,
            log: VecDeque::with_capacity(DIAGNOSTIC_LOG_CAPACITY),
            alert: None,
        }
    }
}

pub struct Session {
    state: SessionState,
    viewport: Viewport,
    feedback: Arc<dyn FeedbackEmitter>,
    feedback_sample_rate: f32,
}

impl Session {
    pub fn new(
        viewport: Viewport,
        feedback: Arc<dyn FeedbackEmitter>,
        feedback_sample_rate: f32,
    ) -> Self {
        Self {
            state: SessionState::default(),
            viewport,
            feedback,
            feedback_sample_rate,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.clone()
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn auto_active(&self) -> bool {
        self.state.mode == ScanMode::Auto
    }

    /// Mode toggle. Both directions clear the stale target so manual mode
    /// never shows an auto-mode overlay and a fresh auto session starts
    /// clean. Entering auto restarts the frame counter for a new stream.
    pub fn set_mode(&mut self, mode: ScanMode) {
        if self.state.mode == mode {
            return;
        }
        self.state.mode = mode;
        self.state.latest = None;
        self.state.overlay = None;
        match mode {
            ScanMode::Auto => {
                self.state.frame_counter = 0;
                self.state.scanning = Scanning::Busy;
            }
            ScanMode::Manual => {
                self.state.scanning = Scanning::Idle;
            }
        }
        self.feedback.emit(FeedbackEvent::ModeChanged { mode });
    }

    /// Accepts a manual trigger only while no manual request is outstanding,
    /// guarding against duplicate dispatches from rapid repeated triggers.
    pub fn begin_manual_scan(&mut self) -> bool {
        if self.state.mode != ScanMode::Manual || self.state.scanning == Scanning::Busy {
            return false;
        }
        self.state.scanning = Scanning::Busy;
        true
    }

    /// Hands out the next streaming frame index. Overlapping in-flight
    /// submissions each get a distinct index.
    pub fn next_frame_index(&mut self) -> u64 {
        let index = self.state.frame_counter;
        self.state.frame_counter += 1;
        index
    }

    pub fn take_alert(&mut self) -> Option<String> {
        self.state.alert.take()
    }

    /// Derived display rate, smoothed over dispatch cadence.
    pub fn record_dispatch_interval(&mut self, interval: Duration) {
        let secs = interval.as_secs_f32();
        if secs <= 0.0 {
            return;
        }
        let instantaneous = 1.0 / secs;
        self.state.measured_fps = if self.state.measured_fps == 0.0 {
            instantaneous
        } else {
            self.state.measured_fps * 0.8 + instantaneous * 0.2
        };
    }

    /// Applies a streaming completion. Completions arriving after the mode
    /// left auto are ignored wholesale so a stale result cannot reappear.
    /// Completions may arrive out of issue order; `latest`/`overlay` are
    /// last-write-wins and the frame counter only moves forward.
    pub fn apply_auto_outcome(
        &mut self,
        frame_width: u32,
        frame_height: u32,
        outcome: TransportOutcome,
    ) {
        if self.state.mode != ScanMode::Auto {
            tracing::debug!("Dropping stale completion after leaving auto mode");
            return;
        }

        match outcome {
            TransportOutcome::Success { detection, metrics } => {
                self.state.connectivity = Connectivity::Online;
                if let Some(metrics) = metrics {
                    if metrics.fps.is_some() {
                        self.state.server_fps = metrics.fps;
                    }
                }
                match detection {
                    Some(detection) => {
                        let label = detection.label.clone();
                        self.apply_match(frame_width, frame_height, detection);
                        if self.state.overlay.is_some() {
                            self.push_log(format!("DETECTED: {label}"));
                            if rand::random::<f32>() < self.feedback_sample_rate {
                                self.feedback.emit(FeedbackEvent::TargetConfirmed { label });
                            }
                        }
                    }
                    None => {
                        self.state.latest = Some(ScanResult::NoMatch);
                        self.state.overlay = None;
                    }
                }
            }
            TransportOutcome::Skipped { frame_index } => {
                // Backpressure acknowledgement: the counter ratchets forward,
                // everything else stays put.
                self.state.connectivity = Connectivity::Online;
                self.state.frame_counter = self.state.frame_counter.max(frame_index + 1);
            }
            TransportOutcome::Failure(error) => {
                self.state.connectivity = Connectivity::Offline;
                self.push_log(format!("ERROR: {error}"));
                tracing::warn!(error = %error, "Streaming frame failed, continuing");
            }
        }
    }

    /// Applies the completion of the single outstanding manual request.
    /// A completion arriving after the user already switched to auto mode is
    /// ignored wholesale: its overlay is stale and `scanning` now means
    /// "loop active", which the manual path must not touch.
    pub fn apply_manual_outcome(
        &mut self,
        frame_width: u32,
        frame_height: u32,
        outcome: TransportOutcome,
    ) {
        if self.state.mode != ScanMode::Manual {
            tracing::debug!("Dropping stale manual completion after leaving manual mode");
            return;
        }
        self.state.scanning = Scanning::Idle;

        match outcome {
            TransportOutcome::Success { detection, metrics } => {
                self.state.connectivity = Connectivity::Online;
                if let Some(metrics) = metrics {
                    if metrics.fps.is_some() {
                        self.state.server_fps = metrics.fps;
                    }
                }
                match detection {
                    Some(detection) => {
                        let label = detection.label.clone();
                        self.apply_match(frame_width, frame_height, detection);
                        if self.state.overlay.is_some() {
                            self.feedback.emit(FeedbackEvent::TargetConfirmed { label });
                        }
                    }
                    None => {
                        self.state.latest = Some(ScanResult::NoMatch);
                        self.state.overlay = None;
                    }
                }
            }
            TransportOutcome::Skipped { .. } => {
                // The predict endpoint never load-sheds; nothing to apply.
                tracing::debug!("Unexpected skip acknowledgement on a manual scan");
            }
            TransportOutcome::Failure(error) => {
                self.state.connectivity = Connectivity::Offline;
                self.push_log(format!("ERROR: {error}"));
                self.state.alert = Some(describe_failure(&error));
            }
        }
    }

    /// Capture capability failed before anything was submitted. Manual mode
    /// still owes the waiting user an alert.
    pub fn abort_manual_scan(&mut self, reason: &str) {
        self.state.scanning = Scanning::Idle;
        self.push_log(format!("ERROR: {reason}"));
        self.state.alert = Some(format!("Capture failed: {reason}"));
    }

    fn apply_match(&mut self, frame_width: u32, frame_height: u32, detection: Detection) {
        match cover_transform(
            frame_width,
            frame_height,
            self.viewport.width,
            self.viewport.height,
        ) {
            Ok(transform) => {
                let [x1, y1, x2, y2] = transform.project(detection.bbox);
                let label = detection.label.clone();
                self.state.latest = Some(ScanResult::Match(detection));
                self.state.overlay = Some(OverlayBox {
                    x1,
                    y1,
                    x2,
                    y2,
                    label,
                });
            }
            Err(e) => {
                // Capability error: the capture reported zero dimensions.
                self.state.latest = None;
                self.state.overlay = None;
                self.push_log(format!("ERROR: {e}"));
                tracing::error!(error = %e, "Capture reported invalid dimensions");
            }
        }
    }

    fn push_log(&mut self, entry: String) {
        self.state.log.push_front(entry);
        self.state.log.truncate(DIAGNOSTIC_LOG_CAPACITY);
    }
}

/// User-facing cause for a blocking manual-mode alert.
fn describe_failure(error: &TransportError) -> String {
    match error {
        TransportError::Timeout => {
            "The server did not respond in time. Check that the backend is running and reachable."
                .to_string()
        }
        TransportError::Network(_) => {
            "Could not reach the server. Check the address and your network connection.".to_string()
        }
        TransportError::Server(reason) | TransportError::MalformedResponse(reason) => {
            format!("The server responded unexpectedly: {reason}")
        }
    }
}
