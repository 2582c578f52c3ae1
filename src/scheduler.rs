use crate::capture::{CaptureHint, CaptureProvider};
use crate::config::{CaptureConfig, ScannerConfig};
use crate::session::{ScanMode, Session};
use crate::transport::{FrameTransport, TransportOutcome};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::instrument;

/// Drives the continuous-scan loop: one capture+submit dispatch per cycle,
/// converging on the target rate by crediting each cycle with the time the
/// previous one already consumed. The next cycle is armed when the current
/// submission is *issued*, not when it completes, so in-flight requests
/// overlap by design instead of serializing on network latency.
pub struct FrameScheduler<C: CaptureProvider, T: FrameTransport> {
    session: Arc<Mutex<Session>>,
    transport: Arc<T>,
    capture: Arc<C>,
    stream_hint: CaptureHint,
    target_interval: Duration,
}

impl<C: CaptureProvider, T: FrameTransport> FrameScheduler<C, T> {
    pub fn new(
        session: Arc<Mutex<Session>>,
        transport: Arc<T>,
        capture: Arc<C>,
        capture_config: &CaptureConfig,
        scanner_config: &ScannerConfig,
    ) -> Self {
        Self {
            session,
            transport,
            capture,
            stream_hint: CaptureHint {
                quality: capture_config.stream_quality,
                scale: capture_config.stream_scale,
            },
            target_interval: Duration::from_millis(scanner_config.get_target_interval_ms()),
        }
    }

    /// Runs until auto mode deactivates or shutdown is signalled. On exit the
    /// remaining in-flight submissions are drained, not cancelled; their late
    /// completions no-op through the session's auto-active guard.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut inflight = FuturesUnordered::new();
        let mut last_start: Option<Instant> = None;

        loop {
            if !self.session.lock().auto_active() {
                break;
            }

            let cycle_start = Instant::now();
            let elapsed = last_start
                .map(|prev| cycle_start - prev)
                .unwrap_or(Duration::ZERO);
            if last_start.is_some() {
                self.session.lock().record_dispatch_interval(elapsed);
            }
            let delay = next_delay(elapsed, self.target_interval);
            last_start = Some(cycle_start);

            match self.capture.capture(self.stream_hint).await {
                Ok(mut frame) => {
                    // Mode may have flipped while the capture was pending.
                    let index = {
                        let mut session = self.session.lock();
                        if !session.auto_active() {
                            break;
                        }
                        session.next_frame_index()
                    };
                    frame.index = Some(index);

                    let transport = self.transport.clone();
                    let (width, height) = (frame.width, frame.height);
                    inflight.push(async move {
                        let outcome = transport.submit(&frame, ScanMode::Auto).await;
                        (width, height, outcome)
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Capture failed, skipping this cycle");
                }
            }

            // Hold the cadence from the dispatch instant while reconciling
            // whatever completions arrive in the meantime.
            let next_cycle_at = Instant::now() + delay;
            loop {
                tokio::select! {
                    _ = sleep_until(next_cycle_at) => break,
                    Some((width, height, outcome)) = inflight.next(), if !inflight.is_empty() => {
                        self.apply(width, height, outcome);
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Frame scheduler received shutdown signal");
                        return;
                    }
                }
            }
        }

        while !inflight.is_empty() {
            tokio::select! {
                Some((width, height, outcome)) = inflight.next() => {
                    self.apply(width, height, outcome);
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Frame scheduler received shutdown signal");
                    return;
                }
            }
        }
        tracing::info!("Frame scheduler stopped");
    }

    fn apply(&self, width: u32, height: u32, outcome: TransportOutcome) {
        self.session.lock().apply_auto_outcome(width, height, outcome);
    }
}

/// Adaptive inter-cycle delay: the time this cycle still owes against the
/// target interval after crediting what the previous cycle consumed.
fn next_delay(elapsed: Duration, target_interval: Duration) -> Duration {
    target_interval.saturating_sub(elapsed)
}

/// One-shot manual scan. Refused (returns false) while a manual request is
/// already outstanding; otherwise captures at high quality, submits to the
/// predict endpoint, and reconciles the outcome.
#[instrument(skip(session, capture, transport, capture_config))]
pub async fn manual_scan<C: CaptureProvider, T: FrameTransport>(
    session: &Mutex<Session>,
    capture: &C,
    transport: &T,
    capture_config: &CaptureConfig,
) -> bool {
    if !session.lock().begin_manual_scan() {
        tracing::debug!("Manual scan refused: one is already outstanding");
        return false;
    }

    let hint = CaptureHint {
        quality: capture_config.manual_quality,
        scale: capture_config.manual_scale,
    };
    match capture.capture(hint).await {
        Ok(frame) => {
            let outcome = transport.submit(&frame, ScanMode::Manual).await;
            session
                .lock()
                .apply_manual_outcome(frame.width, frame.height, outcome);
        }
        Err(e) => {
            session.lock().abort_manual_scan(&e.to_string());
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, Frame};
    use crate::feedback::TracingFeedback;
    use crate::session::Viewport;
    use crate::transport::Detection;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::sleep;

    struct StubCapture;

    #[async_trait]
    impl CaptureProvider for StubCapture {
        async fn capture(&self, hint: CaptureHint) -> Result<Frame, CaptureError> {
            Ok(Frame {
                bytes: Bytes::from_static(b"stub-frame"),
                width: 320,
                height: 240,
                quality: hint.quality,
                scale: hint.scale,
                captured_at: std::time::Instant::now(),
                index: None,
            })
        }
    }

    struct SlowTransport {
        round_trip: Duration,
        submitted: AtomicU64,
        completed: AtomicU64,
    }

    impl SlowTransport {
        fn new(round_trip: Duration) -> Self {
            Self {
                round_trip,
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
            }
        }

        fn submitted(&self) -> u64 {
            self.submitted.load(Ordering::SeqCst)
        }

        fn completed(&self) -> u64 {
            self.completed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FrameTransport for SlowTransport {
        async fn submit(&self, _frame: &Frame, _mode: ScanMode) -> TransportOutcome {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            sleep(self.round_trip).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            TransportOutcome::Success {
                detection: Some(Detection {
                    label: "zebra".to_string(),
                    confidence: 0.9,
                    bbox: [10.0, 10.0, 50.0, 50.0],
                    details: None,
                }),
                metrics: None,
            }
        }
    }

    fn auto_session() -> Arc<Mutex<Session>> {
        let session = Arc::new(Mutex::new(Session::new(
            Viewport {
                width: 1080.0,
                height: 1920.0,
            },
            Arc::new(TracingFeedback),
            0.0,
        )));
        session.lock().set_mode(ScanMode::Auto);
        session
    }

    fn scheduler_under_test(
        session: Arc<Mutex<Session>>,
        transport: Arc<SlowTransport>,
    ) -> FrameScheduler<StubCapture, SlowTransport> {
        FrameScheduler::new(
            session,
            transport,
            Arc::new(StubCapture),
            &CaptureConfig {
                manual_quality: 0.9,
                manual_scale: 1.0,
                stream_quality: 0.5,
                stream_scale: 0.5,
            },
            &ScannerConfig {
                target_fps: 15,
                feedback_sample_rate: 0.0,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_auto_mode_stops_dispatching_within_one_cycle() {
        let transport = Arc::new(SlowTransport::new(Duration::from_millis(10)));
        let session = auto_session();
        let scheduler = scheduler_under_test(session.clone(), transport.clone());
        let (shutdown_tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

        sleep(Duration::from_millis(350)).await;
        assert!(transport.submitted() >= 2);

        session.lock().set_mode(ScanMode::Manual);
        let at_mode_change = transport.submitted();
        sleep(Duration::from_millis(500)).await;

        assert!(transport.submitted() <= at_mode_change + 1);
        handle.await.unwrap();
        assert_eq!(transport.submitted(), transport.completed());
        drop(shutdown_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_drains_overlapping_in_flight_submissions_without_stale_results() {
        // Round trips far longer than the cycle interval, so submissions
        // overlap instead of serializing on latency.
        let transport = Arc::new(SlowTransport::new(Duration::from_secs(1)));
        let session = auto_session();
        let scheduler = scheduler_under_test(session.clone(), transport.clone());
        let (shutdown_tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

        sleep(Duration::from_millis(200)).await;
        assert!(transport.submitted() >= 2);
        assert_eq!(transport.completed(), 0);

        session.lock().set_mode(ScanMode::Manual);
        handle.await.unwrap();

        // Drained to completion, not cancelled, and every late completion
        // no-op'd through the session guard.
        assert_eq!(transport.completed(), transport.submitted());
        assert!(session.lock().state().overlay.is_none());
        assert!(session.lock().state().latest.is_none());
        drop(shutdown_tx);
    }

    #[test]
    fn delay_absorbs_time_the_previous_cycle_consumed() {
        let target = Duration::from_millis(67);

        assert_eq!(next_delay(Duration::ZERO, target), target);
        assert_eq!(
            next_delay(Duration::from_millis(20), target),
            Duration::from_millis(47)
        );
    }

    #[test]
    fn delay_never_goes_negative_when_the_loop_runs_behind() {
        let target = Duration::from_millis(67);

        assert_eq!(next_delay(Duration::from_millis(67), target), Duration::ZERO);
        assert_eq!(next_delay(Duration::from_millis(250), target), Duration::ZERO);
    }
}
