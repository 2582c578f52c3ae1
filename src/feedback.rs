use crate::session::ScanMode;

/// Discrete events the core emits for haptic/speech side effects. Delivery is
/// fire-and-forget; the core never blocks on an emitter.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackEvent {
    TargetConfirmed { label: String },
    ModeChanged { mode: ScanMode },
}

pub trait FeedbackEmitter: Send + Sync {
    fn emit(&self, event: FeedbackEvent);
}

/// Default emitter: records events as structured log lines. Integrations
/// replace this with platform haptics/speech.
pub struct TracingFeedback;

impl FeedbackEmitter for TracingFeedback {
    fn emit(&self, event: FeedbackEvent) {
        match event {
            FeedbackEvent::TargetConfirmed { label } => {
                tracing::info!(label = %label, "feedback: target confirmed");
            }
            FeedbackEvent::ModeChanged { mode } => {
                tracing::info!(mode = ?mode, "feedback: mode changed");
            }
        }
    }
}
