mod coordinate;
mod feedback;
mod scheduler;
mod session;
mod transport;

pub mod app;
pub mod capture;
pub mod config;

pub use app::start_app;
pub use capture::{CaptureError, CaptureHint, CaptureProvider, Frame, TestPatternCapture};
pub use coordinate::{cover_transform, CoverTransform, ProjectError};
pub use feedback::{FeedbackEmitter, FeedbackEvent, TracingFeedback};
pub use scheduler::{manual_scan, FrameScheduler};
pub use session::{
    Connectivity, OverlayBox, ScanMode, ScanResult, Scanning, Session, SessionState, Viewport,
    DIAGNOSTIC_LOG_CAPACITY,
};
pub use transport::{
    Detection, FrameTransport, ServerMetrics, TransportClient, TransportError, TransportOutcome,
};
