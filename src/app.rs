use crate::capture::TestPatternCapture;
use crate::config::Config;
use crate::feedback::TracingFeedback;
use crate::scheduler::{manual_scan, FrameScheduler};
use crate::session::{ScanMode, Session, Viewport};
use crate::transport::TransportClient;

use anyhow::Context;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

// Demo preview size; real integrations set the viewport from the actual
// preview layout and update it on rotation.
const DEMO_VIEWPORT: Viewport = Viewport {
    width: 1080.0,
    height: 1920.0,
};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let transport = Arc::new(
        TransportClient::new(config.backend.get_base_url(), &config.transport)
            .context("failed to initialize transport client")?,
    );

    let capture = Arc::new(TestPatternCapture::new(1280, 720));
    let session = Arc::new(Mutex::new(Session::new(
        DEMO_VIEWPORT,
        Arc::new(TracingFeedback),
        config.scanner.feedback_sample_rate,
    )));

    // One manual scan up front proves the backend is reachable before the
    // continuous loop starts.
    manual_scan(&session, capture.as_ref(), transport.as_ref(), &config.capture).await;
    if let Some(alert) = session.lock().take_alert() {
        tracing::warn!(alert = %alert, "Manual scan failed");
    } else {
        tracing::info!(result = ?session.lock().state().latest, "Manual scan completed");
    }

    session.lock().set_mode(ScanMode::Auto);

    let (shutdown_tx, _) = broadcast::channel(1);
    let scheduler = FrameScheduler::new(
        session.clone(),
        transport,
        capture,
        &config.capture,
        &config.scanner,
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    session.lock().set_mode(ScanMode::Manual);
    let _ = shutdown_tx.send(());
    let _ = scheduler_handle.await;

    let state = session.lock().snapshot();
    tracing::info!(
        frames = state.frame_counter,
        measured_fps = state.measured_fps,
        "Session finished"
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
