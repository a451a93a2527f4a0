//! WebSocket server: live telemetry and video for remote operator UIs.
//!
//! - `GET /telemetry` — server→client JSON, one message per publish tick
//! - `GET /rgb_camera` — server→client binary JPEG frames

pub mod camera;
pub mod telemetry;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::video::Frame;
use telemetry::TelemetryPublisher;

/// Shared state handed to every connection handler.
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<TelemetryPublisher>,
    pub frames: watch::Receiver<Option<Frame>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/telemetry", get(telemetry::ws_upgrade))
        .route("/rgb_camera", get(camera::ws_upgrade))
        .with_state(state)
}

/// Serve on an already-bound listener; binding happens at startup so a bind
/// failure is fatal before any task starts.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("WebSocket server listening on {}", addr);
    }
    axum::serve(listener, router(state)).await
}
