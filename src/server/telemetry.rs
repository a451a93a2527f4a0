//! Telemetry snapshot assembly and broadcast.
//!
//! A fixed-rate publisher serializes the current mode/link/command state and
//! fans it out over a broadcast channel; each WebSocket client forwards from
//! its own receiver, so one slow client never delays the others. An operator
//! watching this stream can tell "paused by me" (sleep) from "link lost"
//! (quality at 0) from "system down" (stream stops).

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::link::LinkManager;
use crate::mode::ModeState;

/// Wire message published on `/telemetry`.
#[derive(Clone, Debug, Serialize)]
pub struct TelemetrySnapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Epoch milliseconds.
    pub timestamp: i64,

    pub sleep: bool,
    pub speed_plus: bool,

    pub lora_connected: bool,
    pub link_quality: u8,
    pub tx_rate_hz: f64,
    /// Absent until the first heartbeat has been seen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_hb_age_s: Option<f64>,

    /// Most recently transmitted effective command.
    pub v: f32,
    pub w: f32,

    // Placeholder sensor fields until real sensors report in
    pub battery_pct: u8,
    pub temperature_c: i32,
    pub air_quality: u8,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub struct TelemetryPublisher {
    link: Arc<LinkManager>,
    mode: watch::Receiver<ModeState>,
    sender: broadcast::Sender<String>,
    publish_hz: f64,
}

impl TelemetryPublisher {
    pub fn new(
        link: Arc<LinkManager>,
        mode: watch::Receiver<ModeState>,
        publish_hz: f64,
    ) -> Arc<Self> {
        let (sender, _) = broadcast::channel(16);
        Arc::new(Self {
            link,
            mode,
            sender,
            publish_hz,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let mode = *self.mode.borrow();
        let link = self.link.snapshot();

        TelemetrySnapshot {
            kind: "telemetry",
            timestamp: Utc::now().timestamp_millis(),
            sleep: mode.sleeping,
            speed_plus: mode.speed_plus,
            lora_connected: link.connected,
            link_quality: link.link_quality,
            tx_rate_hz: link.tx_rate_hz,
            rx_hb_age_s: link.hb_age_s.map(round3),
            v: link.last_sent.0,
            w: link.last_sent.1,
            battery_pct: 100,
            temperature_c: 25,
            air_quality: 95,
        }
    }

    pub fn snapshot_json(&self) -> Option<String> {
        match serde_json::to_string(&self.snapshot()) {
            Ok(json) => Some(json),
            Err(e) => {
                error!("Failed to serialize telemetry: {}", e);
                None
            }
        }
    }

    /// Publish one snapshot per tick to every subscribed client.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = Duration::from_secs_f64(1.0 / self.publish_hz.max(0.1));
        let mut ticker = interval(period);

        info!("Telemetry publisher started at {:.1} Hz", self.publish_hz);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Some(json) = self.snapshot_json() {
                // Err means no subscribers right now, which is fine
                let _ = self.sender.send(json);
            }
        }

        info!("Telemetry publisher stopped");
    }
}

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut rx = state.publisher.subscribe();

    // Immediate snapshot on connect, ahead of the first publish tick
    if let Some(json) = state.publisher.snapshot_json() {
        if ws_tx.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => match result {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Slow client: newer snapshots supersede the missed ones
                    warn!("Telemetry client lagged, skipped {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(data))) => {
                    let _ = ws_tx.send(Message::Pong(data)).await;
                }
                Some(Err(_)) => break,
                _ => {} // Inbound client messages are not part of the protocol
            },
        }
    }

    debug!("Telemetry client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModeCfg, ProtocolCfg};
    use crate::link::transport::MockTransport;
    use crate::mode::ModeController;

    fn publisher(start_sleep: bool) -> (Arc<TelemetryPublisher>, Arc<LinkManager>) {
        let (writer, _written) = MockTransport::writer_only();
        let (_controller, mode_rx) = ModeController::new(&ModeCfg {
            start_sleep,
            ..ModeCfg::default()
        });
        let link = LinkManager::new(
            Box::new(writer),
            mode_rx.clone(),
            ProtocolCfg::default(),
            15.0,
        );
        (
            TelemetryPublisher::new(link.clone(), mode_rx, 2.0),
            link,
        )
    }

    #[test]
    fn snapshot_carries_full_wire_field_set() {
        let (publisher, link) = publisher(false);
        link.handle_line("READY");
        link.send(0.5, -0.25).unwrap();

        let json = publisher.snapshot_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "telemetry");
        assert!(value["timestamp"].as_i64().unwrap() > 0);
        assert_eq!(value["sleep"], false);
        assert_eq!(value["speed_plus"], false);
        assert_eq!(value["lora_connected"], true);
        assert_eq!(value["link_quality"], 100);
        assert!(value["tx_rate_hz"].as_f64().unwrap() > 0.0);
        assert!(value["rx_hb_age_s"].as_f64().unwrap() < 1.0);
        assert_eq!(value["v"].as_f64().unwrap(), 0.5);
        assert_eq!(value["w"].as_f64().unwrap(), -0.25);
        assert_eq!(value["battery_pct"], 100);
        assert_eq!(value["temperature_c"], 25);
        assert_eq!(value["air_quality"], 95);
    }

    #[test]
    fn heartbeat_age_absent_before_first_heartbeat() {
        let (publisher, _link) = publisher(true);

        let json = publisher.snapshot_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value.get("rx_hb_age_s").is_none());
        assert_eq!(value["sleep"], true);
        assert_eq!(value["lora_connected"], false);
        assert_eq!(value["link_quality"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn publisher_broadcasts_on_each_tick() {
        let (publisher, _link) = publisher(false);
        let mut rx = publisher.subscribe();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(publisher.clone().run(cancel.clone()));

        let first = rx.recv().await.unwrap();
        assert!(first.contains("\"type\":\"telemetry\""));
        let _second = rx.recv().await.unwrap();

        cancel.cancel();
        task.await.unwrap();
    }
}
