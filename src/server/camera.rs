//! Video WebSocket handler: binary JPEG frames, latest-wins per client.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use super::AppState;

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut frames = state.frames;

    // A late joiner gets the latest frame right away
    let latest = frames.borrow_and_update().clone();
    if let Some(frame) = latest {
        if ws_tx.send(Message::Binary(frame.jpeg)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            changed = frames.changed() => {
                if changed.is_err() {
                    // Capture side is gone; nothing more to stream
                    break;
                }
                let Some(frame) = frames.borrow_and_update().clone() else {
                    continue;
                };
                // Awaiting this send only delays *this* client; the hub and
                // every other subscriber keep their own pace
                if ws_tx.send(Message::Binary(frame.jpeg)).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(data))) => {
                    let _ = ws_tx.send(Message::Pong(data)).await;
                }
                Some(Err(_)) => break,
                _ => {}
            },
        }
    }

    debug!("Video client disconnected");
}
