use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use tracing::{info, warn};

use crate::state::AppState;

/// Live event stream: every [`crate::notify::MarketEvent`] is pushed to each
/// connected client as one JSON text frame. Read-only; inbound frames are
/// drained and ignored.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| stream_events(socket, state))
}

async fn stream_events(mut socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.events_tx.subscribe();
    info!("event stream client connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Ok(event) = event else {
                    // Lagged or closed; either way the stream is no longer
                    // complete, so drop the client.
                    break;
                };
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(error = %err, "failed to serialize market event");
                        continue;
                    }
                };
                if socket.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }

    info!("event stream client disconnected");
}
