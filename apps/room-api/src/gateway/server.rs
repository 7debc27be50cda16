//! WebSocket upgrade handler and per-connection event loop.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::time;

use crate::AppState;

use super::fanout::{outbound_channel, OutboundReceiver};

/// Normal closure, sent when the server drops a connection's outbound queue.
const CLOSE_NORMAL: u16 = 1000;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, outbound_rx) = outbound_channel();

    let gateway = state.gateway.clone();
    let mut session = gateway.connect(outbound_tx);
    let connection_id = session.connection_id.clone();

    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        outbound_rx,
        state.config.ws_ping_interval(),
        connection_id.clone(),
    ));

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        gateway.handle_text(&mut session, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, %connection_id, "ws read error");
                        break;
                    }
                    // Pings are answered by the transport; binary frames are not part of the protocol.
                    Some(Ok(_)) => continue,
                }
            }

            // Writer gave up (send failed), so the socket is gone.
            _ = &mut writer => break,
        }
    }

    gateway.disconnect(&mut session);
    writer.abort();
}

/// Drain a connection's outbound queue into the socket and keep it alive
/// with periodic pings.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: OutboundReceiver,
    ping_interval: Duration,
    connection_id: String,
) {
    let mut ping_timer = time::interval(ping_interval);
    ping_timer.tick().await; // First tick fires immediately; skip it.

    loop {
        tokio::select! {
            msg = outbound_rx.recv() => {
                let Some(msg) = msg else {
                    let _ = send_close(&mut ws_tx, CLOSE_NORMAL, "Connection closed").await;
                    break;
                };
                let json = match serde_json::to_string(msg.as_ref()) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(%connection_id, error = %e, "failed to encode gateway message");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }

            _ = ping_timer.tick() => {
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    tracing::debug!(%connection_id, "ping failed, closing connection");
                    break;
                }
            }
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
