//! WebSocket real-time channel.
//!
//! Every stamped chunk is pushed to subscribers as
//! `{"event":"data","payload":"..."}`. Clients send
//! `{"event":"input","payload":"..."}` to write a CRLF-terminated line.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::event::BridgeEvent;
use crate::protocol;
use crate::server::AppState;

/// Messages exchanged over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum WsMessage {
    /// Server → client: serial data (or the buffer on connect).
    Data(String),
    /// Client → server: a line to forward to the device.
    Input(String),
}

/// GET /ws: upgrade and stream data events.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: AppState) {
    let mut rx = state.forwarder.subscribe();
    debug!("websocket subscriber connected");

    let replay = WsMessage::Data(state.forwarder.read().await);
    if send(&mut socket, &replay).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            event = rx.recv() => {
                match event {
                    Ok(BridgeEvent::Data(chunk)) => {
                        if send(&mut socket, &WsMessage::Data(chunk)).await.is_err() {
                            break; // Client disconnected
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        warn!("websocket subscriber lagged, skipped {n} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_input(&state, text.as_str()).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("websocket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
    debug!("websocket subscriber disconnected");
}

async fn send(socket: &mut WebSocket, msg: &WsMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).unwrap_or_default();
    socket.send(Message::Text(json.into())).await
}

async fn handle_input(state: &AppState, text: &str) {
    match serde_json::from_str::<WsMessage>(text) {
        Ok(WsMessage::Input(line)) => {
            if let Err(e) = state.forwarder.write(&protocol::encode_write_crlf(&line)).await {
                warn!("websocket input not forwarded: {e}");
            }
        }
        Ok(WsMessage::Data(_)) => {}
        Err(e) => debug!("ignoring websocket message: {e}"),
    }
}
