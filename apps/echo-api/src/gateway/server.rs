//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};

use super::dispatch::Gateway;
use super::events::Outbound;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let gateway = Arc::clone(&state.gateway);
    ws.on_upgrade(move |socket| handle_connection(socket, gateway))
}

/// One task per socket: inbound frames are dispatched in order, and every
/// write goes through the connection's outbound queue.
async fn handle_connection(socket: WebSocket, gateway: Arc<Gateway>) {
    let (conn, mut outbound) = gateway.connect();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        gateway.handle_text(&conn, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        gateway.handle_text(&conn, &String::from_utf8_lossy(&bytes)).await;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %conn, "ws read error");
                        break;
                    }
                }
            }

            out = outbound.recv() => {
                match out {
                    Some(Outbound::Frame(text)) => {
                        if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        let _ = send_close(&mut ws_tx, code, reason).await;
                        break;
                    }
                    // Deregistered elsewhere.
                    None => break,
                }
            }
        }
    }

    gateway.disconnect(&conn);
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
