//! WebSocket Connection Management - Gestione connessioni WebSocket

use crate::core::AppState;
use crate::ws::event_handlers::process_text;
use crate::ws::presence;
use crate::ws::usermap::{InternalSignal, Session};
use crate::ws::CLOSE_AUTH_FAILED;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// Close code "normal closure" usato per l'inattività
const CLOSE_NORMAL: u16 = 1000;

#[instrument(skip(ws, state))]
pub async fn handle_socket(ws: WebSocket, state: Arc<AppState>, user_id: String) {
    info!("WebSocket connection established");

    // Dividiamo il WebSocket in due metà: sender e receiver
    let (ws_tx, ws_rx) = ws.split();

    // Il task di scrittura consuma i segnali destinati a questa connessione
    let (int_tx, int_rx) = unbounded_channel::<InternalSignal>();
    let writer = tokio::spawn(write_ws(user_id.clone(), ws_tx, int_rx));

    let session = Session::new(user_id, int_tx);
    if let Err(e) = presence::connect(&state, &session).await {
        warn!("Closing connection after failed handshake: {}", e);
        session.close(CLOSE_AUTH_FAILED, "Authentication failed");
        drop(session);
        let _ = writer.await;
        return;
    }

    listen_ws(&state, &session, ws_rx).await;

    presence::disconnect(&state, &session).await;
    let _ = session.sender().send(InternalSignal::Shutdown);
    if let Err(e) = writer.await {
        error!("Write task panicked: {:?}", e);
    }
    info!("WebSocket connection closed");
}

#[instrument(skip(websocket_tx, internal_rx))]
async fn write_ws(
    user_id: String,
    mut websocket_tx: SplitSink<WebSocket, Message>,
    mut internal_rx: UnboundedReceiver<InternalSignal>,
) {
    debug!("Write task started");

    while let Some(signal) = internal_rx.recv().await {
        match signal {
            InternalSignal::Event(event) => {
                let json = match serde_json::to_string(event.as_ref()) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(event = event.kind(), "Failed to serialize event: {:?}", e);
                        continue;
                    }
                };
                if let Err(e) = websocket_tx.send(Message::Text(Utf8Bytes::from(json))).await {
                    warn!("Failed to write to WebSocket: {:?}", e);
                    break;
                }
            }
            InternalSignal::Close { code, reason } => {
                info!(code, reason, "Closing WebSocket");
                let frame = CloseFrame {
                    code,
                    reason: Utf8Bytes::from(reason),
                };
                let _ = websocket_tx.send(Message::Close(Some(frame))).await;
                break;
            }
            InternalSignal::Shutdown => {
                debug!("Shutdown signal received");
                break;
            }
        }
    }

    debug!("Write task terminated");
}

#[instrument(skip(state, session, websocket_rx), fields(user_id = %session.user_id))]
async fn listen_ws(state: &AppState, session: &Session, mut websocket_rx: SplitStream<WebSocket>) {
    debug!("Listen task started");

    loop {
        match timeout(state.idle_timeout, websocket_rx.next()).await {
            Ok(Some(Ok(msg))) => match msg {
                Message::Text(text) => process_text(state, session, text.as_str()).await,
                Message::Binary(_) => debug!("Binary frame ignored"),
                Message::Close(_) => {
                    info!("Close message received");
                    break;
                }
                // axum risponde ai ping automaticamente
                Message::Ping(_) | Message::Pong(_) => {}
            },
            Ok(Some(Err(e))) => {
                warn!("WebSocket error: {:?}", e);
                break;
            }
            Ok(None) => {
                info!("WebSocket stream ended");
                break;
            }
            Err(_) => {
                info!("Idle timeout reached, closing connection");
                session.close(CLOSE_NORMAL, "Idle timeout");
                break;
            }
        }
    }
}
