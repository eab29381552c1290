//! WebSocket Module - Gestione WebSocket per comunicazione real-time
//!
//! Questo modulo gestisce le connessioni WebSocket del canale chat. Include:
//! - Upgrade HTTP -> WebSocket con autenticazione tramite token
//! - Registro connessioni (ultima connessione vince) e membri live delle stanze
//! - Presenza online/offline e primitive di broadcast
//! - Dispatcher dei comandi JSON del client

pub mod broadcast;
pub mod connection;
pub mod event_handlers;
pub mod presence;
pub mod roommap;
pub mod usermap;

// Re-exports pubblici
pub use connection::handle_socket;
pub use usermap::{InternalSignal, Session};

use crate::core::auth::{AuthError, authenticate_token};
use crate::core::AppState;
use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Token assente
pub const CLOSE_AUTH_REQUIRED: u16 = 4000;
/// Token scaduto
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;
/// Token non valido
pub const CLOSE_TOKEN_INVALID: u16 = 4002;
/// Token valido ma handshake di presenza fallito
pub const CLOSE_AUTH_FAILED: u16 = 4003;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Entry point per le richieste di upgrade WebSocket (`GET /ws?token=...`)
/// Operazioni:
/// 1. Estrarre il token dalla query o dall'header Authorization
/// 2. Eseguire upgrade HTTP -> WebSocket
/// 3. Token valido: passare la connessione ad handle_socket; altrimenti chiudere con il codice dell'errore
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
) -> Response {
    match authenticate_token(query.token.as_deref(), &headers, &state.jwt_secret) {
        Ok(claims) => {
            info!(user_id = %claims.user_id, "WebSocket connection authenticated");
            ws.on_upgrade(move |socket| handle_socket(socket, state, claims.user_id))
        }
        Err(err) => {
            warn!(close_code = err.close_code(), reason = %err, "WebSocket auth failed");
            // upgrade comunque, poi chiusura immediata con il codice applicativo
            ws.on_upgrade(move |socket| reject(socket, err))
        }
    }
}

async fn reject(mut socket: WebSocket, err: AuthError) {
    let frame = CloseFrame {
        code: err.close_code(),
        reason: err.to_string().into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}
