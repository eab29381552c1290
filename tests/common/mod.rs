//! Helper condivisi dai test di integrazione
//!
//! Tutti i test girano sullo store in memoria: nessun database richiesto.

#![allow(dead_code)]

use axum_test::TestServer;
use market_chat_server::auth::encode_jwt;
use market_chat_server::core::AppState;
use market_chat_server::entities::{RoleSet, User};
use market_chat_server::repositories::MemoryStore;
use market_chat_server::ws::presence;
use market_chat_server::ws::{InternalSignal, Session};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

pub const JWT_SECRET: &str = "ilmiobellissimosegretochevaassolutamentecambiato";

/// Utenti di test: due clienti, un venditore, un admin e un fattorino
pub fn test_users() -> Vec<User> {
    vec![
        user("c1", "carla", RoleSet::CUSTOMER),
        user("c2", "chiara", RoleSet::CUSTOMER),
        user("v1", "bottega", RoleSet::VENDOR),
        user("a1", "admin", RoleSet::ADMIN),
        user("d1", "rider", RoleSet::DELIVERY),
    ]
}

pub fn user(user_id: &str, username: &str, roles: RoleSet) -> User {
    User {
        user_id: user_id.to_string(),
        username: username.to_string(),
        first_name: String::new(),
        last_name: String::new(),
        avatar: None,
        roles,
        is_online: false,
    }
}

/// Crea un AppState in memoria con gli utenti di test
pub fn create_test_state() -> (Arc<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for u in test_users() {
        store.insert_user(u);
    }
    let state = Arc::new(AppState::in_memory(store.clone(), JWT_SECRET.to_string()));
    (state, store)
}

/// Crea un TestServer per i test REST
pub fn create_test_server(state: Arc<AppState>) -> TestServer {
    let app = market_chat_server::create_router(state);
    TestServer::new(app).expect("Failed to create test server")
}

/// Genera un JWT valido 24 ore per l'utente
pub fn create_test_jwt(user_id: &str) -> String {
    encode_jwt(user_id, RoleSet::CUSTOMER, JWT_SECRET).expect("Failed to create JWT token")
}

/// Genera un JWT già scaduto
pub fn create_expired_jwt(user_id: &str) -> String {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use market_chat_server::auth::Claims;

    let past = Utc::now() - Duration::hours(2);
    let claims = Claims {
        iat: past.timestamp() as usize,
        exp: (past + Duration::minutes(30)).timestamp() as usize,
        user_id: user_id.to_string(),
        roles: RoleSet::CUSTOMER,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to create JWT token")
}

/// Connessione simulata: registra l'utente come farebbe il WebSocket e restituisce
/// la sessione insieme al ricevitore dei suoi eventi
pub async fn connect_user(
    state: &AppState,
    user_id: &str,
) -> (Session, UnboundedReceiver<InternalSignal>) {
    let (tx, rx) = unbounded_channel();
    let session = Session::new(user_id, tx);
    presence::connect(state, &session)
        .await
        .expect("presence handshake should succeed");
    (session, rx)
}

/// Svuota il canale e restituisce gli eventi ricevuti come JSON
pub fn drain_events(rx: &mut UnboundedReceiver<InternalSignal>) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(signal) = rx.try_recv() {
        if let InternalSignal::Event(event) = signal {
            events.push(serde_json::to_value(event.as_ref()).expect("event serializes"));
        }
    }
    events
}

pub fn of_type<'a>(events: &'a [Value], kind: &str) -> Vec<&'a Value> {
    events.iter().filter(|e| e["type"] == kind).collect()
}
