//! Broadcast - Primitive di invio eventi verso le connessioni vive
//!
//! Ogni funzione restituisce il numero di connessioni che hanno accettato l'evento.
//! Un destinatario che fallisce viene loggato e non interrompe il ciclo.

use crate::core::AppState;
use crate::dtos::ServerEvent;
use crate::ws::usermap::InternalSignal;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Invia un evento a un singolo utente se connesso
pub fn send_to_user(state: &AppState, user_id: &str, event: ServerEvent) -> bool {
    state
        .users_online
        .send_if_online(user_id, InternalSignal::Event(Arc::new(event)))
}

/// Consegna lo stesso evento a ogni id in `recipients`, una volta per id
pub fn deliver_to<'a>(
    state: &AppState,
    recipients: impl IntoIterator<Item = &'a str>,
    event: ServerEvent,
) -> usize {
    let event = Arc::new(event);
    let mut sent = 0;
    for user_id in recipients {
        if state
            .users_online
            .send_if_online(user_id, InternalSignal::Event(event.clone()))
        {
            sent += 1;
        }
    }
    debug!(event = event.kind(), sent, "Event delivered");
    sent
}

/// Invia un evento ai membri live della stanza, escluso `exclude`
#[instrument(skip(state, event), fields(event = event.kind()))]
pub fn broadcast_to_room(
    state: &AppState,
    room_key: &str,
    event: ServerEvent,
    exclude: Option<&str>,
) -> usize {
    let members = state.rooms_online.members(room_key);
    deliver_to(
        state,
        members
            .iter()
            .map(String::as_str)
            .filter(|id| Some(*id) != exclude),
        event,
    )
}

/// Invia un evento a tutte le connessioni, escluso `exclude`
#[instrument(skip(state, event), fields(event = event.kind()))]
pub fn broadcast_to_all(state: &AppState, event: ServerEvent, exclude: Option<&str>) -> usize {
    let sent = state.users_online.send_to_all(&Arc::new(event), exclude);
    debug!(sent, "Broadcast to all connections");
    sent
}

/// Invia un evento ai clienti (utenti senza ruoli staff) connessi.
/// La popolazione viene letta dalla directory utenti.
#[instrument(skip(state, event), fields(event = event.kind()))]
pub async fn broadcast_to_customers(
    state: &AppState,
    event: ServerEvent,
) -> Result<usize, sqlx::Error> {
    let customers = state.users.find_customer_ids().await.inspect_err(|e| {
        warn!("Failed to load customer population: {:?}", e);
    })?;
    Ok(deliver_to(state, customers.iter().map(String::as_str), event))
}
