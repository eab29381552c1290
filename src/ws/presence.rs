//! Presence - Ingresso e uscita degli utenti dal canale real-time
//!
//! Connessione: registrazione, flag online in directory, annuncio `user_online` ai clienti
//! se l'utente è staff, evento `connection` al nuovo client.
//! Disconnessione: pulizia solo se la connessione che chiude è ancora quella registrata.

use crate::core::{AppState, ChatError};
use crate::dtos::{ServerEvent, UserSummaryDTO};
use crate::ws::broadcast::broadcast_to_customers;
use crate::ws::usermap::Session;
use tracing::{error, info, instrument, warn};

/// Registra la connessione ed esegue l'handshake di presenza.
/// In caso di errore la registrazione viene annullata, ripristinando la connessione sostituita.
#[instrument(skip(state, session), fields(user_id = %session.user_id))]
pub async fn connect(state: &AppState, session: &Session) -> Result<(), ChatError> {
    let replaced = state
        .users_online
        .register_online(&session.user_id, session.sender().clone());

    if let Err(e) = announce_online(state, session).await {
        error!("Presence handshake failed: {}", e);
        match replaced.filter(|previous| !previous.is_closed()) {
            // la connessione precedente è ancora viva: torna a essere quella registrata
            Some(previous) => {
                state
                    .users_online
                    .restore_if_current(&session.user_id, session.sender(), previous);
            }
            None => {
                state
                    .users_online
                    .remove_if_current(&session.user_id, session.sender());
                if let Err(e) = state.users.set_online(&session.user_id, false).await {
                    warn!("Failed to reset online flag: {:?}", e);
                }
            }
        }
        return Err(e);
    }
    Ok(())
}

async fn announce_online(state: &AppState, session: &Session) -> Result<(), ChatError> {
    state.users.set_online(&session.user_id, true).await?;

    let user = state
        .users
        .find_by_id(&session.user_id)
        .await?
        .ok_or(ChatError::NotFound("User not found"))?;

    if user.is_staff() {
        let event = ServerEvent::UserOnline {
            user: UserSummaryDTO::from_user(&user, true),
        };
        let sent = broadcast_to_customers(state, event).await?;
        info!(sent, "Staff user announced online to customers");
    }

    session.reply(ServerEvent::Connection {
        status: "connected".to_string(),
        user_id: session.user_id.clone(),
    });
    Ok(())
}

/// Pulizia alla chiusura del trasporto. Restituisce `false` se la connessione era già stata
/// sostituita: in quel caso non viene toccato nulla.
#[instrument(skip(state, session), fields(user_id = %session.user_id))]
pub async fn disconnect(state: &AppState, session: &Session) -> bool {
    let user_id = session.user_id.as_str();
    if !state.users_online.remove_if_current(user_id, session.sender()) {
        info!("Superseded connection closed");
        return false;
    }

    let left = state.rooms_online.remove_user_everywhere(user_id);
    info!(rooms = left.len(), "User disconnected");

    if let Err(e) = state.users.set_online(user_id, false).await {
        error!("Failed to mark user offline: {:?}", e);
    }
    match state.rooms.set_offline_everywhere(user_id).await {
        Ok(updated) => info!(updated, "Participant status set offline"),
        Err(e) => error!("Failed to update participant status: {:?}", e),
    }

    match state.users.find_by_id(user_id).await {
        Ok(Some(user)) if user.is_staff() => {
            let event = ServerEvent::UserOffline {
                user: UserSummaryDTO::from_user(&user, false),
            };
            match broadcast_to_customers(state, event).await {
                Ok(sent) => info!(sent, "Staff user announced offline to customers"),
                Err(e) => error!("Failed to announce user offline: {:?}", e),
            }
        }
        Ok(_) => {}
        Err(e) => error!("Failed to load user on disconnect: {:?}", e),
    }
    true
}
