//! UserMap - Registro delle connessioni vive
//!
//! Ogni utente ha al massimo una connessione registrata: l'ultima vince.
//! Una connessione sostituita resta aperta ma non riceve più eventi indirizzati all'utente.

use crate::dtos::ServerEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

/// Segnali inviati al task di scrittura di una connessione
#[derive(Debug)]
pub enum InternalSignal {
    /// Evento da serializzare e scrivere sul WebSocket
    Event(Arc<ServerEvent>),
    /// Chiude il WebSocket con un close frame
    Close { code: u16, reason: &'static str },
    Shutdown,
}

pub type ConnectionTx = UnboundedSender<InternalSignal>;

/// Lato "server" di una connessione: l'identità autenticata e il canale verso il suo writer
#[derive(Clone, Debug)]
pub struct Session {
    pub user_id: String,
    tx: ConnectionTx,
}

impl Session {
    pub fn new(user_id: impl Into<String>, tx: ConnectionTx) -> Self {
        Self {
            user_id: user_id.into(),
            tx,
        }
    }

    pub fn sender(&self) -> &ConnectionTx {
        &self.tx
    }

    /// Risposta diretta a questa connessione, indipendentemente dal registro
    pub fn reply(&self, event: ServerEvent) -> bool {
        let kind = event.kind();
        match self.tx.send(InternalSignal::Event(Arc::new(event))) {
            Ok(()) => true,
            Err(_) => {
                warn!(user_id = %self.user_id, event = kind, "Connection closed, reply dropped");
                false
            }
        }
    }

    pub fn close(&self, code: u16, reason: &'static str) {
        let _ = self.tx.send(InternalSignal::Close { code, reason });
    }
}

#[derive(Default)]
pub struct UserMap {
    users_online: DashMap<String, ConnectionTx>,
}

impl UserMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra la connessione dell'utente e restituisce quella eventualmente sostituita
    #[instrument(skip(self, tx))]
    pub fn register_online(&self, user_id: &str, tx: ConnectionTx) -> Option<ConnectionTx> {
        info!("Registering user as online");
        let replaced = self.users_online.insert(user_id.to_string(), tx);
        if replaced.is_some() {
            info!("Previous connection superseded");
        }
        info!("Total online users: {}", self.users_online.len());
        replaced
    }

    /// Rimuove l'utente solo se `tx` è ancora la connessione registrata
    #[instrument(skip(self, tx))]
    pub fn remove_if_current(&self, user_id: &str, tx: &ConnectionTx) -> bool {
        let removed = self
            .users_online
            .remove_if(user_id, |_, current| current.same_channel(tx))
            .is_some();
        if removed {
            info!("User removed from online");
        } else {
            debug!("Connection already superseded, registry untouched");
        }
        removed
    }

    /// Rimette `previous` al posto di `current`, solo se `current` è ancora quella registrata
    #[instrument(skip(self, current, previous))]
    pub fn restore_if_current(
        &self,
        user_id: &str,
        current: &ConnectionTx,
        previous: ConnectionTx,
    ) -> bool {
        match self.users_online.get_mut(user_id) {
            Some(mut entry) if entry.same_channel(current) => {
                *entry = previous;
                info!("Previous connection restored");
                true
            }
            _ => {
                debug!("Connection already superseded, registry untouched");
                false
            }
        }
    }

    /// Invia un segnale all'utente se online; `true` se il canale lo ha accettato
    pub fn send_if_online(&self, user_id: &str, signal: InternalSignal) -> bool {
        match self.users_online.get(user_id) {
            Some(entry) => match entry.value().send(signal) {
                Ok(()) => true,
                Err(e) => {
                    warn!(user_id, "Failed to send signal to user: {:?}", e.0);
                    false
                }
            },
            None => {
                debug!(user_id, "User not online, signal not sent");
                false
            }
        }
    }

    /// Invia un evento a tutte le connessioni tranne `exclude`; restituisce quante lo hanno accettato
    pub fn send_to_all(&self, event: &Arc<ServerEvent>, exclude: Option<&str>) -> usize {
        let mut sent = 0;
        for entry in self.users_online.iter() {
            if exclude == Some(entry.key().as_str()) {
                continue;
            }
            if entry.value().send(InternalSignal::Event(event.clone())).is_ok() {
                sent += 1;
            } else {
                warn!(user_id = %entry.key(), event = event.kind(), "Failed to deliver event");
            }
        }
        sent
    }

    pub fn online_user_ids(&self) -> Vec<String> {
        self.users_online.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_user_online(&self, user_id: &str) -> bool {
        self.users_online.contains_key(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.users_online.len()
    }
}
