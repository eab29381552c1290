//! Room entity - Conversazione persistita tra due utenti

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separatore della room key: non può comparire negli id utente
pub const ROOM_KEY_SEPARATOR: char = '_';

/// Un id può comporre una room key solo se non vuoto e privo del separatore,
/// altrimenti coppie diverse produrrebbero la stessa chiave.
pub fn is_valid_user_id(id: &str) -> bool {
    !id.trim().is_empty() && !id.contains(ROOM_KEY_SEPARATOR)
}

/// Chiave deterministica della stanza: gli id ordinati uniti da `_`.
/// `room_key(a, b) == room_key(b, a)` per ogni coppia.
pub fn room_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}

/// Scompone una room key nei due id che la compongono.
/// Ritorna `None` se la chiave non ha esattamente due segmenti non vuoti.
pub fn split_room_key(key: &str) -> Option<(&str, &str)> {
    let mut parts = key.split(ROOM_KEY_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) if !a.is_empty() && !b.is_empty() => Some((a, b)),
        _ => None,
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Participant {
    pub user_id: String,
    pub username: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub unread_count: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LastMessage {
    pub content: String,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Room {
    pub room_key: String,
    pub participants: Vec<Participant>,
    pub last_message: Option<LastMessage>,
    // le stanze non vengono mai cancellate, al massimo disattivate
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participant(user_id).is_some()
    }

    pub fn unread_for(&self, user_id: &str) -> u32 {
        self.participant(user_id).map(|p| p.unread_count).unwrap_or(0)
    }

    pub fn participant_ids(&self) -> impl Iterator<Item = &str> {
        self.participants.iter().map(|p| p.user_id.as_str())
    }
}
