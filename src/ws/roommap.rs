//! RoomMap - Membri "live" delle stanze
//!
//! Traccia chi ha fatto join in questo processo; non sopravvive al riavvio.

use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

#[derive(Default)]
pub struct RoomMap {
    rooms_online: DashMap<String, HashSet<String>>,
}

impl RoomMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` se l'utente non era già membro
    pub fn join(&self, room_key: &str, user_id: &str) -> bool {
        self.rooms_online
            .entry(room_key.to_string())
            .or_default()
            .insert(user_id.to_string())
    }

    /// `true` se l'utente era membro
    pub fn leave(&self, room_key: &str, user_id: &str) -> bool {
        let removed = match self.rooms_online.get_mut(room_key) {
            Some(mut members) => members.remove(user_id),
            None => false,
        };
        // le stanze vuote non restano nella mappa
        self.rooms_online.remove_if(room_key, |_, members| members.is_empty());
        removed
    }

    pub fn members(&self, room_key: &str) -> Vec<String> {
        self.rooms_online
            .get(room_key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, room_key: &str, user_id: &str) -> bool {
        self.rooms_online
            .get(room_key)
            .is_some_and(|members| members.contains(user_id))
    }

    /// Toglie l'utente da ogni stanza, restituisce le stanze lasciate
    pub fn remove_user_everywhere(&self, user_id: &str) -> Vec<String> {
        let mut left = Vec::new();
        self.rooms_online.retain(|room_key, members| {
            if members.remove(user_id) {
                left.push(room_key.clone());
            }
            !members.is_empty()
        });
        debug!(user_id, rooms = left.len(), "User removed from room memberships");
        left
    }

    pub fn rooms_of(&self, user_id: &str) -> Vec<String> {
        self.rooms_online
            .iter()
            .filter(|entry| entry.value().contains(user_id))
            .map(|entry| entry.key().clone())
            .collect()
    }
}
