//! MemoryStore - Implementazione in memoria di directory, stanze e messaggi
//!
//! Usata dai test e dalle esecuzioni di sviluppo senza `DATABASE_URL`.
//! Stesse semantiche dei repository MySQL, dati persi alla chiusura del processo.

use super::{MessageStore, NewParticipant, RoomStore, UserDirectory};
use crate::dtos::CreateMessageDTO;
use crate::entities::{
    LastMessage, Message, MessageStatus, Participant, ReadReceipt, Room, User, room_key,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::Error;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    rooms: DashMap<String, Room>,
    messages: DashMap<i64, Message>,
    next_message_id: AtomicI64,
    // simula un database irraggiungibile
    unavailable: AtomicBool,
    // fa fallire solo l'aggiornamento del riepilogo delle stanze
    summaries_unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserisce o sostituisce un utente nella directory
    pub fn insert_user(&self, user: User) {
        self.users.insert(user.user_id.clone(), user);
    }

    pub fn user(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|u| u.value().clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Con `true` ogni operazione fallisce con `PoolClosed`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Con `true` fallisce solo `append_last_message`
    pub fn set_summaries_unavailable(&self, unavailable: bool) {
        self.summaries_unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::PoolClosed)
        } else {
            Ok(())
        }
    }

    /// Utenti filtrati come la ricerca della directory MySQL, ordinati per username
    fn matching_users(&self, exclude_id: &str, search: Option<&str>) -> Vec<User> {
        let needle = search.map(str::to_lowercase);
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.user_id != exclude_id)
            .filter(|u| match &needle {
                Some(needle) => [&u.username, &u.first_name, &u.last_name]
                    .iter()
                    .any(|field| field.to_lowercase().contains(needle.as_str())),
                None => true,
            })
            .map(|u| u.value().clone())
            .collect();
        users.sort_by(|a, b| {
            a.username
                .cmp(&b.username)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        users
    }

    fn room_messages_desc(&self, room_key: &str) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|entry| entry.value().room_key == room_key)
            .map(|entry| entry.value().clone())
            .collect();
        messages.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.message_id.cmp(&a.message_id))
        });
        messages
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, Error> {
        self.check()?;
        Ok(self.user(user_id))
    }

    async fn set_online(&self, user_id: &str, is_online: bool) -> Result<(), Error> {
        self.check()?;
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.is_online = is_online;
        }
        Ok(())
    }

    async fn find_online_staff(&self) -> Result<Vec<User>, Error> {
        self.check()?;
        let mut staff: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.is_online && u.is_staff())
            .map(|u| u.value().clone())
            .collect();
        staff.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(staff)
    }

    async fn find_customer_ids(&self) -> Result<Vec<String>, Error> {
        self.check()?;
        Ok(self
            .users
            .iter()
            .filter(|u| u.roles.is_customer())
            .map(|u| u.key().clone())
            .collect())
    }

    async fn find_contacts_paginated(
        &self,
        exclude_id: &str,
        search: Option<&str>,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<User>, Error> {
        self.check()?;
        Ok(self
            .matching_users(exclude_id, search)
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .collect())
    }

    async fn count_contacts(&self, exclude_id: &str, search: Option<&str>) -> Result<i64, Error> {
        self.check()?;
        Ok(self.matching_users(exclude_id, search).len() as i64)
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn find_by_key(&self, room_key: &str) -> Result<Option<Room>, Error> {
        self.check()?;
        Ok(self.rooms.get(room_key).map(|r| r.value().clone()))
    }

    async fn find_or_create(
        &self,
        first: &NewParticipant,
        second: &NewParticipant,
    ) -> Result<Room, Error> {
        self.check()?;
        let key = room_key(&first.user_id, &second.user_id);
        let now = Utc::now();

        // entry() tiene il lock della shard: creazione atomica
        let room = self
            .rooms
            .entry(key.clone())
            .or_insert_with(|| {
                let mut participants: Vec<Participant> = Vec::with_capacity(2);
                for p in [first, second] {
                    if participants.iter().all(|existing| existing.user_id != p.user_id) {
                        participants.push(Participant {
                            user_id: p.user_id.clone(),
                            username: p.username.clone(),
                            is_online: false,
                            last_seen: now,
                            unread_count: 0,
                        });
                    }
                }
                Room {
                    room_key: key,
                    participants,
                    last_message: None,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                }
            })
            .value()
            .clone();
        Ok(room)
    }

    async fn find_many_by_participant(&self, user_id: &str) -> Result<Vec<Room>, Error> {
        self.check()?;
        let mut rooms: Vec<Room> = self
            .rooms
            .iter()
            .filter(|r| r.is_participant(user_id))
            .map(|r| r.value().clone())
            .collect();
        rooms.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rooms)
    }

    async fn update_participant_status(
        &self,
        room_key: &str,
        user_id: &str,
        is_online: bool,
    ) -> Result<(), Error> {
        self.check()?;
        if let Some(mut room) = self.rooms.get_mut(room_key) {
            if let Some(p) = room.participants.iter_mut().find(|p| p.user_id == user_id) {
                p.is_online = is_online;
                p.last_seen = Utc::now();
            }
        }
        Ok(())
    }

    async fn set_offline_everywhere(&self, user_id: &str) -> Result<u64, Error> {
        self.check()?;
        let now = Utc::now();
        let mut changed = 0;
        for mut room in self.rooms.iter_mut() {
            for p in room.participants.iter_mut() {
                if p.user_id == user_id && p.is_online {
                    p.is_online = false;
                    p.last_seen = now;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn append_last_message(&self, room_key: &str, last: &LastMessage) -> Result<(), Error> {
        self.check()?;
        if self.summaries_unavailable.load(Ordering::SeqCst) {
            return Err(Error::PoolTimedOut);
        }
        if let Some(mut room) = self.rooms.get_mut(room_key) {
            room.last_message = Some(last.clone());
            room.updated_at = Utc::now();
            for p in room.participants.iter_mut() {
                if p.user_id != last.sender_id {
                    p.unread_count += 1;
                }
            }
        }
        Ok(())
    }

    async fn set_unread_count(&self, room_key: &str, user_id: &str, count: u32) -> Result<(), Error> {
        self.check()?;
        if let Some(mut room) = self.rooms.get_mut(room_key) {
            if let Some(p) = room.participants.iter_mut().find(|p| p.user_id == user_id) {
                p.unread_count = count;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create(&self, data: &CreateMessageDTO) -> Result<Message, Error> {
        self.check()?;
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message = Message {
            message_id,
            room_key: data.room_key.clone(),
            sender_id: data.sender_id.clone(),
            sender_name: data.sender_name.clone(),
            content: data.content.clone(),
            message_type: data.message_type,
            status: MessageStatus::Sent,
            read_by: Vec::new(),
            created_at: data.created_at,
        };
        self.messages.insert(message_id, message.clone());
        Ok(message)
    }

    async fn read(&self, message_id: i64) -> Result<Option<Message>, Error> {
        self.check()?;
        Ok(self.messages.get(&message_id).map(|m| m.value().clone()))
    }

    async fn find_many_paginated(
        &self,
        room_key: &str,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Message>, Error> {
        self.check()?;
        Ok(self
            .room_messages_desc(room_key)
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .collect())
    }

    async fn count_by_room(&self, room_key: &str) -> Result<i64, Error> {
        self.check()?;
        Ok(self
            .messages
            .iter()
            .filter(|m| m.room_key == room_key)
            .count() as i64)
    }

    async fn count_unread(&self, room_key: &str, user_id: &str) -> Result<i64, Error> {
        self.check()?;
        Ok(self
            .messages
            .iter()
            .filter(|m| m.room_key == room_key && m.sender_id != user_id && !m.is_read_by(user_id))
            .count() as i64)
    }

    async fn find_latest_by_room(&self, room_key: &str) -> Result<Option<Message>, Error> {
        self.check()?;
        Ok(self.room_messages_desc(room_key).into_iter().next())
    }

    async fn mark_read(
        &self,
        message_id: i64,
        user_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.check()?;
        let mut message = self.messages.get_mut(&message_id).ok_or(Error::RowNotFound)?;
        if message.is_read_by(user_id) {
            return Ok(false);
        }
        message.read_by.push(ReadReceipt {
            user_id: user_id.to_string(),
            read_at,
        });
        message.status = message.status.advance(MessageStatus::Read);
        Ok(true)
    }

    async fn advance_status(&self, message_id: i64, status: MessageStatus) -> Result<(), Error> {
        self.check()?;
        if let Some(mut message) = self.messages.get_mut(&message_id) {
            message.status = message.status.advance(status);
        }
        Ok(())
    }
}
