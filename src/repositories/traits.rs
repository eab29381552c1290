//! Store traits
//!
//! Interfacce di persistenza usate dal motore di chat. Esistono due implementazioni:
//! MySQL (`UserRepository`, `RoomRepository`, `MessageRepository`) e in memoria (`MemoryStore`).

use crate::dtos::CreateMessageDTO;
use crate::entities::{LastMessage, Message, MessageStatus, Room, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;

/// Directory utenti: il server legge ruoli e nome, scrive solo il flag online
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Reads a user by id
    ///
    /// # Returns
    /// * `Ok(Some(User))` - User found
    /// * `Ok(None)` - No user with that id
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, Error>;

    /// Persists the presence flag of a user. Unknown ids are a no-op.
    async fn set_online(&self, user_id: &str, is_online: bool) -> Result<(), Error>;

    /// Users currently flagged online that have at least one staff role
    async fn find_online_staff(&self) -> Result<Vec<User>, Error>;

    /// Ids of every user without staff roles (the customer population)
    async fn find_customer_ids(&self) -> Result<Vec<String>, Error>;

    /// Contact directory page: every user except `exclude_id`, optionally filtered by a
    /// case-insensitive match on username, first name or last name, ordered by username
    async fn find_contacts_paginated(
        &self,
        exclude_id: &str,
        search: Option<&str>,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<User>, Error>;

    /// Number of users matched by the same filter of `find_contacts_paginated`
    async fn count_contacts(&self, exclude_id: &str, search: Option<&str>) -> Result<i64, Error>;
}

/// Participant data needed to create a room
#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub user_id: String,
    pub username: String,
}

/// Registro persistito delle stanze
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Reads a room by its key
    async fn find_by_key(&self, room_key: &str) -> Result<Option<Room>, Error>;

    /// Returns the room of the two participants, creating it if absent.
    ///
    /// # Note
    /// Idempotent: the key is `room_key(first, second)`, so concurrent or repeated
    /// calls resolve to the same single room and never duplicate participants.
    async fn find_or_create(
        &self,
        first: &NewParticipant,
        second: &NewParticipant,
    ) -> Result<Room, Error>;

    /// All rooms where `user_id` is a participant, most recently updated first
    async fn find_many_by_participant(&self, user_id: &str) -> Result<Vec<Room>, Error>;

    /// Sets the participant online flag and refreshes `last_seen`.
    /// Missing room or participant is a no-op.
    async fn update_participant_status(
        &self,
        room_key: &str,
        user_id: &str,
        is_online: bool,
    ) -> Result<(), Error>;

    /// Marks the participant offline in every room.
    ///
    /// # Returns
    /// Number of participant entries that changed
    async fn set_offline_everywhere(&self, user_id: &str) -> Result<u64, Error>;

    /// Stores the last-message summary and increments the unread counter of every
    /// participant except the sender
    async fn append_last_message(&self, room_key: &str, last: &LastMessage) -> Result<(), Error>;

    /// Overwrites the unread counter of a participant
    async fn set_unread_count(&self, room_key: &str, user_id: &str, count: u32) -> Result<(), Error>;
}

/// Log dei messaggi, append-only
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Creates a message; id and initial status (`sent`) are assigned by the store
    async fn create(&self, data: &CreateMessageDTO) -> Result<Message, Error>;

    /// Reads a message with its read receipts
    async fn read(&self, message_id: i64) -> Result<Option<Message>, Error>;

    /// Messages of a room ordered from newest to oldest (DESC), skipping `offset`
    async fn find_many_paginated(
        &self,
        room_key: &str,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Message>, Error>;

    async fn count_by_room(&self, room_key: &str) -> Result<i64, Error>;

    /// Messages of the room sent by someone else and without a receipt from `user_id`
    async fn count_unread(&self, room_key: &str, user_id: &str) -> Result<i64, Error>;

    async fn find_latest_by_room(&self, room_key: &str) -> Result<Option<Message>, Error>;

    /// Adds a read receipt for `user_id` and advances the status to `read`.
    ///
    /// # Returns
    /// * `Ok(true)` - receipt added
    /// * `Ok(false)` - the user had already read the message
    async fn mark_read(
        &self,
        message_id: i64,
        user_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<bool, Error>;

    /// Moves the status forward; a lower status than the current one is ignored
    async fn advance_status(&self, message_id: i64, status: MessageStatus) -> Result<(), Error>;
}
