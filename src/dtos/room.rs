//! Room DTOs - Data Transfer Objects per stanze

use crate::entities::{LastMessage, Participant, RoleSet, Room, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDTO {
    pub user_id: String,
    pub username: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub unread_count: u32,
}

impl From<Participant> for ParticipantDTO {
    fn from(value: Participant) -> Self {
        Self {
            user_id: value.user_id,
            username: value.username,
            is_online: value.is_online,
            last_seen: value.last_seen,
            unread_count: value.unread_count,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageDTO {
    pub content: String,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
}

impl From<LastMessage> for LastMessageDTO {
    fn from(value: LastMessage) -> Self {
        Self {
            content: value.content,
            sender_id: value.sender_id,
            timestamp: value.timestamp,
        }
    }
}

/// Stanza vista da uno specifico utente (unread_count è il suo contatore)
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RoomDTO {
    pub room_id: String,
    pub participants: Vec<ParticipantDTO>,
    pub last_message: Option<LastMessageDTO>,
    pub unread_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoomDTO {
    pub fn for_user(room: Room, user_id: &str) -> Self {
        let unread_count = room.unread_for(user_id);
        Self {
            room_id: room.room_key,
            participants: room.participants.into_iter().map(ParticipantDTO::from).collect(),
            last_message: room.last_message.map(LastMessageDTO::from),
            unread_count,
            is_active: room.is_active,
            created_at: room.created_at,
            updated_at: room.updated_at,
        }
    }
}

/// Parte coinvolta in una stanza, usata da `room_available`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContactDTO {
    pub id: String,
    pub name: String,
    pub roles: RoleSet,
}

impl From<&User> for ContactDTO {
    fn from(user: &User) -> Self {
        Self {
            id: user.user_id.clone(),
            name: user.display_name().to_string(),
            roles: user.roles,
        }
    }
}

/// Body di POST /chat/rooms
#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomDTO {
    #[validate(length(min = 1, max = 64, message = "Contact id is required"))]
    pub contact_id: String,
    pub contact_name: Option<String>,
}
