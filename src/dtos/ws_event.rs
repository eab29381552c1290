//! WebSocket Event DTOs - Protocollo JSON del canale real-time
//!
//! Ogni frame è un oggetto con discriminatore `type`:
//! { "type": "send_message", "roomId": "...", "content": "..." }
//! I nomi dei campi sono camelCase, i tipi snake_case.

use crate::dtos::{ContactDTO, MessageDTO, ParticipantDTO, RoomDTO, UserSummaryDTO};
use crate::entities::{MessageStatus, MessageType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tipi di comando riconosciuti dal dispatcher; tutto il resto viene scartato
pub const KNOWN_COMMAND_TYPES: [&str; 7] = [
    "join_room",
    "leave_room",
    "send_message",
    "mark_read",
    "typing",
    "request_online_users",
    "request_available_rooms",
];

/// Comandi in ingresso dal client
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    JoinRoom {
        #[serde(default)]
        room_id: Option<String>,
        #[serde(default)]
        contact_id: Option<String>,
        #[serde(default)]
        contact_name: Option<String>,
    },
    LeaveRoom {
        room_id: String,
    },
    SendMessage {
        room_id: String,
        content: String,
        #[serde(default)]
        message_type: MessageType,
    },
    MarkRead {
        room_id: String,
        #[serde(default)]
        message_ids: Vec<i64>,
    },
    Typing {
        room_id: String,
        is_typing: bool,
    },
    RequestOnlineUsers,
    RequestAvailableRooms,
}

/// Eventi in uscita verso il client
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Connection {
        status: String,
        user_id: String,
    },
    RoomJoined {
        room_id: String,
        messages: Vec<MessageDTO>,
        participants: Vec<ParticipantDTO>,
    },
    UserJoined {
        room_id: String,
        user_id: String,
        username: String,
    },
    RoomAvailable {
        room_id: String,
        initiator: ContactDTO,
        participant: ContactDTO,
        timestamp: DateTime<Utc>,
    },
    NewMessage {
        message: MessageDTO,
    },
    MessageSent {
        message_id: i64,
        status: MessageStatus,
    },
    MessagesRead {
        room_id: String,
        user_id: String,
        message_ids: Vec<i64>,
    },
    Typing {
        room_id: String,
        user_id: String,
        is_typing: bool,
    },
    OnlineUsersList {
        users: Vec<UserSummaryDTO>,
    },
    AvailableRoomsList {
        rooms: Vec<RoomDTO>,
    },
    UserOnline {
        user: UserSummaryDTO,
    },
    UserOffline {
        user: UserSummaryDTO,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Nome del tipo sul protocollo, utile per i log
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Connection { .. } => "connection",
            ServerEvent::RoomJoined { .. } => "room_joined",
            ServerEvent::UserJoined { .. } => "user_joined",
            ServerEvent::RoomAvailable { .. } => "room_available",
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::MessageSent { .. } => "message_sent",
            ServerEvent::MessagesRead { .. } => "messages_read",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::OnlineUsersList { .. } => "online_users_list",
            ServerEvent::AvailableRoomsList { .. } => "available_rooms_list",
            ServerEvent::UserOnline { .. } => "user_online",
            ServerEvent::UserOffline { .. } => "user_offline",
            ServerEvent::Error { .. } => "error",
        }
    }
}
