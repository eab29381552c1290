//! Message DTOs - Data Transfer Objects per messaggi

use crate::entities::{Message, MessageStatus, MessageType, ReadReceipt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptDTO {
    pub user_id: String,
    pub read_at: DateTime<Utc>,
}

impl From<ReadReceipt> for ReadReceiptDTO {
    fn from(value: ReadReceipt) -> Self {
        Self {
            user_id: value.user_id,
            read_at: value.read_at,
        }
    }
}

/// Rappresentazione di un messaggio inviata ai client
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MessageDTO {
    pub id: i64,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read_by: Vec<ReadReceiptDTO>,
}

impl From<Message> for MessageDTO {
    fn from(value: Message) -> Self {
        Self {
            id: value.message_id,
            room_id: value.room_key,
            sender_id: value.sender_id,
            sender_name: value.sender_name,
            content: value.content,
            message_type: value.message_type,
            status: value.status,
            timestamp: value.created_at,
            read_by: value.read_by.into_iter().map(ReadReceiptDTO::from).collect(),
        }
    }
}

/// DTO per creare un nuovo messaggio (senza message_id, assegnato dallo store)
#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
pub struct CreateMessageDTO {
    #[validate(length(min = 1, message = "Room key is required"))]
    pub room_key: String,
    pub sender_id: String,
    pub sender_name: String,

    #[validate(length(min = 1, max = 5000, message = "Message content must be between 1 and 5000 characters"))]
    pub content: String,

    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

/// Body della POST REST per inviare un messaggio
#[derive(Deserialize, Debug, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageDTO {
    #[validate(length(min = 1, max = 5000, message = "Message content must be between 1 and 5000 characters"))]
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
}

/// Pagina di messaggi, sempre in ordine cronologico
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MessagesPage {
    pub messages: Vec<MessageDTO>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}
