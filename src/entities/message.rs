//! Message entity - Entità messaggio

use super::enums::{MessageStatus, MessageType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReadReceipt {
    pub user_id: String,
    pub read_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Message {
    pub message_id: i64,
    pub room_key: String,
    pub sender_id: String,
    // denormalizzato al momento della scrittura
    pub sender_name: String,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub read_by: Vec<ReadReceipt>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }
}
