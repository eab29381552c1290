//! MessageRepository - Log dei messaggi su MySQL

use super::MessageStore;
use crate::dtos::{CreateMessageDTO, MessageDTO, MessagesPage};
use crate::entities::{Message, MessageStatus, ReadReceipt};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Error, MySql, MySqlPool, QueryBuilder};
use std::collections::HashMap;

/// Carica una pagina di messaggi di una stanza.
/// Lo store restituisce i messaggi dal più recente; la pagina viene girata in ordine cronologico.
///
/// # Arguments
/// * `page` - Pagina richiesta, la prima è 1 (i messaggi più recenti)
/// * `limit` - Dimensione della pagina
pub async fn load_page(
    store: &dyn MessageStore,
    room_key: &str,
    page: u32,
    limit: u32,
) -> Result<MessagesPage, Error> {
    let page = page.max(1);
    let limit = limit.max(1);
    let offset = u64::from(page - 1) * u64::from(limit);

    let mut messages = store.find_many_paginated(room_key, offset, limit).await?;
    messages.reverse();
    let total = store.count_by_room(room_key).await?;

    Ok(MessagesPage {
        messages: messages.into_iter().map(MessageDTO::from).collect(),
        total,
        page,
        limit,
        has_more: offset + u64::from(limit) < total.max(0) as u64,
    })
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    message_id: i64,
    room_key: String,
    sender_id: String,
    sender_name: String,
    content: String,
    message_type: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_message(self, read_by: Vec<ReadReceipt>) -> Result<Message, Error> {
        Ok(Message {
            message_id: self.message_id,
            room_key: self.room_key,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            content: self.content,
            message_type: self.message_type.parse().map_err(|e: String| Error::Decode(e.into()))?,
            status: self.status.parse().map_err(|e: String| Error::Decode(e.into()))?,
            read_by,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReceiptRow {
    message_id: i64,
    user_id: String,
    read_at: DateTime<Utc>,
}

const MESSAGE_COLUMNS: &str = "message_id, room_key, sender_id, sender_name, content, \
                               message_type, status, created_at";

// MESSAGE REPO
pub struct MessageRepository {
    connection_pool: MySqlPool,
}

impl MessageRepository {
    pub fn new(connection_pool: MySqlPool) -> Self {
        Self { connection_pool }
    }

    /// Associa a ogni riga le sue ricevute di lettura (una query per tutte le righe)
    async fn with_receipts(&self, rows: Vec<MessageRow>) -> Result<Vec<Message>, Error> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<MySql>::new(
            "SELECT message_id, user_id, read_at FROM message_reads WHERE message_id IN (",
        );
        let mut separated = qb.separated(", ");
        for row in &rows {
            separated.push_bind(row.message_id);
        }
        separated.push_unseparated(") ORDER BY read_at ASC");

        let receipts: Vec<ReceiptRow> = qb
            .build_query_as()
            .fetch_all(&self.connection_pool)
            .await?;

        let mut grouped: HashMap<i64, Vec<ReadReceipt>> = HashMap::new();
        for receipt in receipts {
            grouped.entry(receipt.message_id).or_default().push(ReadReceipt {
                user_id: receipt.user_id,
                read_at: receipt.read_at,
            });
        }

        rows.into_iter()
            .map(|row| {
                let read_by = grouped.remove(&row.message_id).unwrap_or_default();
                row.into_message(read_by)
            })
            .collect()
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn create(&self, data: &CreateMessageDTO) -> Result<Message, Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (room_key, sender_id, sender_name, content, message_type, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&data.room_key)
        .bind(&data.sender_id)
        .bind(&data.sender_name)
        .bind(&data.content)
        .bind(data.message_type.as_str())
        .bind(MessageStatus::Sent.as_str())
        .bind(data.created_at)
        .execute(&self.connection_pool)
        .await?;

        // Get the last inserted ID
        let new_id = result.last_insert_id() as i64;

        Ok(Message {
            message_id: new_id,
            room_key: data.room_key.clone(),
            sender_id: data.sender_id.clone(),
            sender_name: data.sender_name.clone(),
            content: data.content.clone(),
            message_type: data.message_type,
            status: MessageStatus::Sent,
            read_by: Vec::new(),
            created_at: data.created_at,
        })
    }

    async fn read(&self, message_id: i64) -> Result<Option<Message>, Error> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?"
        ))
        .bind(message_id)
        .fetch_optional(&self.connection_pool)
        .await?;

        match row {
            Some(row) => Ok(self.with_receipts(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_many_paginated(
        &self,
        room_key: &str,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Message>, Error> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE room_key = ? \
             ORDER BY created_at DESC, message_id DESC \
             LIMIT ? OFFSET ?"
        ))
        .bind(room_key)
        .bind(i64::from(limit))
        .bind(offset as i64)
        .fetch_all(&self.connection_pool)
        .await?;

        self.with_receipts(rows).await
    }

    async fn count_by_room(&self, room_key: &str) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE room_key = ?")
            .bind(room_key)
            .fetch_one(&self.connection_pool)
            .await
    }

    async fn count_unread(&self, room_key: &str, user_id: &str) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages m \
             WHERE m.room_key = ? AND m.sender_id <> ? \
               AND NOT EXISTS ( \
                   SELECT 1 FROM message_reads r \
                   WHERE r.message_id = m.message_id AND r.user_id = ?)",
        )
        .bind(room_key)
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&self.connection_pool)
        .await
    }

    async fn find_latest_by_room(&self, room_key: &str) -> Result<Option<Message>, Error> {
        Ok(self.find_many_paginated(room_key, 0, 1).await?.pop())
    }

    async fn mark_read(
        &self,
        message_id: i64,
        user_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        // la chiave primaria (message_id, user_id) impedisce ricevute duplicate
        let inserted = sqlx::query(
            "INSERT IGNORE INTO message_reads (message_id, user_id, read_at) VALUES (?, ?, ?)",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(read_at)
        .execute(&self.connection_pool)
        .await?
        .rows_affected()
            == 1;

        if inserted {
            self.advance_status(message_id, MessageStatus::Read).await?;
        }
        Ok(inserted)
    }

    async fn advance_status(&self, message_id: i64, status: MessageStatus) -> Result<(), Error> {
        sqlx::query(
            "UPDATE messages SET status = ? \
             WHERE message_id = ? \
               AND FIELD(status, 'sent', 'delivered', 'read') < FIELD(?, 'sent', 'delivered', 'read')",
        )
        .bind(status.as_str())
        .bind(message_id)
        .bind(status.as_str())
        .execute(&self.connection_pool)
        .await?;

        Ok(())
    }
}
