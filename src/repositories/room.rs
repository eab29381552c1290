//! RoomRepository - Registro delle stanze su MySQL
//!
//! Una stanza è composta da una riga in `rooms` e da una riga per partecipante
//! in `room_participants` (flag online, last_seen e contatore dei non letti).

use super::{NewParticipant, RoomStore};
use crate::entities::{LastMessage, Participant, Room, room_key};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Error, MySql, MySqlPool, QueryBuilder};
use std::collections::HashMap;

#[derive(sqlx::FromRow)]
struct RoomRow {
    room_key: String,
    last_message_content: Option<String>,
    last_message_sender: Option<String>,
    last_message_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    room_key: String,
    user_id: String,
    username: String,
    is_online: bool,
    last_seen: DateTime<Utc>,
    unread_count: u32,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Participant {
            user_id: row.user_id,
            username: row.username,
            is_online: row.is_online,
            last_seen: row.last_seen,
            unread_count: row.unread_count,
        }
    }
}

fn assemble(row: RoomRow, participants: Vec<Participant>) -> Room {
    let last_message = match (row.last_message_content, row.last_message_sender, row.last_message_at) {
        (Some(content), Some(sender_id), Some(timestamp)) => Some(LastMessage {
            content,
            sender_id,
            timestamp,
        }),
        _ => None,
    };

    Room {
        room_key: row.room_key,
        participants,
        last_message,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

const ROOM_COLUMNS: &str = "r.room_key, r.last_message_content, r.last_message_sender, \
                            r.last_message_at, r.is_active, r.created_at, r.updated_at";

// ROOM REPO
pub struct RoomRepository {
    connection_pool: MySqlPool,
}

impl RoomRepository {
    pub fn new(connection_pool: MySqlPool) -> Self {
        Self { connection_pool }
    }

    /// Carica i partecipanti di più stanze con una sola query, raggruppati per room key
    async fn participants_of(
        &self,
        room_keys: &[String],
    ) -> Result<HashMap<String, Vec<Participant>>, Error> {
        let mut grouped: HashMap<String, Vec<Participant>> = HashMap::new();
        if room_keys.is_empty() {
            return Ok(grouped);
        }

        let mut qb = QueryBuilder::<MySql>::new(
            "SELECT room_key, user_id, username, is_online, last_seen, unread_count \
             FROM room_participants WHERE room_key IN (",
        );
        let mut separated = qb.separated(", ");
        for key in room_keys {
            separated.push_bind(key);
        }
        separated.push_unseparated(") ORDER BY room_key, position ASC");

        let rows: Vec<ParticipantRow> = qb
            .build_query_as()
            .fetch_all(&self.connection_pool)
            .await?;

        for row in rows {
            grouped.entry(row.room_key.clone()).or_default().push(row.into());
        }
        Ok(grouped)
    }
}

#[async_trait]
impl RoomStore for RoomRepository {
    async fn find_by_key(&self, room_key: &str) -> Result<Option<Room>, Error> {
        let row = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.room_key = ?"
        ))
        .bind(room_key)
        .fetch_optional(&self.connection_pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut grouped = self.participants_of(&[row.room_key.clone()]).await?;
        let participants = grouped.remove(&row.room_key).unwrap_or_default();
        Ok(Some(assemble(row, participants)))
    }

    async fn find_or_create(
        &self,
        first: &NewParticipant,
        second: &NewParticipant,
    ) -> Result<Room, Error> {
        let key = room_key(&first.user_id, &second.user_id);
        let now = Utc::now();

        let mut tx = self.connection_pool.begin().await?;

        // INSERT IGNORE: con due richieste concorrenti una sola crea la stanza
        let created = sqlx::query(
            "INSERT IGNORE INTO rooms (room_key, is_active, created_at, updated_at) \
             VALUES (?, TRUE, ?, ?)",
        )
        .bind(&key)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if created {
            for (position, participant) in [first, second].into_iter().enumerate() {
                sqlx::query(
                    "INSERT IGNORE INTO room_participants \
                     (room_key, user_id, username, position, is_online, last_seen, unread_count) \
                     VALUES (?, ?, ?, ?, FALSE, ?, 0)",
                )
                .bind(&key)
                .bind(&participant.user_id)
                .bind(&participant.username)
                .bind(position as i32)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        self.find_by_key(&key).await?.ok_or(Error::RowNotFound)
    }

    async fn find_many_by_participant(&self, user_id: &str) -> Result<Vec<Room>, Error> {
        let rows = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms r \
             JOIN room_participants p ON p.room_key = r.room_key \
             WHERE p.user_id = ? \
             ORDER BY r.updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.connection_pool)
        .await?;

        let keys: Vec<String> = rows.iter().map(|r| r.room_key.clone()).collect();
        let mut grouped = self.participants_of(&keys).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let participants = grouped.remove(&row.room_key).unwrap_or_default();
                assemble(row, participants)
            })
            .collect())
    }

    async fn update_participant_status(
        &self,
        room_key: &str,
        user_id: &str,
        is_online: bool,
    ) -> Result<(), Error> {
        sqlx::query(
            "UPDATE room_participants SET is_online = ?, last_seen = ? \
             WHERE room_key = ? AND user_id = ?",
        )
        .bind(is_online)
        .bind(Utc::now())
        .bind(room_key)
        .bind(user_id)
        .execute(&self.connection_pool)
        .await?;

        Ok(())
    }

    async fn set_offline_everywhere(&self, user_id: &str) -> Result<u64, Error> {
        let result = sqlx::query(
            "UPDATE room_participants SET is_online = FALSE, last_seen = ? \
             WHERE user_id = ? AND is_online = TRUE",
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.connection_pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn append_last_message(&self, room_key: &str, last: &LastMessage) -> Result<(), Error> {
        let mut tx = self.connection_pool.begin().await?;

        sqlx::query(
            "UPDATE rooms SET last_message_content = ?, last_message_sender = ?, \
             last_message_at = ?, updated_at = ? WHERE room_key = ?",
        )
        .bind(&last.content)
        .bind(&last.sender_id)
        .bind(last.timestamp)
        .bind(Utc::now())
        .bind(room_key)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE room_participants SET unread_count = unread_count + 1 \
             WHERE room_key = ? AND user_id <> ?",
        )
        .bind(room_key)
        .bind(&last.sender_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn set_unread_count(&self, room_key: &str, user_id: &str, count: u32) -> Result<(), Error> {
        sqlx::query(
            "UPDATE room_participants SET unread_count = ? WHERE room_key = ? AND user_id = ?",
        )
        .bind(count)
        .bind(room_key)
        .bind(user_id)
        .execute(&self.connection_pool)
        .await?;

        Ok(())
    }
}
