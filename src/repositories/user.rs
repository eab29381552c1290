//! UserRepository - Directory utenti su MySQL

use super::UserDirectory;
use crate::entities::{RoleSet, User};
use async_trait::async_trait;
use sqlx::{Error, MySqlPool};

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: String,
    username: String,
    first_name: String,
    last_name: String,
    avatar: Option<String>,
    is_admin: bool,
    is_owner: bool,
    is_delivery: bool,
    is_online: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            user_id: row.user_id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            avatar: row.avatar,
            roles: RoleSet::from_flags(row.is_admin, row.is_owner, row.is_delivery),
            is_online: row.is_online,
        }
    }
}

const USER_COLUMNS: &str = "user_id, username, first_name, last_name, avatar, \
                            is_admin, is_owner, is_delivery, is_online";

const SEARCH_FILTER: &str = "user_id <> ? AND (? IS NULL \
                             OR username LIKE ? OR first_name LIKE ? OR last_name LIKE ?)";

/// Pattern LIKE per una ricerca "contiene"; i caratteri jolly dell'utente vengono escapati
fn like_pattern(search: Option<&str>) -> Option<String> {
    search.map(|s| {
        let escaped = s
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        format!("%{escaped}%")
    })
}

// USER REPO
pub struct UserRepository {
    connection_pool: MySqlPool,
}

impl UserRepository {
    pub fn new(connection_pool: MySqlPool) -> UserRepository {
        Self { connection_pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = ?"
        ))
        .bind(user_id)
        .fetch_optional(&self.connection_pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn set_online(&self, user_id: &str, is_online: bool) -> Result<(), Error> {
        sqlx::query("UPDATE users SET is_online = ? WHERE user_id = ?")
            .bind(is_online)
            .bind(user_id)
            .execute(&self.connection_pool)
            .await?;

        Ok(())
    }

    async fn find_online_staff(&self) -> Result<Vec<User>, Error> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE is_online = TRUE AND (is_admin = TRUE OR is_owner = TRUE OR is_delivery = TRUE)"
        ))
        .fetch_all(&self.connection_pool)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn find_customer_ids(&self) -> Result<Vec<String>, Error> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT user_id FROM users \
             WHERE is_admin = FALSE AND is_owner = FALSE AND is_delivery = FALSE",
        )
        .fetch_all(&self.connection_pool)
        .await?;

        Ok(ids)
    }

    async fn find_contacts_paginated(
        &self,
        exclude_id: &str,
        search: Option<&str>,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<User>, Error> {
        let pattern = like_pattern(search);
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {SEARCH_FILTER} \
             ORDER BY username ASC, user_id ASC LIMIT ? OFFSET ?"
        ))
        .bind(exclude_id)
        .bind(pattern.as_deref())
        .bind(pattern.as_deref())
        .bind(pattern.as_deref())
        .bind(pattern.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.connection_pool)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn count_contacts(&self, exclude_id: &str, search: Option<&str>) -> Result<i64, Error> {
        let pattern = like_pattern(search);
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM users WHERE {SEARCH_FILTER}"))
            .bind(exclude_id)
            .bind(pattern.as_deref())
            .bind(pattern.as_deref())
            .bind(pattern.as_deref())
            .bind(pattern.as_deref())
            .fetch_one(&self.connection_pool)
            .await
    }
}
