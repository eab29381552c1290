//! User DTOs - Data Transfer Objects per utenti

use crate::entities::{RoleSet, User};
use serde::{Deserialize, Serialize};

/// Vista pubblica di un utente usata negli eventi di presenza
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummaryDTO {
    pub id: String,
    pub name: String,
    pub roles: RoleSet,
    pub is_online: bool,
    pub avatar: Option<String>,
}

impl UserSummaryDTO {
    pub fn from_user(user: &User, is_online: bool) -> Self {
        Self {
            id: user.user_id.clone(),
            name: user.display_name().to_string(),
            roles: user.roles,
            is_online,
            avatar: user.avatar.clone(),
        }
    }
}

/// Body e risposta di POST /chat/online
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatusDTO {
    pub is_online: bool,
}

/// Pagina della rubrica contatti (GET /chat)
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ContactsPage {
    pub users: Vec<UserSummaryDTO>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub pages: i64,
}
