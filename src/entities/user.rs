//! User entity - Record della directory utenti visto dal server di chat

use super::role::RoleSet;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub roles: RoleSet,
    pub is_online: bool,
}

impl User {
    /// Nome mostrato agli altri utenti: username, poi first_name, poi "User"
    pub fn display_name(&self) -> &str {
        if !self.username.trim().is_empty() {
            &self.username
        } else if !self.first_name.trim().is_empty() {
            &self.first_name
        } else {
            "User"
        }
    }

    pub fn is_staff(&self) -> bool {
        self.roles.has_staff_role()
    }
}
