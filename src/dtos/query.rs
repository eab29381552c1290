//! Query DTOs - Data Transfer Objects per query di paginazione

use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: u32 = 50;

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// DTO per query parameters di paginazione messaggi (`?page=1&limit=50`)
#[derive(Serialize, Deserialize, Debug, Validate)]
pub struct MessagesQuery {
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "Page starts at 1"))]
    pub page: u32,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 200, message = "Limit must be between 1 and 200"))]
    pub limit: u32,
}

pub const DEFAULT_CONTACTS_LIMIT: u32 = 10;

fn default_contacts_limit() -> u32 {
    DEFAULT_CONTACTS_LIMIT
}

/// Query della rubrica contatti (`?page=1&limit=10&search=...`)
#[derive(Serialize, Deserialize, Debug, Validate)]
pub struct ContactsQuery {
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "Page starts at 1"))]
    pub page: u32,

    #[serde(default = "default_contacts_limit")]
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: u32,

    #[serde(default)]
    pub search: Option<String>,
}
