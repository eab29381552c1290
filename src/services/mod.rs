//! Services module - Coordinatore per tutti i service handler HTTP
//!
//! Ogni sotto-modulo gestisce gli endpoint HTTP di una funzionalità.

pub mod chat;
pub mod user;

// Re-exports per facilitare l'import
pub use chat::{create_room, get_room_messages, list_rooms, send_room_message};
pub use user::{list_contacts, update_online_status};

use crate::core::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

/// Root endpoint - health check
pub async fn root(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, "Server is running!")
}
