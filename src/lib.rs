//! Market chat server library - espone i moduli principali per il binario e per i test

pub mod core;
pub mod dtos;
pub mod entities;
pub mod repositories;
pub mod services;
pub mod ws;

// Re-export dei tipi principali per facilitare l'import
pub use crate::core::{AppError, AppState, auth, config};
pub use services::root;

use axum::{
    Router, middleware,
    routing::{any, get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Crea il router principale dell'applicazione
pub fn create_router(state: Arc<AppState>) -> Router {
    use ws::ws_handler;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .nest("/chat", configure_chat_routes(state.clone()))
        // il WebSocket gestisce da sé l'autenticazione per poter chiudere con codici applicativi
        .route("/ws", any(ws_handler))
        .layer(cors)
        .with_state(state)
}

/// Configura le routes REST della chat (tutte autenticate)
fn configure_chat_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    use crate::core::authentication_middleware;
    use services::*;

    Router::new()
        .route("/", get(list_contacts))
        .route("/rooms", get(list_rooms).post(create_room))
        .route(
            "/rooms/{room_id}/messages",
            get(get_room_messages).post(send_room_message),
        )
        .route("/online", post(update_online_status))
        .layer(middleware::from_fn_with_state(
            state,
            authentication_middleware,
        ))
}
