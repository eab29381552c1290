//! User services - Rubrica contatti e stato online dell'utente via REST

use crate::core::{AppError, AppState};
use crate::dtos::{ContactsPage, ContactsQuery, OnlineStatusDTO, UserSummaryDTO};
use crate::entities::User;
use axum::{
    Extension,
    extract::{Json, Query, State},
};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use validator::Validate;

/// Rubrica: tutti gli utenti tranne il chiamante, paginati e filtrabili per nome.
/// Serve al client per scegliere il `contactId` di `join_room`.
#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id))]
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Query(params): Query<ContactsQuery>,
) -> Result<Json<ContactsPage>, AppError> {
    params.validate()?;
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let offset = u64::from(params.page - 1) * u64::from(params.limit);

    let users = state
        .users
        .find_contacts_paginated(&current_user.user_id, search, offset, params.limit)
        .await?;
    let total = state.users.count_contacts(&current_user.user_id, search).await?;
    debug!(count = users.len(), total, "Contacts page loaded");

    let limit = i64::from(params.limit);
    Ok(Json(ContactsPage {
        users: users
            .iter()
            .map(|u| UserSummaryDTO::from_user(u, u.is_online))
            .collect(),
        total,
        page: params.page,
        limit: params.limit,
        pages: (total + limit - 1) / limit,
    }))
}

/// Aggiorna il flag online in directory (client che non usano il WebSocket)
#[instrument(skip(state, current_user, body), fields(user_id = %current_user.user_id, is_online = body.is_online))]
pub async fn update_online_status(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Json(body): Json<OnlineStatusDTO>,
) -> Result<Json<OnlineStatusDTO>, AppError> {
    state
        .users
        .set_online(&current_user.user_id, body.is_online)
        .await?;
    info!("Online status updated");
    Ok(Json(body))
}
