//! Chat services - Stanze e messaggi via REST

use crate::core::{AppError, AppState};
use crate::dtos::{
    CreateRoomDTO, MessageDTO, MessagesPage, MessagesQuery, RoomDTO, SendMessageDTO,
};
use crate::entities::{Room, User, is_valid_user_id, split_room_key};
use crate::repositories::{NewParticipant, load_page};
use crate::ws::event_handlers::post_message;
use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// Nome da salvare per un partecipante: quello fornito, altrimenti quello in directory
async fn participant_name(
    state: &AppState,
    user_id: &str,
    provided: Option<String>,
) -> Result<String, AppError> {
    if let Some(name) = provided.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        return Ok(name);
    }
    Ok(state
        .users
        .find_by_id(user_id)
        .await?
        .map(|u| u.display_name().to_string())
        .unwrap_or_else(|| "User".to_string()))
}

async fn open_room(
    state: &AppState,
    current_user: &User,
    contact_id: &str,
    contact_name: Option<String>,
) -> Result<Room, AppError> {
    let contact_name = participant_name(state, contact_id, contact_name).await?;
    let room = state
        .rooms
        .find_or_create(
            &NewParticipant {
                user_id: current_user.user_id.clone(),
                username: current_user.display_name().to_string(),
            },
            &NewParticipant {
                user_id: contact_id.to_string(),
                username: contact_name,
            },
        )
        .await?;
    // la chiave coincide con quella di un'altra coppia
    if !room.is_participant(&current_user.user_id) || !room.is_participant(contact_id) {
        warn!(room_key = %room.room_key, "Room key belongs to other participants");
        return Err(AppError::forbidden("You are not a participant of this room"));
    }
    Ok(room)
}

#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id))]
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
) -> Result<Json<Vec<RoomDTO>>, AppError> {
    debug!("Listing rooms for user");
    let rooms: Vec<RoomDTO> = state
        .rooms
        .find_many_by_participant(&current_user.user_id)
        .await?
        .into_iter()
        .filter(|room| room.is_active)
        .map(|room| RoomDTO::for_user(room, &current_user.user_id))
        .collect();

    info!("Successfully retrieved {} rooms", rooms.len());
    Ok(Json(rooms))
}

#[instrument(skip(state, current_user, body), fields(user_id = %current_user.user_id))]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Json(body): Json<CreateRoomDTO>,
) -> Result<(StatusCode, Json<RoomDTO>), AppError> {
    body.validate()?;
    let contact_id = body.contact_id.trim();
    if contact_id == current_user.user_id {
        warn!("Room creation attempted with self");
        return Err(AppError::bad_request("Cannot open a room with yourself"));
    }
    if !is_valid_user_id(contact_id) {
        warn!("Contact id cannot form a room key");
        return Err(AppError::bad_request("Invalid contact id"));
    }

    let room = open_room(&state, &current_user, contact_id, body.contact_name).await?;
    info!(room_key = %room.room_key, "Room ready");
    Ok((StatusCode::OK, Json(RoomDTO::for_user(room, &current_user.user_id))))
}

/// Accesso alla cronologia: partecipante, oppure chiave composta da due id di cui uno è il chiamante
/// (la stanza viene creata in quel caso)
async fn accessible_room(
    state: &AppState,
    current_user: &User,
    room_id: &str,
) -> Result<Room, AppError> {
    if let Some(room) = state.rooms.find_by_key(room_id).await? {
        if room.is_participant(&current_user.user_id) {
            return Ok(room);
        }
        warn!("User is not a participant of the room");
        return Err(AppError::forbidden("You are not a participant of this room"));
    }

    let (a, b) = split_room_key(room_id).ok_or_else(|| {
        warn!("Malformed room id");
        AppError::bad_request("Invalid room id")
    })?;
    let contact_id = if a == current_user.user_id {
        b
    } else if b == current_user.user_id {
        a
    } else {
        warn!("Room id does not include the current user");
        return Err(AppError::forbidden("You are not a participant of this room"));
    };
    if contact_id == current_user.user_id {
        return Err(AppError::bad_request("Invalid room id"));
    }

    open_room(state, current_user, contact_id, None).await
}

#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id))]
pub async fn get_room_messages(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Path(room_id): Path<String>,
    Query(params): Query<MessagesQuery>,
) -> Result<Json<MessagesPage>, AppError> {
    params.validate()?;
    let room = accessible_room(&state, &current_user, &room_id).await?;

    let page = load_page(state.msg.as_ref(), &room.room_key, params.page, params.limit).await?;
    debug!(count = page.messages.len(), total = page.total, "Messages page loaded");
    Ok(Json(page))
}

#[instrument(skip(state, current_user, body), fields(user_id = %current_user.user_id))]
pub async fn send_room_message(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Path(room_id): Path<String>,
    Json(body): Json<SendMessageDTO>,
) -> Result<(StatusCode, Json<MessageDTO>), AppError> {
    let body = SendMessageDTO {
        content: body.content.trim().to_string(),
        message_type: body.message_type,
    };
    body.validate()?;

    let room = state
        .rooms
        .find_by_key(&room_id)
        .await?
        .filter(|room| room.is_participant(&current_user.user_id))
        .ok_or_else(|| {
            warn!("Message posted to a room the user does not belong to");
            AppError::forbidden("You are not a participant of this room")
        })?;

    let (message, delivered) = post_message(
        &state,
        &room,
        &current_user.user_id,
        &body.content,
        body.message_type,
    )
    .await?;

    info!(message_id = message.id, delivered, "Message created via REST");
    Ok((StatusCode::CREATED, Json(message)))
}
