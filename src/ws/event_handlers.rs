//! WebSocket Event Handlers - Dispatcher dei comandi del client
//!
//! Ogni frame di testo viene interpretato come `{type, ...}` e smistato all'handler
//! corrispondente. Gli errori non chiudono la connessione: diventano un evento `error`
//! inviato solo a chi ha iniziato l'operazione.

use crate::core::{AppState, ChatError};
use crate::dtos::{
    ClientCommand, ContactDTO, CreateMessageDTO, KNOWN_COMMAND_TYPES, LastMessageDTO, MessageDTO,
    ParticipantDTO, RoomDTO, ServerEvent, UserSummaryDTO,
};
use crate::entities::{
    LastMessage, MessageStatus, MessageType, Room, User, is_valid_user_id, room_key,
};
use crate::repositories::{NewParticipant, load_page};
use crate::ws::broadcast::{broadcast_to_all, broadcast_to_room, deliver_to};
use crate::ws::usermap::Session;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, error, info, instrument, warn};
use validator::Validate;

const INVALID_FORMAT: &str = "Invalid message format";

/// Punto di ingresso per un frame di testo
#[instrument(skip(state, session, text), fields(user_id = %session.user_id))]
pub async fn process_text(state: &AppState, session: &Session, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Frame is not valid JSON: {}", e);
            session.reply(ServerEvent::error(INVALID_FORMAT));
            return;
        }
    };

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        warn!("Frame without a string type");
        session.reply(ServerEvent::error(INVALID_FORMAT));
        return;
    };

    if !KNOWN_COMMAND_TYPES.contains(&kind) {
        warn!(kind, "Unknown command type, dropped");
        return;
    }

    match serde_json::from_value::<ClientCommand>(value) {
        Ok(command) => process_command(state, session, command).await,
        Err(e) => {
            warn!("Malformed command fields: {}", e);
            session.reply(ServerEvent::error(INVALID_FORMAT));
        }
    }
}

/// Esegue un comando già interpretato
pub async fn process_command(state: &AppState, session: &Session, command: ClientCommand) {
    let (result, failure) = match command {
        ClientCommand::JoinRoom {
            room_id,
            contact_id,
            contact_name,
        } => (
            handle_join_room(state, session, room_id, contact_id, contact_name).await,
            "Failed to join room",
        ),
        ClientCommand::LeaveRoom { room_id } => (
            handle_leave_room(state, session, &room_id).await,
            "Failed to leave room",
        ),
        ClientCommand::SendMessage {
            room_id,
            content,
            message_type,
        } => (
            handle_send_message(state, session, &room_id, &content, message_type).await,
            "Failed to send message",
        ),
        ClientCommand::MarkRead {
            room_id,
            message_ids,
        } => (
            handle_mark_read(state, session, &room_id, message_ids).await,
            "Failed to mark messages as read",
        ),
        ClientCommand::Typing { room_id, is_typing } => {
            handle_typing(state, session, &room_id, is_typing);
            (Ok(()), "Failed to send typing status")
        }
        ClientCommand::RequestOnlineUsers => (
            handle_request_online_users(state, session).await,
            "Failed to fetch online users",
        ),
        ClientCommand::RequestAvailableRooms => (
            handle_request_available_rooms(state, session).await,
            "Failed to fetch available rooms",
        ),
    };

    if let Err(e) = result {
        match &e {
            ChatError::Persistence(_) => error!(user_id = %session.user_id, "{}: {}", failure, e),
            _ => warn!(user_id = %session.user_id, "{}: {}", failure, e),
        }
        session.reply(ServerEvent::error(e.client_message(failure)));
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Stanza esistente di cui l'utente è partecipante
async fn participant_room(state: &AppState, key: &str, user_id: &str) -> Result<Room, ChatError> {
    state
        .rooms
        .find_by_key(key)
        .await?
        .filter(|room| room.is_participant(user_id))
        .ok_or(ChatError::NotFound("Room not found"))
}

#[instrument(skip(state, session), fields(user_id = %session.user_id))]
async fn handle_join_room(
    state: &AppState,
    session: &Session,
    room_id: Option<String>,
    contact_id: Option<String>,
    contact_name: Option<String>,
) -> Result<(), ChatError> {
    let user_id = session.user_id.as_str();
    let me = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(ChatError::NotFound("User not found"))?;

    let mut room = match non_empty(contact_id) {
        Some(contact_id) => {
            if contact_id == user_id {
                return Err(ChatError::Protocol("cannot open a room with yourself".into()));
            }
            if !is_valid_user_id(&contact_id) {
                warn!(contact = %contact_id, "Contact id cannot form a room key");
                return Err(ChatError::NotFound("Room not found"));
            }
            let key = room_key(user_id, &contact_id);
            if let Some(requested) = non_empty(room_id).filter(|r| *r != key) {
                warn!(requested = %requested, derived = %key, "Room id does not match participants, using derived key");
            }

            let contact_display = match non_empty(contact_name) {
                Some(name) => name,
                None => state
                    .users
                    .find_by_id(&contact_id)
                    .await?
                    .map(|c| c.display_name().to_string())
                    .unwrap_or_else(|| "User".to_string()),
            };

            let me_participant = NewParticipant {
                user_id: user_id.to_string(),
                username: me.display_name().to_string(),
            };
            let contact_participant = NewParticipant {
                user_id: contact_id,
                username: contact_display,
            };
            let room = state
                .rooms
                .find_or_create(&me_participant, &contact_participant)
                .await?;
            // una chiave già usata da un'altra coppia non apre la stanza
            if !room.is_participant(user_id) || !room.is_participant(&contact_participant.user_id) {
                warn!(room_key = %room.room_key, "Room key belongs to other participants");
                return Err(ChatError::NotFound("Room not found"));
            }
            room
        }
        None => {
            let key = non_empty(room_id)
                .ok_or_else(|| ChatError::Protocol("roomId or contactId is required".into()))?;
            participant_room(state, &key, user_id).await?
        }
    };

    state
        .rooms
        .update_participant_status(&room.room_key, user_id, true)
        .await?;
    let page = load_page(state.msg.as_ref(), &room.room_key, 1, state.page_size).await?;

    state.rooms_online.join(&room.room_key, user_id);
    for p in room.participants.iter_mut().filter(|p| p.user_id == user_id) {
        p.is_online = true;
        p.last_seen = Utc::now();
    }
    info!(room_key = %room.room_key, history = page.messages.len(), "User joined room");

    session.reply(ServerEvent::RoomJoined {
        room_id: room.room_key.clone(),
        messages: page.messages,
        participants: room.participants.iter().cloned().map(ParticipantDTO::from).collect(),
    });

    broadcast_to_room(
        state,
        &room.room_key,
        ServerEvent::UserJoined {
            room_id: room.room_key.clone(),
            user_id: user_id.to_string(),
            username: me.display_name().to_string(),
        },
        Some(user_id),
    );

    announce_room_available(state, &room, &me).await?;
    Ok(())
}

/// `room_available` a tutti gli altri connessi; saltato se l'altra parte non è in directory
async fn announce_room_available(state: &AppState, room: &Room, me: &User) -> Result<(), ChatError> {
    let Some(other_id) = room.participant_ids().find(|id| *id != me.user_id) else {
        return Ok(());
    };
    let Some(other) = state.users.find_by_id(other_id).await? else {
        warn!(contact = other_id, "Contact not in directory, room_available skipped");
        return Ok(());
    };

    let sent = broadcast_to_all(
        state,
        ServerEvent::RoomAvailable {
            room_id: room.room_key.clone(),
            initiator: ContactDTO::from(me),
            participant: ContactDTO::from(&other),
            timestamp: Utc::now(),
        },
        Some(&me.user_id),
    );
    debug!(sent, "room_available announced");
    Ok(())
}

#[instrument(skip(state, session), fields(user_id = %session.user_id))]
async fn handle_leave_room(state: &AppState, session: &Session, room_id: &str) -> Result<(), ChatError> {
    if !state.rooms_online.leave(room_id, &session.user_id) {
        debug!("User was not in room, nothing to do");
        return Ok(());
    }
    state
        .rooms
        .update_participant_status(room_id, &session.user_id, false)
        .await?;
    info!("User left room");
    Ok(())
}

#[instrument(skip(state, session, content), fields(user_id = %session.user_id))]
async fn handle_send_message(
    state: &AppState,
    session: &Session,
    room_id: &str,
    content: &str,
    message_type: MessageType,
) -> Result<(), ChatError> {
    let room = participant_room(state, room_id, &session.user_id).await?;
    let (message, _) = post_message(state, &room, &session.user_id, content, message_type).await?;

    session.reply(ServerEvent::MessageSent {
        message_id: message.id,
        status: MessageStatus::Sent,
    });
    Ok(())
}

/// Persiste un messaggio, aggiorna il riepilogo della stanza e lo consegna ai destinatari connessi.
/// Destinatari: partecipanti persistiti più membri live, mittente escluso, ognuno una sola volta.
/// Se almeno una connessione ha accettato `new_message` lo stato avanza a "delivered".
/// Restituisce il messaggio come inviato (stato "sent") e il numero di consegne.
pub async fn post_message(
    state: &AppState,
    room: &Room,
    sender_id: &str,
    content: &str,
    message_type: MessageType,
) -> Result<(MessageDTO, usize), ChatError> {
    let sender_name = match state.users.find_by_id(sender_id).await? {
        Some(user) => user.display_name().to_string(),
        None => room
            .participant(sender_id)
            .map(|p| p.username.clone())
            .unwrap_or_else(|| "User".to_string()),
    };

    let data = CreateMessageDTO {
        room_key: room.room_key.clone(),
        sender_id: sender_id.to_string(),
        sender_name,
        content: content.trim().to_string(),
        message_type,
        created_at: Utc::now(),
    };
    data.validate()?;

    let message = state.msg.create(&data).await?;
    let last = LastMessage {
        content: message.content.clone(),
        sender_id: message.sender_id.clone(),
        timestamp: message.created_at,
    };
    // il messaggio è già durevole: un riepilogo non aggiornato non blocca la consegna
    if let Err(e) = state.rooms.append_last_message(&room.room_key, &last).await {
        warn!(message_id = message.message_id, "Failed to update room summary: {:?}", e);
    }

    let mut recipients: BTreeSet<String> = room.participant_ids().map(str::to_string).collect();
    recipients.extend(state.rooms_online.members(&room.room_key));
    recipients.remove(sender_id);

    let message = MessageDTO::from(message);
    let delivered = deliver_to(
        state,
        recipients.iter().map(String::as_str),
        ServerEvent::NewMessage {
            message: message.clone(),
        },
    );
    info!(message_id = message.id, delivered, "Message posted");

    if delivered > 0 {
        if let Err(e) = state.msg.advance_status(message.id, MessageStatus::Delivered).await {
            // il messaggio è già persistito: l'errore non viene propagato
            warn!(message_id = message.id, "Failed to mark message as delivered: {:?}", e);
        }
    }
    Ok((message, delivered))
}

#[instrument(skip(state, session, message_ids), fields(user_id = %session.user_id))]
async fn handle_mark_read(
    state: &AppState,
    session: &Session,
    room_id: &str,
    message_ids: Vec<i64>,
) -> Result<(), ChatError> {
    let user_id = session.user_id.as_str();
    let room = participant_room(state, room_id, user_id).await?;

    let read_at = Utc::now();
    let mut seen = BTreeSet::new();
    let mut marked = Vec::with_capacity(message_ids.len());
    for id in message_ids {
        if !seen.insert(id) {
            continue;
        }
        match state.msg.read(id).await? {
            Some(m) if m.room_key == room.room_key && m.sender_id != user_id => {
                state.msg.mark_read(id, user_id, read_at).await?;
                marked.push(id);
            }
            _ => debug!(message_id = id, "Message skipped"),
        }
    }

    state.rooms.set_unread_count(&room.room_key, user_id, 0).await?;

    broadcast_to_room(
        state,
        &room.room_key,
        ServerEvent::MessagesRead {
            room_id: room.room_key.clone(),
            user_id: user_id.to_string(),
            message_ids: marked,
        },
        Some(user_id),
    );
    Ok(())
}

fn handle_typing(state: &AppState, session: &Session, room_id: &str, is_typing: bool) {
    broadcast_to_room(
        state,
        room_id,
        ServerEvent::Typing {
            room_id: room_id.to_string(),
            user_id: session.user_id.clone(),
            is_typing,
        },
        Some(&session.user_id),
    );
}

async fn handle_request_online_users(state: &AppState, session: &Session) -> Result<(), ChatError> {
    let users = state
        .users
        .find_online_staff()
        .await?
        .iter()
        .map(|u| UserSummaryDTO::from_user(u, true))
        .collect();
    session.reply(ServerEvent::OnlineUsersList { users });
    Ok(())
}

async fn handle_request_available_rooms(state: &AppState, session: &Session) -> Result<(), ChatError> {
    let user_id = session.user_id.as_str();
    let rooms = state.rooms.find_many_by_participant(user_id).await?;

    let mut result = Vec::with_capacity(rooms.len());
    for room in rooms {
        let latest = state.msg.find_latest_by_room(&room.room_key).await?;
        // il contatore persistito è un riepilogo: qui si conta dalle ricevute
        let unread = state.msg.count_unread(&room.room_key, user_id).await?;
        let mut dto = RoomDTO::for_user(room, user_id);
        dto.unread_count = u32::try_from(unread).unwrap_or(u32::MAX);
        if let Some(latest) = latest {
            dto.last_message = Some(LastMessageDTO {
                content: latest.content,
                sender_id: latest.sender_id,
                timestamp: latest.created_at,
            });
        }
        result.push(dto);
    }
    session.reply(ServerEvent::AvailableRoomsList { rooms: result });
    Ok(())
}
