//! Entities module - Entità del dominio applicativo
//!
//! Questo modulo contiene tutte le entità (models) che rappresentano i dati persistiti.
//! Stanze e messaggi sono correlati tramite la room key.

pub mod enums;
pub mod message;
pub mod role;
pub mod room;
pub mod user;

// Re-exports per facilitare l'import
pub use enums::{MessageStatus, MessageType};
pub use message::{Message, ReadReceipt};
pub use role::RoleSet;
pub use room::{LastMessage, Participant, Room, is_valid_user_id, room_key, split_room_key};
pub use user::User;
