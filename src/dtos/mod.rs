//! DTOs module - Data Transfer Objects
//!
//! Questo modulo contiene tutti i DTOs usati per la comunicazione client-server.
//! I DTOs separano la rappresentazione esterna (JSON camelCase) dalle entities.

pub mod message;
pub mod query;
pub mod room;
pub mod user;
pub mod ws_event;

// Re-exports per facilitare l'import
pub use message::{CreateMessageDTO, MessageDTO, MessagesPage, ReadReceiptDTO, SendMessageDTO};
pub use query::{ContactsQuery, MessagesQuery};
pub use room::{ContactDTO, CreateRoomDTO, LastMessageDTO, ParticipantDTO, RoomDTO};
pub use user::{ContactsPage, OnlineStatusDTO, UserSummaryDTO};
pub use ws_event::{ClientCommand, KNOWN_COMMAND_TYPES, ServerEvent};
