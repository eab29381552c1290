//! Repositories module - Coordinatore per tutti gli store del progetto
//!
//! Ogni repository gestisce la persistenza di una specifica entità.
//! Le query MySQL sono scritte con `sqlx::query_as` + `FromRow` (verificate a runtime),
//! così il crate compila anche senza un database raggiungibile.

pub mod memory;
pub mod message;
pub mod room;
pub mod traits;
pub mod user;

// Re-esportazione dei trait per facilitare l'import
pub use traits::{MessageStore, NewParticipant, RoomStore, UserDirectory};

// Re-esportazione delle struct dei repository per facilitare l'import
pub use memory::MemoryStore;
pub use message::{MessageRepository, load_page};
pub use room::RoomRepository;
pub use user::UserRepository;
