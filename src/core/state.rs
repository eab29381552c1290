//! Application State - Stato condiviso dell'applicazione
//!
//! Contiene gli store di persistenza, la configurazione e i registri in memoria
//! delle connessioni. Nessun singleton globale: ogni test può creare il proprio stato.

use crate::dtos::query::DEFAULT_PAGE_SIZE;
use crate::repositories::{
    MemoryStore, MessageRepository, MessageStore, RoomRepository, RoomStore, UserDirectory,
    UserRepository,
};
use crate::ws::roommap::RoomMap;
use crate::ws::usermap::UserMap;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;

/// Inattività massima di una connessione WebSocket se non configurata
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Stato globale dell'applicazione condiviso tra route, middleware e connessioni
pub struct AppState {
    /// Directory utenti (ruoli, nome, flag online)
    pub users: Arc<dyn UserDirectory>,

    /// Registro persistito delle stanze
    pub rooms: Arc<dyn RoomStore>,

    /// Log persistito dei messaggi
    pub msg: Arc<dyn MessageStore>,

    /// Secret key per JWT token
    pub jwt_secret: String,

    /// Numero di messaggi inviati con `room_joined`
    pub page_size: u32,

    /// Chiusura delle connessioni inattive
    pub idle_timeout: Duration,

    /// Registro delle connessioni vive
    /// Key: user_id, Value: Sender verso il task di scrittura del WebSocket
    pub users_online: UserMap,

    /// Membri "live" di ogni stanza (chi ha fatto join in questo processo)
    pub rooms_online: RoomMap,
}

impl AppState {
    /// Crea una nuova istanza di AppState con i repository MySQL
    ///
    /// # Arguments
    /// * `pool` - Pool di connessioni MySQL condiviso
    /// * `jwt_secret` - Chiave segreta per la verifica dei token JWT
    pub fn new(pool: MySqlPool, jwt_secret: String) -> Self {
        Self::from_stores(
            Arc::new(UserRepository::new(pool.clone())),
            Arc::new(RoomRepository::new(pool.clone())),
            Arc::new(MessageRepository::new(pool)),
            jwt_secret,
        )
    }

    /// Crea uno stato che usa un unico store in memoria per utenti, stanze e messaggi
    pub fn in_memory(store: Arc<MemoryStore>, jwt_secret: String) -> Self {
        Self::from_stores(store.clone(), store.clone(), store, jwt_secret)
    }

    pub fn from_stores(
        users: Arc<dyn UserDirectory>,
        rooms: Arc<dyn RoomStore>,
        msg: Arc<dyn MessageStore>,
        jwt_secret: String,
    ) -> Self {
        Self {
            users,
            rooms,
            msg,
            jwt_secret,
            page_size: DEFAULT_PAGE_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            users_online: UserMap::new(),
            rooms_online: RoomMap::new(),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}
