use market_chat_server::{
    AppState, config::Config, create_router, repositories::MemoryStore,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Inizializza la configurazione
    let config = Config::from_env()?;
    config.print_info();

    let state = match &config.database_url {
        Some(url) => {
            let pool = MySqlPoolOptions::new()
                .max_connections(config.max_connections)
                .max_lifetime(Duration::from_secs(config.connection_lifetime_secs))
                .connect(url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database connected, migrations applied");
            AppState::new(pool, config.jwt_secret.clone())
        }
        None => {
            warn!("DATABASE_URL not set, starting with in-memory storage");
            AppState::in_memory(Arc::new(MemoryStore::new()), config.jwt_secret.clone())
        }
    };
    let state = Arc::new(
        state
            .with_page_size(config.message_page_size)
            .with_idle_timeout(Duration::from_secs(config.ws_idle_timeout_secs)),
    );

    // Crea il router
    let app = create_router(state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    // Avvia il server
    axum::serve(listener, app).await?;

    Ok(())
}
