use private_chat_service::{
    config::Config, db, error::AppError, logging, migrations, routes,
    services::burn_sweeper, services::encryption::MessageCodec, state::AppState,
    websocket::ConnectionRegistry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let config = Arc::new(Config::from_env()?);

    let db = db::init_pool(&config.database_url)
        .await
        .map_err(|e| AppError::StartServer(format!("db: {e}")))?;

    // Schema must be in sync before anything touches it.
    migrations::run_all(&db)
        .await
        .map_err(|e| AppError::StartServer(format!("database migrations failed: {e}")))?;

    let registry = ConnectionRegistry::new();
    let codec = Arc::new(MessageCodec::new(config.master_key));

    let state = AppState {
        db: db.clone(),
        registry: registry.clone(),
        codec,
        config: config.clone(),
    };

    // Time-triggered destruction runs for the whole process lifetime.
    let _sweeper = burn_sweeper::spawn(db, registry, config.burn_sweep_interval);

    let app = routes::build_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%bind_addr, "starting private-chat-service");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;

    Ok(())
}
