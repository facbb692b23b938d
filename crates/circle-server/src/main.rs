use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use circle_api::media::MediaStore;
use circle_api::state::{AppState, AppStateInner};
use circle_gateway::Dispatcher;
use circle_server::config::Config;
use circle_server::routes::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circle=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = circle_db::Database::open(&config.db_path)?;
    let media = MediaStore::new(
        config.media_dir.clone(),
        &config.public_url,
        config.jwt_secret.as_bytes(),
        config.media_url_ttl_secs,
    )?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: Dispatcher::new(),
        media,
    });

    let app = build_router(state, config.cors_origin.as_deref())?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Circle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
