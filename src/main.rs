use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use studio_api::config::AppConfig;
use studio_api::{app_router, db, events, logging, AppServices, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    logging::init(&config);

    let connection = db::establish_connection(&config.database_url)
        .await
        .context("failed to connect to the database")?;
    if config.auto_migrate {
        db::ensure_schema(&connection)
            .await
            .context("failed to create missing tables")?;
    }
    let connection = Arc::new(connection);

    let (event_sender, event_receiver) = events::channel(1024);
    let _event_loop = events::spawn_logger(event_receiver);

    let services = AppServices::build(connection.clone(), &config, Some(Arc::new(event_sender)));
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState {
        config,
        db: connection,
        services,
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "studio api listening");

    axum::serve(listener, app_router(state))
        .await
        .context("server error")?;

    Ok(())
}
