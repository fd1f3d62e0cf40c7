use actix_web::{App, HttpServer, middleware, web};
use chrono::Utc;
use common::ServiceError;
use common::config::ServiceConfig;
use common::hub::Hub;
use common::recovery::ConnectRetry;
use common::store::CanvasStore;
use migration::{Migrator, MigratorTrait};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Marks sessions whose expiry has passed. Runs until the server stops.
async fn sweep_expired_sessions(store: CanvasStore, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match store.expire_stale_sessions(Utc::now()).await {
            Ok(0) => {}
            Ok(expired) => info!("Marked {} sessions as expired", expired),
            Err(e) => error!("Expiry sweep failed: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    let config = ServiceConfig::new()?;

    let default_filter = if config.is_development() {
        "debug,sqlx=warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!(
        "Starting canvas server ({}) on {}",
        config.environment, config.bind_address
    );

    let db = ConnectRetry::from_config(&config)
        .connect(&config.database_url)
        .await?;

    info!("Running database migrations...");
    Migrator::up(&db, None).await?;
    info!("Migrations completed successfully");

    let store = CanvasStore::new(db);
    let sweeper = sweep_expired_sessions(
        store.clone(),
        Duration::from_secs(config.expiry_sweep_secs.max(1)),
    );

    let store_data = web::Data::new(store);
    let hub_data = web::Data::new(Hub::new());
    let config_data = web::Data::new(config.clone());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(store_data.clone())
            .app_data(hub_data.clone())
            .app_data(config_data.clone())
            .configure(common::api::configure)
            .configure(common::hub::ws::configure)
    })
    .bind(&config.bind_address)?
    .run();

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("HTTP server error: {:?}", e);
            }
        }
        _ = sweeper => {}
    }

    info!("Canvas server stopped");
    Ok(())
}
