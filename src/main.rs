use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use learnify::api::{ApiClient, ApiConfig, HttpApiClient, StaticApiClient};
use learnify::gateway;
use learnify::services::SyncScheduler;
use learnify::store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "learnify=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://learnify.db?mode=rwc".to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let api: Arc<dyn ApiClient> = match ApiConfig::from_env() {
        Ok(config) => Arc::new(HttpApiClient::new(config)?),
        Err(e) => {
            warn!("API not configured ({}), running against the bundled catalog", e);
            Arc::new(StaticApiClient)
        }
    };

    let origin = std::env::var("LEARNIFY_ORIGIN")
        .unwrap_or_else(|_| "http://localhost:5000".to_string());
    let gateway_addr: SocketAddr = std::env::var("GATEWAY_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8787".to_string())
        .parse()?;

    // Held for the whole run: dropping it would close the control channel.
    let _gateway_control = gateway::spawn(origin, gateway_addr)?;

    let store = Arc::new(Store::load(api, pool.clone()).await);

    let interval_secs = std::env::var("SYNC_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(60);

    info!("learnify client core ready (sync every {}s)", interval_secs);
    SyncScheduler::new(store, interval_secs).start().await;

    Ok(())
}
