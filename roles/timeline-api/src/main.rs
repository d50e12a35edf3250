use std::sync::Arc;
use tracing::info;

use checkin_timeline::SqliteStorage;
use timeline_api::{api, config::Config, TimelineData};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_args()?;

    // Setup tracing with optional file output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt().with_env_filter(env_filter);

    if let Some(log_file) = &config.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| format!("Failed to open log file {}: {}", log_file, e))?;
        fmt_layer.with_writer(Arc::new(file)).init();
    } else {
        fmt_layer.init();
    }

    info!("Starting timeline-api service");
    info!("HTTP server: {}", config.http_address);
    info!("Check-in database: {}", config.db_path);
    info!(
        "Default width: {}px, window config cache: {} entries",
        config.default_width, config.config_cache_capacity
    );

    let storage = SqliteStorage::new(&config.db_path).await?;
    let data = Arc::new(TimelineData::new(
        Arc::new(storage),
        config.default_width,
        config.config_cache_capacity,
    ));

    api::run_http_server(config.http_address.clone(), data).await
}
