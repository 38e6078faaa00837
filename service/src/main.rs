//! Ratekeeper Service Binary
//!
//! Runs the exchange-rate cache with a background refresh loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ratekeeper_common::CurrencySupportTable;
use ratekeeper_fx::{
    ConversionEngine, ConversionService, EcbRateSource, MemoryRateStore, PgRateStore, RateStore,
};
use ratekeeper_service::{RefreshLoop, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Ratekeeper");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let store: Arc<dyn RateStore> = match &config.database_url {
        Some(url) => {
            let store = PgRateStore::connect(url).await?;
            info!("Using Postgres rate store");
            Arc::new(store)
        }
        None => {
            info!("DATABASE_URL not set, rates are kept in memory only");
            Arc::new(MemoryRateStore::new())
        }
    };

    let source = Arc::new(EcbRateSource::with_url(config.feed_url.clone(), config.fetch_timeout)?);
    let engine = Arc::new(ConversionEngine::new(source, store, config.engine_config())?);

    if !engine.warm_up().await {
        info!("Rates will be fetched on first use");
    }

    let service = ConversionService::new(engine, CurrencySupportTable::ecb());

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let refresher = RefreshLoop::new(service.clone(), config.status_interval);
    let refresh_task = tokio::spawn(refresher.run(shutdown_rx));

    info!(
        feed_url = %config.feed_url,
        refresh_interval_hours = config.refresh_interval_hours,
        currencies = service.supported_currencies().len(),
        "Ratekeeper running"
    );

    // Keep running until shutdown
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(()).await;
    if let Err(e) = refresh_task.await {
        error!(error = %e, "Refresh loop ended abnormally");
    }

    info!(metrics = %service.engine().metrics().to_prometheus(), "Ratekeeper shutdown complete");
    Ok(())
}
