//! Background freshness check.
//!
//! Lookups already refresh a stale cache on demand. This task keeps the
//! refresh interval honoured on an idle service and reports cache status.

use std::time::Duration;

use ratekeeper_common::time::as_hours;
use ratekeeper_fx::{ConversionService, FxResult};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodic `ensure_fresh` plus status reporting.
pub struct RefreshLoop {
    service: ConversionService,
    period: Duration,
}

impl RefreshLoop {
    pub fn new(service: ConversionService, period: Duration) -> Self {
        Self { service, period }
    }

    /// Run until a message arrives on `shutdown` or its sender is dropped.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period_secs = self.period.as_secs(), "Refresh loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Refresh loop stopping");
                    break;
                }
            }
        }
    }

    /// One freshness check followed by a status report.
    pub async fn tick(&self) -> FxResult<()> {
        let result = self.service.engine().ensure_fresh().await.map(|_| ());
        if let Err(e) = &result {
            warn!(error = %e, code = e.error_code(), "Background refresh found no usable rates");
        }

        let status = self.service.status().await;
        let metrics = self.service.engine().metrics().snapshot();

        if status.is_degraded() {
            warn!(
                source = %status.source,
                age_hours = status.snapshot_age().map(as_hours),
                last_error = status.last_error.as_deref().unwrap_or(""),
                "Serving stale exchange rates"
            );
        } else {
            info!(
                source = %status.source,
                rate_count = status.rate_count,
                captured_at = ?status.captured_at,
                fetch_attempts = metrics.fetch_attempts,
                fetch_failures = metrics.fetch_failures,
                "Exchange rate status"
            );
        }

        if let Ok(json) = serde_json::to_string(&metrics) {
            debug!(metrics = %json, "Rate engine counters");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ratekeeper_common::{Currency, CurrencySupportTable};
    use ratekeeper_fx::source::MockRateSource;
    use ratekeeper_fx::{CacheSource, ConversionEngine, EngineConfig, FetchError, FxError, MemoryRateStore};
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<MockRateSource>, ConversionService) {
        let source = Arc::new(MockRateSource::new(Currency::eur()));
        source.set_rate(Currency::usd(), dec!(1.1));

        let engine = ConversionEngine::new(
            source.clone(),
            Arc::new(MemoryRateStore::new()),
            EngineConfig::default(),
        )
        .unwrap();

        (source, ConversionService::new(Arc::new(engine), CurrencySupportTable::ecb()))
    }

    #[tokio::test]
    async fn test_tick_loads_rates_once() {
        let (source, service) = setup();
        let refresher = RefreshLoop::new(service.clone(), Duration::from_secs(60));

        refresher.tick().await.unwrap();
        refresher.tick().await.unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(service.status().await.source, CacheSource::Live);
    }

    #[tokio::test]
    async fn test_tick_reports_outage() {
        let (source, service) = setup();
        source.set_failure(Some(FetchError::Unreachable("offline".into())));
        let refresher = RefreshLoop::new(service, Duration::from_secs(60));

        assert_eq!(refresher.tick().await, Err(FxError::NoRatesAvailable));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (source, service) = setup();
        let refresher = RefreshLoop::new(service, Duration::from_millis(10));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = tokio::spawn(refresher.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source.calls(), 1);
    }
}
