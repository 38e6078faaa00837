//! Scripted rate source for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use ratekeeper_common::Currency;
use rust_decimal::Decimal;

use super::RemoteRateSource;
use crate::error::FetchError;
use crate::snapshot::RateSnapshot;

/// Mock rate source. Serves a configurable rate table stamped with the
/// fetch time, or a configured failure.
pub struct MockRateSource {
    name: String,
    pivot: Currency,
    rates: RwLock<Vec<(Currency, Decimal)>>,
    failure: RwLock<Option<FetchError>>,
    delay: RwLock<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockRateSource {
    /// Create a new mock source quoting against `pivot`.
    pub fn new(pivot: Currency) -> Self {
        Self {
            name: "mock".to_string(),
            pivot,
            rates: RwLock::new(Vec::new()),
            failure: RwLock::new(None),
            delay: RwLock::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Set the rate for a currency.
    pub fn set_rate(&self, currency: Currency, rate: Decimal) {
        let mut rates = self.rates.write();
        rates.retain(|(c, _)| *c != currency);
        rates.push((currency, rate));
    }

    /// Make every fetch fail with `error`, or succeed again with `None`.
    pub fn set_failure(&self, error: Option<FetchError>) {
        *self.failure.write() = error;
    }

    /// Sleep before answering each fetch.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write() = Some(delay);
    }

    /// Number of fetches started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteRateSource for MockRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<RateSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failure.read().clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let rates = self.rates.read().clone();
        RateSnapshot::new(self.pivot.clone(), Utc::now(), rates)
            .map_err(|_| FetchError::EmptyPayload)
    }
}
