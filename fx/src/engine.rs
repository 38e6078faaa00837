//! Rate cache and refresh state machine.
//!
//! The engine owns one [`CacheState`] behind a single reader-writer lock.
//! Lookups take the shared lock while the cache is fresh. A stale cache is
//! refreshed by whichever caller first wins the exclusive lock; everyone
//! queued behind it re-checks freshness once the lock is released and reuses
//! the winner's snapshot, so at most one remote fetch is in flight.
//!
//! Refresh order on a stale cache:
//!
//! 1. the latest persisted snapshot, if younger than the refresh interval;
//! 2. a live fetch from the remote source;
//! 3. the newest snapshot seen so far (persisted or in memory), flagged stale;
//! 4. [`FxError::NoRatesAvailable`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use ratekeeper_common::time::{as_hours, constants, is_valid_refresh_interval, refresh_interval};
use ratekeeper_common::Currency;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{FetchError, FxError, FxResult, StoreError};
use crate::metrics::FxMetrics;
use crate::snapshot::RateSnapshot;
use crate::source::RemoteRateSource;
use crate::store::RateStore;

/// Configuration for the conversion engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Currency the remote feed quotes against.
    pub pivot: Currency,
    /// Age after which a snapshot is refreshed. 1..=168.
    pub refresh_interval_hours: u32,
    /// Upper bound on a single remote fetch.
    pub fetch_timeout: StdDuration,
    /// Minimum gap between fetch attempts while serving stale rates.
    pub failure_backoff: Duration,
    /// Age past which persisted snapshots are pruned on explicit refresh.
    pub retention: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pivot: Currency::eur(),
            refresh_interval_hours: constants::DEFAULT_REFRESH_INTERVAL_HOURS,
            fetch_timeout: constants::fetch_timeout(),
            failure_backoff: constants::failure_backoff(),
            retention: constants::snapshot_retention(),
        }
    }
}

impl EngineConfig {
    /// Validate configuration.
    pub fn validate(&self) -> FxResult<()> {
        if !is_valid_refresh_interval(self.refresh_interval_hours) {
            return Err(FxError::InvalidRefreshInterval(self.refresh_interval_hours));
        }
        Ok(())
    }
}

/// Where the cached snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheSource {
    /// Nothing loaded yet.
    None,
    /// Fetched from the remote feed.
    Live,
    /// Loaded from the store while younger than the refresh interval.
    PersistedFresh,
    /// Served after a failed fetch; older than the refresh interval.
    PersistedStale,
}

impl CacheSource {
    /// Whether lookups are being served from stale data.
    pub fn is_degraded(&self) -> bool {
        matches!(self, CacheSource::PersistedStale)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheSource::None => "none",
            CacheSource::Live => "live",
            CacheSource::PersistedFresh => "persisted-fresh",
            CacheSource::PersistedStale => "persisted-stale",
        }
    }
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rate in a status listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateEntry {
    pub currency: Currency,
    pub rate: Decimal,
}

/// Read-only view of the cache for operators and settings pages.
#[derive(Debug, Clone, Serialize)]
pub struct RateStatus {
    pub pivot: Currency,
    pub source: CacheSource,
    /// Last successful remote fetch by this process.
    pub last_fetch: Option<DateTime<Utc>>,
    /// Capture time of the loaded snapshot.
    pub captured_at: Option<DateTime<Utc>>,
    pub snapshot_age_seconds: Option<i64>,
    pub rate_count: usize,
    pub last_error: Option<String>,
    pub refresh_interval_hours: u32,
    /// Rates sorted by currency code.
    pub rates: Vec<RateEntry>,
}

impl RateStatus {
    /// Age of the loaded snapshot when the status was taken.
    pub fn snapshot_age(&self) -> Option<Duration> {
        self.snapshot_age_seconds.map(Duration::seconds)
    }

    /// Whether lookups are being served from stale data.
    pub fn is_degraded(&self) -> bool {
        self.source.is_degraded()
    }
}

/// The engine's authoritative in-memory view.
#[derive(Debug)]
struct CacheState {
    snapshot: Option<Arc<RateSnapshot>>,
    source: CacheSource,
    last_successful_fetch: Option<DateTime<Utc>>,
    last_failed_fetch: Option<DateTime<Utc>>,
    last_error: Option<FetchError>,
    refresh_interval_hours: u32,
}

impl CacheState {
    fn new(refresh_interval_hours: u32) -> Self {
        Self {
            snapshot: None,
            source: CacheSource::None,
            last_successful_fetch: None,
            last_failed_fetch: None,
            last_error: None,
            refresh_interval_hours,
        }
    }

    fn refresh_interval(&self) -> Duration {
        refresh_interval(self.refresh_interval_hours)
    }

    /// The freshness predicate, evaluated on both sides of the write lock.
    fn fresh_snapshot(&self, now: DateTime<Utc>, failure_backoff: Duration) -> Option<Arc<RateSnapshot>> {
        let snapshot = self.snapshot.as_ref()?;
        let interval = self.refresh_interval();

        let fresh = match self.source {
            CacheSource::None => false,
            CacheSource::Live | CacheSource::PersistedFresh => snapshot.age(now) < interval,
            // Stale data is retried after the backoff, never later than one interval.
            CacheSource::PersistedStale => self
                .last_failed_fetch
                .map_or(false, |at| now - at < failure_backoff.min(interval)),
        };

        fresh.then(|| Arc::clone(snapshot))
    }

    fn failed_since(&self, since: DateTime<Utc>) -> bool {
        self.last_failed_fetch.map_or(false, |at| at >= since)
    }

    fn adopt(&mut self, snapshot: Arc<RateSnapshot>, source: CacheSource) -> Arc<RateSnapshot> {
        self.snapshot = Some(Arc::clone(&snapshot));
        self.source = source;
        snapshot
    }

    fn record_success(&mut self, snapshot: RateSnapshot, now: DateTime<Utc>) -> Arc<RateSnapshot> {
        self.last_successful_fetch = Some(now);
        self.last_failed_fetch = None;
        self.last_error = None;
        self.adopt(Arc::new(snapshot), CacheSource::Live)
    }

    fn record_failure(&mut self, error: FetchError, now: DateTime<Utc>) {
        self.last_failed_fetch = Some(now);
        self.last_error = Some(error);
    }

    fn status(&self, pivot: &Currency, now: DateTime<Utc>) -> RateStatus {
        let rates: Vec<RateEntry> = self
            .snapshot
            .as_ref()
            .map(|s| {
                s.iter()
                    .map(|(currency, rate)| RateEntry {
                        currency: currency.clone(),
                        rate,
                    })
                    .collect()
            })
            .unwrap_or_default();

        RateStatus {
            pivot: pivot.clone(),
            source: self.source,
            last_fetch: self.last_successful_fetch,
            captured_at: self.snapshot.as_ref().map(|s| s.captured_at()),
            snapshot_age_seconds: self.snapshot.as_ref().map(|s| s.age(now).num_seconds()),
            rate_count: rates.len(),
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
            refresh_interval_hours: self.refresh_interval_hours,
            rates,
        }
    }
}

/// Everything a detached refresh task needs.
#[derive(Clone)]
struct Refresher {
    source: Arc<dyn RemoteRateSource>,
    store: Arc<dyn RateStore>,
    config: EngineConfig,
    metrics: Arc<FxMetrics>,
}

impl Refresher {
    /// Refresh a cache that failed the freshness predicate.
    async fn refresh_stale(
        self,
        mut state: OwnedRwLockWriteGuard<CacheState>,
    ) -> FxResult<Arc<RateSnapshot>> {
        let persisted = self.load_persisted().await;

        if let Some(snapshot) = &persisted {
            let age = snapshot.age(Utc::now());
            if age < state.refresh_interval() {
                info!(
                    pivot = %self.config.pivot,
                    age_hours = as_hours(age),
                    rate_count = snapshot.len(),
                    "Adopted fresh persisted rates"
                );
                self.metrics.persisted_loaded();
                return Ok(state.adopt(Arc::new(snapshot.clone()), CacheSource::PersistedFresh));
            }
        }

        match self.fetch().await {
            Ok(snapshot) => {
                let snapshot = state.record_success(snapshot, Utc::now());
                drop(state);
                self.persist(&snapshot).await;
                Ok(snapshot)
            }
            Err(err) => {
                let now = Utc::now();
                state.record_failure(err.clone(), now);

                match newest(persisted.map(Arc::new), state.snapshot.clone()) {
                    Some(snapshot) => {
                        warn!(
                            error = %err,
                            pivot = %self.config.pivot,
                            age_hours = as_hours(snapshot.age(now)),
                            captured_at = %snapshot.captured_at(),
                            "Rate fetch failed, serving stale rates"
                        );
                        self.metrics.stale_fallback();
                        Ok(state.adopt(snapshot, CacheSource::PersistedStale))
                    }
                    None => {
                        error!(
                            error = %err,
                            pivot = %self.config.pivot,
                            "Rate fetch failed and no persisted rates exist"
                        );
                        Err(FxError::NoRatesAvailable)
                    }
                }
            }
        }
    }

    /// Fetch unconditionally, then prune old persisted snapshots.
    async fn force_refresh(self, mut state: OwnedRwLockWriteGuard<CacheState>) -> FxResult<()> {
        match self.fetch().await {
            Ok(snapshot) => {
                let snapshot = state.record_success(snapshot, Utc::now());
                drop(state);
                self.persist(&snapshot).await;
                self.prune().await;
                Ok(())
            }
            Err(err) => {
                let now = Utc::now();
                state.record_failure(err.clone(), now);

                if state.snapshot.is_none() {
                    if let Some(persisted) = self.load_persisted().await {
                        let source = if persisted.age(now) < state.refresh_interval() {
                            CacheSource::PersistedFresh
                        } else {
                            CacheSource::PersistedStale
                        };
                        state.adopt(Arc::new(persisted), source);
                    }
                }

                warn!(
                    error = %err,
                    source = %state.source,
                    "Manual rate refresh failed"
                );
                Err(FxError::FetchFailed(err))
            }
        }
    }

    /// One bounded attempt against the remote source.
    async fn fetch(&self) -> Result<RateSnapshot, FetchError> {
        self.metrics.fetch_attempted();
        let timeout = self.config.fetch_timeout;

        let result = match tokio::time::timeout(timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Unreachable(format!(
                "no response within {:.1}s",
                timeout.as_secs_f64()
            ))),
        }
        .and_then(|snapshot| {
            if snapshot.pivot() == &self.config.pivot {
                Ok(snapshot)
            } else {
                Err(FetchError::BadResponse(format!(
                    "rates quoted against {}, expected {}",
                    snapshot.pivot(),
                    self.config.pivot
                )))
            }
        });

        match &result {
            Ok(snapshot) => info!(
                source = self.source.name(),
                rate_count = snapshot.len(),
                "Fetched live rates"
            ),
            Err(_) => self.metrics.fetch_failed(),
        }
        result
    }

    async fn load_persisted(&self) -> Option<RateSnapshot> {
        match self.store.read_latest(&self.config.pivot).await {
            Ok(snapshot) => Some(snapshot),
            Err(StoreError::NotFound(_)) => {
                debug!(pivot = %self.config.pivot, "No persisted rates");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted rates");
                None
            }
        }
    }

    /// Best-effort write: a failure is logged and never reaches the caller.
    async fn persist(&self, snapshot: &RateSnapshot) {
        if let Err(e) = self.store.write_batch(snapshot).await {
            self.metrics.persist_failed();
            warn!(
                error = %e,
                captured_at = %snapshot.captured_at(),
                "Failed to persist rates, keeping in-memory copy"
            );
        }
    }

    async fn prune(&self) {
        match self.store.delete_older_than(self.config.retention).await {
            Ok(rows) => debug!(rows, "Pruned persisted rates"),
            Err(e) => warn!(error = %e, "Failed to prune persisted rates"),
        }
    }
}

fn newest(
    a: Option<Arc<RateSnapshot>>,
    b: Option<Arc<RateSnapshot>>,
) -> Option<Arc<RateSnapshot>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if a.captured_at() >= b.captured_at() { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Run a refresh on its own task so an abandoned caller cannot cancel it
/// while it holds the write lock.
async fn run_detached<T, F>(refresh: F) -> FxResult<T>
where
    F: Future<Output = FxResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(refresh).await.map_err(|e| {
        error!(error = %e, "Rate refresh task failed");
        FxError::RefreshAborted(e.to_string())
    })?
}

/// Process-wide exchange-rate cache.
///
/// Construct once at startup and share by `Arc`.
pub struct ConversionEngine {
    state: Arc<RwLock<CacheState>>,
    refresher: Refresher,
}

impl ConversionEngine {
    /// Create an engine with an empty cache.
    pub fn new(
        source: Arc<dyn RemoteRateSource>,
        store: Arc<dyn RateStore>,
        config: EngineConfig,
    ) -> FxResult<Self> {
        config.validate()?;

        Ok(Self {
            state: Arc::new(RwLock::new(CacheState::new(config.refresh_interval_hours))),
            refresher: Refresher {
                source,
                store,
                config,
                metrics: Arc::new(FxMetrics::new()),
            },
        })
    }

    /// The currency all cached rates are quoted against.
    pub fn pivot(&self) -> &Currency {
        &self.refresher.config.pivot
    }

    /// Engine counters.
    pub fn metrics(&self) -> &FxMetrics {
        &self.refresher.metrics
    }

    /// Return a usable snapshot, refreshing first if the cache is stale.
    ///
    /// Fails only with [`FxError::NoRatesAvailable`] (nothing was ever
    /// loaded and the fetch failed) or [`FxError::RefreshAborted`].
    pub async fn ensure_fresh(&self) -> FxResult<Arc<RateSnapshot>> {
        let backoff = self.refresher.config.failure_backoff;

        {
            let state = self.state.read().await;
            if let Some(snapshot) = state.fresh_snapshot(Utc::now(), backoff) {
                self.refresher.metrics.cache_hit();
                return Ok(snapshot);
            }
        }

        let waiting_since = Utc::now();
        let state = Arc::clone(&self.state).write_owned().await;
        if let Some(snapshot) = state.fresh_snapshot(Utc::now(), backoff) {
            debug!("Rates refreshed by a concurrent caller");
            return Ok(snapshot);
        }

        // A concurrent caller already failed to load anything while we waited.
        if state.snapshot.is_none() && state.failed_since(waiting_since) {
            debug!("Rate fetch failed for a concurrent caller");
            return Err(FxError::NoRatesAvailable);
        }

        let refresher = self.refresher.clone();
        run_detached(refresher.refresh_stale(state)).await
    }

    /// Units of `to` per unit of `from`, unrounded.
    #[instrument(level = "debug", skip_all, fields(from = %from, to = %to))]
    pub async fn rate(&self, from: &Currency, to: &Currency) -> FxResult<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }

        self.refresher.metrics.lookup();
        let snapshot = self.ensure_fresh().await?;
        snapshot.cross_rate(from, to)
    }

    /// Fetch from the remote source regardless of cache age, then prune
    /// persisted snapshots older than the retention period.
    #[instrument(skip(self))]
    pub async fn refresh_now(&self) -> FxResult<()> {
        let state = Arc::clone(&self.state).write_owned().await;
        let refresher = self.refresher.clone();
        run_detached(refresher.force_refresh(state)).await
    }

    /// Load the latest persisted snapshot, of any age, into an empty cache
    /// without touching the network. Returns whether a snapshot is loaded.
    ///
    /// A snapshot older than the refresh interval is loaded as stale and
    /// refreshed by the next lookup.
    pub async fn warm_up(&self) -> bool {
        let mut state = self.state.write().await;
        if state.snapshot.is_some() {
            return true;
        }

        let Some(snapshot) = self.refresher.load_persisted().await else {
            info!(pivot = %self.pivot(), "No persisted rates to warm up from");
            return false;
        };

        let age = snapshot.age(Utc::now());
        let source = if age < state.refresh_interval() {
            CacheSource::PersistedFresh
        } else {
            CacheSource::PersistedStale
        };

        info!(
            source = %source,
            age_hours = as_hours(age),
            rate_count = snapshot.len(),
            "Warmed rate cache from store"
        );
        state.adopt(Arc::new(snapshot), source);
        true
    }

    /// Snapshot of the cache state. Never triggers a refresh.
    pub async fn status(&self) -> RateStatus {
        let state = self.state.read().await;
        state.status(self.pivot(), Utc::now())
    }

    /// Current refresh interval.
    pub async fn refresh_interval_hours(&self) -> u32 {
        self.state.read().await.refresh_interval_hours
    }

    /// Change the refresh interval. Takes effect at the next freshness
    /// check; an already-loaded snapshot is not invalidated.
    pub async fn set_refresh_interval_hours(&self, hours: u32) -> FxResult<()> {
        if !is_valid_refresh_interval(hours) {
            return Err(FxError::InvalidRefreshInterval(hours));
        }

        let mut state = self.state.write().await;
        let previous = std::mem::replace(&mut state.refresh_interval_hours, hours);
        info!(previous, hours, "Rate refresh interval changed");
        Ok(())
    }
}
