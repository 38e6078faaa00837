//! Ratekeeper FX Engine
//!
//! Exchange-rate cache and conversion engine.
//!
//! # Features
//!
//! - Single in-memory snapshot of rates against one pivot currency
//! - TTL-driven refresh with at most one remote fetch in flight
//! - Fallback from live feed to fresh persisted, then stale persisted rates
//! - Cross-rate conversion through the pivot
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ratekeeper_common::{Currency, CurrencySupportTable};
//! use ratekeeper_fx::{ConversionEngine, ConversionService, EcbRateSource, EngineConfig, MemoryRateStore};
//!
//! let config = EngineConfig::default();
//! let source = Arc::new(EcbRateSource::new(config.fetch_timeout)?);
//! let engine = ConversionEngine::new(source, Arc::new(MemoryRateStore::new()), config)?;
//! let service = ConversionService::new(Arc::new(engine), CurrencySupportTable::ecb());
//!
//! let rate = service.get_rate(&Currency::usd(), &Currency::gbp()).await?;
//! ```

pub mod conversion;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod snapshot;
pub mod source;
pub mod store;

pub use conversion::ConversionService;
pub use engine::{CacheSource, ConversionEngine, EngineConfig, RateEntry, RateStatus};
pub use error::{FetchError, FxError, FxResult, SnapshotError, StoreError};
pub use metrics::{FxMetrics, MetricsSnapshot};
pub use snapshot::RateSnapshot;
pub use source::{EcbRateSource, RemoteRateSource};
pub use store::{MemoryRateStore, PgRateStore, RateStore};
