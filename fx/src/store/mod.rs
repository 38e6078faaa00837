//! Durable rate snapshot persistence.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::Duration;
use ratekeeper_common::Currency;

use crate::error::StoreError;
use crate::snapshot::RateSnapshot;

pub use memory::MemoryRateStore;
pub use postgres::PgRateStore;

/// Persistence for rate snapshots, one row per (pivot, currency, rate,
/// captured_at). Used for restart recovery and stale fallback only.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Most recently captured snapshot for `pivot`, or
    /// [`StoreError::NotFound`].
    async fn read_latest(&self, pivot: &Currency) -> Result<RateSnapshot, StoreError>;

    /// Upsert every rate of the snapshot. Writing the same snapshot twice is
    /// a no-op.
    async fn write_batch(&self, snapshot: &RateSnapshot) -> Result<(), StoreError>;

    /// Delete rows captured more than `age` ago. Returns rows removed.
    async fn delete_older_than(&self, age: Duration) -> Result<u64, StoreError>;
}
