//! In-process rate store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ratekeeper_common::Currency;

use super::RateStore;
use crate::error::StoreError;
use crate::snapshot::RateSnapshot;

/// Rate store kept in memory, keyed by pivot then capture time.
///
/// Suitable for single-process deployments without a database and for
/// tests; writes and reads can be made to fail on demand.
#[derive(Default)]
pub struct MemoryRateStore {
    snapshots: DashMap<Currency, BTreeMap<DateTime<Utc>, RateSnapshot>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryRateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `snapshot`.
    pub fn with_snapshot(snapshot: RateSnapshot) -> Self {
        let store = Self::new();
        store.insert(snapshot);
        store
    }

    /// Insert a snapshot directly, bypassing failure injection.
    pub fn insert(&self, snapshot: RateSnapshot) {
        self.snapshots
            .entry(snapshot.pivot().clone())
            .or_default()
            .insert(snapshot.captured_at(), snapshot);
    }

    /// Make reads fail with a backend error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make writes fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored snapshots across all pivots.
    pub fn len(&self) -> usize {
        self.snapshots.iter().map(|e| e.value().len()).sum()
    }

    /// Check if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `read_latest` calls.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful `write_batch` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn read_latest(&self, pivot: &Currency) -> Result<RateSnapshot, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected read failure".to_string()));
        }

        self.snapshots
            .get(pivot)
            .and_then(|by_time| by_time.values().next_back().cloned())
            .ok_or_else(|| StoreError::NotFound(pivot.clone()))
    }

    async fn write_batch(&self, snapshot: &RateSnapshot) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }

        self.insert(snapshot.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_older_than(&self, age: Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - age;
        let mut removed = 0u64;

        for mut entry in self.snapshots.iter_mut() {
            let kept = entry.value_mut().split_off(&cutoff);
            removed += entry
                .value()
                .values()
                .map(|snapshot| snapshot.len() as u64)
                .sum::<u64>();
            *entry.value_mut() = kept;
        }
        self.snapshots.retain(|_, by_time| !by_time.is_empty());

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot_at(captured_at: DateTime<Utc>, usd: rust_decimal::Decimal) -> RateSnapshot {
        RateSnapshot::new(
            Currency::eur(),
            captured_at,
            vec![(Currency::usd(), usd), (Currency::gbp(), dec!(0.85))],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_read_latest_returns_newest() {
        let store = MemoryRateStore::new();
        let now = Utc::now();
        store.write_batch(&snapshot_at(now - Duration::hours(30), dec!(1.05))).await.unwrap();
        store.write_batch(&snapshot_at(now, dec!(1.1))).await.unwrap();

        let latest = store.read_latest(&Currency::eur()).await.unwrap();
        assert_eq!(latest.rate(&Currency::usd()), Some(dec!(1.1)));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_read_latest_not_found() {
        let store = MemoryRateStore::new();
        let result = store.read_latest(&Currency::usd()).await;
        assert_eq!(result, Err(StoreError::NotFound(Currency::usd())));
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let store = MemoryRateStore::new();
        let snapshot = snapshot_at(Utc::now(), dec!(1.1));
        store.write_batch(&snapshot).await.unwrap();
        store.write_batch(&snapshot).await.unwrap();

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_older_than_counts_rows() {
        let now = Utc::now();
        let store = MemoryRateStore::with_snapshot(snapshot_at(now - Duration::days(8), dec!(1.0)));
        store.insert(snapshot_at(now - Duration::days(1), dec!(1.1)));

        let removed = store.delete_older_than(Duration::days(7)).await.unwrap();

        // three rows: USD, GBP and the pivot
        assert_eq!(removed, 3);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryRateStore::new();
        store.set_fail_writes(true);
        assert!(store.write_batch(&snapshot_at(Utc::now(), dec!(1.1))).await.is_err());
        assert!(store.is_empty());

        store.set_fail_reads(true);
        assert!(matches!(
            store.read_latest(&Currency::eur()).await,
            Err(StoreError::Backend(_))
        ));
        assert_eq!(store.reads(), 1);
    }
}
