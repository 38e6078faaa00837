//! Postgres-backed rate store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ratekeeper_common::Currency;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use super::RateStore;
use crate::error::StoreError;
use crate::snapshot::RateSnapshot;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS exchange_rates (
    pivot_currency  TEXT        NOT NULL,
    currency        TEXT        NOT NULL,
    rate            NUMERIC     NOT NULL CHECK (rate > 0),
    captured_at     TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (pivot_currency, captured_at, currency)
)"#;

const CREATE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS exchange_rates_captured_at_idx
    ON exchange_rates (captured_at)"#;

const SELECT_LATEST: &str = r#"
SELECT currency, rate, captured_at
FROM exchange_rates
WHERE pivot_currency = $1
  AND captured_at = (
      SELECT MAX(captured_at) FROM exchange_rates WHERE pivot_currency = $1
  )"#;

const UPSERT_RATE: &str = r#"
INSERT INTO exchange_rates (pivot_currency, currency, rate, captured_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (pivot_currency, captured_at, currency) DO UPDATE SET rate = EXCLUDED.rate"#;

const DELETE_OLDER: &str = "DELETE FROM exchange_rates WHERE captured_at < $1";

/// Stores each snapshot as one `exchange_rates` row per currency.
pub struct PgRateStore {
    pool: PgPool,
}

impl PgRateStore {
    /// Connect to `database_url` and ensure the table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool. Call [`PgRateStore::migrate`] before use.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the rates table and index if missing.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        info!("Rate store schema ready");
        Ok(())
    }
}

#[async_trait]
impl RateStore for PgRateStore {
    async fn read_latest(&self, pivot: &Currency) -> Result<RateSnapshot, StoreError> {
        let rows = sqlx::query(SELECT_LATEST)
            .bind(pivot.code())
            .fetch_all(&self.pool)
            .await?;

        let Some(first) = rows.first() else {
            return Err(StoreError::NotFound(pivot.clone()));
        };
        let captured_at: DateTime<Utc> = first.try_get("captured_at")?;

        let mut rates = Vec::with_capacity(rows.len());
        for row in &rows {
            let code: String = row.try_get("currency")?;
            let rate: Decimal = row.try_get("rate")?;
            rates.push((Currency::new(code), rate));
        }

        debug!(pivot = %pivot, rows = rows.len(), "Loaded persisted rates");

        RateSnapshot::new(pivot.clone(), captured_at, rates)
            .map_err(|e| StoreError::Backend(format!("corrupt persisted snapshot: {}", e)))
    }

    async fn write_batch(&self, snapshot: &RateSnapshot) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for (currency, rate) in snapshot.iter() {
            sqlx::query(UPSERT_RATE)
                .bind(snapshot.pivot().code())
                .bind(currency.code())
                .bind(rate)
                .bind(snapshot.captured_at())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_older_than(&self, age: Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - age;
        let result = sqlx::query(DELETE_OLDER)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
