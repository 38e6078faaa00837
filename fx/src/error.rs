//! Rate engine error types.

use ratekeeper_common::Currency;
use rust_decimal::Decimal;
use thiserror::Error;

/// Why a remote fetch produced no snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport failure, timeout or non-success status.
    #[error("Rate feed unreachable: {0}")]
    Unreachable(String),

    /// Payload received but not parseable into currency/rate pairs.
    #[error("Malformed rate feed response: {0}")]
    BadResponse(String),

    /// Payload parsed but held no rates.
    #[error("Rate feed returned no rates")]
    EmptyPayload,
}

/// Rate store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No snapshot persisted for the pivot.
    #[error("No persisted rates for pivot {0}")]
    NotFound(Currency),

    /// Storage backend failed.
    #[error("Rate store error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// A snapshot failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// No rates besides the implicit pivot.
    #[error("Snapshot contains no rates")]
    Empty,

    /// A rate was zero or negative.
    #[error("Non-positive rate {rate} for {currency}")]
    NonPositiveRate { currency: Currency, rate: Decimal },
}

/// Errors surfaced by the conversion engine and facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FxError {
    /// Currency unknown, or never published by the feed.
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(Currency),

    /// Both currencies supported but missing from the loaded snapshot.
    #[error("No rate in snapshot for {from}/{to}")]
    UnsupportedPair { from: Currency, to: Currency },

    /// The rate or converted amount exceeds the decimal range.
    #[error("Conversion from {from} to {to} overflows")]
    ConversionOverflow { from: Currency, to: Currency },

    /// No snapshot has ever been obtained.
    #[error("No exchange rates available")]
    NoRatesAvailable,

    /// Explicit refresh failed.
    #[error("Rate refresh failed: {0}")]
    FetchFailed(#[from] FetchError),

    /// Refresh interval outside 1..=168 hours.
    #[error("Refresh interval {0}h outside 1-168 hours")]
    InvalidRefreshInterval(u32),

    /// The refresh task panicked or was cancelled by the runtime.
    #[error("Rate refresh aborted: {0}")]
    RefreshAborted(String),
}

impl FxError {
    /// Check if the caller may succeed by retrying later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FxError::NoRatesAvailable | FxError::FetchFailed(_) | FxError::RefreshAborted(_)
        )
    }

    /// Stable code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::UnsupportedCurrency(_) => "UNSUPPORTED_CURRENCY",
            FxError::UnsupportedPair { .. } => "UNSUPPORTED_PAIR",
            FxError::ConversionOverflow { .. } => "CONVERSION_OVERFLOW",
            FxError::NoRatesAvailable => "NO_RATES_AVAILABLE",
            FxError::FetchFailed(_) => "FETCH_FAILED",
            FxError::InvalidRefreshInterval(_) => "INVALID_REFRESH_INTERVAL",
            FxError::RefreshAborted(_) => "REFRESH_ABORTED",
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FxError::NoRatesAvailable.is_retryable());
        assert!(FxError::FetchFailed(FetchError::EmptyPayload).is_retryable());
        assert!(!FxError::UnsupportedCurrency(Currency::new("RUB")).is_retryable());
        assert!(!FxError::InvalidRefreshInterval(0).is_retryable());

        let overflow = FxError::ConversionOverflow {
            from: Currency::eur(),
            to: Currency::jpy(),
        };
        assert!(!overflow.is_retryable());
        assert_eq!(overflow.error_code(), "CONVERSION_OVERFLOW");
    }

    #[test]
    fn test_fetch_error_converts() {
        let err: FxError = FetchError::Unreachable("connection refused".into()).into();
        assert_eq!(err.error_code(), "FETCH_FAILED");
        assert_eq!(
            err.to_string(),
            "Rate refresh failed: Rate feed unreachable: connection refused"
        );
    }
}
