//! Remote rate sources.

mod ecb;
#[cfg(any(test, feature = "test-utils"))]
mod mock;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::snapshot::RateSnapshot;

pub use ecb::{parse_daily_feed, EcbRateSource, ECB_DAILY_URL};
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockRateSource;

/// A feed publishing a full set of rates against one pivot currency.
///
/// Implementations make a single attempt per call; retry policy belongs to
/// the engine.
#[async_trait]
pub trait RemoteRateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Fetch the current snapshot.
    async fn fetch(&self) -> Result<RateSnapshot, FetchError>;
}
