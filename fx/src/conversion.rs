//! Public conversion operations.

use std::sync::Arc;

use ratekeeper_common::{Currency, CurrencySupportTable, Money};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::engine::{ConversionEngine, RateStatus};
use crate::error::{FxError, FxResult};

/// Entry point for the rest of the application: validates currencies
/// against the support table before anything reaches the rate cache.
#[derive(Clone)]
pub struct ConversionService {
    engine: Arc<ConversionEngine>,
    support: Arc<CurrencySupportTable>,
}

impl ConversionService {
    /// Create a service over a shared engine.
    pub fn new(engine: Arc<ConversionEngine>, support: CurrencySupportTable) -> Self {
        Self {
            engine,
            support: Arc::new(support),
        }
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Arc<ConversionEngine> {
        &self.engine
    }

    /// Recognised currencies in display order.
    pub fn supported_currencies(&self) -> &[Currency] {
        self.support.supported_currencies()
    }

    /// Whether the feed publishes a rate for `currency`.
    pub fn has_feed_rate(&self, currency: &Currency) -> bool {
        self.support.has_feed_rate(currency)
    }

    /// Units of `to` per one unit of `from`.
    ///
    /// Same-currency requests return 1 without touching the cache.
    /// A currency the feed never publishes fails with
    /// [`FxError::UnsupportedCurrency`] before any refresh is attempted.
    pub async fn get_rate(&self, from: &Currency, to: &Currency) -> FxResult<Decimal> {
        self.ensure_recognised(from)?;
        self.ensure_recognised(to)?;

        if from == to {
            return Ok(Decimal::ONE);
        }

        self.ensure_quotable(from)?;
        self.ensure_quotable(to)?;

        self.engine.rate(from, to).await
    }

    /// Convert `amount` from one currency to another, unrounded.
    ///
    /// Zero converts to zero even when no rate could be obtained.
    #[instrument(level = "debug", skip_all, fields(amount = %amount, from = %from, to = %to))]
    pub async fn convert(&self, amount: Decimal, from: &Currency, to: &Currency) -> FxResult<Decimal> {
        self.ensure_recognised(from)?;
        self.ensure_recognised(to)?;

        if from == to || amount.is_zero() {
            return Ok(amount);
        }

        let rate = self.get_rate(from, to).await?;
        amount
            .checked_mul(rate)
            .ok_or_else(|| FxError::ConversionOverflow {
                from: from.clone(),
                to: to.clone(),
            })
    }

    /// Convert a money value into `to`.
    pub async fn convert_money(&self, money: &Money, to: &Currency) -> FxResult<Money> {
        let value = self.convert(money.value, &money.currency, to).await?;
        Ok(Money::new(value, to.clone()))
    }

    /// Force a fetch from the remote feed.
    pub async fn refresh(&self) -> FxResult<()> {
        let result = self.engine.refresh_now().await;
        if result.is_ok() {
            info!("Exchange rates refreshed");
        }
        result
    }

    /// Read-only cache status; never triggers a refresh.
    pub async fn status(&self) -> RateStatus {
        self.engine.status().await
    }

    /// Change how old a snapshot may get before it is refreshed.
    pub async fn set_refresh_interval_hours(&self, hours: u32) -> FxResult<()> {
        self.engine.set_refresh_interval_hours(hours).await
    }

    fn ensure_recognised(&self, currency: &Currency) -> FxResult<()> {
        if self.support.is_recognised(currency) {
            Ok(())
        } else {
            Err(FxError::UnsupportedCurrency(currency.clone()))
        }
    }

    fn ensure_quotable(&self, currency: &Currency) -> FxResult<()> {
        if self.support.has_feed_rate(currency) {
            Ok(())
        } else {
            Err(FxError::UnsupportedCurrency(currency.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::error::FetchError;
    use crate::source::MockRateSource;
    use crate::store::MemoryRateStore;
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<MockRateSource>, ConversionService) {
        let source = Arc::new(MockRateSource::new(Currency::eur()));
        source.set_rate(Currency::usd(), dec!(1.1));
        source.set_rate(Currency::gbp(), dec!(0.85));

        let engine = ConversionEngine::new(
            source.clone(),
            Arc::new(MemoryRateStore::new()),
            EngineConfig::default(),
        )
        .unwrap();

        (source, ConversionService::new(Arc::new(engine), CurrencySupportTable::ecb()))
    }

    #[tokio::test]
    async fn test_get_rate_through_pivot() {
        let (_, service) = setup();

        let rate = service.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();
        assert_eq!(rate.round_dp(3), dec!(0.909));
    }

    #[tokio::test]
    async fn test_convert_example() {
        let (_, service) = setup();

        let gbp = service
            .convert(dec!(100), &Currency::usd(), &Currency::gbp())
            .await
            .unwrap();
        assert_eq!(gbp.round_dp(2), dec!(77.27));
    }

    #[tokio::test]
    async fn test_convert_preserves_sign() {
        let (_, service) = setup();

        let eur = service
            .convert(dec!(-100), &Currency::usd(), &Currency::eur())
            .await
            .unwrap();
        assert_eq!(eur.round_dp(2), dec!(-90.91));
    }

    #[tokio::test]
    async fn test_identity_for_display_only_currency() {
        let (source, service) = setup();
        let rub = Currency::new("RUB");

        assert_eq!(service.get_rate(&rub, &rub).await.unwrap(), Decimal::ONE);
        assert_eq!(service.convert(dec!(12.345), &rub, &rub).await.unwrap(), dec!(12.345));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_display_only_pair_is_unsupported_with_full_cache() {
        let (source, service) = setup();
        service.refresh().await.unwrap();

        let result = service
            .get_rate(&Currency::new("RUB"), &Currency::new("COP"))
            .await;

        assert_eq!(result, Err(FxError::UnsupportedCurrency(Currency::new("RUB"))));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_currency_never_fetches() {
        let (source, service) = setup();

        let result = service.get_rate(&Currency::usd(), &Currency::new("XYZ")).await;

        assert!(matches!(result, Err(FxError::UnsupportedCurrency(c)) if c.code() == "XYZ"));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_quotable_currency_missing_from_feed() {
        let (_, service) = setup();

        let result = service.get_rate(&Currency::usd(), &Currency::new("CHF")).await;
        assert!(matches!(result, Err(FxError::UnsupportedPair { .. })));
    }

    #[tokio::test]
    async fn test_zero_converts_during_outage() {
        let (source, service) = setup();
        source.set_failure(Some(FetchError::Unreachable("offline".into())));

        let zero = service
            .convert(Decimal::ZERO, &Currency::usd(), &Currency::gbp())
            .await
            .unwrap();
        assert!(zero.is_zero());

        let result = service.convert(dec!(1), &Currency::usd(), &Currency::gbp()).await;
        assert_eq!(result, Err(FxError::NoRatesAvailable));
    }

    #[tokio::test]
    async fn test_huge_amount_overflows_instead_of_panicking() {
        let (source, service) = setup();
        source.set_rate(Currency::jpy(), dec!(160.5));

        let result = service
            .convert(Decimal::MAX, &Currency::eur(), &Currency::jpy())
            .await;
        assert_eq!(
            result,
            Err(FxError::ConversionOverflow {
                from: Currency::eur(),
                to: Currency::jpy(),
            })
        );

        let eur = service
            .convert(Decimal::MAX, &Currency::jpy(), &Currency::eur())
            .await
            .unwrap();
        assert!(eur < Decimal::MAX);
    }

    #[tokio::test]
    async fn test_convert_money() {
        let (_, service) = setup();
        let usd = Money::new(dec!(100), Currency::usd());

        let gbp = service.convert_money(&usd, &Currency::gbp()).await.unwrap();

        assert_eq!(gbp.currency, Currency::gbp());
        assert_eq!(gbp.round().value, dec!(77.27));
    }

    #[tokio::test]
    async fn test_refresh_surfaces_fetch_failure() {
        let (source, service) = setup();
        source.set_failure(Some(FetchError::BadResponse("truncated".into())));

        let result = service.refresh().await;
        assert!(matches!(result, Err(FxError::FetchFailed(FetchError::BadResponse(_)))));
    }

    #[tokio::test]
    async fn test_status_does_not_refresh() {
        let (source, service) = setup();

        let status = service.status().await;

        assert_eq!(status.rate_count, 0);
        assert_eq!(status.refresh_interval_hours, 24);
        assert_eq!(source.calls(), 0);
    }
}
