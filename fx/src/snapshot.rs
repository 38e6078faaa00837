//! Point-in-time rate snapshots quoted against a pivot currency.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use ratekeeper_common::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FxError, FxResult, SnapshotError};

/// Rates captured at one instant, each expressed as units of the currency
/// per one unit of the pivot. The pivot itself is stored at exactly 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pivot: Currency,
    rates: BTreeMap<Currency, Decimal>,
    captured_at: DateTime<Utc>,
}

impl RateSnapshot {
    /// Validate and build a snapshot.
    ///
    /// Fails if no non-pivot rate is present or any rate is not positive.
    /// A pivot entry in `rates` is ignored and replaced by 1.
    pub fn new<I>(pivot: Currency, captured_at: DateTime<Utc>, rates: I) -> Result<Self, SnapshotError>
    where
        I: IntoIterator<Item = (Currency, Decimal)>,
    {
        let mut map = BTreeMap::new();
        for (currency, rate) in rates {
            if currency == pivot {
                continue;
            }
            if rate <= Decimal::ZERO {
                return Err(SnapshotError::NonPositiveRate { currency, rate });
            }
            map.insert(currency, rate);
        }

        if map.is_empty() {
            return Err(SnapshotError::Empty);
        }

        map.insert(pivot.clone(), Decimal::ONE);

        Ok(Self {
            pivot,
            rates: map,
            captured_at,
        })
    }

    /// The currency all rates are quoted against.
    pub fn pivot(&self) -> &Currency {
        &self.pivot
    }

    /// When the rates were captured.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Rate of `currency` relative to the pivot.
    pub fn rate(&self, currency: &Currency) -> Option<Decimal> {
        self.rates.get(currency).copied()
    }

    /// Number of currencies including the pivot.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Always false for a validated snapshot.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Age of the snapshot at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.captured_at)
    }

    /// Rates sorted by currency code.
    pub fn iter(&self) -> impl Iterator<Item = (&Currency, Decimal)> {
        self.rates.iter().map(|(c, r)| (c, *r))
    }

    /// Units of `to` per one unit of `from`, divided through the pivot.
    ///
    /// Unrounded. `from == to` is exactly 1 and never consults the rates.
    pub fn cross_rate(&self, from: &Currency, to: &Currency) -> FxResult<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }

        match (self.rate(from), self.rate(to)) {
            (Some(from_rate), Some(to_rate)) => {
                to_rate
                    .checked_div(from_rate)
                    .ok_or_else(|| FxError::ConversionOverflow {
                        from: from.clone(),
                        to: to.clone(),
                    })
            }
            _ => Err(FxError::UnsupportedPair {
                from: from.clone(),
                to: to.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn sample() -> RateSnapshot {
        RateSnapshot::new(
            Currency::eur(),
            Utc::now(),
            vec![
                (Currency::usd(), dec!(1.1)),
                (Currency::gbp(), dec!(0.85)),
                (Currency::jpy(), dec!(160.5)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_pivot_is_stored_at_one() {
        let snapshot = sample();
        assert_eq!(snapshot.rate(&Currency::eur()), Some(Decimal::ONE));
        assert_eq!(snapshot.len(), 4);
    }

    #[test]
    fn test_cross_rate_through_pivot() {
        let snapshot = sample();

        let usd_eur = snapshot.cross_rate(&Currency::usd(), &Currency::eur()).unwrap();
        assert_eq!(usd_eur.round_dp(3), dec!(0.909));

        let eur_usd = snapshot.cross_rate(&Currency::eur(), &Currency::usd()).unwrap();
        assert_eq!(eur_usd, dec!(1.1));

        let usd_gbp = snapshot.cross_rate(&Currency::usd(), &Currency::gbp()).unwrap();
        assert_eq!((dec!(100) * usd_gbp).round_dp(2), dec!(77.27));
    }

    #[test]
    fn test_identity_skips_lookup() {
        let snapshot = sample();
        let chf = Currency::new("CHF");
        assert_eq!(snapshot.cross_rate(&chf, &chf).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_missing_currency_is_unsupported_pair() {
        let snapshot = sample();
        let result = snapshot.cross_rate(&Currency::usd(), &Currency::new("CHF"));
        assert!(matches!(result, Err(FxError::UnsupportedPair { .. })));
    }

    #[test]
    fn test_extreme_cross_rate_overflows() {
        let snapshot = RateSnapshot::new(
            Currency::eur(),
            Utc::now(),
            vec![
                (Currency::new("AAA"), Decimal::new(1, 28)),
                (Currency::new("BBB"), Decimal::MAX),
            ],
        )
        .unwrap();

        let result = snapshot.cross_rate(&Currency::new("AAA"), &Currency::new("BBB"));
        assert!(matches!(result, Err(FxError::ConversionOverflow { .. })));
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        let result = RateSnapshot::new(
            Currency::eur(),
            Utc::now(),
            vec![(Currency::usd(), dec!(1.1)), (Currency::gbp(), dec!(0))],
        );
        assert!(matches!(result, Err(SnapshotError::NonPositiveRate { .. })));
    }

    #[test]
    fn test_rejects_pivot_only() {
        let result = RateSnapshot::new(
            Currency::eur(),
            Utc::now(),
            vec![(Currency::eur(), dec!(1))],
        );
        assert_eq!(result, Err(SnapshotError::Empty));
    }

    #[test]
    fn test_iter_is_sorted_by_code() {
        let codes: Vec<String> = sample().iter().map(|(c, _)| c.code().to_string()).collect();
        assert_eq!(codes, vec!["EUR", "GBP", "JPY", "USD"]);
    }

    proptest! {
        #[test]
        fn prop_cross_rates_compose(
            a in 1u32..5_000_000,
            b in 1u32..5_000_000,
            c in 1u32..5_000_000,
        ) {
            let snapshot = RateSnapshot::new(
                Currency::eur(),
                Utc::now(),
                vec![
                    (Currency::new("AAA"), Decimal::new(a as i64, 4)),
                    (Currency::new("BBB"), Decimal::new(b as i64, 4)),
                    (Currency::new("CCC"), Decimal::new(c as i64, 4)),
                ],
            ).unwrap();
            let (aa, bb, cc) = (Currency::new("AAA"), Currency::new("BBB"), Currency::new("CCC"));

            let ab = snapshot.cross_rate(&aa, &bb).unwrap();
            let bc = snapshot.cross_rate(&bb, &cc).unwrap();
            let ac = snapshot.cross_rate(&aa, &cc).unwrap();

            let tolerance = ac * dec!(0.000000001) + dec!(0.000000000001);
            prop_assert!((ab * bc - ac).abs() <= tolerance);
        }
    }
}
