//! Static table of recognised currencies.

use std::collections::HashSet;

use crate::Currency;

/// Currencies published by the ECB daily feed, EUR (the pivot) first.
pub const ECB_QUOTED: &[&str] = &[
    "EUR", "USD", "GBP", "JPY", "CHF", "SEK", "PLN", "INR", "BRL", "AUD", "CAD", "CNY", "CZK",
    "DKK", "HKD", "HUF", "IDR", "ILS", "ISK", "KRW", "MXN", "MYR", "NOK", "NZD", "PHP", "RON",
    "SGD", "THB", "TRY", "ZAR",
];

/// Currencies accepted for display but never convertible.
pub const DISPLAY_ONLY: &[&str] = &["RUB", "COP", "BDT"];

/// Immutable partition of recognised currencies into pivot-quotable and
/// display-only codes.
#[derive(Debug, Clone)]
pub struct CurrencySupportTable {
    pivot: Currency,
    ordered: Vec<Currency>,
    quotable: HashSet<Currency>,
}

impl CurrencySupportTable {
    /// Build a table. The pivot is always quotable; a code listed in both
    /// sets is treated as quotable.
    pub fn new<Q, D>(pivot: Currency, quotable: Q, display_only: D) -> Self
    where
        Q: IntoIterator<Item = Currency>,
        D: IntoIterator<Item = Currency>,
    {
        let mut ordered = vec![pivot.clone()];
        let mut quotable_set = HashSet::from([pivot.clone()]);

        for currency in quotable {
            if quotable_set.insert(currency.clone()) {
                ordered.push(currency);
            }
        }
        for currency in display_only {
            if !ordered.contains(&currency) {
                ordered.push(currency);
            }
        }

        Self {
            pivot,
            ordered,
            quotable: quotable_set,
        }
    }

    /// The table matching the ECB daily reference rates.
    pub fn ecb() -> Self {
        Self::new(
            Currency::eur(),
            ECB_QUOTED.iter().map(|c| Currency::new(*c)),
            DISPLAY_ONLY.iter().map(|c| Currency::new(*c)),
        )
    }

    /// The feed's pivot currency.
    pub fn pivot(&self) -> &Currency {
        &self.pivot
    }

    /// Whether the application accepts this code at all.
    pub fn is_recognised(&self, currency: &Currency) -> bool {
        self.ordered.contains(currency)
    }

    /// Whether the remote feed publishes a rate for this code.
    pub fn has_feed_rate(&self, currency: &Currency) -> bool {
        self.quotable.contains(currency)
    }

    /// Recognised currencies in display order: quotable first, then
    /// display-only.
    pub fn supported_currencies(&self) -> &[Currency] {
        &self.ordered
    }
}

impl Default for CurrencySupportTable {
    fn default() -> Self {
        Self::ecb()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecb_table_partitions() {
        let table = CurrencySupportTable::ecb();

        assert_eq!(table.pivot(), &Currency::eur());
        assert!(table.has_feed_rate(&Currency::eur()));
        assert!(table.has_feed_rate(&Currency::usd()));
        assert!(table.is_recognised(&Currency::new("RUB")));
        assert!(!table.has_feed_rate(&Currency::new("RUB")));
        assert!(!table.is_recognised(&Currency::new("XYZ")));
    }

    #[test]
    fn test_display_order_puts_display_only_last() {
        let table = CurrencySupportTable::ecb();
        let codes: Vec<&str> = table.supported_currencies().iter().map(|c| c.code()).collect();

        assert_eq!(codes.len(), ECB_QUOTED.len() + DISPLAY_ONLY.len());
        assert_eq!(codes[0], "EUR");
        assert_eq!(&codes[codes.len() - 3..], DISPLAY_ONLY);
    }

    #[test]
    fn test_pivot_is_quotable_even_if_omitted() {
        let table = CurrencySupportTable::new(
            Currency::new("USD"),
            vec![Currency::eur()],
            vec![Currency::eur(), Currency::new("BDT")],
        );

        assert!(table.has_feed_rate(&Currency::usd()));
        assert!(table.has_feed_rate(&Currency::eur()));
        assert_eq!(table.supported_currencies().len(), 3);
    }
}
