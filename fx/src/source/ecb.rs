//! European Central Bank daily reference-rate feed.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use ratekeeper_common::Currency;
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::debug;

use super::RemoteRateSource;
use crate::error::{FetchError, SnapshotError};
use crate::snapshot::RateSnapshot;

/// Well-known location of the daily XML document.
pub const ECB_DAILY_URL: &str = "https://www.ecb.europa.eu/stats/eurofxref/eurofxref-daily.xml";

/// Fetches the ECB daily document. All rates are quoted against EUR.
pub struct EcbRateSource {
    client: Client,
    url: String,
}

impl EcbRateSource {
    /// Source for the public ECB endpoint.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Self::with_url(ECB_DAILY_URL, timeout)
    }

    /// Source for a mirror or test server serving the same document.
    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Unreachable(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RemoteRateSource for EcbRateSource {
    fn name(&self) -> &str {
        "ecb"
    }

    async fn fetch(&self) -> Result<RateSnapshot, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Unreachable(format!(
                "{} returned status {}",
                self.url, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Unreachable(format!("reading body: {}", e)))?;

        let snapshot = parse_daily_feed(&body, Utc::now())?;
        debug!(
            source = "ecb",
            rate_count = snapshot.len(),
            "Fetched daily rates"
        );
        Ok(snapshot)
    }
}

/// Parse the ECB envelope into an EUR-pivot snapshot.
///
/// Rates live on `Cube` elements carrying both `currency` and `rate`
/// attributes; the enclosing `Cube` elements carry neither (or only `time`).
pub fn parse_daily_feed(xml: &str, captured_at: DateTime<Utc>) -> Result<RateSnapshot, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut saw_envelope = false;
    let mut rates = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"Envelope" => saw_envelope = true,
                b"Cube" => {
                    if let Some(pair) = cube_rate(&e)? {
                        rates.push(pair);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::BadResponse(format!(
                    "invalid XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    if !saw_envelope {
        return Err(FetchError::BadResponse("missing Envelope element".to_string()));
    }

    RateSnapshot::new(Currency::eur(), captured_at, rates).map_err(|e| match e {
        SnapshotError::Empty => FetchError::EmptyPayload,
        other => FetchError::BadResponse(other.to_string()),
    })
}

fn cube_rate(element: &BytesStart<'_>) -> Result<Option<(Currency, Decimal)>, FetchError> {
    let mut currency = None;
    let mut rate = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| FetchError::BadResponse(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| FetchError::BadResponse(e.to_string()))?;

        match attr.key.as_ref() {
            b"currency" => {
                let code = Currency::parse(&value)
                    .map_err(|e| FetchError::BadResponse(e.to_string()))?;
                currency = Some(code);
            }
            b"rate" => {
                let parsed = Decimal::from_str(value.trim()).map_err(|e| {
                    FetchError::BadResponse(format!("rate {:?}: {}", value, e))
                })?;
                rate = Some(parsed);
            }
            _ => {}
        }
    }

    match (currency, rate) {
        (Some(currency), Some(rate)) => Ok(Some((currency, rate))),
        (None, None) => Ok(None),
        (Some(currency), None) => Err(FetchError::BadResponse(format!(
            "no rate for {}",
            currency
        ))),
        (None, Some(_)) => Err(FetchError::BadResponse(
            "rate without currency".to_string(),
        )),
    }
}
