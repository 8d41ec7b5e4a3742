use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::error::UpstreamError;

const LOG_TARGET: &str = "upstream::price";
const SERVICE: &str = "ticker";

/// Live conversion quote: units of `currency` per one unit of the payout
/// currency.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn last_price(&self, currency: &str) -> Result<f64, UpstreamError>;
}

#[derive(Debug, Clone, Deserialize)]
struct TickerQuote {
    last: f64,
}

/// Picks `currency` out of a `{CODE: {last: f64}}` ticker document and
/// rejects zero, negative or non-finite prices.
pub fn price_from_ticker(body: &[u8], currency: &str) -> Result<f64, UpstreamError> {
    let quotes: BTreeMap<String, TickerQuote> =
        serde_json::from_slice(body).map_err(|err| UpstreamError::Decode {
            service: SERVICE,
            message: err.to_string(),
        })?;
    let quote = quotes
        .get(currency)
        .ok_or_else(|| UpstreamError::MissingPrice {
            currency: currency.to_string(),
        })?;
    validate_price(currency, quote.last)
}

pub fn validate_price(currency: &str, price: f64) -> Result<f64, UpstreamError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(UpstreamError::InvalidPrice {
            currency: currency.to_string(),
            price,
        })
    }
}

pub struct HttpTickerOracle {
    client: reqwest::Client,
    url: String,
}

impl HttpTickerOracle {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| UpstreamError::Config(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PriceOracle for HttpTickerOracle {
    async fn last_price(&self, currency: &str) -> Result<f64, UpstreamError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| UpstreamError::from_reqwest(SERVICE, err))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| UpstreamError::from_reqwest(SERVICE, err))?;
        if !status.is_success() {
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        let price = price_from_ticker(&body, currency)?;
        debug!(target: LOG_TARGET, currency, price, "fetched price quote");
        Ok(price)
    }
}
