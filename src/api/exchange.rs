use crate::models::{Candle, Timeframe};
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use thiserror::Error;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const RATE_LIMIT_RPM: u32 = 600;
const MAX_RETRIES: u32 = 3;

type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Failures at the exchange boundary. All of them are transient from the
/// caller's point of view: the affected unit of work is skipped and
/// retried on the next scheduled cycle.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("exchange returned status {0}")]
    Status(StatusCode),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// 24h ticker snapshot entry
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSummary {
    pub symbol: String,
    pub last_price: f64,
    pub quote_volume: f64,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerRaw {
    symbol: String,
    last_price: String,
    quote_volume: String,
}

// ============== Implementation ==============

/// Exchange REST client.
///
/// Cloneable; all clones share one rate limiter, so concurrent discovery
/// and hydration stay inside the request quota.
#[derive(Clone)]
pub struct ExchangeClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl ExchangeClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Rate-limited GET with bounded retries; 5xx and transport errors are
    /// retried with a linear backoff, 4xx is returned immediately.
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, ExchangeError> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<serde_json::Value>()
                            .await
                            .map_err(ExchangeError::Http);
                    }
                    if status.is_client_error() {
                        return Err(ExchangeError::Status(status));
                    }
                    last_error = Some(ExchangeError::Status(status));
                }
                Err(error) => last_error = Some(ExchangeError::Http(error)),
            }

            if attempt < MAX_RETRIES {
                tracing::warn!(target: "feed", url, attempt, "Exchange request failed, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(attempt as u64)).await;
            }
        }

        Err(last_error.unwrap_or(ExchangeError::Malformed("no attempts made".to_string())))
    }

    /// 24h ticker snapshot for all symbols
    pub async fn ticker_24h(&self) -> Result<Vec<TickerSummary>, ExchangeError> {
        let url = format!("{}/api/v3/ticker/24hr", self.base_url);
        let body = self.get_json(&url).await?;

        let raw: Vec<TickerRaw> = serde_json::from_value(body)
            .map_err(|e| ExchangeError::Malformed(format!("ticker array: {}", e)))?;

        raw.into_iter()
            .map(|t| {
                let last_price = parse_price(&t.last_price, "lastPrice")?;
                let quote_volume = parse_price(&t.quote_volume, "quoteVolume")?;
                Ok(TickerSummary {
                    symbol: t.symbol,
                    last_price,
                    quote_volume,
                })
            })
            .collect()
    }

    /// Historical candles for symbol/interval, optionally from `start_time`
    pub async fn klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_time: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            timeframe.as_str(),
            limit
        );
        if let Some(start) = start_time {
            url.push_str(&format!("&startTime={}", start.timestamp_millis()));
        }

        let body = self.get_json(&url).await?;

        let rows = body
            .as_array()
            .ok_or_else(|| ExchangeError::Malformed("klines: expected array".to_string()))?;

        rows.iter().map(parse_kline_row).collect()
    }
}

/// One kline row: [openTime, open, high, low, close, volume, ...], the
/// numeric fields encoded as strings
fn parse_kline_row(row: &serde_json::Value) -> Result<Candle, ExchangeError> {
    let fields = row
        .as_array()
        .filter(|f| f.len() >= 6)
        .ok_or_else(|| ExchangeError::Malformed("kline row: expected >= 6 fields".to_string()))?;

    let open_time = fields[0]
        .as_i64()
        .ok_or_else(|| ExchangeError::Malformed("kline row: bad open time".to_string()))?;
    let timestamp = Utc
        .timestamp_millis_opt(open_time)
        .single()
        .ok_or_else(|| ExchangeError::Malformed("kline row: open time out of range".to_string()))?;

    let number = |index: usize, name: &str| -> Result<f64, ExchangeError> {
        let text = fields[index]
            .as_str()
            .ok_or_else(|| ExchangeError::Malformed(format!("kline row: {} not a string", name)))?;
        parse_price(text, name)
    };

    Ok(Candle {
        timestamp,
        open: number(1, "open")?,
        high: number(2, "high")?,
        low: number(3, "low")?,
        close: number(4, "close")?,
        volume: number(5, "volume")?,
    })
}

fn parse_price(text: &str, name: &str) -> Result<f64, ExchangeError> {
    text.parse::<f64>()
        .map_err(|_| ExchangeError::Malformed(format!("{}: not a number: {:?}", name, text)))
}
