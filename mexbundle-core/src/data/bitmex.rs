//! BitMEX REST source.
//!
//! Fetches trade buckets from `/trade/bucketed` and instrument metadata from
//! `/instrument`. Any non-success status or a body that is not a JSON list is
//! fatal. Retries are off by default; when enabled they cover transport
//! errors, 429 and 5xx with exponential backoff.

use super::pacer::RequestPacer;
use super::provider::{BarSource, DataError};
use crate::config::UpstreamConfig;
use crate::domain::{Bar, BinSize, InstrumentInfo};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://www.bitmex.com/api/v1";

/// One row of `/trade/bucketed`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketRow {
    timestamp: DateTime<Utc>,
    #[allow(dead_code)]
    symbol: Option<String>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    trades: Option<u64>,
    volume: Option<u64>,
    vwap: Option<f64>,
    last_size: Option<u64>,
    turnover: Option<u64>,
    home_notional: Option<f64>,
    foreign_notional: Option<f64>,
}

impl From<BucketRow> for Bar {
    fn from(row: BucketRow) -> Self {
        Bar {
            timestamp: row.timestamp,
            open: row.open.unwrap_or(f64::NAN),
            high: row.high.unwrap_or(f64::NAN),
            low: row.low.unwrap_or(f64::NAN),
            close: row.close.unwrap_or(f64::NAN),
            volume: row.volume.unwrap_or(0),
            trades: row.trades.unwrap_or(0),
            vwap: row.vwap,
            last_size: row.last_size,
            turnover: row.turnover.unwrap_or(0),
            home_notional: row.home_notional,
            foreign_notional: row.foreign_notional,
        }
    }
}

/// One row of `/instrument`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentRow {
    symbol: String,
    root_symbol: String,
    underlying: String,
    expiry: Option<DateTime<Utc>>,
    settle: Option<DateTime<Utc>>,
    tick_size: f64,
    lot_size: f64,
}

/// BitMEX public REST client.
pub struct BitmexClient {
    client: reqwest::blocking::Client,
    base_url: String,
    pacer: RequestPacer,
    max_retries: u32,
    base_delay: Duration,
}

impl BitmexClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("mexbundle/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            pacer: RequestPacer::new(Duration::from_millis(config.min_request_interval_ms)),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(500),
        })
    }

    fn url(&self, operation: &str) -> String {
        format!("{}{operation}", self.base_url)
    }

    /// GET `operation` with `params`, returning the raw body of a 2xx response.
    fn get(&self, operation: &str, params: &[(&str, String)]) -> Result<String, DataError> {
        let url = self.url(operation);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                warn!(%url, attempt, ?delay, "retrying upstream request");
                std::thread::sleep(delay);
            }

            self.pacer.wait();
            debug!(%url, ?params, "GET");

            let resp = match self.client.get(&url).query(params).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(DataError::Network(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::Network(e.to_string())),
            };

            let status = resp.status();
            let body = resp
                .text()
                .map_err(|e| DataError::Network(format!("failed to read body: {e}")))?;

            if status.is_success() {
                return Ok(body);
            }

            let err = DataError::Http {
                status: status.as_u16(),
                body,
            };
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_error.unwrap_or_else(|| DataError::Network("max retries exceeded".into())))
    }
}

/// Split a response body into its list elements, rejecting anything else.
fn expect_list(body: &str) -> Result<Vec<Value>, DataError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| DataError::ResponseFormat(format!("invalid JSON: {e}")))?;
    match value {
        Value::Array(items) => Ok(items),
        other => Err(DataError::NotAList(other.to_string())),
    }
}

/// Parse a `/trade/bucketed` body into bars, dropping the per-row symbol.
pub(crate) fn parse_bucket_page(body: &str) -> Result<Vec<Bar>, DataError> {
    expect_list(body)?
        .into_iter()
        .map(|item| {
            serde_json::from_value::<BucketRow>(item)
                .map(Bar::from)
                .map_err(|e| DataError::ResponseFormat(format!("bucket row: {e}")))
        })
        .collect()
}

/// Parse an `/instrument` body, which must hold exactly one element.
pub(crate) fn parse_instrument(symbol: &str, body: &str) -> Result<InstrumentInfo, DataError> {
    let mut items = expect_list(body)?;
    match items.len() {
        0 => {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
        }
        1 => {}
        n => {
            return Err(DataError::UnexpectedShape(format!(
                "expected 1 instrument for {symbol}, got {n}"
            )))
        }
    }

    let row: InstrumentRow = serde_json::from_value(items.remove(0))
        .map_err(|e| DataError::ResponseFormat(format!("instrument row: {e}")))?;

    Ok(InstrumentInfo {
        symbol: row.symbol,
        root_symbol: row.root_symbol,
        underlying: row.underlying,
        expiry: row.expiry,
        settle: row.settle,
        tick_size: row.tick_size,
        lot_size: row.lot_size,
    })
}

fn wire_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl BarSource for BitmexClient {
    fn name(&self) -> &str {
        "bitmex"
    }

    fn fetch_page(
        &self,
        symbol: &str,
        bin_size: BinSize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<Bar>, DataError> {
        let params = [
            ("binSize", bin_size.as_str().to_string()),
            ("count", count.to_string()),
            ("symbol", symbol.to_string()),
            ("startTime", wire_time(start)),
            ("endTime", wire_time(end)),
        ];
        let body = self.get("/trade/bucketed", &params)?;
        parse_bucket_page(&body)
    }

    fn fetch_instrument(&self, symbol: &str) -> Result<InstrumentInfo, DataError> {
        let body = self.get("/instrument", &[("symbol", symbol.to_string())])?;
        parse_instrument(symbol, &body)
    }
}
