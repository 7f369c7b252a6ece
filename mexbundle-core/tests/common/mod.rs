//! In-process upstream stub shared by the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use mexbundle_core::data::{BarSource, DataError};
use mexbundle_core::domain::{Bar, BinSize, InstrumentInfo};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// One recorded `fetch_page` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub symbol: String,
    pub bin_size: BinSize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: usize,
}

/// Serves pre-generated series the way the bucketed endpoint does:
/// ascending, `start <= ts <= end`, at most `count` rows.
#[derive(Default)]
pub struct StubSource {
    series: BTreeMap<(String, BinSize), Vec<Bar>>,
    instruments: BTreeMap<String, InstrumentInfo>,
    /// Fail any page request starting before this instant.
    reject_before: Option<DateTime<Utc>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: &str, bin_size: BinSize, bars: Vec<Bar>) -> Self {
        self.instruments
            .entry(symbol.to_string())
            .or_insert_with(|| perpetual(symbol));
        self.series.insert((symbol.to_string(), bin_size), bars);
        self
    }

    /// Serve `info` for `symbol`, whatever symbol it carries.
    pub fn with_instrument(mut self, symbol: &str, info: InstrumentInfo) -> Self {
        self.instruments.insert(symbol.to_string(), info);
        self
    }

    pub fn rejecting_before(mut self, t: DateTime<Utc>) -> Self {
        self.reject_before = Some(t);
        self
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl BarSource for StubSource {
    fn name(&self) -> &str {
        "stub"
    }

    fn fetch_page(
        &self,
        symbol: &str,
        bin_size: BinSize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<Bar>, DataError> {
        self.requests.lock().unwrap().push(PageRequest {
            symbol: symbol.to_string(),
            bin_size,
            start,
            end,
            count,
        });

        if let Some(limit) = self.reject_before {
            if start < limit {
                return Err(DataError::InvalidRange(format!(
                    "stub refuses {start}, already cached up to {limit}"
                )));
            }
        }

        let bars = self
            .series
            .get(&(symbol.to_string(), bin_size))
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= start && b.timestamp <= end)
                    .take(count)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(bars)
    }

    fn fetch_instrument(&self, symbol: &str) -> Result<InstrumentInfo, DataError> {
        self.instruments
            .get(symbol)
            .cloned()
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }
}

/// Hands out fixed pages in order, then empty pages. Ignores the request.
pub struct ScriptedSource {
    pages: Mutex<VecDeque<Vec<Bar>>>,
    calls: Mutex<usize>,
}

impl ScriptedSource {
    pub fn new(pages: Vec<Vec<Bar>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl BarSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch_page(
        &self,
        _symbol: &str,
        _bin_size: BinSize,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _count: usize,
    ) -> Result<Vec<Bar>, DataError> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    fn fetch_instrument(&self, symbol: &str) -> Result<InstrumentInfo, DataError> {
        Ok(perpetual(symbol))
    }
}

pub fn perpetual(symbol: &str) -> InstrumentInfo {
    InstrumentInfo {
        symbol: symbol.to_string(),
        root_symbol: symbol.chars().take(3).collect(),
        underlying: symbol.chars().take(3).collect(),
        expiry: None,
        settle: None,
        tick_size: 0.5,
        lot_size: 1.0,
    }
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn bar(timestamp: DateTime<Utc>, close: f64) -> Bar {
    Bar {
        timestamp,
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 100,
        trades: 10,
        vwap: Some(close),
        last_size: Some(1),
        turnover: 1_000,
        home_notional: Some(0.1),
        foreign_notional: None,
    }
}

/// `n` consecutive bars starting at `from`, closes 0, 1, 2 and so on.
pub fn series(bin_size: BinSize, from: DateTime<Utc>, n: usize) -> Vec<Bar> {
    let step: Duration = bin_size.duration();
    (0..n)
        .map(|i| bar(from + step * i as i32, i as f64))
        .collect()
}
