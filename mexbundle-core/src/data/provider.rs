//! Upstream source trait, structured error types and progress reporting.
//!
//! The BarSource trait abstracts over the exchange REST API so the fetch loop
//! can be driven by an in-process stub in tests.

use crate::domain::{Bar, BinSize, InstrumentInfo, Sid};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Structured error types for data operations.
///
/// Every variant is fatal for an ingestion run: nothing is retried above the
/// HTTP client and no partial bundle is produced.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("upstream response is not a list: {0}")]
    NotAList(String),

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("coverage check failed: {0}")]
    Coverage(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("calendar error: {0}")]
    Calendar(String),
}

/// A source of OHLCV pages and instrument metadata.
///
/// Implementations only talk to the upstream; the series cache sits above
/// this trait and sources never see it.
pub trait BarSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch at most `count` buckets in `[start, end]`, ascending by timestamp.
    ///
    /// An empty page means the upstream has nothing more in the range.
    fn fetch_page(
        &self,
        symbol: &str,
        bin_size: BinSize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<Bar>, DataError>;

    /// Fetch metadata for exactly one instrument.
    fn fetch_instrument(&self, symbol: &str) -> Result<InstrumentInfo, DataError>;
}

/// Progress callback for multi-symbol ingestion.
pub trait IngestProgress {
    /// Called when a series starts fetching.
    fn on_start(&self, sid: Sid, symbol: &str, bin_size: BinSize, total: usize);

    /// Called when a series has been fetched and checked.
    fn on_complete(&self, sid: Sid, symbol: &str, bin_size: BinSize, rows: usize);

    /// Called once the whole bundle has been written.
    fn on_finish(&self, symbols: usize, minute_rows: usize, daily_rows: usize);
}

/// Simple progress reporter that prints to stdout.
pub struct StdoutProgress;

impl IngestProgress for StdoutProgress {
    fn on_start(&self, sid: Sid, symbol: &str, bin_size: BinSize, total: usize) {
        println!("[{}/{}] Fetching {symbol} {bin_size}...", sid + 1, total);
    }

    fn on_complete(&self, _sid: Sid, symbol: &str, bin_size: BinSize, rows: usize) {
        println!("  OK: {symbol} {bin_size} ({rows} bars)");
    }

    fn on_finish(&self, symbols: usize, minute_rows: usize, daily_rows: usize) {
        println!(
            "\nIngest complete: {symbols} symbol(s), {minute_rows} minute bars, {daily_rows} daily bars"
        );
    }
}

/// Reporter that stays silent.
pub struct NoProgress;

impl IngestProgress for NoProgress {
    fn on_start(&self, _: Sid, _: &str, _: BinSize, _: usize) {}
    fn on_complete(&self, _: Sid, _: &str, _: BinSize, _: usize) {}
    fn on_finish(&self, _: usize, _: usize, _: usize) {}
}
