//! Ingestion pipeline: symbols in, bundle out.
//!
//! Symbols are processed strictly in order. Asset metadata is written first,
//! then every minute series, then every daily series. Bar tables are produced
//! lazily so the writer holds at most one series in memory.

use super::cache::SeriesStore;
use super::coverage::{check_coverage, enforce};
use super::fetcher::{window, IncrementalBarFetcher};
use super::metadata::{build_asset_table, exchange_table};
use super::provider::{BarSource, DataError, IngestProgress};
use super::schema::bars_to_frame;
use crate::bundle::{BundleManifest, BundleWriter};
use crate::calendar::TradingCalendar;
use crate::config::{ConfigError, CoverageSeverity, IngestConfig};
use crate::domain::{assign_sids, BinSize, SeriesKey, Sid};
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::DataFrame;
use std::slice;
use tracing::info;

/// One ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    pub symbols: Vec<String>,
    /// First session (inclusive).
    pub start: NaiveDate,
    /// Last session (inclusive).
    pub end: NaiveDate,
    pub page_size: usize,
    pub coverage: CoverageSeverity,
}

impl IngestRequest {
    /// Build a request from a validated config. Both session bounds must be set.
    pub fn from_config(config: &IngestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let start = config
            .bundle
            .start
            .ok_or_else(|| ConfigError::Invalid("no start session given".into()))?;
        let end = config
            .bundle
            .end
            .ok_or_else(|| ConfigError::Invalid("no end session given".into()))?;
        Ok(Self {
            symbols: config.bundle.symbols.clone(),
            start,
            end,
            page_size: config.upstream.page_size,
            coverage: config.validation.coverage,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub symbols: usize,
    pub minute_rows: usize,
    pub daily_rows: usize,
    pub manifest: BundleManifest,
}

/// Run a full ingestion into `writer`.
///
/// Any error aborts the run; the writer may hold partial output but no
/// manifest is written.
pub fn ingest(
    request: &IngestRequest,
    source: &dyn BarSource,
    store: &mut dyn SeriesStore,
    writer: &mut dyn BundleWriter,
    calendar: &TradingCalendar,
    progress: &dyn IngestProgress,
) -> Result<IngestSummary, DataError> {
    validate_sessions(request, calendar)?;

    let sid_map = assign_sids(&request.symbols);
    info!(
        source = source.name(),
        symbols = sid_map.len(),
        start = %request.start,
        end = %request.end,
        calendar = %calendar.name,
        "starting ingest"
    );

    let assets = build_asset_table(&sid_map, source)?;
    writer.write_assets(assets, exchange_table()?)?;

    let fetcher = IncrementalBarFetcher::new(source, request.page_size);
    let mut rows = [0usize; 2];
    for (slot, bin_size) in BinSize::ALL.into_iter().enumerate() {
        let mut tables = SeriesTables {
            fetcher: &fetcher,
            store: &mut *store,
            sids: sid_map.iter(),
            total: sid_map.len(),
            bin_size,
            calendar,
            request,
            progress,
            failed: false,
        };
        rows[slot] = writer.write_bars(bin_size, &mut tables)?;
    }
    let [minute_rows, daily_rows] = rows;

    let manifest = writer.finish(BundleManifest {
        calendar: calendar.name.clone(),
        start_session: request.start,
        end_session: request.end,
        sids: sid_map.iter().cloned().collect(),
        tables: Vec::new(),
        created_at: Utc::now(),
    })?;

    progress.on_finish(sid_map.len(), minute_rows, daily_rows);
    info!(minute_rows, daily_rows, "ingest complete");

    Ok(IngestSummary {
        symbols: sid_map.len(),
        minute_rows,
        daily_rows,
        manifest,
    })
}

fn validate_sessions(request: &IngestRequest, calendar: &TradingCalendar) -> Result<(), DataError> {
    if request.start > request.end {
        return Err(DataError::InvalidRange(format!(
            "start session {} is after end session {}",
            request.start, request.end
        )));
    }
    for date in [request.start, request.end] {
        if !calendar.is_session(date) {
            return Err(DataError::Calendar(format!(
                "{date} is not a {} session",
                calendar.name
            )));
        }
    }
    Ok(())
}

/// Instants to fetch for a session range.
///
/// Minute series run from the first session's open to the last minute of the
/// last session; daily series from the first open to the last open.
pub fn fetch_window(
    calendar: &TradingCalendar,
    bin_size: BinSize,
    start: NaiveDate,
    end: NaiveDate,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let from = calendar.session_open(start);
    let to = match bin_size {
        BinSize::OneMinute => calendar.session_close(end),
        BinSize::OneDay => calendar.session_open(end),
    };
    (from, to)
}

/// Lazy `(sid, table)` sequence for one bin size. Fuses after the first error.
struct SeriesTables<'a> {
    fetcher: &'a IncrementalBarFetcher<'a>,
    store: &'a mut dyn SeriesStore,
    sids: slice::Iter<'a, (Sid, String)>,
    total: usize,
    bin_size: BinSize,
    calendar: &'a TradingCalendar,
    request: &'a IngestRequest,
    progress: &'a dyn IngestProgress,
    failed: bool,
}

impl SeriesTables<'_> {
    fn series_table(&mut self, sid: Sid, symbol: &str) -> Result<DataFrame, DataError> {
        self.progress.on_start(sid, symbol, self.bin_size, self.total);

        let (from, to) = fetch_window(self.calendar, self.bin_size, self.request.start, self.request.end);
        let bars = self
            .fetcher
            .fetch(symbol, self.bin_size, from, to, &mut *self.store)?;
        let bars = window(&bars, from, to);

        let key = SeriesKey::new(symbol, self.bin_size);
        if self.request.coverage != CoverageSeverity::Ignore {
            let report = check_coverage(
                bars,
                self.bin_size,
                self.calendar,
                self.request.start,
                self.request.end,
            );
            enforce(&key, &report, self.request.coverage)?;
        }

        let df = bars_to_frame(bars)?;
        self.progress.on_complete(sid, symbol, self.bin_size, df.height());
        Ok(df)
    }
}

impl Iterator for SeriesTables<'_> {
    type Item = Result<(Sid, DataFrame), DataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (sid, symbol) = self.sids.next()?;
        let result = self.series_table(*sid, symbol);
        self.failed = result.is_err();
        Some(result.map(|df| (*sid, df)))
    }
}
