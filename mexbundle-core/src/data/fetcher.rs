//! Incremental, resumable bar fetching.
//!
//! `IncrementalBarFetcher::fetch` pages through the upstream for one
//! (symbol, bin size) series and merges every page into the series cache, so
//! a second call with the same cache only asks for what it does not have yet.
//!
//! The last cached bar is provisional: its bucket may still have been open
//! when it was fetched. Resuming always starts at that bar's timestamp, and
//! the fresh copy replaces the cached one.

use super::cache::SeriesStore;
use super::provider::{BarSource, DataError};
use crate::domain::{Bar, BinSize, SeriesKey};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Page size the exchange accepted when this loop was written.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Each page repeats the cursor bar, so a single-row page never advances.
pub const MIN_PAGE_SIZE: usize = 2;

pub struct IncrementalBarFetcher<'a> {
    source: &'a dyn BarSource,
    page_size: usize,
}

impl<'a> IncrementalBarFetcher<'a> {
    pub fn new(source: &'a dyn BarSource, page_size: usize) -> Self {
        Self { source, page_size }
    }

    /// Bring the cached series for `symbol`/`bin_size` up to `range_end` and
    /// return the full cached sequence.
    ///
    /// The result may extend outside `[range_start, range_end]` when the
    /// cache already held older bars; use [`window`] to slice it.
    pub fn fetch(
        &self,
        symbol: &str,
        bin_size: BinSize,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        store: &mut dyn SeriesStore,
    ) -> Result<Vec<Bar>, DataError> {
        if range_start > range_end {
            return Err(DataError::InvalidRange(format!(
                "{range_start} is after {range_end}"
            )));
        }
        if self.page_size < MIN_PAGE_SIZE {
            return Err(DataError::InvalidRange(format!(
                "page size must be at least {MIN_PAGE_SIZE}: pages overlap by the provisional bar"
            )));
        }

        let key = SeriesKey::new(symbol, bin_size);
        let mut bars = store.get(&key)?.unwrap_or_default();
        let mut pages = 0usize;

        loop {
            let cursor = match bars.last() {
                Some(last) if last.timestamp >= range_end => break,
                Some(last) => last.timestamp,
                None => range_start,
            };

            debug!(%key, %cursor, %range_end, count = self.page_size, "requesting page");
            let page = self
                .source
                .fetch_page(symbol, bin_size, cursor, range_end, self.page_size)?;
            pages += 1;

            if page.is_empty() {
                debug!(%key, %cursor, "upstream exhausted");
                break;
            }

            merge_page(&mut bars, page);
            store.put(&key, &bars)?;

            match bars.last() {
                Some(last) if last.timestamp > cursor => {}
                _ => {
                    debug!(%key, %cursor, "page did not advance the cursor");
                    break;
                }
            }
        }

        info!(
            %key,
            bars = bars.len(),
            pages,
            last = ?bars.last().map(|b| b.timestamp),
            "series up to date"
        );
        Ok(bars)
    }
}

/// Merge a freshly fetched page into a cached series.
///
/// Every cached bar at or after the page's first timestamp is replaced; the
/// page itself is sorted and deduplicated with the later occurrence winning.
/// The result stays strictly ordered.
pub fn merge_page(bars: &mut Vec<Bar>, mut page: Vec<Bar>) {
    page.sort_by_key(|b| b.timestamp);
    // Last occurrence wins: dedup_by keeps the first of a run, so walk reversed.
    page.reverse();
    page.dedup_by_key(|b| b.timestamp);
    page.reverse();

    let Some(first) = page.first().map(|b| b.timestamp) else {
        return;
    };
    let keep = bars.partition_point(|b| b.timestamp < first);
    bars.truncate(keep);
    bars.extend(page);
}

/// Bars with `start <= timestamp <= end`.
pub fn window(bars: &[Bar], start: DateTime<Utc>, end: DateTime<Utc>) -> &[Bar] {
    let lo = bars.partition_point(|b| b.timestamp < start);
    let hi = bars.partition_point(|b| b.timestamp <= end);
    &bars[lo..hi.max(lo)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::is_strictly_ordered;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap()
    }

    fn bar_at(minute: i64, close: f64) -> Bar {
        Bar {
            timestamp: t0() + Duration::minutes(minute),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1,
            trades: 1,
            vwap: None,
            last_size: None,
            turnover: 1,
            home_notional: None,
            foreign_notional: None,
        }
    }

    #[test]
    fn merge_replaces_overlap_with_fresh_values() {
        let mut bars = vec![bar_at(0, 1.0), bar_at(1, 1.0), bar_at(2, 1.0)];
        merge_page(&mut bars, vec![bar_at(2, 9.0), bar_at(3, 9.0)]);

        assert_eq!(bars.len(), 4);
        assert_eq!(bars[2].close, 9.0);
        assert!(is_strictly_ordered(&bars));
    }

    #[test]
    fn merge_keeps_last_duplicate_within_page() {
        let mut bars = Vec::new();
        merge_page(&mut bars, vec![bar_at(1, 1.0), bar_at(0, 0.0), bar_at(1, 2.0)]);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 2.0);
    }

    #[test]
    fn merge_of_empty_page_is_a_no_op() {
        let mut bars = vec![bar_at(0, 1.0)];
        merge_page(&mut bars, Vec::new());
        assert_eq!(bars, vec![bar_at(0, 1.0)]);
    }

    #[test]
    fn window_is_inclusive() {
        let bars: Vec<Bar> = (0..10).map(|m| bar_at(m, m as f64)).collect();
        let w = window(&bars, t0() + Duration::minutes(2), t0() + Duration::minutes(5));
        assert_eq!(w.len(), 4);
        assert_eq!(w[0].close, 2.0);
        assert_eq!(w[3].close, 5.0);

        assert!(window(&bars, t0() + Duration::minutes(20), t0() + Duration::minutes(30)).is_empty());
    }

    proptest! {
        #[test]
        fn merge_always_yields_strictly_ordered_series(
            cached in proptest::collection::btree_set(0i64..200, 0..50),
            page in proptest::collection::vec(0i64..200, 0..50),
        ) {
            let mut bars: Vec<Bar> = cached.iter().map(|&m| bar_at(m, 0.0)).collect();
            let page: Vec<Bar> = page.iter().map(|&m| bar_at(m, 1.0)).collect();
            let page_min = page.iter().map(|b| b.timestamp).min();

            merge_page(&mut bars, page);

            prop_assert!(is_strictly_ordered(&bars));
            if let Some(first) = page_min {
                // Nothing older than the page was touched; everything from it on is fresh.
                for b in &bars {
                    if b.timestamp >= first {
                        prop_assert_eq!(b.close, 1.0);
                    } else {
                        prop_assert_eq!(b.close, 0.0);
                    }
                }
            }
        }
    }
}
