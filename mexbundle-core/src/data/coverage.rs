//! Session coverage checks for fetched series.
//!
//! Each session must hold exactly `bars_per_session` bars (1440 for `1m`, one
//! for `1d`) and consecutive bars must be exactly one bucket apart.

use super::provider::DataError;
use crate::calendar::TradingCalendar;
use crate::config::CoverageSeverity;
use crate::domain::{Bar, BinSize, SeriesKey};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::warn;

/// A session whose bar count differs from the calendar's expectation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionShortfall {
    pub session: NaiveDate,
    pub expected: usize,
    pub actual: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    pub expected: usize,
    pub actual: usize,
    pub shortfalls: Vec<SessionShortfall>,
    /// Adjacent bar pairs not exactly one bucket apart.
    pub discontinuities: usize,
    /// Bars whose date is not a session of the range.
    pub stray_bars: usize,
}

impl CoverageReport {
    pub fn is_complete(&self) -> bool {
        self.shortfalls.is_empty() && self.discontinuities == 0 && self.stray_bars == 0
    }

    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} of {} bars", self.actual, self.expected)];
        if let Some(first) = self.shortfalls.first() {
            parts.push(format!(
                "{} short session(s), first {} with {}/{}",
                self.shortfalls.len(),
                first.session,
                first.actual,
                first.expected
            ));
        }
        if self.discontinuities > 0 {
            parts.push(format!("{} gap(s)", self.discontinuities));
        }
        if self.stray_bars > 0 {
            parts.push(format!("{} bar(s) outside sessions", self.stray_bars));
        }
        parts.join(", ")
    }
}

/// Check `bars` (already windowed to `[start, end]`) against the calendar.
pub fn check_coverage(
    bars: &[Bar],
    bin_size: BinSize,
    calendar: &TradingCalendar,
    start: NaiveDate,
    end: NaiveDate,
) -> CoverageReport {
    let per_session = calendar.bars_per_session(bin_size);
    let sessions = calendar.sessions_in_range(start, end);

    let mut counts: BTreeMap<NaiveDate, usize> = sessions.iter().map(|d| (*d, 0)).collect();
    let mut stray_bars = 0;
    for bar in bars {
        match counts.get_mut(&bar.timestamp.date_naive()) {
            Some(n) => *n += 1,
            None => stray_bars += 1,
        }
    }

    let shortfalls = counts
        .iter()
        .filter(|(_, n)| **n != per_session)
        .map(|(d, n)| SessionShortfall {
            session: *d,
            expected: per_session,
            actual: *n,
        })
        .collect();

    let step = bin_size.duration();
    let discontinuities = bars
        .windows(2)
        .filter(|w| {
            let next = w[0].timestamp + step;
            // Skipped non-session days are not gaps.
            calendar.is_session(next.date_naive()) && w[1].timestamp != next
        })
        .count();

    CoverageReport {
        expected: per_session * sessions.len(),
        actual: bars.len(),
        shortfalls,
        discontinuities,
        stray_bars,
    }
}

/// Act on a coverage report according to the configured severity.
pub fn enforce(
    key: &SeriesKey,
    report: &CoverageReport,
    severity: CoverageSeverity,
) -> Result<(), DataError> {
    if report.is_complete() {
        return Ok(());
    }
    match severity {
        CoverageSeverity::Fatal => Err(DataError::Coverage(format!("{key}: {}", report.summary()))),
        CoverageSeverity::Warn => {
            warn!(%key, summary = %report.summary(), "incomplete series");
            Ok(())
        }
        CoverageSeverity::Ignore => Ok(()),
    }
}
