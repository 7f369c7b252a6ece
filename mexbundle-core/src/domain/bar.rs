//! Bar: one OHLCV trade bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bucket for a single symbol and bin size.
///
/// `timestamp` is the bucket start in UTC. The upstream `symbol` column is not
/// carried: a bar always lives inside a series that already names its symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    /// Number of trades in the bucket.
    pub trades: u64,
    pub vwap: Option<f64>,
    pub last_size: Option<u64>,
    pub turnover: u64,
    pub home_notional: Option<f64>,
    pub foreign_notional: Option<f64>,
}

/// True if `bars` is strictly increasing by timestamp (no duplicates).
pub fn is_strictly_ordered(bars: &[Bar]) -> bool {
    bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_bar() -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(),
            open: 3700.0,
            high: 3750.5,
            low: 3690.0,
            close: 3720.0,
            volume: 1_000_000,
            trades: 420,
            vwap: Some(3721.3),
            last_size: Some(25),
            turnover: 27_000_000_000,
            home_notional: Some(270.0),
            foreign_notional: Some(1_000_000.0),
        }
    }

    #[test]
    fn ordering_rejects_duplicates() {
        let a = sample_bar();
        let b = sample_bar();
        assert!(!is_strictly_ordered(&[a.clone(), b]));

        let mut c = a.clone();
        c.timestamp = a.timestamp + chrono::Duration::minutes(1);
        assert!(is_strictly_ordered(&[a, c]));
    }
}
