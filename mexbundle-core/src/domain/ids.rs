//! Identifier types: sids and series cache keys.

use super::BinSize;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Small-integer surrogate id for a symbol within one ingestion run.
pub type Sid = u32;

/// Assign sids by position: the first symbol gets 0, the next 1, and so on.
pub fn assign_sids(symbols: &[String]) -> Vec<(Sid, String)> {
    symbols
        .iter()
        .enumerate()
        .map(|(i, s)| (i as Sid, s.clone()))
        .collect()
}

/// Cache key for one bar series: `{symbol}-{bin_size}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub bin_size: BinSize,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, bin_size: BinSize) -> Self {
        Self {
            symbol: symbol.into(),
            bin_size,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.symbol, self.bin_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display() {
        assert_eq!(SeriesKey::new("XBTUSD", BinSize::OneMinute).to_string(), "XBTUSD-1m");
        assert_eq!(SeriesKey::new("ETHUSD", BinSize::OneDay).to_string(), "ETHUSD-1d");
    }

    #[test]
    fn sids_follow_symbol_order() {
        let sids = assign_sids(&["XBTUSD".into(), "ETHUSD".into()]);
        assert_eq!(sids, vec![(0, "XBTUSD".into()), (1, "ETHUSD".into())]);
    }
}
