//! Bucket width of an OHLCV aggregation.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bucket width. Displays and parses as the upstream wire string (`1m`, `1d`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BinSize {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "1d")]
    OneDay,
}

impl BinSize {
    pub const ALL: [BinSize; 2] = [BinSize::OneMinute, BinSize::OneDay];

    /// Wire string used by the upstream API and in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinSize::OneMinute => "1m",
            BinSize::OneDay => "1d",
        }
    }

    /// Width of one bucket.
    pub fn duration(&self) -> Duration {
        match self {
            BinSize::OneMinute => Duration::minutes(1),
            BinSize::OneDay => Duration::days(1),
        }
    }

    /// Directory name used in the bundle layout.
    pub fn table_dir(&self) -> &'static str {
        match self {
            BinSize::OneMinute => "minute",
            BinSize::OneDay => "daily",
        }
    }
}

impl fmt::Display for BinSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown bin size '{0}' (expected 1m or 1d)")]
pub struct ParseBinSizeError(pub String);

impl FromStr for BinSize {
    type Err = ParseBinSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(BinSize::OneMinute),
            "1d" => Ok(BinSize::OneDay),
            other => Err(ParseBinSizeError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_strings() {
        assert_eq!("1m".parse::<BinSize>(), Ok(BinSize::OneMinute));
        assert_eq!("1d".parse::<BinSize>(), Ok(BinSize::OneDay));
        assert!("5m".parse::<BinSize>().is_err());
    }

    #[test]
    fn display_matches_wire_string() {
        for bin in BinSize::ALL {
            assert_eq!(bin.to_string().parse::<BinSize>(), Ok(bin));
        }
    }

    #[test]
    fn durations() {
        assert_eq!(BinSize::OneMinute.duration().num_seconds(), 60);
        assert_eq!(BinSize::OneDay.duration().num_seconds(), 86_400);
    }
}
