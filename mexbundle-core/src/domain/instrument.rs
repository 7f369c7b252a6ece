use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Instrument metadata as reported by the exchange's instrument endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentInfo {
    pub symbol: String,
    pub root_symbol: String,
    /// Underlying asset, used as the asset name.
    pub underlying: String,
    /// Expiry; `None` for perpetual swaps.
    pub expiry: Option<DateTime<Utc>>,
    /// Settlement time; `None` for perpetual swaps.
    pub settle: Option<DateTime<Utc>>,
    pub tick_size: f64,
    pub lot_size: f64,
}
