//! Asset and exchange tables for the bundle.

use super::provider::{BarSource, DataError};
use crate::domain::{InstrumentInfo, Sid};
use polars::prelude::*;
use tracing::debug;

pub const EXCHANGE: &str = "bitmex";
pub const EXCHANGE_TIMEZONE: &str = "UTC";

/// Fetch instrument metadata for every sid and build the asset table.
///
/// The symbol column holds the requested symbol, whatever the upstream echoes.
pub fn build_asset_table(
    sid_map: &[(Sid, String)],
    source: &dyn BarSource,
) -> Result<DataFrame, DataError> {
    let mut instruments = Vec::with_capacity(sid_map.len());
    for (sid, symbol) in sid_map {
        let info = source.fetch_instrument(symbol)?;
        debug!(sid, %symbol, echoed = %info.symbol, root = %info.root_symbol, "instrument metadata");
        instruments.push((
            *sid,
            InstrumentInfo {
                symbol: symbol.clone(),
                ..info
            },
        ));
    }
    asset_table(&instruments)
}

/// Asset table: one row per sid.
///
/// Columns: sid, symbol, root_symbol, asset_name, expiration_date,
/// auto_close_date, tick_size, multiplier, exchange.
pub fn asset_table(instruments: &[(Sid, InstrumentInfo)]) -> Result<DataFrame, DataError> {
    let sids: Vec<u32> = instruments.iter().map(|(sid, _)| *sid).collect();
    let symbols: Vec<&str> = instruments.iter().map(|(_, i)| i.symbol.as_str()).collect();
    let roots: Vec<&str> = instruments
        .iter()
        .map(|(_, i)| i.root_symbol.as_str())
        .collect();
    let names: Vec<&str> = instruments
        .iter()
        .map(|(_, i)| i.underlying.as_str())
        .collect();
    let expiries: Vec<Option<i64>> = instruments
        .iter()
        .map(|(_, i)| i.expiry.map(|t| t.timestamp_millis()))
        .collect();
    let settles: Vec<Option<i64>> = instruments
        .iter()
        .map(|(_, i)| i.settle.map(|t| t.timestamp_millis()))
        .collect();
    let ticks: Vec<f64> = instruments.iter().map(|(_, i)| i.tick_size).collect();
    let multipliers: Vec<f64> = instruments.iter().map(|(_, i)| i.lot_size).collect();
    let exchanges: Vec<&str> = vec![EXCHANGE; instruments.len()];

    let datetime = DataType::Datetime(TimeUnit::Milliseconds, None);
    let map_err = |e: PolarsError| DataError::Parquet(format!("asset table: {e}"));

    DataFrame::new(vec![
        Column::new("sid".into(), sids),
        Column::new("symbol".into(), symbols),
        Column::new("root_symbol".into(), roots),
        Column::new("asset_name".into(), names),
        Column::new("expiration_date".into(), expiries)
            .cast(&datetime)
            .map_err(map_err)?,
        Column::new("auto_close_date".into(), settles)
            .cast(&datetime)
            .map_err(map_err)?,
        Column::new("tick_size".into(), ticks),
        Column::new("multiplier".into(), multipliers),
        Column::new("exchange".into(), exchanges),
    ])
    .map_err(map_err)
}

/// Exchange → timezone table.
pub fn exchange_table() -> Result<DataFrame, DataError> {
    df!(
        "exchange" => &[EXCHANGE],
        "timezone" => &[EXCHANGE_TIMEZONE],
    )
    .map_err(|e| DataError::Parquet(format!("exchange table: {e}")))
}
