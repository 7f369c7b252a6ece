//! Bar table schema and conversions between `Bar` slices and Polars frames.
//!
//! Timestamps are stored as millisecond datetimes without a zone attached;
//! every value is UTC. There is no `symbol` column: a table belongs to one sid
//! or one cache key.

use super::provider::DataError;
use crate::domain::Bar;
use chrono::{DateTime, Utc};
use polars::prelude::*;

pub const TIMESTAMP: &str = "timestamp";

/// Expected schema for bar tables.
pub struct BarSchema;

impl BarSchema {
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new(TIMESTAMP.into(), DataType::Datetime(TimeUnit::Milliseconds, None)),
            Field::new("open".into(), DataType::Float64),
            Field::new("high".into(), DataType::Float64),
            Field::new("low".into(), DataType::Float64),
            Field::new("close".into(), DataType::Float64),
            Field::new("volume".into(), DataType::UInt64),
            Field::new("trades".into(), DataType::UInt64),
            Field::new("vwap".into(), DataType::Float64),
            Field::new("last_size".into(), DataType::UInt64),
            Field::new("turnover".into(), DataType::UInt64),
            Field::new("home_notional".into(), DataType::Float64),
            Field::new("foreign_notional".into(), DataType::Float64),
        ])
    }

    /// Validate a DataFrame against the bar schema.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        if actual.contains("symbol") {
            return Err(SchemaError::UnexpectedColumn("symbol".into()));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("unexpected column: {0}")]
    UnexpectedColumn(String),

    #[error("type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}

impl From<SchemaError> for DataError {
    fn from(e: SchemaError) -> Self {
        DataError::Parquet(e.to_string())
    }
}

fn polars_err(context: &'static str) -> impl Fn(PolarsError) -> DataError {
    move |e| DataError::Parquet(format!("{context}: {e}"))
}

/// Convert bars to a DataFrame in the bar schema.
pub fn bars_to_frame(bars: &[Bar]) -> Result<DataFrame, DataError> {
    let timestamps: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_millis()).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();
    let trades: Vec<u64> = bars.iter().map(|b| b.trades).collect();
    let vwaps: Vec<Option<f64>> = bars.iter().map(|b| b.vwap).collect();
    let last_sizes: Vec<Option<u64>> = bars.iter().map(|b| b.last_size).collect();
    let turnovers: Vec<u64> = bars.iter().map(|b| b.turnover).collect();
    let home: Vec<Option<f64>> = bars.iter().map(|b| b.home_notional).collect();
    let foreign: Vec<Option<f64>> = bars.iter().map(|b| b.foreign_notional).collect();

    DataFrame::new(vec![
        Column::new(TIMESTAMP.into(), timestamps)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(polars_err("timestamp cast"))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("trades".into(), trades),
        Column::new("vwap".into(), vwaps),
        Column::new("last_size".into(), last_sizes),
        Column::new("turnover".into(), turnovers),
        Column::new("home_notional".into(), home),
        Column::new("foreign_notional".into(), foreign),
    ])
    .map_err(polars_err("dataframe creation"))
}

/// Convert a DataFrame in the bar schema back to bars.
pub fn frame_to_bars(df: &DataFrame) -> Result<Vec<Bar>, DataError> {
    BarSchema::validate(df)?;

    let ts_col = df
        .column(TIMESTAMP)
        .and_then(|c| c.cast(&DataType::Int64))
        .map_err(polars_err("timestamp column"))?;
    let ts = ts_col.i64().map_err(polars_err("timestamp column type"))?;

    let f64_col = |name: &str| -> Result<Float64Chunked, DataError> {
        df.column(name)
            .and_then(|c| c.f64().cloned())
            .map_err(|e| DataError::Parquet(format!("{name} column: {e}")))
    };
    let u64_col = |name: &str| -> Result<UInt64Chunked, DataError> {
        df.column(name)
            .and_then(|c| c.u64().cloned())
            .map_err(|e| DataError::Parquet(format!("{name} column: {e}")))
    };

    let open = f64_col("open")?;
    let high = f64_col("high")?;
    let low = f64_col("low")?;
    let close = f64_col("close")?;
    let volume = u64_col("volume")?;
    let trades = u64_col("trades")?;
    let vwap = f64_col("vwap")?;
    let last_size = u64_col("last_size")?;
    let turnover = u64_col("turnover")?;
    let home = f64_col("home_notional")?;
    let foreign = f64_col("foreign_notional")?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        let millis = ts
            .get(i)
            .ok_or_else(|| DataError::Parquet(format!("null timestamp at row {i}")))?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| DataError::Parquet(format!("timestamp out of range at row {i}")))?;

        bars.push(Bar {
            timestamp,
            open: open.get(i).unwrap_or(f64::NAN),
            high: high.get(i).unwrap_or(f64::NAN),
            low: low.get(i).unwrap_or(f64::NAN),
            close: close.get(i).unwrap_or(f64::NAN),
            volume: volume.get(i).unwrap_or(0),
            trades: trades.get(i).unwrap_or(0),
            vwap: vwap.get(i),
            last_size: last_size.get(i),
            turnover: turnover.get(i).unwrap_or(0),
            home_notional: home.get(i),
            foreign_notional: foreign.get(i),
        });
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(minute: u32, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2019, 1, 1, 0, minute, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10,
            trades: 2,
            vwap: if minute % 2 == 0 { Some(close) } else { None },
            last_size: None,
            turnover: 1000,
            home_notional: Some(0.1),
            foreign_notional: None,
        }
    }

    #[test]
    fn frame_matches_schema() {
        let df = bars_to_frame(&[bar(0, 100.0), bar(1, 101.0)]).unwrap();
        BarSchema::validate(&df).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 12);
        assert!(df.column("symbol").is_err());
    }

    #[test]
    fn nullable_fields_survive_conversion() {
        let bars = vec![bar(0, 100.0), bar(1, 101.0)];
        let back = frame_to_bars(&bars_to_frame(&bars).unwrap()).unwrap();
        assert_eq!(back, bars);
    }

    #[test]
    fn validate_rejects_missing_column() {
        let df = bars_to_frame(&[bar(0, 100.0)]).unwrap().drop("turnover").unwrap();
        assert!(matches!(
            BarSchema::validate(&df),
            Err(SchemaError::MissingColumn(c)) if c == "turnover"
        ));
    }

    #[test]
    fn validate_rejects_symbol_column() {
        let mut df = bars_to_frame(&[bar(0, 100.0)]).unwrap();
        df.with_column(Column::new("symbol".into(), &["XBTUSD"]))
            .unwrap();
        assert!(matches!(
            BarSchema::validate(&df),
            Err(SchemaError::UnexpectedColumn(_))
        ));
    }

    #[test]
    fn validate_rejects_wrong_type() {
        let mut df = bars_to_frame(&[bar(0, 100.0)]).unwrap();
        df.with_column(Column::new("volume".into(), &[1.5f64]))
            .unwrap();
        assert!(matches!(
            BarSchema::validate(&df),
            Err(SchemaError::TypeMismatch { .. })
        ));
    }
}
