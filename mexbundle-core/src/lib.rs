//! mexbundle core: BitMEX bar ingestion into a backtest bundle.
//!
//! - Domain types (bars, bin sizes, instruments, sids)
//! - Upstream REST client behind the `BarSource` trait
//! - Series cache (`SeriesStore`) with in-memory and Parquet backends
//! - Incremental, resumable fetch loop
//! - Trading calendar and calendar registry
//! - Bundle writer and the ingestion pipeline

pub mod bundle;
pub mod calendar;
pub mod config;
pub mod data;
pub mod domain;
