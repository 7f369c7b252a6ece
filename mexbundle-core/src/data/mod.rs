//! Data layer: upstream client, series cache, fetch loop and bundle inputs.

pub mod bitmex;
pub mod cache;
pub mod coverage;
pub mod fetcher;
pub mod ingest;
pub mod metadata;
pub mod pacer;
pub mod provider;
pub mod schema;

pub use bitmex::BitmexClient;
pub use cache::{MemoryStore, ParquetStore, SeriesMeta, SeriesStore};
pub use coverage::{check_coverage, CoverageReport};
pub use fetcher::{IncrementalBarFetcher, DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};
pub use ingest::{ingest, IngestRequest, IngestSummary};
pub use provider::{BarSource, DataError, IngestProgress, NoProgress, StdoutProgress};
pub use schema::{bars_to_frame, frame_to_bars, BarSchema};
