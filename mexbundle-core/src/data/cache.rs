//! Series cache: an explicit key-value store of bar series.
//!
//! The fetcher receives a `SeriesStore` by dependency injection and only ever
//! calls `get` and `put`. Two implementations:
//! - `MemoryStore` for a single process (and tests)
//! - `ParquetStore`, durable across runs
//!
//! ParquetStore layout: `{cache_dir}/symbol={SYMBOL}/{bin}.parquet` with a
//! `{bin}.meta.json` sidecar (range, bar count, BLAKE3 hash). Writes are
//! atomic (write to .tmp, rename into place); a corrupt file is quarantined
//! as `{bin}.parquet.quarantined` and read as a miss.

use super::provider::DataError;
use super::schema::{bars_to_frame, frame_to_bars};
use crate::domain::{Bar, BinSize, SeriesKey};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Key-value store of bar series, keyed by symbol and bin size.
pub trait SeriesStore {
    /// Bars stored under `key`, or `None` if the key was never written.
    fn get(&self, key: &SeriesKey) -> Result<Option<Vec<Bar>>, DataError>;

    /// Replace the bars stored under `key`.
    fn put(&mut self, key: &SeriesKey, bars: &[Bar]) -> Result<(), DataError>;
}

/// In-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<SeriesKey, Vec<Bar>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SeriesStore for MemoryStore {
    fn get(&self, key: &SeriesKey) -> Result<Option<Vec<Bar>>, DataError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &SeriesKey, bars: &[Bar]) -> Result<(), DataError> {
        self.entries.insert(key.clone(), bars.to_vec());
        Ok(())
    }
}

/// Metadata sidecar for one cached series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub symbol: String,
    pub bin_size: BinSize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub bar_count: usize,
    pub data_hash: String,
    pub cached_at: DateTime<Utc>,
}

/// Durable store backed by one Parquet file per series.
pub struct ParquetStore {
    cache_dir: PathBuf,
}

impl ParquetStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// `{cache_dir}/symbol={SYMBOL}/`
    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.cache_dir.join(format!("symbol={symbol}"))
    }

    /// `{cache_dir}/symbol={SYMBOL}/{bin}.parquet`
    pub fn series_path(&self, key: &SeriesKey) -> PathBuf {
        self.symbol_dir(&key.symbol)
            .join(format!("{}.parquet", key.bin_size))
    }

    fn meta_path(&self, key: &SeriesKey) -> PathBuf {
        self.symbol_dir(&key.symbol)
            .join(format!("{}.meta.json", key.bin_size))
    }

    /// Metadata for a cached series, if present and readable.
    pub fn get_meta(&self, key: &SeriesKey) -> Option<SeriesMeta> {
        let content = fs::read_to_string(self.meta_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Metadata for every cached series, sorted by symbol then bin size.
    pub fn status(&self) -> Result<Vec<SeriesMeta>, DataError> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }

        let mut metas = Vec::new();
        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| DataError::Cache(format!("read dir: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| DataError::Cache(format!("dir entry: {e}")))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(symbol) = name.strip_prefix("symbol=") else {
                continue;
            };
            for bin in BinSize::ALL {
                if let Some(meta) = self.get_meta(&SeriesKey::new(symbol, bin)) {
                    metas.push(meta);
                }
            }
        }

        metas.sort_by(|a, b| (&a.symbol, a.bin_size).cmp(&(&b.symbol, b.bin_size)));
        Ok(metas)
    }

    /// Drop one cached series. Returns true if anything was removed.
    pub fn remove(&self, key: &SeriesKey) -> Result<bool, DataError> {
        let mut removed = false;
        for path in [self.series_path(key), self.meta_path(key)] {
            if path.exists() {
                fs::remove_file(&path)
                    .map_err(|e| DataError::Cache(format!("remove {}: {e}", path.display())))?;
                removed = true;
            }
        }
        Ok(removed)
    }

    /// Drop every cached series of a symbol. Returns true if anything was removed.
    pub fn clear_symbol(&self, symbol: &str) -> Result<bool, DataError> {
        let dir = self.symbol_dir(symbol);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)
            .map_err(|e| DataError::Cache(format!("remove {}: {e}", dir.display())))?;
        Ok(true)
    }

    fn quarantine(&self, path: &Path, reason: &DataError) {
        let target = path.with_extension("parquet.quarantined");
        warn!(
            path = %path.display(),
            error = %reason,
            "quarantining corrupt cache file"
        );
        if let Err(e) = fs::rename(path, &target) {
            warn!(
                path = %path.display(),
                error = %e,
                "failed to quarantine cache file, it will be read again next run"
            );
        }
    }
}

impl SeriesStore for ParquetStore {
    fn get(&self, key: &SeriesKey) -> Result<Option<Vec<Bar>>, DataError> {
        let path = self.series_path(key);
        if !path.exists() {
            return Ok(None);
        }

        match read_parquet(&path).and_then(|df| frame_to_bars(&df)) {
            Ok(bars) => {
                debug!(%key, bars = bars.len(), "cache hit");
                Ok(Some(bars))
            }
            Err(e) => {
                self.quarantine(&path, &e);
                let meta_path = self.meta_path(key);
                if let Err(e) = fs::remove_file(&meta_path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %meta_path.display(), error = %e, "failed to remove stale meta");
                    }
                }
                Ok(None)
            }
        }
    }

    fn put(&mut self, key: &SeriesKey, bars: &[Bar]) -> Result<(), DataError> {
        let sym_dir = self.symbol_dir(&key.symbol);
        fs::create_dir_all(&sym_dir)
            .map_err(|e| DataError::Cache(format!("failed to create dir: {e}")))?;

        let mut df = bars_to_frame(bars)?;
        let path = self.series_path(key);
        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::Cache(format!("atomic rename failed: {e}"))
        })?;

        let meta = SeriesMeta {
            symbol: key.symbol.clone(),
            bin_size: key.bin_size,
            first: bars.first().map(|b| b.timestamp),
            last: bars.last().map(|b| b.timestamp),
            bar_count: bars.len(),
            data_hash: hash_file(&path)?,
            cached_at: Utc::now(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::Cache(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(key), meta_json)
            .map_err(|e| DataError::Cache(format!("meta write: {e}")))?;

        debug!(%key, bars = bars.len(), "cache write");
        Ok(())
    }
}

/// BLAKE3 of a file's bytes, hex encoded.
pub fn hash_file(path: &Path) -> Result<String, DataError> {
    let bytes = fs::read(path)
        .map_err(|e| DataError::Cache(format!("read back {}: {e}", path.display())))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

pub(crate) fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::Parquet(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

pub(crate) fn read_parquet(path: &Path) -> Result<DataFrame, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::Parquet(format!("open: {e}")))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::Parquet(format!("read: {e}")))
}
