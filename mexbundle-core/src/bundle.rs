//! Bundle output: the tables a backtest engine reads.
//!
//! Layout written by [`ParquetBundleWriter`]:
//!
//! ```text
//! {output_dir}/assets.parquet
//! {output_dir}/exchanges.parquet
//! {output_dir}/minute/sid={sid}.parquet
//! {output_dir}/daily/sid={sid}.parquet
//! {output_dir}/manifest.json
//! ```

use crate::data::cache::{hash_file, write_parquet};
use crate::data::provider::DataError;
use crate::domain::{BinSize, Sid};
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lazy `(sid, bar table)` sequence handed to a writer.
pub type BarTables<'a> = dyn Iterator<Item = Result<(Sid, DataFrame), DataError>> + 'a;

/// Downstream storage for an ingestion run.
pub trait BundleWriter {
    fn write_assets(&mut self, assets: DataFrame, exchanges: DataFrame) -> Result<(), DataError>;

    /// Drain `tables`, writing each one. Stops at the first error.
    /// Returns the number of rows written.
    fn write_bars(&mut self, bin_size: BinSize, tables: &mut BarTables<'_>) -> Result<usize, DataError>;

    /// Seal the bundle. Returns the manifest as written.
    fn finish(&mut self, manifest: BundleManifest) -> Result<BundleManifest, DataError>;
}

/// One table file in the bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Path relative to the bundle root.
    pub path: String,
    pub rows: usize,
    /// BLAKE3 of the file bytes.
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub calendar: String,
    pub start_session: NaiveDate,
    pub end_session: NaiveDate,
    pub sids: BTreeMap<Sid, String>,
    pub tables: Vec<TableEntry>,
    pub created_at: DateTime<Utc>,
}

impl BundleManifest {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let content = fs::read_to_string(path)
            .map_err(|e| DataError::Cache(format!("read manifest {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| DataError::Cache(format!("parse manifest: {e}")))
    }
}

/// Writes the bundle as Parquet files under one directory.
pub struct ParquetBundleWriter {
    root: PathBuf,
    tables: Vec<TableEntry>,
}

impl ParquetBundleWriter {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, DataError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| DataError::Cache(format!("create {}: {e}", root.display())))?;
        Ok(Self {
            root,
            tables: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    fn write_table(&mut self, relative: &str, mut df: DataFrame) -> Result<usize, DataError> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DataError::Cache(format!("create {}: {e}", parent.display())))?;
        }

        let tmp = path.with_extension("parquet.tmp");
        write_parquet(&mut df, &tmp)?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            DataError::Cache(format!("atomic rename failed: {e}"))
        })?;

        let hash = hash_file(&path)?;
        let rows = df.height();
        self.tables.retain(|t| t.path != relative);
        self.tables.push(TableEntry {
            path: relative.to_string(),
            rows,
            hash,
        });
        debug!(table = relative, rows, "wrote table");
        Ok(rows)
    }
}

impl BundleWriter for ParquetBundleWriter {
    fn write_assets(&mut self, assets: DataFrame, exchanges: DataFrame) -> Result<(), DataError> {
        self.write_table("assets.parquet", assets)?;
        self.write_table("exchanges.parquet", exchanges)?;
        Ok(())
    }

    fn write_bars(&mut self, bin_size: BinSize, tables: &mut BarTables<'_>) -> Result<usize, DataError> {
        let mut rows = 0;
        for item in tables {
            let (sid, df) = item?;
            let relative = format!("{}/sid={sid}.parquet", bin_size.table_dir());
            rows += self.write_table(&relative, df)?;
        }
        Ok(rows)
    }

    fn finish(&mut self, mut manifest: BundleManifest) -> Result<BundleManifest, DataError> {
        manifest.tables = self.tables.clone();
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| DataError::Cache(format!("manifest serialization: {e}")))?;
        fs::write(self.manifest_path(), json)
            .map_err(|e| DataError::Cache(format!("manifest write: {e}")))?;
        Ok(manifest)
    }
}

/// Keeps every table in memory. Used where the caller wants the frames
/// rather than files.
#[derive(Debug, Default)]
pub struct MemoryBundle {
    pub assets: Option<DataFrame>,
    pub exchanges: Option<DataFrame>,
    pub minute: BTreeMap<Sid, DataFrame>,
    pub daily: BTreeMap<Sid, DataFrame>,
    pub manifest: Option<BundleManifest>,
}

impl MemoryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bars(&self, bin_size: BinSize) -> &BTreeMap<Sid, DataFrame> {
        match bin_size {
            BinSize::OneMinute => &self.minute,
            BinSize::OneDay => &self.daily,
        }
    }
}

impl BundleWriter for MemoryBundle {
    fn write_assets(&mut self, assets: DataFrame, exchanges: DataFrame) -> Result<(), DataError> {
        self.assets = Some(assets);
        self.exchanges = Some(exchanges);
        Ok(())
    }

    fn write_bars(&mut self, bin_size: BinSize, tables: &mut BarTables<'_>) -> Result<usize, DataError> {
        let mut rows = 0;
        for item in tables {
            let (sid, df) = item?;
            rows += df.height();
            match bin_size {
                BinSize::OneMinute => self.minute.insert(sid, df),
                BinSize::OneDay => self.daily.insert(sid, df),
            };
        }
        Ok(rows)
    }

    fn finish(&mut self, manifest: BundleManifest) -> Result<BundleManifest, DataError> {
        self.manifest = Some(manifest.clone());
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::read_parquet;
    use crate::data::metadata::exchange_table;
    use polars::prelude::*;

    fn manifest() -> BundleManifest {
        BundleManifest {
            calendar: "bitmex".into(),
            start_session: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            end_session: NaiveDate::from_ymd_opt(2019, 1, 4).unwrap(),
            sids: BTreeMap::from([(0, "XBTUSD".to_string())]),
            tables: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn tiny_frame(rows: usize) -> DataFrame {
        df!("close" => vec![1.0f64; rows]).unwrap()
    }

    #[test]
    fn parquet_writer_layout_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ParquetBundleWriter::new(dir.path()).unwrap();

        writer
            .write_assets(tiny_frame(1), exchange_table().unwrap())
            .unwrap();
        let mut tables = vec![Ok((0, tiny_frame(3))), Ok((1, tiny_frame(2)))].into_iter();
        assert_eq!(writer.write_bars(BinSize::OneDay, &mut tables).unwrap(), 5);

        let written = writer.finish(manifest()).unwrap();

        assert!(dir.path().join("assets.parquet").exists());
        assert!(dir.path().join("exchanges.parquet").exists());
        assert!(dir.path().join("daily/sid=0.parquet").exists());
        assert!(dir.path().join("daily/sid=1.parquet").exists());
        assert_eq!(written.tables.len(), 4);

        let loaded = BundleManifest::load(&writer.manifest_path()).unwrap();
        assert_eq!(loaded, written);

        let back = read_parquet(&dir.path().join("daily/sid=0.parquet")).unwrap();
        assert_eq!(back.height(), 3);
    }

    #[test]
    fn write_bars_stops_at_first_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ParquetBundleWriter::new(dir.path()).unwrap();
        let mut tables = vec![
            Ok((0, tiny_frame(1))),
            Err(DataError::NotAList("{}".into())),
            Ok((2, tiny_frame(1))),
        ]
        .into_iter();

        assert!(writer.write_bars(BinSize::OneMinute, &mut tables).is_err());
        assert!(dir.path().join("minute/sid=0.parquet").exists());
        assert!(!dir.path().join("minute/sid=2.parquet").exists());
    }

    #[test]
    fn memory_bundle_collects_frames() {
        let mut bundle = MemoryBundle::new();
        let mut tables = vec![Ok((0, tiny_frame(4)))].into_iter();
        assert_eq!(bundle.write_bars(BinSize::OneMinute, &mut tables).unwrap(), 4);
        assert_eq!(bundle.bars(BinSize::OneMinute).len(), 1);
        assert!(bundle.bars(BinSize::OneDay).is_empty());
    }
}
