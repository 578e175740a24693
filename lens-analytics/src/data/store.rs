//! Durable table store.
//!
//! Each key maps to one file, `<dir>/<key>.csv`. A put replaces the whole
//! file: the table is written to a temporary file named after the key, the
//! process id and a per-process sequence number, then renamed over the old
//! file. A reader sees either the previous table or the new one, and
//! concurrent writers never share a temporary file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::DataTable;
use crate::error::{AnalyticsError, Result};

/// Keyed storage for whole tables.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Replace the table stored under `key`.
    async fn put(&self, key: &str, table: &DataTable) -> Result<()>;

    /// Read the table stored under `key`, `None` if never written.
    async fn get(&self, key: &str) -> Result<Option<DataTable>>;
}

/// CSV files in a single directory.
#[derive(Debug, Clone)]
pub struct CsvTableStore {
    dir: PathBuf,
}

impl CsvTableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", key))
    }

    /// Unique temporary path for one write of `key`.
    fn temp_path(&self, key: &str) -> PathBuf {
        static SEQUENCE: AtomicU64 = AtomicU64::new(0);
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{}.csv.{}.{}.tmp", key, std::process::id(), seq))
    }

    fn encode(key: &str, table: &DataTable) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&table.header)
            .map_err(|e| AnalyticsError::persistence(key, e))?;
        for row in &table.rows {
            writer
                .write_record(row)
                .map_err(|e| AnalyticsError::persistence(key, e))?;
        }
        writer
            .into_inner()
            .map_err(|e| AnalyticsError::persistence(key, e))
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<DataTable> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(bytes);

        let header = reader
            .headers()
            .map_err(|e| AnalyticsError::persistence(key, e))?
            .iter()
            .map(String::from)
            .collect();

        let rows = reader
            .records()
            .map(|record| {
                record
                    .map(|r| r.iter().map(String::from).collect())
                    .map_err(|e| AnalyticsError::persistence(key, e))
            })
            .collect::<Result<Vec<Vec<String>>>>()?;

        Ok(DataTable { header, rows })
    }
}

#[async_trait]
impl TableStore for CsvTableStore {
    async fn put(&self, key: &str, table: &DataTable) -> Result<()> {
        let bytes = Self::encode(key, table)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AnalyticsError::persistence(key, e))?;

        let path = self.path_for(key);
        let tmp = self.temp_path(key);

        let written = match tokio::fs::write(&tmp, &bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        path = %tmp.display(),
                        error = %cleanup,
                        "Temporary table file left behind"
                    );
                }
            }
            return Err(AnalyticsError::persistence(key, e));
        }

        debug!(key = key, path = %path.display(), rows = table.len(), "Table written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<DataTable>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AnalyticsError::persistence(key, e)),
        };

        Self::decode(key, &bytes).map(Some)
    }
}
