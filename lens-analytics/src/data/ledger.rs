//! Refresh ledger using SQLite.
//!
//! Every per-table refresh attempt is appended to `refresh_log`. The ledger
//! answers "when was this table last written successfully", which is the
//! capture time of the snapshot built from the store.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS refresh_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_key TEXT NOT NULL,
    status TEXT NOT NULL,
    rows INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    finished_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_refresh_log_key_finished
ON refresh_log(table_key, finished_at DESC);
"#;

/// Outcome of one table refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Success,
    Failed,
}

impl std::fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl RefreshStatus {
    fn from_str(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            _ => Self::Failed,
        }
    }
}

/// One row of `refresh_log`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRecord {
    pub table_key: String,
    pub status: RefreshStatus,
    pub rows: usize,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// SQLite-backed refresh history.
pub struct RefreshLedger {
    /// rusqlite::Connection is Send but not Sync, so it lives behind a Mutex
    db: Arc<Mutex<Connection>>,
}

impl RefreshLedger {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create ledger directory {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open refresh ledger {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;

        let ledger = Self::from_connection(conn)?;
        info!(db_path = %path.display(), "Initialized refresh ledger");
        Ok(ledger)
    }

    /// In-memory ledger, used by tests and one-off runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory ledger")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create refresh ledger tables")?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Append one refresh outcome.
    pub async fn record(&self, record: &RefreshRecord) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO refresh_log (table_key, status, rows, error, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.table_key,
                record.status.to_string(),
                record.rows as i64,
                record.error,
                record.finished_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )
        .with_context(|| format!("Failed to record refresh of {}", record.table_key))?;
        Ok(())
    }

    /// Finish time of the latest successful refresh of `table_key`.
    pub async fn last_success(&self, table_key: &str) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().await;
        let raw: Option<String> = db
            .query_row(
                "SELECT finished_at FROM refresh_log
                 WHERE table_key = ?1 AND status = 'success'
                 ORDER BY finished_at DESC, id DESC LIMIT 1",
                params![table_key],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|s| parse_timestamp(&s)).transpose()
    }

    /// Most recent records across all tables, newest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<RefreshRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT table_key, status, rows, error, finished_at FROM refresh_log
             ORDER BY finished_at DESC, id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (table_key, status, count, error, finished_at) = row?;
            records.push(RefreshRecord {
                table_key,
                status: RefreshStatus::from_str(&status),
                rows: count.max(0) as usize,
                error,
                finished_at: parse_timestamp(&finished_at)?,
            });
        }
        Ok(records)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid ledger timestamp '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn record(key: &str, status: RefreshStatus, at: DateTime<Utc>) -> RefreshRecord {
        RefreshRecord {
            table_key: key.to_string(),
            status,
            rows: 10,
            error: match status {
                RefreshStatus::Success => None,
                RefreshStatus::Failed => Some("Network error: timeout".into()),
            },
            finished_at: at,
        }
    }

    #[tokio::test]
    async fn test_last_success_ignores_failures() {
        let ledger = RefreshLedger::in_memory().unwrap();
        let t0 = Utc::now() - Duration::days(1);
        let t1 = Utc::now();

        ledger
            .record(&record("price_history", RefreshStatus::Success, t0))
            .await
            .unwrap();
        ledger
            .record(&record("price_history", RefreshStatus::Failed, t1))
            .await
            .unwrap();

        let last = ledger.last_success("price_history").await.unwrap().unwrap();
        assert_eq!(last.timestamp(), t0.timestamp());
        assert!(ledger.last_success("cash_flow").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let ledger = RefreshLedger::in_memory().unwrap();
        let base = Utc::now();
        for (i, key) in ["income_statement", "balance_sheet", "cash_flow"].iter().enumerate() {
            ledger
                .record(&record(key, RefreshStatus::Success, base + Duration::seconds(i as i64)))
                .await
                .unwrap();
        }

        let history = ledger.history(2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].table_key, "cash_flow");
        assert_eq!(history[1].table_key, "balance_sheet");
        assert_eq!(history[0].rows, 10);
    }

    #[tokio::test]
    async fn test_ledger_persists_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("refresh_ledger.db");
        {
            let ledger = RefreshLedger::open(&path).unwrap();
            ledger
                .record(&record("balance_sheet", RefreshStatus::Failed, Utc::now()))
                .await
                .unwrap();
        }

        let reopened = RefreshLedger::open(&path).unwrap();
        let history = reopened.history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, RefreshStatus::Failed);
        assert!(history[0].error.as_deref().unwrap().contains("timeout"));
    }
}
