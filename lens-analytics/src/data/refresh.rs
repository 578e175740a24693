//! Scheduled refresh daemon.
//!
//! Pulls every raw table for the instrument from the provider once a day and
//! overwrites the stored copies.
//!
//! # State machine
//!
//! ```text
//!   Idle ──(due tick / trigger, CAS)──► Refreshing ──(cycle done)──► Idle
//!     │                                      │
//!     └──────────── shutdown() ──────────────┴──► Stopped
//! ```
//!
//! The schedule is a daily cron expression evaluated in local time, e.g.
//! `0 0 9 * * *` for 09:00.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use cron::Schedule;
use serde::Serialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{DataTable, MarketDataProvider, RefreshLedger, RefreshRecord, RefreshStatus, TableStore};
use crate::error::AnalyticsError;

/// How late a scheduled instant may be picked up.
const DUE_WINDOW_SECS: i64 = 120;

// ============================================================================
// Table keys
// ============================================================================

/// Stable storage keys, one per refreshed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKey {
    PriceHistory,
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    ReferenceFields,
    BenchmarkHistory,
}

impl TableKey {
    /// Refresh order.
    pub const ALL: [TableKey; 6] = [
        Self::PriceHistory,
        Self::IncomeStatement,
        Self::BalanceSheet,
        Self::CashFlow,
        Self::ReferenceFields,
        Self::BenchmarkHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceHistory => "price_history",
            Self::IncomeStatement => "income_statement",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
            Self::ReferenceFields => "reference_fields",
            Self::BenchmarkHistory => "benchmark_history",
        }
    }
}

impl std::fmt::Display for TableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Result of refreshing one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableOutcome {
    pub key: TableKey,
    pub status: RefreshStatus,
    pub rows: usize,
    pub error: Option<String>,
}

/// Result of one refresh cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub symbol: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tables: Vec<TableOutcome>,
}

impl RefreshReport {
    pub fn succeeded(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| t.status == RefreshStatus::Success)
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &TableOutcome> {
        self.tables.iter().filter(|t| t.status == RefreshStatus::Failed)
    }

    pub fn outcome(&self, key: TableKey) -> Option<&TableOutcome> {
        self.tables.iter().find(|t| t.key == key)
    }
}

/// What a tick or trigger did.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Completed(RefreshReport),
    /// Another cycle was in flight (or the daemon is stopped).
    Skipped,
}

// ============================================================================
// Daemon state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum DaemonState {
    Idle = 0,
    Refreshing = 1,
    Stopped = 2,
}

impl DaemonState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Refreshing,
            _ => Self::Stopped,
        }
    }
}

/// True when a scheduled instant falls after `last_run`, is not in the
/// future, and is at most two minutes old.
pub fn is_due<Z: TimeZone>(
    schedule: &Schedule,
    last_run: Option<DateTime<Z>>,
    now: DateTime<Z>,
) -> bool {
    let window = chrono::Duration::seconds(DUE_WINDOW_SECS);
    let after = last_run.clone().unwrap_or_else(|| now.clone() - window);

    for scheduled in schedule.after(&after).take(10) {
        if scheduled > now {
            break;
        }
        if now.clone().signed_duration_since(scheduled.clone()) < window {
            if let Some(last) = &last_run {
                if *last >= scheduled {
                    continue;
                }
            }
            return true;
        }
    }

    false
}

// ============================================================================
// Refresh daemon
// ============================================================================

/// Keeps the persisted tables for one instrument current.
pub struct RefreshDaemon {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn TableStore>,
    ledger: Arc<RefreshLedger>,
    symbol: String,
    benchmark_symbol: Option<String>,
    schedule: Schedule,
    poll_interval: Duration,
    state: AtomicU8,
    last_run: RwLock<Option<DateTime<Local>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl RefreshDaemon {
    /// Create a daemon for `symbol` with a six-field cron expression.
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn TableStore>,
        ledger: Arc<RefreshLedger>,
        symbol: impl Into<String>,
        cron_expr: &str,
    ) -> Result<Self> {
        let schedule = Schedule::from_str(cron_expr)
            .with_context(|| format!("Invalid refresh schedule cron: {}", cron_expr))?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            provider,
            store,
            ledger,
            symbol: symbol.into(),
            benchmark_symbol: None,
            schedule,
            poll_interval: Duration::from_secs(1),
            state: AtomicU8::new(DaemonState::Idle as u8),
            last_run: RwLock::new(None),
            shutdown_tx,
        })
    }

    /// Also refresh the benchmark index history.
    pub fn with_benchmark(mut self, benchmark_symbol: Option<String>) -> Self {
        self.benchmark_symbol = benchmark_symbol;
        self
    }

    /// How often the loop checks the schedule.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> DaemonState {
        DaemonState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Next scheduled refresh in local time.
    pub fn next_run(&self) -> Option<DateTime<Local>> {
        self.schedule.upcoming(Local).next()
    }

    /// Stop scheduling. An in-flight cycle still runs to completion.
    pub fn shutdown(&self) {
        self.state.store(DaemonState::Stopped as u8, Ordering::Release);
        self.shutdown_tx.send_replace(true);
        info!("Refresh daemon stopping");
    }

    /// Run the scheduler loop until `shutdown()`.
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        info!(
            symbol = %self.symbol,
            next_run = ?self.next_run(),
            poll_secs = self.poll_interval.as_secs_f64(),
            "Refresh daemon started"
        );

        let mut check_interval = interval(self.poll_interval);
        check_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = check_interval.tick() => {
                    if self.state() == DaemonState::Stopped {
                        break;
                    }
                    self.check_and_execute().await;
                }
                _ = shutdown_rx.changed() => break,
            }
        }

        info!("Refresh daemon stopped");
        Ok(())
    }

    async fn check_and_execute(&self) {
        let now = Local::now();
        let last = *self.last_run.read().await;

        if !is_due(&self.schedule, last, now) {
            return;
        }

        *self.last_run.write().await = Some(now);
        info!(symbol = %self.symbol, "Scheduled refresh due");

        if let RefreshOutcome::Completed(report) = self.trigger().await {
            if report.succeeded() < report.tables.len() {
                warn!(
                    failed = report.tables.len() - report.succeeded(),
                    "Refresh finished with failures, next attempt at the next schedule"
                );
            }
        }
    }

    /// Run one refresh cycle now, unless one is already running.
    pub async fn trigger(&self) -> RefreshOutcome {
        if self
            .state
            .compare_exchange(
                DaemonState::Idle as u8,
                DaemonState::Refreshing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            warn!(state = ?self.state(), "Refresh skipped, daemon not idle");
            return RefreshOutcome::Skipped;
        }

        let report = self.refresh_all().await;

        // Leaves Stopped untouched if shutdown() ran mid-cycle
        let _ = self.state.compare_exchange(
            DaemonState::Refreshing as u8,
            DaemonState::Idle as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        RefreshOutcome::Completed(report)
    }

    async fn refresh_all(&self) -> RefreshReport {
        let started_at = Utc::now();
        info!(symbol = %self.symbol, provider = self.provider.name(), "Refresh started");

        let mut tables = Vec::new();
        for key in TableKey::ALL {
            if key == TableKey::BenchmarkHistory && self.benchmark_symbol.is_none() {
                continue;
            }
            tables.push(self.refresh_table(key).await);
        }

        let report = RefreshReport {
            symbol: self.symbol.clone(),
            started_at,
            finished_at: Utc::now(),
            tables,
        };

        info!(
            symbol = %self.symbol,
            succeeded = report.succeeded(),
            total = report.tables.len(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Refresh finished"
        );

        report
    }

    async fn refresh_table(&self, key: TableKey) -> TableOutcome {
        let result = match self.fetch(key).await {
            Ok(table) => self.store.put(key.as_str(), &table).await.map(|_| table.len()),
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(rows) => {
                info!(table = %key, rows, "Table persisted");
                TableOutcome {
                    key,
                    status: RefreshStatus::Success,
                    rows,
                    error: None,
                }
            }
            Err(e) => {
                error!(table = %key, error = %e, "Table refresh failed");
                TableOutcome {
                    key,
                    status: RefreshStatus::Failed,
                    rows: 0,
                    error: Some(e.to_string()),
                }
            }
        };

        let record = RefreshRecord {
            table_key: key.as_str().to_string(),
            status: outcome.status,
            rows: outcome.rows,
            error: outcome.error.clone(),
            finished_at: Utc::now(),
        };
        if let Err(e) = self.ledger.record(&record).await {
            error!(table = %key, error = %e, "Failed to record refresh outcome");
        }

        outcome
    }

    async fn fetch(&self, key: TableKey) -> Result<DataTable, AnalyticsError> {
        let symbol = self.symbol.as_str();
        debug!(table = %key, symbol, "Fetching table");

        let table = match key {
            TableKey::PriceHistory => self.provider.price_history(symbol).await?.to_table(),
            TableKey::IncomeStatement => self.provider.income_statement(symbol).await?.to_table(),
            TableKey::BalanceSheet => self.provider.balance_sheet(symbol).await?.to_table(),
            TableKey::CashFlow => self.provider.cash_flow(symbol).await?.to_table(),
            TableKey::ReferenceFields => self.provider.reference_fields(symbol).await?.to_table(),
            TableKey::BenchmarkHistory => {
                let benchmark = self.benchmark_symbol.as_deref().ok_or_else(|| {
                    AnalyticsError::InvalidInput("no benchmark symbol configured".into())
                })?;
                self.provider.price_history(benchmark).await?.to_table()
            }
        };

        Ok(table)
    }
}
