//! Lens Analytics Library
//!
//! Single-instrument equity analytics: financial ratios, a DCF valuation,
//! price trends and a close-price regression, all computed from tables that
//! a scheduled refresh daemon keeps current.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        lens-analytics                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  MarketDataProvider ──► RefreshDaemon ──► TableStore (CSV)       │
//! │                               │                 │                │
//! │                               ▼                 ▼                │
//! │                         RefreshLedger ──► SnapshotReader         │
//! │                                                 │                │
//! │                                                 ▼                │
//! │      RatioEngine  ValuationEngine  TrendEngine  PredictionEngine │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The refresh write path and the engines' read path meet only at the
//! persisted store. Engines are pure functions of an immutable `RawSnapshot`.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod analysis;
pub mod data;
pub mod error;
pub mod prediction;
pub mod report;
pub mod valuation;

use anyhow::{Context, Result};
use lens_common::Config;
use std::sync::Arc;
use std::time::Duration;

use crate::data::{
    CsvTableStore, MarketDataProvider, RefreshDaemon, RefreshLedger, RefreshRecord,
    SnapshotReader, TableStore, YahooAdapter,
};
use crate::report::AnalyticsReport;

pub use error::{AnalyticsError, Result as AnalyticsResult};

/// File name of the refresh ledger inside the data directory.
pub const LEDGER_FILE: &str = "refresh_ledger.db";

/// Shared handles for one configured instrument.
pub struct LensState {
    /// Configuration
    pub config: Config,
    /// Market data source
    pub provider: Arc<dyn MarketDataProvider>,
    /// Persisted tables
    pub store: Arc<dyn TableStore>,
    /// Refresh history
    pub ledger: Arc<RefreshLedger>,
}

impl LensState {
    /// Open the store and ledger under the configured data directory,
    /// reading market data from Yahoo.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_provider(config, Arc::new(YahooAdapter::new()))
    }

    pub fn with_provider(config: Config, provider: Arc<dyn MarketDataProvider>) -> Result<Self> {
        let data_dir = config.refresh.data_dir();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let ledger = RefreshLedger::open(&data_dir.join(LEDGER_FILE))?;

        Ok(Self {
            config,
            provider,
            store: Arc::new(CsvTableStore::new(data_dir)),
            ledger: Arc::new(ledger),
        })
    }

    /// Refresh daemon on the configured daily schedule.
    pub fn daemon(&self) -> Result<RefreshDaemon> {
        let cron_expr = self.config.refresh.cron_expression()?;
        let daemon = RefreshDaemon::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.store),
            Arc::clone(&self.ledger),
            self.config.instrument.symbol.clone(),
            &cron_expr,
        )?
        .with_benchmark(self.config.instrument.benchmark_symbol.clone())
        .with_poll_interval(Duration::from_secs(self.config.refresh.poll_interval_secs));

        Ok(daemon)
    }

    pub fn snapshot_reader(&self) -> SnapshotReader {
        SnapshotReader::new(
            Arc::clone(&self.store),
            Arc::clone(&self.ledger),
            self.config.instrument.symbol.clone(),
        )
    }

    /// Load the current snapshot and run every engine over it.
    pub async fn report(&self) -> Result<AnalyticsReport> {
        let snapshot = self
            .snapshot_reader()
            .load()
            .await
            .context("Failed to load snapshot")?;

        Ok(AnalyticsReport::build(&snapshot, &self.config))
    }

    /// Most recent refresh ledger entries, newest first.
    pub async fn status(&self, limit: usize) -> Result<Vec<RefreshRecord>> {
        self.ledger.history(limit).await
    }
}
