//! Configuration management for the lens analytics service.
//!
//! The service reads a single JSON file at `~/.lens/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (LENS_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `LENS_SYMBOL` → instrument.symbol
//! - `LENS_BENCHMARK_SYMBOL` → instrument.benchmark_symbol
//! - `LENS_DISCOUNT_RATE` → valuation.discount_rate
//! - `LENS_GROWTH_RATE` → valuation.growth_rate
//! - `LENS_FORECAST_YEARS` → valuation.forecast_years
//! - `LENS_REFRESH_TIME` → refresh.time (`HH:MM`, local time)
//! - `LENS_DATA_DIR` → refresh.data_dir
//! - `LENS_LOG_LEVEL` → observability.log_level
//! - `LENS_LOG_FORMAT` → observability.log_format
//!
//! # Example
//!
//! ```json
//! {
//!   "instrument": { "symbol": "PLTR", "benchmark_symbol": "^GSPC" },
//!   "valuation": { "discount_rate": 0.10, "growth_rate": 0.05, "forecast_years": 5 },
//!   "refresh": { "enabled": true, "time": "09:00" }
//! }
//! ```

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new()
        .map_or_else(
            || PathBuf::from(".lens"),
            |dirs| dirs.home_dir().join(".lens"),
        )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Instrument
// ============================================================================

/// The analysed instrument and the index it is compared against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Ticker symbol of the analysed company
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Benchmark index symbol; `None` disables the benchmark download
    #[serde(default = "default_benchmark_symbol")]
    pub benchmark_symbol: Option<String>,

    /// First date of the benchmark comparison window (inclusive)
    #[serde(default = "default_comparison_start")]
    pub comparison_start: NaiveDate,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            benchmark_symbol: default_benchmark_symbol(),
            comparison_start: default_comparison_start(),
        }
    }
}

// ============================================================================
// Valuation
// ============================================================================

/// Longest explicit DCF forecast horizon accepted, in years.
pub const MAX_FORECAST_YEARS: u32 = 100;

/// DCF assumptions. Rates are fractions (0.10 = 10%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationConfig {
    #[serde(default = "default_discount_rate")]
    pub discount_rate: f64,

    #[serde(default = "default_growth_rate")]
    pub growth_rate: f64,

    /// Explicit forecast horizon in years
    #[serde(default = "default_forecast_years")]
    pub forecast_years: u32,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            discount_rate: default_discount_rate(),
            growth_rate: default_growth_rate(),
            forecast_years: default_forecast_years(),
        }
    }
}

// ============================================================================
// Trend
// ============================================================================

/// Moving-average windows, in trading sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    #[serde(default = "default_short_window")]
    pub short_window: usize,

    #[serde(default = "default_long_window")]
    pub long_window: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            short_window: default_short_window(),
            long_window: default_long_window(),
        }
    }
}

// ============================================================================
// Prediction
// ============================================================================

/// Regression split settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Seed for the train/test shuffle
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Share of usable rows held out for evaluation
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            test_fraction: default_test_fraction(),
        }
    }
}

// ============================================================================
// Refresh
// ============================================================================

/// Scheduled refresh daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Enable the daily schedule (manual refresh works regardless)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Wall-clock time of the daily refresh, `HH:MM` in local time
    #[serde(default = "default_refresh_time")]
    pub time: String,

    /// How often the daemon loop wakes to check the schedule
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Directory holding the persisted tables and the refresh ledger
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time: default_refresh_time(),
            poll_interval_secs: default_poll_interval_secs(),
            data_dir: None,
        }
    }
}

impl RefreshConfig {
    /// Parse `time` into (hour, minute).
    pub fn hour_minute(&self) -> Result<(u32, u32)> {
        let time = NaiveTime::parse_from_str(self.time.trim(), "%H:%M")
            .with_context(|| format!("Invalid refresh time '{}', expected HH:MM", self.time))?;
        Ok((time.hour(), time.minute()))
    }

    /// Daily cron expression (with seconds field) for the configured time.
    pub fn cron_expression(&self) -> Result<String> {
        let (hour, minute) = self.hour_minute()?;
        Ok(format!("0 {} {} * * *", minute, hour))
    }

    /// Effective data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| config_dir().join("data"))
    }
}

// ============================================================================
// Holding
// ============================================================================

/// A personal position tracked for return-on-investment reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingConfig {
    pub purchase_price: f64,
    pub purchase_date: NaiveDate,
}

// ============================================================================
// Observability
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to force to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default)]
    pub instrument: InstrumentConfig,

    #[serde(default)]
    pub valuation: ValuationConfig,

    #[serde(default)]
    pub trend: TrendConfig,

    #[serde(default)]
    pub prediction: PredictionConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Optional tracked position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holding: Option<HoldingConfig>,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `LENS_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (environment in production).
    ///
    /// Values that fail to parse are ignored and the file value is kept.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(symbol) = lookup("LENS_SYMBOL") {
            self.instrument.symbol = symbol;
        }
        if let Some(benchmark) = lookup("LENS_BENCHMARK_SYMBOL") {
            self.instrument.benchmark_symbol = if benchmark.is_empty() {
                None
            } else {
                Some(benchmark)
            };
        }
        if let Some(rate) = lookup("LENS_DISCOUNT_RATE").and_then(|v| v.parse().ok()) {
            self.valuation.discount_rate = rate;
        }
        if let Some(rate) = lookup("LENS_GROWTH_RATE").and_then(|v| v.parse().ok()) {
            self.valuation.growth_rate = rate;
        }
        if let Some(years) = lookup("LENS_FORECAST_YEARS").and_then(|v| v.parse().ok()) {
            self.valuation.forecast_years = years;
        }
        if let Some(time) = lookup("LENS_REFRESH_TIME") {
            self.refresh.time = time;
        }
        if let Some(dir) = lookup("LENS_DATA_DIR") {
            self.refresh.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = lookup("LENS_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("LENS_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let path = config_path();
        let dir = config_dir();

        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_symbol() -> String {
    "PLTR".into()
}
fn default_benchmark_symbol() -> Option<String> {
    Some("^GSPC".into())
}
fn default_comparison_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 9, 30).unwrap_or_default()
}
fn default_discount_rate() -> f64 {
    0.10
}
fn default_growth_rate() -> f64 {
    0.05
}
fn default_forecast_years() -> u32 {
    5
}
fn default_short_window() -> usize {
    50
}
fn default_long_window() -> usize {
    200
}
fn default_seed() -> u64 {
    42
}
fn default_test_fraction() -> f64 {
    0.2
}
fn default_refresh_time() -> String {
    "09:00".into()
}
fn default_poll_interval_secs() -> u64 {
    1
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.instrument.symbol, "PLTR");
        assert_eq!(config.instrument.benchmark_symbol.as_deref(), Some("^GSPC"));
        assert!((config.valuation.discount_rate - 0.10).abs() < 1e-12);
        assert!((config.valuation.growth_rate - 0.05).abs() < 1e-12);
        assert_eq!(config.valuation.forecast_years, 5);
        assert_eq!(config.refresh.time, "09:00");
        assert!(config.holding.is_none());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "valuation": { "discount_rate": 0.12 }, "refresh": { "time": "18:30" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!((config.valuation.discount_rate - 0.12).abs() < 1e-12);
        assert!((config.valuation.growth_rate - 0.05).abs() < 1e-12);
        assert_eq!(config.refresh.hour_minute().unwrap(), (18, 30));
        assert_eq!(config.trend.long_window, 200);
    }

    #[test]
    fn test_refresh_cron_expression() {
        let refresh = RefreshConfig::default();
        assert_eq!(refresh.cron_expression().unwrap(), "0 0 9 * * *");

        let bad = RefreshConfig {
            time: "25:00".into(),
            ..Default::default()
        };
        assert!(bad.hour_minute().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LENS_SYMBOL", "MSFT"),
            ("LENS_BENCHMARK_SYMBOL", ""),
            ("LENS_DISCOUNT_RATE", "0.08"),
            ("LENS_GROWTH_RATE", "not-a-number"),
            ("LENS_REFRESH_TIME", "07:15"),
            ("LENS_DATA_DIR", "/tmp/lens"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.instrument.symbol, "MSFT");
        assert!(config.instrument.benchmark_symbol.is_none());
        assert!((config.valuation.discount_rate - 0.08).abs() < 1e-12);
        // Unparseable values keep the previous setting
        assert!((config.valuation.growth_rate - 0.05).abs() < 1e-12);
        assert_eq!(config.refresh.time, "07:15");
        assert_eq!(config.refresh.data_dir(), PathBuf::from("/tmp/lens"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "holding": { "purchase_price": 6.89, "purchase_date": "2022-05-11" } }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        let holding = config.holding.unwrap();
        assert!((holding.purchase_price - 6.89).abs() < 1e-12);
        assert_eq!(holding.purchase_date, NaiveDate::from_ymd_opt(2022, 5, 11).unwrap());
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("absent.json")).is_err());
    }
}
