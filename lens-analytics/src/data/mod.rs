//! Market data for the analysed instrument.
//!
//! Holds the raw domain values (price bars, statement tables, reference
//! fields), the provider interface used to fetch them, the durable table
//! store, the refresh ledger and the daemon that keeps the store current.
//!
//! # Data flow
//!
//! ```text
//! MarketDataProvider ──► RefreshDaemon ──► TableStore (+ RefreshLedger)
//!                                               │
//!                                     SnapshotReader ──► RawSnapshot ──► engines
//! ```

mod ledger;
mod provider;
mod refresh;
mod snapshot;
mod store;
mod table;
mod yahoo;

pub use ledger::{RefreshLedger, RefreshRecord, RefreshStatus};
pub use provider::{MarketDataProvider, ProviderError};
pub use refresh::{
    is_due, DaemonState, RefreshDaemon, RefreshOutcome, RefreshReport, TableKey, TableOutcome,
};
pub use snapshot::SnapshotReader;
pub use store::{CsvTableStore, TableStore};
pub use table::DataTable;
pub use yahoo::YahooAdapter;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{AnalyticsError, Result};

/// Statement line-item names, in the provider's vocabulary.
pub mod items {
    // Income statement
    pub const TOTAL_REVENUE: &str = "Total Revenue";
    pub const GROSS_PROFIT: &str = "Gross Profit";
    pub const NET_INCOME: &str = "Net Income";
    pub const EBIT: &str = "EBIT";
    pub const INTEREST_EXPENSE: &str = "Interest Expense";

    // Balance sheet
    pub const STOCKHOLDERS_EQUITY: &str = "Stockholders Equity";
    pub const CURRENT_ASSETS: &str = "Current Assets";
    pub const CURRENT_LIABILITIES: &str = "Current Liabilities";
    pub const INVENTORY: &str = "Inventory";
    pub const TOTAL_ASSETS: &str = "Total Assets";
    pub const ACCOUNTS_RECEIVABLE: &str = "Accounts Receivable";
    pub const TOTAL_LIABILITIES: &str = "Total Liabilities Net Minority Interest";

    // Cash flow
    pub const FREE_CASH_FLOW: &str = "Free Cash Flow";
}

// ============================================================================
// Prices
// ============================================================================

/// One trading session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// True when every numeric field is finite.
    pub fn is_complete(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Daily bars ordered by strictly increasing date.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series, rejecting out-of-order or duplicate dates.
    pub fn new(bars: Vec<PriceBar>) -> Result<Self> {
        if let Some(pair) = bars.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(AnalyticsError::InvalidSnapshot(format!(
                "price dates must be strictly increasing ({} followed by {})",
                pair[0].date, pair[1].date
            )));
        }
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Bars dated on or after `start`.
    pub fn since(&self, start: NaiveDate) -> &[PriceBar] {
        let idx = self.bars.partition_point(|b| b.date < start);
        &self.bars[idx..]
    }
}

// ============================================================================
// Statements
// ============================================================================

/// Which of the three periodic statements a table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Income,
    BalanceSheet,
    CashFlow,
}

impl StatementKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Income => "income statement",
            Self::BalanceSheet => "balance sheet",
            Self::CashFlow => "cash flow",
        }
    }
}

/// Line items by fiscal period, most recent period first.
///
/// Every item carries exactly one slot per period; `None` means the provider
/// reported nothing for that item in that period.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatementTable {
    periods: Vec<NaiveDate>,
    items: BTreeMap<String, Vec<Option<f64>>>,
}

impl StatementTable {
    pub fn new(periods: Vec<NaiveDate>, items: BTreeMap<String, Vec<Option<f64>>>) -> Result<Self> {
        if let Some(pair) = periods.windows(2).find(|w| w[0] <= w[1]) {
            return Err(AnalyticsError::InvalidSnapshot(format!(
                "statement periods must be most-recent first ({} followed by {})",
                pair[0], pair[1]
            )));
        }
        if let Some((name, values)) = items.iter().find(|(_, v)| v.len() != periods.len()) {
            return Err(AnalyticsError::InvalidSnapshot(format!(
                "line item '{}' has {} values for {} periods",
                name,
                values.len(),
                periods.len()
            )));
        }
        Ok(Self { periods, items })
    }

    pub fn periods(&self) -> &[NaiveDate] {
        &self.periods
    }

    pub fn latest_period(&self) -> Option<NaiveDate> {
        self.periods.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Value of `item` for the period at `index` (0 = most recent).
    pub fn value(&self, item: &str, index: usize) -> Option<f64> {
        self.items.get(item)?.get(index).copied().flatten()
    }

    /// Value of `item` for the latest period.
    pub fn latest(&self, item: &str) -> Option<f64> {
        self.value(item, 0)
    }

    pub fn item_names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub(crate) fn items(&self) -> &BTreeMap<String, Vec<Option<f64>>> {
        &self.items
    }
}

/// Income statement, balance sheet and cash flow with a shared latest period.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatementSet {
    pub income: StatementTable,
    pub balance_sheet: StatementTable,
    pub cash_flow: StatementTable,
}

impl StatementSet {
    /// Combine three tables; every non-empty table must share period 0.
    pub fn new(
        income: StatementTable,
        balance_sheet: StatementTable,
        cash_flow: StatementTable,
    ) -> Result<Self> {
        let latest: Vec<(StatementKind, NaiveDate)> = [
            (StatementKind::Income, &income),
            (StatementKind::BalanceSheet, &balance_sheet),
            (StatementKind::CashFlow, &cash_flow),
        ]
        .into_iter()
        .filter_map(|(kind, table)| table.latest_period().map(|p| (kind, p)))
        .collect();

        if let Some(&(first_kind, first)) = latest.first() {
            if let Some(&(kind, other)) = latest.iter().find(|(_, p)| *p != first) {
                return Err(AnalyticsError::InvalidSnapshot(format!(
                    "latest period of {} ({}) differs from {} ({})",
                    kind.name(),
                    other,
                    first_kind.name(),
                    first
                )));
            }
        }

        Ok(Self {
            income,
            balance_sheet,
            cash_flow,
        })
    }

    /// Fiscal period end shared by the latest column of every table.
    pub fn latest_period(&self) -> Option<NaiveDate> {
        self.income
            .latest_period()
            .or_else(|| self.balance_sheet.latest_period())
            .or_else(|| self.cash_flow.latest_period())
    }
}

// ============================================================================
// Reference fields and snapshot
// ============================================================================

/// Point-in-time scalars. Not aligned with any statement period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceFields {
    pub market_cap: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl ReferenceFields {
    /// Reference fields with nothing known.
    pub fn unknown(observed_at: DateTime<Utc>) -> Self {
        Self {
            market_cap: None,
            shares_outstanding: None,
            observed_at,
        }
    }
}

/// Everything the engines read, captured by one refresh cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RawSnapshot {
    pub symbol: String,
    pub prices: PriceSeries,
    pub benchmark: Option<PriceSeries>,
    pub statements: StatementSet,
    pub reference: ReferenceFields,
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bar(d: NaiveDate, close: f64) -> PriceBar {
        PriceBar {
            date: d,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    fn single_item(
        periods: Vec<NaiveDate>,
        item: &str,
        values: Vec<Option<f64>>,
    ) -> StatementTable {
        let mut items = BTreeMap::new();
        items.insert(item.to_string(), values);
        StatementTable::new(periods, items).unwrap()
    }

    #[test]
    fn test_price_series_rejects_unordered_dates() {
        let bars = vec![bar(date(2024, 1, 3), 10.0), bar(date(2024, 1, 2), 11.0)];
        assert!(matches!(
            PriceSeries::new(bars),
            Err(AnalyticsError::InvalidSnapshot(_))
        ));

        let dup = vec![bar(date(2024, 1, 2), 10.0), bar(date(2024, 1, 2), 11.0)];
        assert!(PriceSeries::new(dup).is_err());
    }

    #[test]
    fn test_price_series_since() {
        let series = PriceSeries::new(vec![
            bar(date(2024, 1, 2), 10.0),
            bar(date(2024, 1, 3), 11.0),
            bar(date(2024, 1, 5), 12.0),
        ])
        .unwrap();

        assert_eq!(series.since(date(2024, 1, 3)).len(), 2);
        assert_eq!(series.since(date(2024, 1, 4))[0].close, 12.0);
        assert!(series.since(date(2024, 2, 1)).is_empty());
    }

    #[test]
    fn test_statement_table_ordering() {
        let ok = single_item(
            vec![date(2023, 12, 31), date(2022, 12, 31)],
            items::TOTAL_REVENUE,
            vec![Some(2.0), None],
        );
        assert_eq!(ok.latest(items::TOTAL_REVENUE), Some(2.0));
        assert_eq!(ok.value(items::TOTAL_REVENUE, 1), None);
        assert_eq!(ok.latest(items::NET_INCOME), None);

        let mut values = BTreeMap::new();
        values.insert(items::TOTAL_REVENUE.to_string(), vec![Some(1.0), Some(2.0)]);
        let ascending = StatementTable::new(vec![date(2022, 12, 31), date(2023, 12, 31)], values);
        assert!(ascending.is_err());
    }

    #[test]
    fn test_statement_table_item_length() {
        let mut values = BTreeMap::new();
        values.insert(items::TOTAL_REVENUE.to_string(), vec![Some(1.0)]);
        let result = StatementTable::new(vec![date(2023, 12, 31), date(2022, 12, 31)], values);
        assert!(matches!(result, Err(AnalyticsError::InvalidSnapshot(_))));
    }

    #[test]
    fn test_statement_set_period_alignment() {
        let income = single_item(vec![date(2023, 12, 31)], items::NET_INCOME, vec![Some(1.0)]);
        let balance = single_item(vec![date(2023, 12, 31)], items::TOTAL_ASSETS, vec![Some(5.0)]);
        let shifted = single_item(vec![date(2024, 12, 31)], items::FREE_CASH_FLOW, vec![Some(3.0)]);

        let set = StatementSet::new(income.clone(), balance.clone(), StatementTable::default())
            .unwrap();
        assert_eq!(set.latest_period(), Some(date(2023, 12, 31)));

        assert!(StatementSet::new(income, balance, shifted).is_err());
    }
}
