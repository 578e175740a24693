//! Assembles the persisted tables into a `RawSnapshot`.

use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    DataTable, PriceSeries, RawSnapshot, ReferenceFields, RefreshLedger, StatementSet,
    StatementTable, TableKey, TableStore,
};
use crate::error::{AnalyticsError, Result};

/// Reads the latest refreshed tables for the engines.
///
/// Never waits on an in-flight refresh: each table is read as last renamed
/// into place.
pub struct SnapshotReader {
    store: Arc<dyn TableStore>,
    ledger: Arc<RefreshLedger>,
    symbol: String,
}

impl SnapshotReader {
    pub fn new(
        store: Arc<dyn TableStore>,
        ledger: Arc<RefreshLedger>,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ledger,
            symbol: symbol.into(),
        }
    }

    /// Load the current snapshot.
    ///
    /// Price history is required. Absent statement tables degrade to empty
    /// tables and absent reference fields to unknown values. Statements left
    /// on different fiscal years by a partial refresh keep only the tables
    /// at the newest period.
    pub async fn load(&self) -> Result<RawSnapshot> {
        let captured_at = self
            .ledger
            .last_success(TableKey::PriceHistory.as_str())
            .await
            .map_err(|e| AnalyticsError::persistence("refresh_ledger", e))?
            .ok_or_else(|| {
                AnalyticsError::MissingData(format!(
                    "no successful price refresh recorded for {}",
                    self.symbol
                ))
            })?;

        let prices = match self.read(TableKey::PriceHistory).await? {
            Some(table) => PriceSeries::from_table(&table)?,
            None => {
                return Err(AnalyticsError::MissingData(format!(
                    "price history for {} has not been persisted",
                    self.symbol
                )))
            }
        };

        let benchmark = self
            .read(TableKey::BenchmarkHistory)
            .await?
            .map(|t| PriceSeries::from_table(&t))
            .transpose()?;

        let statements = aligned_statements(
            self.statement(TableKey::IncomeStatement).await?,
            self.statement(TableKey::BalanceSheet).await?,
            self.statement(TableKey::CashFlow).await?,
        )?;

        let reference = match self.read(TableKey::ReferenceFields).await? {
            Some(table) => ReferenceFields::from_table(&table)?,
            None => {
                warn!(
                    symbol = %self.symbol,
                    "Reference fields not persisted, market ratios will be undefined"
                );
                ReferenceFields::unknown(captured_at)
            }
        };

        debug!(
            symbol = %self.symbol,
            sessions = prices.len(),
            has_benchmark = benchmark.is_some(),
            "Snapshot loaded"
        );

        Ok(RawSnapshot {
            symbol: self.symbol.clone(),
            prices,
            benchmark,
            statements,
            reference,
            captured_at,
        })
    }

    async fn read(&self, key: TableKey) -> Result<Option<DataTable>> {
        self.store.get(key.as_str()).await
    }

    async fn statement(&self, key: TableKey) -> Result<StatementTable> {
        match self.read(key).await? {
            Some(table) => StatementTable::from_table(&table),
            None => {
                warn!(table = key.as_str(), "Statement not persisted, treating as empty");
                Ok(StatementTable::default())
            }
        }
    }
}

/// Drop statement tables whose latest period is older than the newest one.
fn aligned_statements(
    income: StatementTable,
    balance_sheet: StatementTable,
    cash_flow: StatementTable,
) -> Result<StatementSet> {
    let newest = [&income, &balance_sheet, &cash_flow]
        .iter()
        .filter_map(|t| t.latest_period())
        .max();

    let keep = |key: TableKey, table: StatementTable| match (newest, table.latest_period()) {
        (Some(newest), Some(latest)) if latest != newest => {
            warn!(
                table = key.as_str(),
                latest = %latest,
                newest = %newest,
                "Statement is behind the newest fiscal period, treating as empty"
            );
            StatementTable::default()
        }
        _ => table,
    };

    StatementSet::new(
        keep(TableKey::IncomeStatement, income),
        keep(TableKey::BalanceSheet, balance_sheet),
        keep(TableKey::CashFlow, cash_flow),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{items, CsvTableStore, PriceBar, RefreshRecord, RefreshStatus};
    use chrono::{NaiveDate, Utc};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn fiscal_year(year: i32, item: &str, value: f64) -> StatementTable {
        let mut line_items = BTreeMap::new();
        line_items.insert(item.to_string(), vec![Some(value)]);
        let period = NaiveDate::from_ymd_opt(year, 12, 31).unwrap();
        StatementTable::new(vec![period], line_items).unwrap()
    }

    async fn seeded(dir: &std::path::Path, record_success: bool) -> SnapshotReader {
        let store = Arc::new(CsvTableStore::new(dir));
        let ledger = Arc::new(RefreshLedger::in_memory().unwrap());

        let series = PriceSeries::new(vec![PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            open: 21.0,
            high: 22.0,
            low: 20.5,
            close: 21.7,
            volume: 4.2e7,
        }])
        .unwrap();
        store
            .put(TableKey::PriceHistory.as_str(), &series.to_table())
            .await
            .unwrap();

        if record_success {
            ledger
                .record(&RefreshRecord {
                    table_key: TableKey::PriceHistory.as_str().into(),
                    status: RefreshStatus::Success,
                    rows: 1,
                    error: None,
                    finished_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        SnapshotReader::new(store, ledger, "PLTR")
    }

    #[tokio::test]
    async fn test_load_with_only_prices() {
        let dir = tempdir().unwrap();
        let reader = seeded(dir.path(), true).await;

        let snapshot = reader.load().await.unwrap();
        assert_eq!(snapshot.symbol, "PLTR");
        assert_eq!(snapshot.prices.len(), 1);
        assert!(snapshot.benchmark.is_none());
        assert!(snapshot.statements.income.is_empty());
        assert!(snapshot.reference.market_cap.is_none());
    }

    #[tokio::test]
    async fn test_load_without_refresh_record() {
        let dir = tempdir().unwrap();
        let reader = seeded(dir.path(), false).await;

        assert!(matches!(
            reader.load().await,
            Err(AnalyticsError::MissingData(_))
        ));
    }

    #[tokio::test]
    async fn test_load_with_statements_on_different_years() {
        let dir = tempdir().unwrap();
        let reader = seeded(dir.path(), true).await;

        // A partial refresh left the balance sheet a year behind
        let store = CsvTableStore::new(dir.path());
        let income = fiscal_year(2024, items::NET_INCOME, 4.6e8);
        let balance_sheet = fiscal_year(2023, items::STOCKHOLDERS_EQUITY, 3.5e9);
        store
            .put(TableKey::IncomeStatement.as_str(), &income.to_table())
            .await
            .unwrap();
        store
            .put(TableKey::BalanceSheet.as_str(), &balance_sheet.to_table())
            .await
            .unwrap();

        let snapshot = reader.load().await.unwrap();
        assert_eq!(snapshot.prices.len(), 1);
        assert_eq!(snapshot.statements.income, income);
        assert!(snapshot.statements.balance_sheet.is_empty());
        assert!(snapshot.statements.cash_flow.is_empty());
        assert_eq!(
            snapshot.statements.latest_period(),
            NaiveDate::from_ymd_opt(2024, 12, 31)
        );
    }
}
