//! Row/column form of the domain values, as persisted by the table store.
//!
//! Cells are text. An empty cell means "no value". Floats are written with
//! the shortest representation that parses back to the same `f64`.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

use super::{PriceBar, PriceSeries, ReferenceFields, StatementTable};
use crate::error::{AnalyticsError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";
const PRICE_COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];
const PERIOD_COLUMN: &str = "period";
const REFERENCE_COLUMNS: [&str; 3] = ["market_cap", "shares_outstanding", "observed_at"];

/// A header row plus data rows of equal width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn new<S: Into<String>>(header: impl IntoIterator<Item = S>) -> Self {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.header.len() {
            return Err(AnalyticsError::InvalidSnapshot(format!(
                "row has {} cells, header has {}",
                row.len(),
                self.header.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| AnalyticsError::InvalidSnapshot(format!("missing column '{}'", name)))
    }
}

fn format_number(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}

fn parse_optional(cell: &str) -> Result<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|e| AnalyticsError::InvalidSnapshot(format!("bad number '{}': {}", cell, e)))
}

fn parse_date(cell: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(cell.trim(), DATE_FORMAT)
        .map_err(|e| AnalyticsError::InvalidSnapshot(format!("bad date '{}': {}", cell, e)))
}

// ============================================================================
// Prices
// ============================================================================

impl PriceSeries {
    pub fn to_table(&self) -> DataTable {
        let mut table = DataTable::new(PRICE_COLUMNS);
        for bar in self.bars() {
            table.rows.push(vec![
                bar.date.format(DATE_FORMAT).to_string(),
                format_number(bar.open),
                format_number(bar.high),
                format_number(bar.low),
                format_number(bar.close),
                format_number(bar.volume),
            ]);
        }
        table
    }

    /// Rebuild from a stored table. Absent cells become NaN.
    pub fn from_table(table: &DataTable) -> Result<Self> {
        let idx: Vec<usize> = PRICE_COLUMNS
            .iter()
            .map(|c| table.column(c))
            .collect::<Result<_>>()?;

        let field = |row: &[String], i: usize| -> Result<f64> {
            Ok(parse_optional(&row[idx[i]])?.unwrap_or(f64::NAN))
        };

        let bars = table
            .rows
            .iter()
            .map(|row| {
                let row = row.as_slice();
                Ok(PriceBar {
                    date: parse_date(&row[idx[0]])?,
                    open: field(row, 1)?,
                    high: field(row, 2)?,
                    low: field(row, 3)?,
                    close: field(row, 4)?,
                    volume: field(row, 5)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        PriceSeries::new(bars)
    }
}

// ============================================================================
// Statements
// ============================================================================

impl StatementTable {
    /// One row per period (most recent first), one column per line item.
    pub fn to_table(&self) -> DataTable {
        let names: Vec<&String> = self.items().keys().collect();
        let mut header = vec![PERIOD_COLUMN.to_string()];
        header.extend(names.iter().map(|n| n.to_string()));

        let mut table = DataTable::new(header);
        for (i, period) in self.periods().iter().enumerate() {
            let mut row = vec![period.format(DATE_FORMAT).to_string()];
            row.extend(names.iter().map(|n| format_optional(self.value(n, i))));
            table.rows.push(row);
        }
        table
    }

    pub fn from_table(table: &DataTable) -> Result<Self> {
        let period_idx = table.column(PERIOD_COLUMN)?;

        let periods = table
            .rows
            .iter()
            .map(|row| parse_date(&row[period_idx]))
            .collect::<Result<Vec<_>>>()?;

        let mut items = BTreeMap::new();
        for (col, name) in table.header.iter().enumerate() {
            if col == period_idx {
                continue;
            }
            let values = table
                .rows
                .iter()
                .map(|row| parse_optional(&row[col]))
                .collect::<Result<Vec<_>>>()?;
            items.insert(name.clone(), values);
        }

        StatementTable::new(periods, items)
    }
}

// ============================================================================
// Reference fields
// ============================================================================

impl ReferenceFields {
    pub fn to_table(&self) -> DataTable {
        let mut table = DataTable::new(REFERENCE_COLUMNS);
        table.rows.push(vec![
            format_optional(self.market_cap),
            format_optional(self.shares_outstanding),
            self.observed_at.to_rfc3339(),
        ]);
        table
    }

    pub fn from_table(table: &DataTable) -> Result<Self> {
        let row = table
            .rows
            .first()
            .ok_or_else(|| AnalyticsError::MissingData("reference fields row".into()))?;

        let observed_raw = &row[table.column("observed_at")?];
        let observed_at = DateTime::parse_from_rfc3339(observed_raw.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                AnalyticsError::InvalidSnapshot(format!("bad timestamp '{}': {}", observed_raw, e))
            })?;

        Ok(Self {
            market_cap: parse_optional(&row[table.column("market_cap")?])?,
            shares_outstanding: parse_optional(&row[table.column("shares_outstanding")?])?,
            observed_at,
        })
    }
}
