//! Financial ratios from the latest statement period.
//!
//! A ratio whose inputs are missing, or whose denominator is zero, comes back
//! as `RatioValue::Undefined` with the reason. It never collapses to 0 and
//! never fails the rest of the report.

use chrono::NaiveDate;
use serde::Serialize;

use crate::data::{items, RawSnapshot, ReferenceFields, StatementSet};

// ============================================================================
// Ratio values
// ============================================================================

/// Why a ratio could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "item", rename_all = "snake_case")]
pub enum UndefinedReason {
    /// Line item or reference field absent
    MissingItem(String),
    /// Denominator present but zero
    ZeroDenominator(String),
    /// Result was infinite or NaN
    NonFinite,
}

impl std::fmt::Display for UndefinedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingItem(name) => write!(f, "missing {}", name),
            Self::ZeroDenominator(name) => write!(f, "{} is zero", name),
            Self::NonFinite => write!(f, "non-finite result"),
        }
    }
}

/// A computed ratio or the reason it is undefined.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioValue {
    Value(f64),
    Undefined(UndefinedReason),
}

impl RatioValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Undefined(_) => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl std::fmt::Display for RatioValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{:.2}", v),
            Self::Undefined(reason) => write!(f, "n/a ({})", reason),
        }
    }
}

/// A named operand: where the number came from, and the number if known.
#[derive(Debug, Clone, Copy)]
struct Operand<'a> {
    name: &'a str,
    value: Option<f64>,
}

fn operand(name: &str, value: Option<f64>) -> Operand<'_> {
    Operand { name, value }
}

fn divide(numerator: Operand<'_>, denominator: Operand<'_>, scale: f64) -> RatioValue {
    let Some(num) = numerator.value else {
        return RatioValue::Undefined(UndefinedReason::MissingItem(numerator.name.to_string()));
    };
    let Some(den) = denominator.value else {
        return RatioValue::Undefined(UndefinedReason::MissingItem(denominator.name.to_string()));
    };
    if den == 0.0 {
        return RatioValue::Undefined(UndefinedReason::ZeroDenominator(
            denominator.name.to_string(),
        ));
    }

    let ratio = num / den * scale;
    if ratio.is_finite() {
        RatioValue::Value(ratio)
    } else {
        RatioValue::Undefined(UndefinedReason::NonFinite)
    }
}

// ============================================================================
// Report
// ============================================================================

/// Margins and return on equity, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitabilityRatios {
    pub gross_margin: RatioValue,
    pub net_margin: RatioValue,
    pub return_on_equity: RatioValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidityRatios {
    pub current_ratio: RatioValue,
    pub quick_ratio: RatioValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyRatios {
    pub asset_turnover: RatioValue,
    pub receivables_turnover: RatioValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeverageRatios {
    pub debt_to_equity: RatioValue,
    pub interest_coverage: RatioValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketRatios {
    pub price_to_earnings: RatioValue,
    pub price_to_book: RatioValue,
}

/// All ratio groups for one fiscal period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioReport {
    /// Fiscal period end the statement ratios were taken from
    pub period_end: Option<NaiveDate>,
    pub profitability: ProfitabilityRatios,
    pub liquidity: LiquidityRatios,
    pub efficiency: EfficiencyRatios,
    pub leverage: LeverageRatios,
    pub market: MarketRatios,
    /// Inventory was absent and treated as 0 in the quick ratio
    pub inventory_fallback: bool,
    /// Market ratios mix point-in-time market cap with period statements
    pub reference_fields_unaligned: bool,
}

impl RatioReport {
    /// Every ratio as `(group, name, value)`, in display order.
    pub fn entries(&self) -> Vec<(&'static str, &'static str, &RatioValue)> {
        vec![
            ("profitability", "gross_margin", &self.profitability.gross_margin),
            ("profitability", "net_margin", &self.profitability.net_margin),
            ("profitability", "return_on_equity", &self.profitability.return_on_equity),
            ("liquidity", "current_ratio", &self.liquidity.current_ratio),
            ("liquidity", "quick_ratio", &self.liquidity.quick_ratio),
            ("efficiency", "asset_turnover", &self.efficiency.asset_turnover),
            ("efficiency", "receivables_turnover", &self.efficiency.receivables_turnover),
            ("leverage", "debt_to_equity", &self.leverage.debt_to_equity),
            ("leverage", "interest_coverage", &self.leverage.interest_coverage),
            ("market", "price_to_earnings", &self.market.price_to_earnings),
            ("market", "price_to_book", &self.market.price_to_book),
        ]
    }

    pub fn undefined_count(&self) -> usize {
        self.entries().iter().filter(|(_, _, v)| !v.is_defined()).count()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Derives the ratio report from statements and reference fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct RatioEngine;

impl RatioEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn from_snapshot(&self, snapshot: &RawSnapshot) -> RatioReport {
        self.compute(&snapshot.statements, &snapshot.reference)
    }

    /// Compute every ratio for period 0.
    pub fn compute(&self, statements: &StatementSet, reference: &ReferenceFields) -> RatioReport {
        let income = &statements.income;
        let balance = &statements.balance_sheet;

        let revenue = operand(items::TOTAL_REVENUE, income.latest(items::TOTAL_REVENUE));
        let gross_profit = operand(items::GROSS_PROFIT, income.latest(items::GROSS_PROFIT));
        let net_income = operand(items::NET_INCOME, income.latest(items::NET_INCOME));
        let ebit = operand(items::EBIT, income.latest(items::EBIT));
        let interest = operand(items::INTEREST_EXPENSE, income.latest(items::INTEREST_EXPENSE));

        let equity = operand(
            items::STOCKHOLDERS_EQUITY,
            balance.latest(items::STOCKHOLDERS_EQUITY),
        );
        let current_assets = operand(items::CURRENT_ASSETS, balance.latest(items::CURRENT_ASSETS));
        let current_liabilities = operand(
            items::CURRENT_LIABILITIES,
            balance.latest(items::CURRENT_LIABILITIES),
        );
        let total_assets = operand(items::TOTAL_ASSETS, balance.latest(items::TOTAL_ASSETS));
        let receivables = operand(
            items::ACCOUNTS_RECEIVABLE,
            balance.latest(items::ACCOUNTS_RECEIVABLE),
        );
        let total_liabilities = operand(
            items::TOTAL_LIABILITIES,
            balance.latest(items::TOTAL_LIABILITIES),
        );

        let inventory = balance.latest(items::INVENTORY);
        let inventory_fallback = inventory.is_none();
        let quick_assets = operand(
            items::CURRENT_ASSETS,
            current_assets.value.map(|ca| ca - inventory.unwrap_or(0.0)),
        );

        let market_cap = operand("market cap", reference.market_cap);

        RatioReport {
            period_end: statements.latest_period(),
            profitability: ProfitabilityRatios {
                gross_margin: divide(gross_profit, revenue, 100.0),
                net_margin: divide(net_income, revenue, 100.0),
                return_on_equity: divide(net_income, equity, 100.0),
            },
            liquidity: LiquidityRatios {
                current_ratio: divide(current_assets, current_liabilities, 1.0),
                quick_ratio: divide(quick_assets, current_liabilities, 1.0),
            },
            efficiency: EfficiencyRatios {
                asset_turnover: divide(revenue, total_assets, 1.0),
                receivables_turnover: divide(revenue, receivables, 1.0),
            },
            leverage: LeverageRatios {
                debt_to_equity: divide(total_liabilities, equity, 1.0),
                interest_coverage: divide(ebit, interest, 1.0),
            },
            market: MarketRatios {
                price_to_earnings: divide(market_cap, net_income, 1.0),
                price_to_book: divide(market_cap, equity, 1.0),
            },
            inventory_fallback,
            reference_fields_unaligned: reference.market_cap.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StatementTable;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn table(values: &[(&str, f64)]) -> StatementTable {
        let items: BTreeMap<String, Vec<Option<f64>>> = values
            .iter()
            .map(|(name, v)| (name.to_string(), vec![Some(*v)]))
            .collect();
        StatementTable::new(vec![NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()], items).unwrap()
    }

    fn full_statements() -> StatementSet {
        StatementSet::new(
            table(&[
                (items::TOTAL_REVENUE, 1000.0),
                (items::GROSS_PROFIT, 800.0),
                (items::NET_INCOME, 200.0),
                (items::EBIT, 250.0),
                (items::INTEREST_EXPENSE, 50.0),
            ]),
            table(&[
                (items::STOCKHOLDERS_EQUITY, 2000.0),
                (items::CURRENT_ASSETS, 1500.0),
                (items::CURRENT_LIABILITIES, 500.0),
                (items::INVENTORY, 100.0),
                (items::TOTAL_ASSETS, 4000.0),
                (items::ACCOUNTS_RECEIVABLE, 250.0),
                (items::TOTAL_LIABILITIES, 1000.0),
            ]),
            table(&[(items::FREE_CASH_FLOW, 300.0)]),
        )
        .unwrap()
    }

    fn reference(market_cap: Option<f64>) -> ReferenceFields {
        ReferenceFields {
            market_cap,
            shares_outstanding: Some(100.0),
            observed_at: Utc::now(),
        }
    }

    fn value(v: &RatioValue) -> f64 {
        v.value().expect("ratio should be defined")
    }

    #[test]
    fn test_all_ratios_defined() {
        let report = RatioEngine::new().compute(&full_statements(), &reference(Some(10_000.0)));

        assert_eq!(report.undefined_count(), 0);
        assert!((value(&report.profitability.gross_margin) - 80.0).abs() < 1e-9);
        assert!((value(&report.profitability.net_margin) - 20.0).abs() < 1e-9);
        assert!((value(&report.profitability.return_on_equity) - 10.0).abs() < 1e-9);
        assert!((value(&report.liquidity.current_ratio) - 3.0).abs() < 1e-9);
        assert!((value(&report.liquidity.quick_ratio) - 2.8).abs() < 1e-9);
        assert!((value(&report.efficiency.asset_turnover) - 0.25).abs() < 1e-9);
        assert!((value(&report.efficiency.receivables_turnover) - 4.0).abs() < 1e-9);
        assert!((value(&report.leverage.debt_to_equity) - 0.5).abs() < 1e-9);
        assert!((value(&report.leverage.interest_coverage) - 5.0).abs() < 1e-9);
        assert!((value(&report.market.price_to_earnings) - 50.0).abs() < 1e-9);
        assert!((value(&report.market.price_to_book) - 5.0).abs() < 1e-9);
        assert!(!report.inventory_fallback);
        assert!(report.reference_fields_unaligned);
        assert_eq!(report.period_end, NaiveDate::from_ymd_opt(2023, 12, 31));
    }

    #[test]
    fn test_zero_denominator_only_affects_that_ratio() {
        let mut statements = full_statements();
        statements.income = table(&[
            (items::TOTAL_REVENUE, 1000.0),
            (items::GROSS_PROFIT, 800.0),
            (items::NET_INCOME, 200.0),
            (items::EBIT, 250.0),
            (items::INTEREST_EXPENSE, 0.0),
        ]);

        let report = RatioEngine::new().compute(&statements, &reference(Some(10_000.0)));

        assert_eq!(
            report.leverage.interest_coverage,
            RatioValue::Undefined(UndefinedReason::ZeroDenominator(
                items::INTEREST_EXPENSE.to_string()
            ))
        );
        assert_eq!(report.undefined_count(), 1);
        assert!(report.leverage.debt_to_equity.is_defined());
    }

    #[test]
    fn test_missing_items_and_inventory_fallback() {
        let mut statements = full_statements();
        statements.balance_sheet = table(&[
            (items::STOCKHOLDERS_EQUITY, 2000.0),
            (items::CURRENT_ASSETS, 1500.0),
            (items::CURRENT_LIABILITIES, 500.0),
            (items::TOTAL_ASSETS, 4000.0),
            (items::TOTAL_LIABILITIES, 1000.0),
        ]);

        let report = RatioEngine::new().compute(&statements, &reference(None));

        assert!(report.inventory_fallback);
        assert!((value(&report.liquidity.quick_ratio) - 3.0).abs() < 1e-9);
        assert_eq!(
            report.efficiency.receivables_turnover,
            RatioValue::Undefined(UndefinedReason::MissingItem(
                items::ACCOUNTS_RECEIVABLE.to_string()
            ))
        );
        assert!(!report.market.price_to_earnings.is_defined());
        assert!(!report.market.price_to_book.is_defined());
        assert!(!report.reference_fields_unaligned);
        assert_eq!(report.undefined_count(), 3);
    }

    #[test]
    fn test_empty_statements() {
        let report = RatioEngine::new()
            .compute(&StatementSet::default(), &reference(Some(1.0)));
        assert_eq!(report.period_end, None);
        assert_eq!(report.undefined_count(), report.entries().len());
    }

    #[test]
    fn test_display() {
        assert_eq!(RatioValue::Value(3.14159).to_string(), "3.14");
        assert_eq!(
            RatioValue::Undefined(UndefinedReason::NonFinite).to_string(),
            "n/a (non-finite result)"
        );
    }
}
