//! Yahoo Finance adapter.
//!
//! - Prices: `/v8/finance/chart/{symbol}?range=max&interval=1d`
//! - Statements and reference fields: the fundamentals-timeseries endpoint,
//!   one request per statement with the annual line items it needs.
//!
//! Both endpoints are unauthenticated but reject requests without a
//! browser-like user agent.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::debug;

use super::items;
use super::provider::{MarketDataProvider, ProviderError};
use super::{PriceBar, PriceSeries, ReferenceFields, StatementTable};

const CHART_API_BASE: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const TIMESERIES_API_BASE: &str =
    "https://query2.finance.yahoo.com/ws/fundamentals-timeseries/v1/finance/timeseries";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) lens-analytics";
const RATE_LIMIT_RETRY_SECS: u64 = 60;
/// 1985-09-01, earlier than any statement Yahoo serves.
const TIMESERIES_PERIOD_START: i64 = 494_380_800;

const INCOME_ITEMS: &[(&str, &str)] = &[
    ("annualTotalRevenue", items::TOTAL_REVENUE),
    ("annualGrossProfit", items::GROSS_PROFIT),
    ("annualNetIncome", items::NET_INCOME),
    ("annualEBIT", items::EBIT),
    ("annualInterestExpense", items::INTEREST_EXPENSE),
];

const BALANCE_SHEET_ITEMS: &[(&str, &str)] = &[
    ("annualStockholdersEquity", items::STOCKHOLDERS_EQUITY),
    ("annualCurrentAssets", items::CURRENT_ASSETS),
    ("annualCurrentLiabilities", items::CURRENT_LIABILITIES),
    ("annualInventory", items::INVENTORY),
    ("annualTotalAssets", items::TOTAL_ASSETS),
    ("annualAccountsReceivable", items::ACCOUNTS_RECEIVABLE),
    ("annualTotalLiabilitiesNetMinorityInterest", items::TOTAL_LIABILITIES),
];

const CASH_FLOW_ITEMS: &[(&str, &str)] = &[("annualFreeCashFlow", items::FREE_CASH_FLOW)];

const MARKET_CAP_TYPE: &str = "trailingMarketCap";
const SHARES_TYPE: &str = "annualOrdinarySharesNumber";

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl ApiError {
    fn message(&self) -> String {
        format!(
            "{}: {}",
            self.code.as_deref().unwrap_or("error"),
            self.description.as_deref().unwrap_or("no description")
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    /// Exchange offset from UTC in seconds
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    timeseries: TimeseriesBody,
}

#[derive(Debug, Deserialize)]
struct TimeseriesBody {
    #[serde(default)]
    result: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeseriesPoint {
    as_of_date: NaiveDate,
    #[serde(default)]
    reported_value: Option<ReportedValue>,
}

#[derive(Debug, Deserialize)]
struct ReportedValue {
    raw: f64,
}

/// Values by Yahoo type name, each as (as-of date, value).
type TimeseriesMap = HashMap<String, Vec<(NaiveDate, f64)>>;

// ============================================================================
// Yahoo Adapter
// ============================================================================

/// HTTP adapter for Yahoo Finance.
pub struct YahooAdapter {
    client: reqwest::Client,
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        debug!(url = %url, "Requesting Yahoo endpoint");

        let response = self
            .client
            .get(url)
            .query(query)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Network("Request timeout".into())
                } else if e.is_connect() {
                    ProviderError::Network("Connection failed".into())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::DataNotAvailable(format!("{} returned 404", url)));
        }

        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Internal(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))
    }

    async fn fetch_timeseries(
        &self,
        symbol: &str,
        types: &[&str],
    ) -> Result<TimeseriesMap, ProviderError> {
        let url = format!("{}/{}", TIMESERIES_API_BASE, symbol);
        let query = [
            ("symbol", symbol.to_string()),
            ("type", types.join(",")),
            ("period1", TIMESERIES_PERIOD_START.to_string()),
            ("period2", Utc::now().timestamp().to_string()),
        ];

        let response: TimeseriesResponse = self.get_json(&url, &query).await?;
        if let Some(err) = response.timeseries.error {
            return Err(ProviderError::DataNotAvailable(err.message()));
        }

        Ok(parse_timeseries(response.timeseries.result.unwrap_or_default()))
    }

    async fn fetch_statement(
        &self,
        symbol: &str,
        mapping: &[(&str, &str)],
    ) -> Result<StatementTable, ProviderError> {
        let types: Vec<&str> = mapping.iter().map(|(t, _)| *t).collect();
        let series = self.fetch_timeseries(symbol, &types).await?;

        if series.values().all(|v| v.is_empty()) {
            return Err(ProviderError::DataNotAvailable(format!(
                "no statement data for {}",
                symbol
            )));
        }

        build_statement(&series, mapping)
    }
}

/// Pull (asOfDate, raw) pairs out of each timeseries result.
///
/// Each result names its type in `meta.type[0]` and carries the points under
/// a key of the same name; null points are skipped.
fn parse_timeseries(results: Vec<serde_json::Value>) -> TimeseriesMap {
    let mut map = TimeseriesMap::new();

    for result in results {
        let Some(kind) = result
            .pointer("/meta/type/0")
            .and_then(|v| v.as_str())
            .map(String::from)
        else {
            continue;
        };

        let points = result
            .get(&kind)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter(|p| !p.is_null())
                    .filter_map(|p| serde_json::from_value::<TimeseriesPoint>(p.clone()).ok())
                    .filter_map(|p| p.reported_value.map(|v| (p.as_of_date, v.raw)))
                    .collect()
            })
            .unwrap_or_default();

        map.insert(kind, points);
    }

    map
}

/// Align line items on the union of their period dates, most recent first.
fn build_statement(
    series: &TimeseriesMap,
    mapping: &[(&str, &str)],
) -> Result<StatementTable, ProviderError> {
    let periods: Vec<NaiveDate> = series
        .values()
        .flatten()
        .map(|(date, _)| *date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .rev()
        .collect();

    let mut values = BTreeMap::new();
    for (yahoo_type, item) in mapping {
        let Some(points) = series.get(*yahoo_type) else {
            continue;
        };
        if points.is_empty() {
            continue;
        }
        let by_date: HashMap<NaiveDate, f64> = points.iter().copied().collect();
        let column = periods.iter().map(|p| by_date.get(p).copied()).collect();
        values.insert(item.to_string(), column);
    }

    StatementTable::new(periods, values).map_err(|e| ProviderError::Internal(e.to_string()))
}

/// Convert a chart result into daily bars keyed by exchange-local date.
///
/// Yahoo occasionally repeats the live session; the later row wins.
fn build_price_series(result: ChartResult) -> Result<PriceSeries, ProviderError> {
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let offset = result.meta.gmtoffset;

    let mut by_date: BTreeMap<NaiveDate, PriceBar> = BTreeMap::new();
    for (i, ts) in result.timestamp.iter().enumerate() {
        let Some(moment) = DateTime::from_timestamp(ts + offset, 0) else {
            continue;
        };
        let date = moment.date_naive();
        by_date.insert(
            date,
            PriceBar {
                date,
                open: pick(&quote.open, i),
                high: pick(&quote.high, i),
                low: pick(&quote.low, i),
                close: pick(&quote.close, i),
                volume: pick(&quote.volume, i),
            },
        );
    }

    PriceSeries::new(by_date.into_values().collect())
        .map_err(|e| ProviderError::Internal(e.to_string()))
}

fn pick(column: &[Option<f64>], i: usize) -> f64 {
    column.get(i).copied().flatten().unwrap_or(f64::NAN)
}

/// Latest value of a timeseries type, if any.
fn latest_value(series: &TimeseriesMap, yahoo_type: &str) -> Option<f64> {
    series
        .get(yahoo_type)?
        .iter()
        .max_by_key(|(date, _)| *date)
        .map(|(_, v)| *v)
}

#[async_trait]
impl MarketDataProvider for YahooAdapter {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn price_history(&self, symbol: &str) -> Result<PriceSeries, ProviderError> {
        let url = format!("{}/{}", CHART_API_BASE, symbol);
        let query = [
            ("range", "max".to_string()),
            ("interval", "1d".to_string()),
            ("includePrePost", "false".to_string()),
        ];

        let response: ChartResponse = self.get_json(&url, &query).await?;
        if let Some(err) = response.chart.error {
            return Err(ProviderError::DataNotAvailable(err.message()));
        }

        let result = response
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no chart for {}", symbol)))?;

        if result.timestamp.is_empty() {
            return Err(ProviderError::DataNotAvailable(format!(
                "empty price history for {}",
                symbol
            )));
        }

        build_price_series(result)
    }

    async fn income_statement(&self, symbol: &str) -> Result<StatementTable, ProviderError> {
        self.fetch_statement(symbol, INCOME_ITEMS).await
    }

    async fn balance_sheet(&self, symbol: &str) -> Result<StatementTable, ProviderError> {
        self.fetch_statement(symbol, BALANCE_SHEET_ITEMS).await
    }

    async fn cash_flow(&self, symbol: &str) -> Result<StatementTable, ProviderError> {
        self.fetch_statement(symbol, CASH_FLOW_ITEMS).await
    }

    async fn reference_fields(&self, symbol: &str) -> Result<ReferenceFields, ProviderError> {
        let series = self
            .fetch_timeseries(symbol, &[MARKET_CAP_TYPE, SHARES_TYPE])
            .await?;

        Ok(ReferenceFields {
            market_cap: latest_value(&series, MARKET_CAP_TYPE),
            shares_outstanding: latest_value(&series, SHARES_TYPE),
            observed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_chart_response() {
        let payload = json!({
            "chart": {
                "result": [{
                    "meta": { "gmtoffset": -14400 },
                    "timestamp": [1601472600, 1601559000, 1601559060],
                    "indicators": { "quote": [{
                        "open": [10.0, 9.69, 9.7],
                        "high": [11.41, 10.1, 10.2],
                        "low": [9.11, 9.23, 9.3],
                        "close": [9.5, 9.46, null],
                        "volume": [338584400, 124297600, null]
                    }]}
                }],
                "error": null
            }
        });

        let response: ChartResponse = serde_json::from_value(payload).unwrap();
        let result = response.chart.result.unwrap().into_iter().next().unwrap();
        let series = build_price_series(result).unwrap();

        // Last two timestamps fall on the same local date, the later one wins
        assert_eq!(series.len(), 2);
        assert_eq!(series.bars()[0].date, NaiveDate::from_ymd_opt(2020, 9, 30).unwrap());
        assert!((series.bars()[0].close - 9.5).abs() < 1e-12);
        assert!(series.bars()[1].close.is_nan());
        assert!((series.bars()[1].open - 9.7).abs() < 1e-12);
    }

    #[test]
    fn test_parse_timeseries_into_statement() {
        let results = vec![
            json!({
                "meta": { "symbol": ["PLTR"], "type": ["annualTotalRevenue"] },
                "timestamp": [1640908800, 1672444800],
                "annualTotalRevenue": [
                    { "asOfDate": "2021-12-31", "periodType": "12M",
                      "reportedValue": { "raw": 1541889000.0, "fmt": "1.54B" } },
                    { "asOfDate": "2022-12-31", "periodType": "12M",
                      "reportedValue": { "raw": 1905871000.0, "fmt": "1.91B" } }
                ]
            }),
            json!({
                "meta": { "symbol": ["PLTR"], "type": ["annualNetIncome"] },
                "annualNetIncome": [
                    null,
                    { "asOfDate": "2022-12-31", "periodType": "12M",
                      "reportedValue": { "raw": -373705000.0, "fmt": "-373.71M" } }
                ]
            }),
            json!({ "meta": { "symbol": ["PLTR"], "type": ["annualEBIT"] } }),
        ];

        let series = parse_timeseries(results);
        let table = build_statement(&series, INCOME_ITEMS).unwrap();

        assert_eq!(
            table.periods(),
            &[
                NaiveDate::from_ymd_opt(2022, 12, 31).unwrap(),
                NaiveDate::from_ymd_opt(2021, 12, 31).unwrap()
            ]
        );
        assert_eq!(table.latest(items::TOTAL_REVENUE), Some(1905871000.0));
        assert_eq!(table.latest(items::NET_INCOME), Some(-373705000.0));
        assert_eq!(table.value(items::NET_INCOME, 1), None);
        assert!(table.item_names().all(|n| n != items::EBIT));
    }

    #[test]
    fn test_latest_value() {
        let mut series = TimeseriesMap::new();
        series.insert(
            MARKET_CAP_TYPE.to_string(),
            vec![
                (NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(), 5.6e10),
                (NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(), 8.3e10),
            ],
        );
        assert_eq!(latest_value(&series, MARKET_CAP_TYPE), Some(8.3e10));
        assert_eq!(latest_value(&series, SHARES_TYPE), None);
    }
}
