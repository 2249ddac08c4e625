use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Full payload cached for a view. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Dashboard(DashboardSnapshot),
    Activities(ActivityPage),
    Stock(StockSnapshot),
    Search(SearchSnapshot),
    Settings(SettingsSnapshot),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Money {
    #[serde(deserialize_with = "de_amount")]
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountChange {
    #[serde(deserialize_with = "de_amount")]
    pub amount: f64,
    #[serde(deserialize_with = "de_amount")]
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Table<T> {
    pub table: T,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultsList<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

impl<T> Default for ResultsList<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DashboardSnapshot {
    pub available_to_trade: Money,
    pub account_value: Money,
    pub net_deposits: Money,
    pub available_to_withdraw: Money,
    pub account_change: AccountChange,
    pub account_value_graph: Table<Vec<ValuePoint>>,
    pub account_positions: Table<ResultsList<Position>>,
    pub account_watchlist: Table<Watchlist>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValuePoint {
    pub date: String,
    pub value: Money,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Watchlist {
    #[serde(default)]
    pub securities: Vec<Security>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StockRef {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub primary_exchange: Option<String>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub avg_daily_volume_last_month: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Quote {
    #[serde(deserialize_with = "de_amount")]
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub high: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub low: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub open: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Position {
    pub id: String,
    pub stock: StockRef,
    #[serde(deserialize_with = "de_amount")]
    pub quantity: f64,
    pub quote: Quote,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Security {
    pub id: String,
    pub stock: StockRef,
    #[serde(default)]
    pub quote: Option<Quote>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StockSnapshot {
    #[serde(default)]
    pub sparkline: Sparkline,
    pub security_info: SecurityInfo,
    #[serde(default)]
    pub position: ResultsList<AccountPositions>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Sparkline {
    #[serde(default)]
    pub results: Vec<SparkPoint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SparkPoint {
    pub time: String,
    #[serde(deserialize_with = "de_amount")]
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SecurityInfo {
    pub id: String,
    #[serde(default)]
    pub asset_class: String,
    #[serde(default)]
    pub security_type: String,
    pub stock: StockRef,
    pub quote: Quote,
    #[serde(default)]
    pub fundamentals: Fundamentals,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Fundamentals {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub high_52_week: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub low_52_week: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub market_cap: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub pe_ratio: Option<f64>,
    #[serde(default, rename = "yield", deserialize_with = "de_opt_amount")]
    pub dividend_yield: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub beta: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub company_debt: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub company_revenue: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub total_assets: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub company_gross_profit_margin: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub company_cash: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_amount")]
    pub company_earnings_growth: Option<f64>,
    #[serde(default)]
    pub company_ceo: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AccountPositions {
    #[serde(default)]
    pub position_quantities: BTreeMap<String, Value>,
}

impl StockSnapshot {
    /// Whether the first account holds any quantity of the displayed security.
    pub fn is_owned(&self) -> bool {
        self.position
            .results
            .first()
            .is_some_and(|account| {
                account
                    .position_quantities
                    .contains_key(&self.security_info.id)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityPage {
    pub results: Vec<ActivityEntry>,
    #[serde(default)]
    pub bookmark: Option<String>,
}

/// A single account activity. Closed set; anything the client has no
/// projection for lands in `Unrecognized` instead of being dropped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub enum ActivityEntry {
    Order(OrderActivity),
    Transfer(TransferActivity),
    Dividend(DividendActivity),
    Unrecognized(UnrecognizedActivity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderActivity {
    pub id: Option<String>,
    pub side: OrderSide,
    pub symbol: Option<String>,
    pub status: Option<String>,
    pub market_value: Option<Money>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferActivity {
    pub id: Option<String>,
    pub kind: TransferKind,
    pub status: Option<String>,
    pub value: Option<Money>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DividendActivity {
    pub id: Option<String>,
    pub symbol: Option<String>,
    pub amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnrecognizedActivity {
    pub id: Option<String>,
    pub kind: String,
}

/// Field access on a raw activity object. Kind fields are read first; money
/// fields are only parsed for kinds that display them, and a malformed one
/// reads as absent rather than failing the page.
struct RawActivity(Map<String, Value>);

impl RawActivity {
    fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn money(&self, key: &str) -> Option<Money> {
        let value = self.0.get(key).filter(|value| !value.is_null())?;
        Money::deserialize(value).ok()
    }
}

impl From<Map<String, Value>> for ActivityEntry {
    fn from(fields: Map<String, Value>) -> Self {
        let raw = RawActivity(fields);
        let id = raw.text("id");
        let object = raw.text("object").unwrap_or_default();
        match object.as_str() {
            "order" => {
                let order_type = raw.text("order_type").unwrap_or_default();
                let side = if order_type.starts_with("buy") {
                    OrderSide::Buy
                } else if order_type.starts_with("sell") {
                    OrderSide::Sell
                } else {
                    return ActivityEntry::Unrecognized(UnrecognizedActivity {
                        id,
                        kind: format!("order/{order_type}"),
                    });
                };
                ActivityEntry::Order(OrderActivity {
                    id,
                    side,
                    symbol: raw.text("symbol"),
                    status: raw.text("status"),
                    market_value: raw.money("market_value"),
                })
            }
            "deposit" | "withdrawal" => ActivityEntry::Transfer(TransferActivity {
                id,
                kind: if object == "deposit" {
                    TransferKind::Deposit
                } else {
                    TransferKind::Withdrawal
                },
                status: raw.text("status"),
                value: raw.money("value"),
            }),
            "dividend" => ActivityEntry::Dividend(DividendActivity {
                id,
                symbol: raw.text("symbol"),
                amount: raw.money("market_value").or_else(|| raw.money("net_cash")),
            }),
            _ => ActivityEntry::Unrecognized(UnrecognizedActivity {
                id,
                kind: if object.is_empty() {
                    "<missing>".to_string()
                } else {
                    object
                },
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub most_watched: ResultsList<Security>,
    #[serde(default)]
    pub most_active: ResultsList<Security>,
    #[serde(default)]
    pub top_gainers: ResultsList<Security>,
    #[serde(default)]
    pub top_losers: ResultsList<Security>,
}

/// Search view state: the pushed top-movers page plus the results of the
/// most recent query that was still current when it came back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSnapshot {
    pub page: Option<SearchPage>,
    pub query: Option<String>,
    pub results: Vec<Security>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsSnapshot {
    pub sections: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

fn parse_amount<E: serde::de::Error>(value: NumberOrText) -> Result<f64, E> {
    match value {
        NumberOrText::Number(number) => Ok(number),
        NumberOrText::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|err| E::custom(format!("invalid amount {text:?}: {err}"))),
    }
}

/// Amounts arrive either as JSON numbers or as decimal strings.
fn de_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    parse_amount(NumberOrText::deserialize(deserializer)?)
}

fn de_opt_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        Some(value) => parse_amount(value).map(Some),
        None => Ok(None),
    }
}
