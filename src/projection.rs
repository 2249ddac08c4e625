//! Pure derivation of renderable view models from cached snapshots.
//!
//! Nothing in here touches the network or holds state: the same snapshot and
//! display mode always produce the same [`ViewModel`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{
    ActivityEntry, ActivityPage, DashboardSnapshot, DividendActivity, Money, OrderActivity,
    OrderSide, SearchSnapshot, Security, SettingsSnapshot, Snapshot, StockSnapshot,
    TransferActivity, TransferKind, UnrecognizedActivity,
};

const STOCK_ASSET_CLASSES: [&str; 3] = ["us_stocks", "canadian_stocks", "individual_stocks"];

/// Local display toggle for position values. Never sent to the service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Current quote price of each position.
    #[default]
    Price,
    /// Number of shares held.
    Shares,
}

impl DisplayMode {
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::Price => DisplayMode::Shares,
            DisplayMode::Shares => DisplayMode::Price,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DisplayMode::Price => "price",
            DisplayMode::Shares => "shares",
        })
    }
}

impl FromStr for DisplayMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "price" => Ok(DisplayMode::Price),
            "shares" => Ok(DisplayMode::Shares),
            other => anyhow::bail!("unknown display mode {other:?} (expected price or shares)"),
        }
    }
}

/// What a render sink is asked to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "frame", content = "data", rename_all = "snake_case")]
pub enum RenderFrame {
    /// Redraw the whole view.
    Full(ViewModel),
    /// Append rows to the bottom of the activity list.
    Append(Vec<DisplayFields>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewModel {
    Dashboard(DashboardView),
    Activities(ActivitiesView),
    Stock(StockView),
    Search(SearchView),
    Settings(SettingsView),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricLine {
    pub label: String,
    pub value: String,
}

impl MetricLine {
    fn new(label: &str, value: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRow {
    pub security_id: String,
    pub symbol: String,
    pub value: String,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub mode: DisplayMode,
    pub metrics: Vec<MetricLine>,
    pub chart: Vec<ChartPoint>,
    pub positions: Vec<PositionRow>,
    pub watchlist: Vec<PositionRow>,
}

/// Display fields for one activity row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayFields {
    pub kind: String,
    pub title: String,
    pub value: String,
    pub recognized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitiesView {
    pub rows: Vec<DisplayFields>,
    pub exhausted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum StockDetail {
    Equity {
        stats: Vec<MetricLine>,
        sparkline: Vec<ChartPoint>,
        website: Option<String>,
    },
    Etf,
    Unknown {
        asset_class: String,
        security_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockView {
    pub security_id: String,
    pub symbol: String,
    pub name: String,
    pub price: String,
    pub description: Option<String>,
    pub owned: bool,
    pub detail: StockDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityLink {
    pub security_id: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchView {
    pub most_watched: Vec<SecurityLink>,
    pub most_active: Vec<SecurityLink>,
    pub top_gainers: Vec<SecurityLink>,
    pub top_losers: Vec<SecurityLink>,
    pub query: Option<String>,
    pub results: Vec<SecurityLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsView {
    pub sections: Vec<MetricLine>,
}

/// Per-kind projection of a feed entry into a display row.
pub trait EntryProjection {
    fn display_fields(&self) -> DisplayFields;
}

impl EntryProjection for ActivityEntry {
    fn display_fields(&self) -> DisplayFields {
        match self {
            ActivityEntry::Order(order) => order.display_fields(),
            ActivityEntry::Transfer(transfer) => transfer.display_fields(),
            ActivityEntry::Dividend(dividend) => dividend.display_fields(),
            ActivityEntry::Unrecognized(entry) => entry.display_fields(),
        }
    }
}

impl EntryProjection for OrderActivity {
    fn display_fields(&self) -> DisplayFields {
        let kind = match self.side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        DisplayFields {
            kind: kind.to_string(),
            title: self.symbol.clone().unwrap_or_else(|| "order".to_string()),
            value: status_value(self.status.as_deref(), "posted", self.market_value.as_ref()),
            recognized: true,
        }
    }
}

impl EntryProjection for TransferActivity {
    fn display_fields(&self) -> DisplayFields {
        let kind = match self.kind {
            TransferKind::Deposit => "deposit",
            TransferKind::Withdrawal => "withdrawal",
        };
        DisplayFields {
            kind: kind.to_string(),
            title: kind.to_string(),
            value: status_value(self.status.as_deref(), "accepted", self.value.as_ref()),
            recognized: true,
        }
    }
}

impl EntryProjection for DividendActivity {
    fn display_fields(&self) -> DisplayFields {
        DisplayFields {
            kind: "dividend".to_string(),
            title: self
                .symbol
                .clone()
                .unwrap_or_else(|| "dividend".to_string()),
            value: self
                .amount
                .as_ref()
                .map(money_text)
                .unwrap_or_else(|| "None".to_string()),
            recognized: true,
        }
    }
}

impl EntryProjection for UnrecognizedActivity {
    fn display_fields(&self) -> DisplayFields {
        DisplayFields {
            kind: "unrecognized".to_string(),
            title: self.kind.clone(),
            value: format!("unrecognized activity type {}", self.kind),
            recognized: false,
        }
    }
}

fn status_value(status: Option<&str>, settled: &str, amount: Option<&Money>) -> String {
    match (status, amount) {
        (Some("cancelled"), _) => "cancelled".to_string(),
        (Some(status), Some(amount)) if status == settled => money_text(amount),
        _ => "None".to_string(),
    }
}

/// Projects a snapshot for display under `mode`.
pub fn project(snapshot: &Snapshot, mode: DisplayMode) -> ViewModel {
    match snapshot {
        Snapshot::Dashboard(dashboard) => ViewModel::Dashboard(dashboard_view(dashboard, mode)),
        Snapshot::Activities(page) => ViewModel::Activities(page_view(page)),
        Snapshot::Stock(stock) => ViewModel::Stock(stock_view(stock)),
        Snapshot::Search(search) => ViewModel::Search(search_view(search)),
        Snapshot::Settings(settings) => ViewModel::Settings(settings_view(settings)),
    }
}

pub fn activity_rows(entries: &[ActivityEntry]) -> Vec<DisplayFields> {
    entries.iter().map(EntryProjection::display_fields).collect()
}

pub fn activities_view(entries: &[ActivityEntry], exhausted: bool) -> ActivitiesView {
    ActivitiesView {
        rows: activity_rows(entries),
        exhausted,
    }
}

fn page_view(page: &ActivityPage) -> ActivitiesView {
    let exhausted = page
        .bookmark
        .as_deref()
        .map_or(true, |bookmark| bookmark.trim().is_empty());
    activities_view(&page.results, exhausted)
}

fn dashboard_view(snapshot: &DashboardSnapshot, mode: DisplayMode) -> DashboardView {
    let metrics = vec![
        MetricLine::new(
            "Account value",
            format!(
                "{} {}",
                fixed2(snapshot.account_value.amount),
                snapshot.account_value.currency
            ),
        ),
        MetricLine::new(
            "Account change",
            format!(
                "${}({}%)",
                snapshot.account_change.amount, snapshot.account_change.percentage
            ),
        ),
        MetricLine::new("Net deposit", money_text(&snapshot.net_deposits)),
        MetricLine::new("Available to trade", money_text(&snapshot.available_to_trade)),
        MetricLine::new(
            "Available to withdraw",
            money_text(&snapshot.available_to_withdraw),
        ),
    ];

    let chart = snapshot
        .account_value_graph
        .table
        .iter()
        .map(|point| ChartPoint {
            label: chart_label(&point.date),
            value: round2(point.value.amount),
        })
        .collect();

    let positions = snapshot
        .account_positions
        .table
        .results
        .iter()
        .map(|position| match mode {
            DisplayMode::Shares => PositionRow {
                security_id: position.id.clone(),
                symbol: position.stock.symbol.clone(),
                value: position.quantity.to_string(),
                unit: None,
            },
            DisplayMode::Price => PositionRow {
                security_id: position.id.clone(),
                symbol: position.stock.symbol.clone(),
                value: fixed2(position.quote.amount),
                unit: non_empty(&position.quote.currency),
            },
        })
        .collect();

    let watchlist = snapshot
        .account_watchlist
        .table
        .securities
        .iter()
        .map(|security| PositionRow {
            security_id: security.id.clone(),
            symbol: security.stock.symbol.clone(),
            value: security
                .quote
                .as_ref()
                .map(|quote| fixed2(quote.amount))
                .unwrap_or_else(|| "None".to_string()),
            unit: security
                .quote
                .as_ref()
                .and_then(|quote| non_empty(&quote.currency)),
        })
        .collect();

    DashboardView {
        mode,
        metrics,
        chart,
        positions,
        watchlist,
    }
}

fn stock_view(snapshot: &StockSnapshot) -> StockView {
    let info = &snapshot.security_info;
    let fundamentals = &info.fundamentals;
    let is_stock = STOCK_ASSET_CLASSES.contains(&info.asset_class.as_str())
        && info.security_type == "equity";

    let detail = if is_stock {
        let stats = vec![
            MetricLine::new("High", opt_fixed2(info.quote.high)),
            MetricLine::new("52W high", opt_fixed2(fundamentals.high_52_week)),
            MetricLine::new("Low", opt_fixed2(info.quote.low)),
            MetricLine::new("52W low", opt_fixed2(fundamentals.low_52_week)),
            MetricLine::new("Open", opt_fixed2(info.quote.open)),
            MetricLine::new("Market cap", opt_fixed2(fundamentals.market_cap)),
            MetricLine::new("Volume", opt_plain(info.quote.volume)),
            MetricLine::new("Avg volume", opt_fixed2(info.stock.avg_daily_volume_last_month)),
            MetricLine::new("P/E ratio", opt_plain(fundamentals.pe_ratio)),
            MetricLine::new(
                "Yield",
                fundamentals
                    .dividend_yield
                    .map(|value| format!("{}%", fixed2(value * 100.0)))
                    .unwrap_or_else(|| "None".to_string()),
            ),
            MetricLine::new(
                "Exchange",
                info.stock
                    .primary_exchange
                    .clone()
                    .unwrap_or_else(|| "None".to_string()),
            ),
            MetricLine::new("Beta", opt_plain(fundamentals.beta)),
            MetricLine::new("Debt", opt_plain(fundamentals.company_debt)),
            MetricLine::new("Revenue", opt_plain(fundamentals.company_revenue)),
            MetricLine::new("Total assets", opt_plain(fundamentals.total_assets)),
            MetricLine::new(
                "Gross profit margin",
                opt_fixed2(fundamentals.company_gross_profit_margin),
            ),
            MetricLine::new("Cash", opt_plain(fundamentals.company_cash)),
            MetricLine::new("Earnings growth", opt_fixed2(fundamentals.company_earnings_growth)),
            MetricLine::new(
                "CEO",
                fundamentals
                    .company_ceo
                    .clone()
                    .unwrap_or_else(|| "None".to_string()),
            ),
        ];
        // The first sample is the previous close, not part of the session curve.
        let sparkline = snapshot
            .sparkline
            .results
            .iter()
            .skip(1)
            .map(|point| ChartPoint {
                label: sparkline_label(&point.time),
                value: point.close,
            })
            .collect();
        StockDetail::Equity {
            stats,
            sparkline,
            website: fundamentals.website.clone(),
        }
    } else if info.security_type == "exchange_traded_fund" {
        StockDetail::Etf
    } else {
        StockDetail::Unknown {
            asset_class: info.asset_class.clone(),
            security_type: info.security_type.clone(),
        }
    };

    let description = match detail {
        StockDetail::Unknown { .. } => None,
        _ => fundamentals.description.clone(),
    };

    StockView {
        security_id: info.id.clone(),
        symbol: info.stock.symbol.clone(),
        name: info.stock.name.clone(),
        price: format!("{} {}", fixed2(info.quote.amount), info.quote.currency)
            .trim_end()
            .to_string(),
        description,
        owned: snapshot.is_owned(),
        detail,
    }
}

fn search_view(snapshot: &SearchSnapshot) -> SearchView {
    let page = snapshot.page.clone().unwrap_or_default();
    SearchView {
        most_watched: links(&page.most_watched.results),
        most_active: links(&page.most_active.results),
        top_gainers: links(&page.top_gainers.results),
        top_losers: links(&page.top_losers.results),
        query: snapshot.query.clone(),
        results: links(&snapshot.results),
    }
}

fn links(securities: &[Security]) -> Vec<SecurityLink> {
    securities
        .iter()
        .map(|security| SecurityLink {
            security_id: security.id.clone(),
            symbol: security.stock.symbol.clone(),
        })
        .collect()
}

fn settings_view(snapshot: &SettingsSnapshot) -> SettingsView {
    let sections = snapshot
        .sections
        .iter()
        .map(|(key, value)| {
            let summary = match value {
                Value::Object(fields) => format!("{} fields", fields.len()),
                Value::Array(items) => format!("{} items", items.len()),
                Value::String(text) => text.clone(),
                Value::Null => "None".to_string(),
                other => other.to_string(),
            };
            MetricLine::new(key, summary)
        })
        .collect();
    SettingsView { sections }
}

fn chart_label(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.format("%H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn sparkline_label(raw: &str) -> String {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map(|time| time.format("%-I:%M %p").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn money_text(money: &Money) -> String {
    format!("{} {}", money.amount, money.currency)
        .trim_end()
        .to_string()
}

fn fixed2(value: f64) -> String {
    format!("{value:.2}")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn opt_fixed2(value: Option<f64>) -> String {
    value.map(fixed2).unwrap_or_else(|| "None".to_string())
}

fn opt_plain(value: Option<f64>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| "None".to_string())
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn dashboard_payload(quantity: f64, quote: &str) -> Value {
        json!({
            "available_to_trade": {"amount": 10, "currency": "CAD"},
            "account_value": {"amount": 1234.5, "currency": "CAD"},
            "net_deposits": {"amount": 1000, "currency": "CAD"},
            "available_to_withdraw": {"amount": 5, "currency": "CAD"},
            "account_change": {"amount": 234.5, "percentage": 23.45},
            "account_value_graph": {"table": [
                {"date": "2020-11-02T14:30:00Z", "value": {"amount": 1200.456, "currency": "CAD"}}
            ]},
            "account_positions": {"table": {"results": [
                {"id": "sec-aapl", "stock": {"symbol": "AAPL"}, "quantity": quantity,
                 "quote": {"amount": quote, "currency": "USD"}}
            ]}},
            "account_watchlist": {"table": {"securities": [
                {"id": "sec-shop", "stock": {"symbol": "SHOP"}, "quote": {"amount": "1012.1", "currency": "CAD"}}
            ]}}
        })
    }

    pub(crate) fn dashboard_snapshot(quantity: f64, quote: &str) -> Snapshot {
        Snapshot::Dashboard(serde_json::from_value(dashboard_payload(quantity, quote)).unwrap())
    }

    fn positions(view: ViewModel) -> Vec<PositionRow> {
        match view {
            ViewModel::Dashboard(dashboard) => dashboard.positions,
            other => panic!("expected dashboard, got {other:?}"),
        }
    }

    #[test]
    fn toggle_switches_between_price_and_shares() {
        let snapshot = dashboard_snapshot(5.0, "100");
        let shares = positions(project(&snapshot, DisplayMode::Shares));
        assert_eq!(shares[0].symbol, "AAPL");
        assert_eq!(shares[0].value, "5");
        assert_eq!(shares[0].unit, None);

        let price = positions(project(&snapshot, DisplayMode::Price));
        assert_eq!(price[0].value, "100.00");
        assert_eq!(price[0].unit.as_deref(), Some("USD"));
    }

    #[test]
    fn dashboard_metrics_and_chart() {
        let view = project(&dashboard_snapshot(1.5, "3"), DisplayMode::Price);
        let ViewModel::Dashboard(dashboard) = view else {
            panic!("expected dashboard");
        };
        assert_eq!(dashboard.metrics[0].value, "1234.50 CAD");
        assert_eq!(dashboard.metrics[1].value, "$234.5(23.45%)");
        assert_eq!(dashboard.chart[0].label, "14:30");
        assert_eq!(dashboard.chart[0].value, 1200.46);
        assert_eq!(dashboard.watchlist[0].value, "1012.10");
    }

    #[test]
    fn projection_is_repeatable() {
        let snapshot = dashboard_snapshot(2.0, "41.999");
        for mode in [DisplayMode::Price, DisplayMode::Shares] {
            assert_eq!(project(&snapshot, mode), project(&snapshot, mode));
        }
    }

    #[test]
    fn entry_projection_follows_status() {
        let entries: Vec<ActivityEntry> = serde_json::from_value(json!([
            {"object": "order", "order_type": "buy_quantity", "symbol": "AAPL", "status": "posted",
             "market_value": {"amount": 500, "currency": "USD"}},
            {"object": "order", "order_type": "sell_quantity", "status": "cancelled"},
            {"object": "deposit", "status": "pending", "value": {"amount": 50, "currency": "CAD"}},
            {"object": "withdrawal", "status": "accepted", "value": {"amount": 20, "currency": "CAD"}},
            {"object": "referral_reward"}
        ]))
        .unwrap();
        let rows = activity_rows(&entries);
        assert_eq!(rows[0].title, "AAPL");
        assert_eq!(rows[0].value, "500 USD");
        assert_eq!(rows[1].value, "cancelled");
        assert_eq!(rows[2].value, "None");
        assert_eq!(rows[3].value, "20 CAD");
        assert_eq!(rows[4].kind, "unrecognized");
        assert!(!rows[4].recognized);
        assert_eq!(rows[4].title, "referral_reward");
    }

    #[test]
    fn stock_classification() {
        let base = json!({
            "sparkline": {"results": [
                {"time": "09:30:00", "close": 99},
                {"time": "13:05:00", "close": "101.5"}
            ]},
            "security_info": {
                "id": "sec-1", "asset_class": "us_stocks", "security_type": "equity",
                "stock": {"symbol": "AAPL", "name": "Apple"},
                "quote": {"amount": "120.5", "currency": "USD", "high": "121"},
                "fundamentals": {"description": "Phones", "yield": 0.0065}
            }
        });
        let stock: StockSnapshot = serde_json::from_value(base.clone()).unwrap();
        let ViewModel::Stock(view) = project(&Snapshot::Stock(stock), DisplayMode::Price) else {
            panic!("expected stock view");
        };
        assert_eq!(view.price, "120.50 USD");
        assert!(!view.owned);
        match view.detail {
            StockDetail::Equity { stats, sparkline, .. } => {
                assert_eq!(sparkline.len(), 1);
                assert_eq!(sparkline[0].label, "1:05 PM");
                let yield_line = stats.iter().find(|line| line.label == "Yield").unwrap();
                assert_eq!(yield_line.value, "0.65%");
            }
            other => panic!("expected equity, got {other:?}"),
        }

        let mut etf = base.clone();
        etf["security_info"]["security_type"] = json!("exchange_traded_fund");
        let etf: StockSnapshot = serde_json::from_value(etf).unwrap();
        let ViewModel::Stock(view) = project(&Snapshot::Stock(etf), DisplayMode::Price) else {
            panic!("expected stock view");
        };
        assert_eq!(view.detail, StockDetail::Etf);
        assert_eq!(view.description.as_deref(), Some("Phones"));

        let mut unknown = base;
        unknown["security_info"]["security_type"] = json!("option");
        let unknown: StockSnapshot = serde_json::from_value(unknown).unwrap();
        let ViewModel::Stock(view) = project(&Snapshot::Stock(unknown), DisplayMode::Price) else {
            panic!("expected stock view");
        };
        assert!(matches!(view.detail, StockDetail::Unknown { .. }));
        assert_eq!(view.description, None);
    }

    #[test]
    fn display_mode_parses() {
        assert_eq!("Shares".parse::<DisplayMode>().unwrap(), DisplayMode::Shares);
        assert_eq!(DisplayMode::Price.toggled(), DisplayMode::Shares);
        assert!("amount".parse::<DisplayMode>().is_err());
    }
}
