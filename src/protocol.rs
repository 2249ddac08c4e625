use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::feed::Cursor;
use crate::model::{
    AccountPositions, ActivityPage, DashboardSnapshot, ResultsList, SearchPage, Security,
    SecurityInfo, SettingsSnapshot, Sparkline, StockSnapshot,
};

pub mod events {
    pub const INVALID_TOKEN: &str = "invalid_token";

    pub const DASHBOARD: &str = "dashboard";
    pub const DASHBOARD_INFO: &str = "main_dashboard_info";

    pub const GET_ACTIVITIES: &str = "get_activities";
    pub const DISPLAY_ACTIVITIES: &str = "display_activities";

    pub const GET_SECURITY_INFO: &str = "get_security_info";
    pub const RETURN_STOCK_INFO: &str = "return_stock_info";

    pub const GET_SEARCH_PAGE: &str = "get_search_page";
    pub const RETURN_SEARCH_PAGE: &str = "return_search_page";
    pub const FIND_SECURITY: &str = "find_security";
    pub const RETURN_SECURITY: &str = "return_security";

    pub const GET_SETTINGS: &str = "get_settings";
    pub const RETURN_SETTINGS: &str = "return_settings";
}

/// An inbound named event with its JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// A fire-and-forget request. There is no request id on the wire; replies
/// are matched by event name only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outbound {
    pub event: &'static str,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Outbound {
    pub fn dashboard() -> Self {
        Self {
            event: events::DASHBOARD,
            payload: Value::Null,
        }
    }

    /// `[]` for the first page, `[bookmark]` for every page after it.
    pub fn activities(cursor: Option<&Cursor>) -> Self {
        let payload = match cursor {
            Some(cursor) => json!([cursor.as_str()]),
            None => json!([]),
        };
        Self {
            event: events::GET_ACTIVITIES,
            payload,
        }
    }

    pub fn security_info(security_id: &str) -> Self {
        Self {
            event: events::GET_SECURITY_INFO,
            payload: Value::String(security_id.to_string()),
        }
    }

    pub fn search_page() -> Self {
        Self {
            event: events::GET_SEARCH_PAGE,
            payload: Value::Null,
        }
    }

    pub fn find_security(query: &str) -> Self {
        Self {
            event: events::FIND_SECURITY,
            payload: json!([query]),
        }
    }

    pub fn settings() -> Self {
        Self {
            event: events::GET_SETTINGS,
            payload: json!([]),
        }
    }
}

/// Which page a coordinator drives. Fixes the bootstrap request and the
/// inbound events the view understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewKind {
    Dashboard,
    Activities,
    Stock { security_id: String },
    Search,
    Settings,
}

impl ViewKind {
    pub fn bootstrap(&self) -> Outbound {
        match self {
            ViewKind::Dashboard => Outbound::dashboard(),
            ViewKind::Activities => Outbound::activities(None),
            ViewKind::Stock { security_id } => Outbound::security_info(security_id),
            ViewKind::Search => Outbound::search_page(),
            ViewKind::Settings => Outbound::settings(),
        }
    }

    pub fn has_feed(&self) -> bool {
        matches!(self, ViewKind::Activities)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ViewKind::Dashboard => "dashboard",
            ViewKind::Activities => "activities",
            ViewKind::Stock { .. } => "stock",
            ViewKind::Search => "search",
            ViewKind::Settings => "settings",
        }
    }
}

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    SessionInvalidated,
    Dashboard(DashboardSnapshot),
    ActivityPage(ActivityPage),
    Stock(StockSnapshot),
    SearchPage(SearchPage),
    SearchResults(Vec<Security>),
    Settings(SettingsSnapshot),
    /// An event this view has no handler for.
    Ignored(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{event}: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{event}: {reason}")]
    Shape { event: String, reason: &'static str },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StockWire {
    Keyed(StockSnapshot),
    Positional(Sparkline, SecurityInfo, ResultsList<AccountPositions>),
}

/// Validates an envelope for `kind`. Either the whole payload decodes or
/// nothing is returned.
pub fn decode(kind: &ViewKind, envelope: Envelope) -> Result<Inbound, DecodeError> {
    let Envelope { event, payload } = envelope;
    if event == events::INVALID_TOKEN {
        return Ok(Inbound::SessionInvalidated);
    }

    let inbound = match (kind, event.as_str()) {
        (ViewKind::Dashboard, events::DASHBOARD_INFO) => {
            Inbound::Dashboard(from_payload(&event, payload)?)
        }
        (ViewKind::Activities, events::DISPLAY_ACTIVITIES) => {
            Inbound::ActivityPage(from_payload(&event, payload)?)
        }
        (ViewKind::Stock { .. }, events::RETURN_STOCK_INFO) => {
            let snapshot = match from_payload::<StockWire>(&event, payload)? {
                StockWire::Keyed(snapshot) => snapshot,
                StockWire::Positional(sparkline, security_info, position) => StockSnapshot {
                    sparkline,
                    security_info,
                    position,
                },
            };
            Inbound::Stock(snapshot)
        }
        (ViewKind::Search, events::RETURN_SEARCH_PAGE) => {
            Inbound::SearchPage(from_payload(&event, payload)?)
        }
        (ViewKind::Search, events::RETURN_SECURITY) => {
            let mut lists: Vec<ResultsList<Security>> = from_payload(&event, payload)?;
            if lists.is_empty() {
                return Err(DecodeError::Shape {
                    event,
                    reason: "expected a one-element list of search results",
                });
            }
            Inbound::SearchResults(lists.swap_remove(0).results)
        }
        (ViewKind::Settings, events::RETURN_SETTINGS) => match payload {
            Value::Object(sections) => Inbound::Settings(SettingsSnapshot { sections }),
            _ => {
                return Err(DecodeError::Shape {
                    event,
                    reason: "expected an object of settings sections",
                })
            }
        },
        _ => Inbound::Ignored(event),
    };
    Ok(inbound)
}

fn from_payload<T: serde::de::DeserializeOwned>(
    event: &str,
    payload: Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(payload).map_err(|source| DecodeError::Payload {
        event: event.to_string(),
        source,
    })
}
