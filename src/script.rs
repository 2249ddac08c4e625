//! Recorded page sessions, replayed through [`crate::app::App`].
//!
//! ```yaml
//! security_id: sec-s-76a9ff8c      # optional; enables the stock view
//! events:
//!   - step: connect
//!     channel: activities
//!   - step: receive
//!     channel: activities
//!     event: display_activities
//!     payload: {results: [], bookmark: null}
//!   - step: scroll
//!     channel: activities
//!     scroll_top: 600
//!     scroll_height: 1000
//!     client_height: 400
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::app::AppEvent;
use crate::channel::ChannelId;
use crate::coordinator::ViewEvent;
use crate::projection::DisplayMode;
use crate::protocol::Envelope;
use crate::viewport::ScrollMetrics;

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub security_id: Option<String>,
    #[serde(default)]
    pub events: Vec<ScriptStep>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    Connect {
        channel: ChannelId,
    },
    Disconnect {
        channel: ChannelId,
    },
    Receive {
        channel: ChannelId,
        event: String,
        #[serde(default)]
        payload: Value,
    },
    Scroll {
        channel: ChannelId,
        scroll_top: f64,
        scroll_height: f64,
        client_height: f64,
    },
    Toggle {
        channel: ChannelId,
        mode: DisplayMode,
    },
    Query {
        channel: ChannelId,
        text: String,
    },
    Refresh {
        channel: ChannelId,
    },
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script at {}", path.display()))?;
        Self::from_yaml(&data)
            .with_context(|| format!("Failed to parse replay script at {}", path.display()))
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }
}

impl From<ScriptStep> for AppEvent {
    fn from(step: ScriptStep) -> Self {
        let view = |channel, event| AppEvent::View { channel, event };
        match step {
            ScriptStep::Connect { channel } => view(channel, ViewEvent::Connected),
            ScriptStep::Disconnect { channel } => view(channel, ViewEvent::Disconnected),
            ScriptStep::Receive {
                channel,
                event,
                payload,
            } => view(channel, ViewEvent::Message(Envelope::new(event, payload))),
            ScriptStep::Scroll {
                channel,
                scroll_top,
                scroll_height,
                client_height,
            } => AppEvent::Scroll {
                channel,
                metrics: ScrollMetrics {
                    scroll_top,
                    scroll_height,
                    client_height,
                },
            },
            ScriptStep::Toggle { channel, mode } => view(channel, ViewEvent::Toggle(mode)),
            ScriptStep::Query { channel, text } => view(channel, ViewEvent::Query(text)),
            ScriptStep::Refresh { channel } => view(channel, ViewEvent::Refresh),
        }
    }
}
