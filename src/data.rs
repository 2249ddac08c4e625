use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::channel::{ChannelId, Transport};
use crate::projection::RenderFrame;
use crate::protocol::Outbound;

/// Draws projected view models. DOM construction and charting live behind it.
pub trait RenderSink: Send + Sync {
    fn render(&self, channel: &ChannelId, frame: &RenderFrame);
}

/// Page navigation.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}

/// Transport that keeps every emitted request in memory.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ChannelId, Outbound)>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<(ChannelId, Outbound)> {
        self.sent.lock().clone()
    }

    pub fn take(&self) -> Vec<(ChannelId, Outbound)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Transport for RecordingTransport {
    fn emit(&self, channel: &ChannelId, request: &Outbound) -> Result<()> {
        self.sent.lock().push((channel.clone(), request.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<(ChannelId, RenderFrame)>>,
}

impl RecordingSink {
    pub fn frames(&self) -> Vec<(ChannelId, RenderFrame)> {
        self.frames.lock().clone()
    }

    pub fn last(&self) -> Option<RenderFrame> {
        self.frames.lock().last().map(|(_, frame)| frame.clone())
    }

    pub fn take(&self) -> Vec<(ChannelId, RenderFrame)> {
        std::mem::take(&mut *self.frames.lock())
    }
}

impl RenderSink for RecordingSink {
    fn render(&self, channel: &ChannelId, frame: &RenderFrame) {
        self.frames.lock().push((channel.clone(), frame.clone()));
    }
}

#[derive(Debug, Default)]
pub struct RecordingNavigator {
    redirects: AtomicUsize,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputLine<'a> {
    Send {
        channel: &'a ChannelId,
        request: &'a Outbound,
    },
    Render {
        channel: &'a ChannelId,
        #[serde(flatten)]
        frame: &'a RenderFrame,
    },
    Redirect {
        to: &'static str,
    },
}

/// Writes requests, frames and redirects as JSON lines. Backs the replay
/// binary, where stdout stands in for both the socket and the page.
pub struct JsonLinesOutput {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesOutput {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn write(&self, line: &OutputLine<'_>) -> Result<()> {
        let encoded = serde_json::to_string(line).context("encode output line")?;
        let mut out = self.out.lock();
        writeln!(out, "{encoded}").context("write output line")?;
        out.flush().context("flush output")
    }
}

impl Transport for JsonLinesOutput {
    fn emit(&self, channel: &ChannelId, request: &Outbound) -> Result<()> {
        self.write(&OutputLine::Send { channel, request })
    }
}

impl RenderSink for JsonLinesOutput {
    fn render(&self, channel: &ChannelId, frame: &RenderFrame) {
        if let Err(err) = self.write(&OutputLine::Render { channel, frame }) {
            warn!(channel = %channel, "failed to write render frame: {err:#}");
        }
    }
}

impl Navigator for JsonLinesOutput {
    fn redirect_to_login(&self) {
        if let Err(err) = self.write(&OutputLine::Redirect { to: "/" }) {
            warn!("failed to write redirect: {err:#}");
        }
    }
}
