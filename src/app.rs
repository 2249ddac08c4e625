use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use crate::channel::ChannelId;
use crate::config::Config;
use crate::coordinator::{Collaborators, Outcome, SyncCoordinator, ViewEvent};
use crate::data::{JsonLinesOutput, Navigator};
use crate::protocol::ViewKind;
use crate::script::Script;
use crate::viewport::ScrollMetrics;

/// Input to the page: a view event addressed to one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    View { channel: ChannelId, event: ViewEvent },
    /// Raw scroll geometry; sampled against the configured end slack.
    Scroll {
        channel: ChannelId,
        metrics: ScrollMetrics,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub applied: usize,
    pub ignored: usize,
    pub discarded: usize,
    /// The page left for the login screen.
    pub redirected: bool,
}

/// Forwards the first redirect only; every view on the page shares it.
struct PageNavigator {
    inner: Arc<dyn Navigator>,
    left: Arc<AtomicBool>,
}

impl Navigator for PageNavigator {
    fn redirect_to_login(&self) {
        if !self.left.swap(true, Ordering::SeqCst) {
            self.inner.redirect_to_login();
        }
    }
}

/// All views of one page, keyed by channel identity.
pub struct App {
    views: BTreeMap<ChannelId, SyncCoordinator>,
    end_slack_px: f64,
    left: Arc<AtomicBool>,
}

impl App {
    pub fn new(cfg: &Config, security_id: Option<String>, collaborators: Collaborators) -> Self {
        let left = Arc::new(AtomicBool::new(false));
        let collaborators = Collaborators {
            navigator: Arc::new(PageNavigator {
                inner: collaborators.navigator,
                left: left.clone(),
            }),
            ..collaborators
        };

        let channels = &cfg.channels;
        let mut kinds = vec![
            (channels.dashboard.as_str(), ViewKind::Dashboard),
            (channels.activities.as_str(), ViewKind::Activities),
            (channels.search.as_str(), ViewKind::Search),
            (channels.settings.as_str(), ViewKind::Settings),
        ];
        if let Some(security_id) = security_id {
            kinds.push((channels.stock.as_str(), ViewKind::Stock { security_id }));
        }

        let mut views = BTreeMap::new();
        for (name, kind) in kinds {
            let channel = ChannelId::new(name);
            let mut view = SyncCoordinator::new(
                channel.clone(),
                kind,
                collaborators.clone(),
                cfg.view.default_mode,
            );
            view.on_ready(|channel| debug!(channel = %channel, "connection ready"));
            if views.insert(channel.clone(), view).is_some() {
                warn!(channel = %channel, "channel configured for two views; keeping the last");
            }
        }

        Self {
            views,
            end_slack_px: cfg.feed.end_threshold_px,
            left,
        }
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelId> {
        self.views.keys()
    }

    pub fn view(&self, channel: &ChannelId) -> Option<&SyncCoordinator> {
        self.views.get(channel)
    }

    /// True once any view redirected to login; all views are gone.
    pub fn is_closed(&self) -> bool {
        self.left.load(Ordering::SeqCst)
    }

    pub fn dispatch(&mut self, event: AppEvent) -> Outcome {
        if self.is_closed() {
            return Outcome::Ignored;
        }
        let outcome = match event {
            AppEvent::View { channel, event } => match self.views.get_mut(&channel) {
                Some(view) => view.handle(event),
                None => unknown_channel(&channel),
            },
            AppEvent::Scroll { channel, metrics } => match self.views.get_mut(&channel) {
                Some(view) => view.scrolled(&metrics.with_slack(self.end_slack_px)),
                None => unknown_channel(&channel),
            },
            AppEvent::Shutdown => Outcome::Ignored,
        };
        if self.is_closed() && !self.views.is_empty() {
            info!(views = self.views.len(), "session invalidated; closing page");
            self.views.clear();
        }
        outcome
    }

    /// Drains `events` until shutdown, sender disconnect or redirect.
    pub fn run(&mut self, events: Receiver<AppEvent>) -> RunSummary {
        let mut summary = RunSummary::default();
        for event in events.iter() {
            if event == AppEvent::Shutdown {
                break;
            }
            match self.dispatch(event) {
                Outcome::Applied => summary.applied += 1,
                Outcome::Ignored => summary.ignored += 1,
                Outcome::Discarded(_) => summary.discarded += 1,
            }
            if self.is_closed() {
                break;
            }
        }
        summary.redirected = self.is_closed();
        summary
    }
}

fn unknown_channel(channel: &ChannelId) -> Outcome {
    warn!(channel = %channel, "event for unknown channel dropped");
    Outcome::Ignored
}

/// Plays `script` through a fresh page, writing requests and frames to `output`.
pub fn replay(cfg: &Config, script: Script, output: Arc<JsonLinesOutput>) -> Result<RunSummary> {
    let collaborators = Collaborators {
        transport: output.clone(),
        sink: output.clone(),
        navigator: output,
    };
    let mut app = App::new(cfg, script.security_id, collaborators);

    let (tx, rx) = crossbeam_channel::unbounded();
    let delay = cfg.replay.response_delay;
    let steps = script.events;
    let feeder = thread::Builder::new()
        .name("wsimple-replay".into())
        .spawn(move || {
            for step in steps {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                if tx.send(AppEvent::from(step)).is_err() {
                    return;
                }
            }
            let _ = tx.send(AppEvent::Shutdown);
        })
        .context("failed to spawn replay feeder")?;

    let summary = app.run(rx);
    feeder
        .join()
        .map_err(|_| anyhow!("replay feeder panicked"))?;

    info!(
        applied = summary.applied,
        ignored = summary.ignored,
        discarded = summary.discarded,
        redirected = summary.redirected,
        "replay finished"
    );
    Ok(summary)
}
