//! Per-view synchronisation state machine.
//!
//! A [`SyncCoordinator`] ties one [`ChannelSession`], its [`ViewCache`] and
//! (for the activity page) a [`CursorFeed`] together. Every input is a
//! discrete [`ViewEvent`]; each handler runs to completion and reports an
//! [`Outcome`] instead of an error, so nothing an inbound message does can
//! escape the view.
//!
//! Responses carry no request id. Requests whose replies share an event name
//! (activity pages, search queries) are queued in issue order and each reply
//! resolves the oldest entry, even when it fails to decode. A query reply
//! with a newer query queued behind it is stale and dropped; an activity page
//! arriving while a refresh is queued answers the refresh.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{CacheError, ViewCache};
use crate::channel::{ChannelId, ChannelSession, SessionError, SessionState, Transport};
use crate::data::{Navigator, RenderSink};
use crate::feed::{Cursor, CursorFeed};
use crate::model::{ActivityPage, SearchPage, SearchSnapshot, Security, Snapshot};
use crate::projection::{self, DisplayMode, RenderFrame, ViewModel};
use crate::protocol::{self, events, DecodeError, Envelope, Inbound, Outbound, ViewKind};
use crate::viewport::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Idle,
    AwaitingBootstrap,
    Live,
    SessionInvalid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// Transport established a physical connection.
    Connected,
    /// Transport lost the connection; it will reconnect on its own.
    Disconnected,
    Message(Envelope),
    /// Viewport scrolled; `reached_end` is the sampled end-of-content predicate.
    Scroll { reached_end: bool },
    Toggle(DisplayMode),
    Query(String),
    /// Re-issue the bootstrap request on the live connection.
    Refresh,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("session invalidated")]
    SessionInvalid,
    #[error("malformed response: {0}")]
    MalformedResponse(#[from] DecodeError),
    #[error("stale {event} response discarded")]
    StaleResponse { event: &'static str },
    #[error(transparent)]
    NoSnapshotYet(#[from] CacheError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// What handling an event did to the view.
#[derive(Debug)]
pub enum Outcome {
    Applied,
    /// Not applicable in the current state; nothing changed.
    Ignored,
    /// Dropped; the view keeps its last good state.
    Discarded(SyncError),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

/// Collaborators shared by every view on the page.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub sink: Arc<dyn RenderSink>,
    pub navigator: Arc<dyn Navigator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingRequest {
    Bootstrap,
    FetchMore(Cursor),
    Query(String),
}

#[derive(Debug, Clone)]
struct Pending {
    generation: u64,
    request: PendingRequest,
}

pub struct SyncCoordinator {
    kind: ViewKind,
    session: ChannelSession,
    cache: ViewCache,
    feed: Option<CursorFeed>,
    state: ViewState,
    mode: DisplayMode,
    pending: VecDeque<Pending>,
    next_generation: u64,
    sink: Arc<dyn RenderSink>,
}

impl SyncCoordinator {
    pub fn new(
        channel: ChannelId,
        kind: ViewKind,
        collaborators: Collaborators,
        mode: DisplayMode,
    ) -> Self {
        let Collaborators {
            transport,
            sink,
            navigator,
        } = collaborators;
        let mut session = ChannelSession::open(channel, kind.bootstrap(), transport);
        session.on_invalidated(move |_| navigator.redirect_to_login());
        let feed = kind.has_feed().then(CursorFeed::new);
        Self {
            kind,
            session,
            cache: ViewCache::new(),
            feed,
            state: ViewState::Idle,
            mode,
            pending: VecDeque::new(),
            next_generation: 1,
            sink,
        }
    }

    pub fn channel(&self) -> &ChannelId {
        self.session.id()
    }

    pub fn kind(&self) -> &ViewKind {
        &self.kind
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn cache(&self) -> &ViewCache {
        &self.cache
    }

    pub fn feed(&self) -> Option<&CursorFeed> {
        self.feed.as_ref()
    }

    /// Register an extra hook on the underlying session's ready signal.
    pub fn on_ready(&mut self, hook: impl FnMut(&ChannelId) + Send + 'static) {
        self.session.on_ready(hook);
    }

    pub fn handle(&mut self, event: ViewEvent) -> Outcome {
        if self.state == ViewState::SessionInvalid {
            debug!(channel = %self.channel(), ?event, "view closed; event ignored");
            return Outcome::Ignored;
        }
        let result = match event {
            ViewEvent::Connected => self.on_connected(),
            ViewEvent::Disconnected => {
                self.session.connecting();
                Ok(Outcome::Applied)
            }
            ViewEvent::Message(envelope) => self.on_message(envelope),
            ViewEvent::Scroll { reached_end } => self.on_scroll(reached_end),
            ViewEvent::Toggle(mode) => self.on_toggle(mode),
            ViewEvent::Query(text) => self.on_query(text),
            ViewEvent::Refresh => self.on_refresh(),
        };
        match result {
            Ok(outcome) => outcome,
            Err(err @ SyncError::StaleResponse { .. }) => {
                debug!(channel = %self.channel(), "{err}");
                Outcome::Discarded(err)
            }
            Err(err) => {
                warn!(channel = %self.channel(), "{err:#}");
                Outcome::Discarded(err)
            }
        }
    }

    /// Samples `viewport` and forwards the result as a scroll event.
    pub fn scrolled(&mut self, viewport: &dyn Viewport) -> Outcome {
        self.handle(ViewEvent::Scroll {
            reached_end: viewport.reached_end(),
        })
    }

    fn on_connected(&mut self) -> Result<Outcome, SyncError> {
        if !self.pending.is_empty() {
            debug!(
                channel = %self.channel(),
                dropped = self.pending.len(),
                "requests from the previous connection will not be answered"
            );
            self.pending.clear();
        }
        if let Some(feed) = self.feed.as_mut() {
            feed.abandon();
        }
        self.session.ready()?;
        if self.kind.has_feed() {
            self.push_pending(PendingRequest::Bootstrap);
        }
        self.state = ViewState::AwaitingBootstrap;
        Ok(Outcome::Applied)
    }

    fn on_refresh(&mut self) -> Result<Outcome, SyncError> {
        if self.state == ViewState::Idle {
            return Ok(Outcome::Ignored);
        }
        self.session.send(&self.kind.bootstrap())?;
        if self.kind.has_feed() {
            self.push_pending(PendingRequest::Bootstrap);
        }
        info!(channel = %self.channel(), "full refresh requested");
        Ok(Outcome::Applied)
    }

    fn on_message(&mut self, envelope: Envelope) -> Result<Outcome, SyncError> {
        let resolved = self.resolve_pending(&envelope.event);
        let inbound = match protocol::decode(&self.kind, envelope) {
            Ok(inbound) => inbound,
            Err(err) => {
                if let Some(Pending {
                    request: PendingRequest::FetchMore(_),
                    ..
                }) = resolved
                {
                    if let Some(feed) = self.feed.as_mut() {
                        feed.abandon();
                    }
                }
                return Err(err.into());
            }
        };
        match inbound {
            Inbound::SessionInvalidated => Ok(self.invalidate()),
            Inbound::Dashboard(snapshot) => self.apply_snapshot(Snapshot::Dashboard(snapshot)),
            Inbound::Stock(snapshot) => self.apply_snapshot(Snapshot::Stock(snapshot)),
            Inbound::Settings(snapshot) => self.apply_snapshot(Snapshot::Settings(snapshot)),
            Inbound::SearchPage(page) => self.apply_search_page(page),
            Inbound::SearchResults(results) => self.apply_search_results(resolved, results),
            Inbound::ActivityPage(page) => self.apply_activity_page(resolved, page),
            Inbound::Ignored(event) => {
                debug!(channel = %self.channel(), event = %event, "no handler for event");
                Ok(Outcome::Ignored)
            }
        }
    }

    /// Takes the request an inbound reply answers off the queue, whether or
    /// not the reply turns out to be usable. A queued bootstrap absorbs every
    /// fetch-more issued before it.
    fn resolve_pending(&mut self, event: &str) -> Option<Pending> {
        match (&self.kind, event) {
            (ViewKind::Activities, events::DISPLAY_ACTIVITIES) => {
                let bootstrap = self
                    .pending
                    .iter()
                    .position(|pending| pending.request == PendingRequest::Bootstrap);
                let Some(index) = bootstrap else {
                    return self.pending.pop_front();
                };
                if index > 0 {
                    debug!(
                        channel = %self.channel(),
                        dropped = index,
                        "fetch-more superseded by refresh"
                    );
                    if let Some(feed) = self.feed.as_mut() {
                        feed.abandon();
                    }
                }
                self.pending.drain(..=index).last()
            }
            (ViewKind::Search, events::RETURN_SECURITY) => self.pending.pop_front(),
            _ => None,
        }
    }

    fn invalidate(&mut self) -> Outcome {
        self.pending.clear();
        if let Some(feed) = self.feed.as_mut() {
            feed.abandon();
        }
        self.state = ViewState::SessionInvalid;
        self.session.invalidate();
        Outcome::Applied
    }

    /// Bootstrap response or unsolicited full refresh.
    fn apply_snapshot(&mut self, snapshot: Snapshot) -> Result<Outcome, SyncError> {
        self.cache.store(snapshot);
        self.session.mark_live();
        self.state = ViewState::Live;
        debug!(
            channel = %self.channel(),
            revision = self.cache.revision(),
            mode = %self.mode,
            "snapshot stored"
        );
        self.render_full()?;
        Ok(Outcome::Applied)
    }

    fn apply_search_page(&mut self, page: SearchPage) -> Result<Outcome, SyncError> {
        let previous = self.search_snapshot();
        self.apply_snapshot(Snapshot::Search(SearchSnapshot {
            page: Some(page),
            ..previous
        }))
    }

    fn apply_search_results(
        &mut self,
        resolved: Option<Pending>,
        results: Vec<Security>,
    ) -> Result<Outcome, SyncError> {
        let Some(Pending {
            generation,
            request: PendingRequest::Query(query),
        }) = resolved
        else {
            return Err(SyncError::StaleResponse {
                event: events::RETURN_SECURITY,
            });
        };
        if !self.pending.is_empty() {
            debug!(channel = %self.channel(), generation, query = %query, "newer query outstanding");
            return Err(SyncError::StaleResponse {
                event: events::RETURN_SECURITY,
            });
        }

        let previous = self.search_snapshot();
        self.cache.store(Snapshot::Search(SearchSnapshot {
            query: Some(query),
            results,
            ..previous
        }));
        self.render_full()?;
        Ok(Outcome::Applied)
    }

    fn search_snapshot(&self) -> SearchSnapshot {
        match self.cache.snapshot().as_deref() {
            Some(Snapshot::Search(search)) => search.clone(),
            _ => SearchSnapshot::default(),
        }
    }

    fn apply_activity_page(
        &mut self,
        resolved: Option<Pending>,
        page: ActivityPage,
    ) -> Result<Outcome, SyncError> {
        match resolved.map(|pending| pending.request) {
            Some(PendingRequest::FetchMore(cursor)) if self.state != ViewState::Live => {
                if let Some(feed) = self.feed.as_mut() {
                    feed.abandon();
                }
                debug!(channel = %self.channel(), cursor = %cursor, "fetch-more answered outside live state");
                Err(SyncError::StaleResponse {
                    event: events::DISPLAY_ACTIVITIES,
                })
            }
            Some(PendingRequest::FetchMore(_)) => self.append_page(page),
            Some(PendingRequest::Query(_)) => Err(SyncError::StaleResponse {
                event: events::DISPLAY_ACTIVITIES,
            }),
            Some(PendingRequest::Bootstrap) | None => self.seed_feed(page),
        }
    }

    fn seed_feed(&mut self, page: ActivityPage) -> Result<Outcome, SyncError> {
        let next = Cursor::from_wire(page.bookmark.clone());
        let entries = page.results.clone();
        self.cache.store(Snapshot::Activities(page));
        if let Some(feed) = self.feed.as_mut() {
            feed.reset();
            feed.append_page(entries, next);
        }
        self.session.mark_live();
        self.state = ViewState::Live;
        self.render_full()?;
        Ok(Outcome::Applied)
    }

    fn append_page(&mut self, page: ActivityPage) -> Result<Outcome, SyncError> {
        let Some(feed) = self.feed.as_mut() else {
            return Ok(Outcome::Ignored);
        };
        let next = Cursor::from_wire(page.bookmark);
        let appended = feed.append_page(page.results, next);
        let rows = projection::activity_rows(&feed.entries()[appended]);
        debug!(
            channel = %self.session.id(),
            appended = rows.len(),
            exhausted = feed.is_exhausted(),
            "activity page appended"
        );
        self.sink
            .render(self.session.id(), &RenderFrame::Append(rows));
        Ok(Outcome::Applied)
    }

    fn on_scroll(&mut self, reached_end: bool) -> Result<Outcome, SyncError> {
        if self.state != ViewState::Live {
            return Ok(Outcome::Ignored);
        }
        if self
            .pending
            .iter()
            .any(|pending| pending.request == PendingRequest::Bootstrap)
        {
            return Ok(Outcome::Ignored);
        }
        let Some(feed) = self.feed.as_mut() else {
            return Ok(Outcome::Ignored);
        };
        let Some(cursor) = feed.request_more(reached_end) else {
            return Ok(Outcome::Ignored);
        };
        if let Err(err) = self.session.send(&Outbound::activities(Some(&cursor))) {
            feed.abandon();
            return Err(err.into());
        }
        debug!(channel = %self.session.id(), cursor = %cursor, "fetch-more requested");
        self.push_pending(PendingRequest::FetchMore(cursor));
        Ok(Outcome::Applied)
    }

    fn on_toggle(&mut self, mode: DisplayMode) -> Result<Outcome, SyncError> {
        self.mode = mode;
        if self.state != ViewState::Live {
            return Ok(Outcome::Ignored);
        }
        self.render_full()?;
        Ok(Outcome::Applied)
    }

    fn on_query(&mut self, text: String) -> Result<Outcome, SyncError> {
        if self.kind != ViewKind::Search || self.state == ViewState::Idle {
            return Ok(Outcome::Ignored);
        }
        let query = text.trim();
        if query.is_empty() {
            debug!(channel = %self.channel(), "blank search query not sent");
            return Ok(Outcome::Ignored);
        }
        self.session.send(&Outbound::find_security(query))?;
        self.push_pending(PendingRequest::Query(query.to_string()));
        Ok(Outcome::Applied)
    }

    fn push_pending(&mut self, request: PendingRequest) {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        self.pending.push_back(Pending {
            generation,
            request,
        });
    }

    /// The full view as it should currently be drawn.
    pub fn view_model(&self) -> Result<ViewModel, CacheError> {
        match &self.feed {
            Some(feed) if self.cache.revision() > 0 => Ok(ViewModel::Activities(
                projection::activities_view(feed.entries(), feed.is_exhausted()),
            )),
            _ => self.cache.project(self.mode),
        }
    }

    fn render_full(&self) -> Result<(), SyncError> {
        let view = self.view_model()?;
        self.sink.render(self.session.id(), &RenderFrame::Full(view));
        Ok(())
    }
}
