use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::protocol::Outbound;

/// Name of a logical topic on the duplex channel ("dashboard", "activities", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Bootstrapping,
    Live,
    Invalidated,
}

/// Outbound half of the duplex channel. Handshake, reconnection and framing
/// live behind this trait.
pub trait Transport: Send + Sync {
    fn emit(&self, channel: &ChannelId, request: &Outbound) -> anyhow::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session on channel {0} has been invalidated")]
    Invalidated(ChannelId),
    #[error("failed to emit {event} on channel {channel}")]
    Transport {
        channel: ChannelId,
        event: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

type Hook = Box<dyn FnMut(&ChannelId) + Send>;

/// One logical channel: owns its bootstrap request and its
/// invalid-session handling.
pub struct ChannelSession {
    id: ChannelId,
    state: SessionState,
    bootstrap: Outbound,
    transport: Arc<dyn Transport>,
    ready_hooks: Vec<Hook>,
    invalidated_hooks: Vec<Hook>,
}

impl fmt::Debug for ChannelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("bootstrap", &self.bootstrap.event)
            .finish_non_exhaustive()
    }
}

impl ChannelSession {
    pub fn open(id: ChannelId, bootstrap: Outbound, transport: Arc<dyn Transport>) -> Self {
        Self {
            id,
            state: SessionState::Disconnected,
            bootstrap,
            transport,
            ready_hooks: Vec::new(),
            invalidated_hooks: Vec::new(),
        }
    }

    /// Runs on every physical connection establishment, before the bootstrap
    /// request goes out.
    pub fn on_ready(&mut self, hook: impl FnMut(&ChannelId) + Send + 'static) {
        self.ready_hooks.push(Box::new(hook));
    }

    /// Runs once, when the remote first reports the credentials invalid.
    pub fn on_invalidated(&mut self, hook: impl FnMut(&ChannelId) + Send + 'static) {
        self.invalidated_hooks.push(Box::new(hook));
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_invalidated(&self) -> bool {
        self.state == SessionState::Invalidated
    }

    /// Transport lost the connection and is working on a new one.
    pub fn connecting(&mut self) {
        if self.is_invalidated() {
            return;
        }
        debug!(channel = %self.id, from = ?self.state, "channel reconnecting");
        self.state = SessionState::Connecting;
    }

    /// Physical connection established: run ready hooks and send the bootstrap.
    pub fn ready(&mut self) -> Result<(), SessionError> {
        if self.is_invalidated() {
            return Err(SessionError::Invalidated(self.id.clone()));
        }
        self.state = SessionState::Connecting;
        for hook in self.ready_hooks.iter_mut() {
            hook(&self.id);
        }
        let bootstrap = self.bootstrap.clone();
        self.send(&bootstrap)?;
        self.state = SessionState::Bootstrapping;
        info!(channel = %self.id, event = bootstrap.event, "bootstrap requested");
        Ok(())
    }

    pub fn mark_live(&mut self) {
        if matches!(
            self.state,
            SessionState::Bootstrapping | SessionState::Connecting | SessionState::Disconnected
        ) {
            self.state = SessionState::Live;
        }
    }

    /// Returns true only for the first invalidation signal.
    pub fn invalidate(&mut self) -> bool {
        if self.is_invalidated() {
            debug!(channel = %self.id, "repeated invalid-session signal ignored");
            return false;
        }
        warn!(channel = %self.id, "access token is invalid or broken; session closed");
        self.state = SessionState::Invalidated;
        for hook in self.invalidated_hooks.iter_mut() {
            hook(&self.id);
        }
        true
    }

    /// Fire-and-forget send. Refused once the session is invalidated.
    pub fn send(&self, request: &Outbound) -> Result<(), SessionError> {
        if self.is_invalidated() {
            return Err(SessionError::Invalidated(self.id.clone()));
        }
        self.transport
            .emit(&self.id, request)
            .map_err(|source| SessionError::Transport {
                channel: self.id.clone(),
                event: request.event,
                source,
            })
    }
}
