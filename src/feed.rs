use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::ActivityEntry;

/// Opaque server-issued pagination token. Stored and echoed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Blank bookmarks carry no position and are treated as absent.
    pub fn from_wire(raw: Option<String>) -> Option<Self> {
        raw.filter(|value| !value.trim().is_empty()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the feed stands relative to the server's pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CursorState {
    /// Nothing fetched yet. Not the same as the end of the feed.
    #[default]
    Unfetched,
    /// More pages exist after this cursor.
    Next(Cursor),
    /// The server signalled that no further pages exist.
    Exhausted,
}

/// Append-only, cursor-paginated activity list with a single-flight
/// fetch-more guard.
#[derive(Debug, Default)]
pub struct CursorFeed {
    entries: Vec<ActivityEntry>,
    cursor: CursorState,
    in_flight: Option<Cursor>,
}

impl CursorFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.cursor = CursorState::Unfetched;
        self.in_flight = None;
    }

    /// Appends a page in arrival order, replaces the cursor, and releases the
    /// fetch-more guard. Returns the index range of the appended entries.
    pub fn append_page(&mut self, entries: Vec<ActivityEntry>, next: Option<Cursor>) -> Range<usize> {
        let start = self.entries.len();
        let stalled = entries.is_empty()
            && matches!((&self.cursor, &next), (CursorState::Next(held), Some(incoming)) if held == incoming);

        self.entries.extend(entries);
        self.in_flight = None;
        self.cursor = match next {
            Some(_) if stalled => {
                debug!("empty page returned the held cursor again; treating feed as exhausted");
                CursorState::Exhausted
            }
            Some(cursor) => CursorState::Next(cursor),
            None => CursorState::Exhausted,
        };
        start..self.entries.len()
    }

    /// Samples the viewport's end-of-content predicate. Returns the cursor to
    /// request when a fetch-more should go out, arming the guard.
    pub fn request_more(&mut self, reached_end: bool) -> Option<Cursor> {
        if !reached_end {
            return None;
        }
        if let Some(pending) = &self.in_flight {
            debug!(cursor = %pending, "fetch-more already in flight");
            return None;
        }
        let CursorState::Next(cursor) = &self.cursor else {
            return None;
        };
        self.in_flight = Some(cursor.clone());
        Some(cursor.clone())
    }

    /// Releases the guard without appending, for a request whose response was
    /// dropped or will never arrive.
    pub fn abandon(&mut self) {
        self.in_flight = None;
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    pub fn in_flight(&self) -> Option<&Cursor> {
        self.in_flight.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.cursor, CursorState::Exhausted)
    }
}
