use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::model::Snapshot;
use crate::projection::{self, DisplayMode, ViewModel};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("no snapshot has been stored for this view yet")]
    NoSnapshotYet,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: Arc<Snapshot>,
    stored_at: DateTime<Utc>,
}

/// Last full payload received for a view.
#[derive(Debug, Default)]
pub struct ViewCache {
    entry: Option<CacheEntry>,
    revision: u64,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps in `snapshot` as a whole.
    pub fn store(&mut self, snapshot: Snapshot) {
        self.entry = Some(CacheEntry {
            snapshot: Arc::new(snapshot),
            stored_at: Utc::now(),
        });
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn project(&self, mode: DisplayMode) -> Result<ViewModel, CacheError> {
        let entry = self.entry.as_ref().ok_or(CacheError::NoSnapshotYet)?;
        Ok(projection::project(&entry.snapshot, mode))
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.entry.as_ref().map(|entry| Arc::clone(&entry.snapshot))
    }

    pub fn stored_at(&self) -> Option<DateTime<Utc>> {
        self.entry.as_ref().map(|entry| entry.stored_at)
    }

    /// Number of snapshots stored so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::tests::dashboard_snapshot;

    #[test]
    fn project_before_store_fails() {
        let cache = ViewCache::new();
        assert!(matches!(
            cache.project(DisplayMode::Price),
            Err(CacheError::NoSnapshotYet)
        ));
        assert_eq!(cache.stored_at(), None);
    }

    #[test]
    fn repeated_projection_is_identical() {
        let mut cache = ViewCache::new();
        for quantity in [1.0, 2.5, 7.0] {
            cache.store(dashboard_snapshot(quantity, "10"));
            for mode in [DisplayMode::Price, DisplayMode::Shares] {
                let first = cache.project(mode).unwrap();
                let second = cache.project(mode).unwrap();
                assert_eq!(first, second);
            }
        }
        assert_eq!(cache.revision(), 3);
    }

    #[test]
    fn store_replaces_whole_snapshot() {
        let mut cache = ViewCache::new();
        cache.store(dashboard_snapshot(1.0, "10"));
        let before = cache.snapshot().unwrap();
        cache.store(dashboard_snapshot(9.0, "11"));
        let after = cache.snapshot().unwrap();
        assert_ne!(before, after);
        assert_eq!(*before, dashboard_snapshot(1.0, "10"));
    }
}
