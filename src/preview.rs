//! Ephemeral preview handles for local gallery entries.
//!
//! A local entry's preview is session-scoped, like a browser object URL: it
//! is created from the entry's bytes by a [`PreviewStore`] and must be revoked
//! exactly once. The [`PreviewTracker`] owns the live set for one gallery and
//! is the only thing that talks to the store:
//!
//! - [`acquire`](PreviewTracker::acquire) creates a handle and records it.
//! - [`release`](PreviewTracker::release) revokes a tracked handle. Releasing
//!   an unknown or already-released handle is a no-op, so a remove racing a
//!   teardown can never revoke twice.
//! - [`release_all`](PreviewTracker::release_all) revokes everything; it also
//!   runs when the tracker is dropped.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("preview store refused the handle: {0}")]
    Refused(String),
}

/// An ephemeral, session-scoped preview handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PreviewRef(String);

impl PreviewRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates and revokes preview handles (the object-URL capability).
pub trait PreviewStore: Send {
    fn create(&mut self, bytes: &[u8], mime: &str) -> Result<PreviewRef, PreviewError>;
    fn revoke(&mut self, preview: &PreviewRef);
}

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// In-memory store: handles resolve to shared copies of the preview bytes.
pub struct MemoryPreviewStore {
    session: u64,
    next: u64,
    blobs: HashMap<PreviewRef, Arc<[u8]>>,
}

impl MemoryPreviewStore {
    pub fn new() -> Self {
        Self {
            session: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            next: 0,
            blobs: HashMap::new(),
        }
    }

    /// Bytes behind a live handle; `None` once revoked.
    pub fn resolve(&self, preview: &PreviewRef) -> Option<Arc<[u8]>> {
        self.blobs.get(preview).cloned()
    }
}

impl Default for MemoryPreviewStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewStore for MemoryPreviewStore {
    fn create(&mut self, bytes: &[u8], mime: &str) -> Result<PreviewRef, PreviewError> {
        self.next += 1;
        let preview = PreviewRef(format!("blob:session-{}/{}#{mime}", self.session, self.next));
        self.blobs.insert(preview.clone(), Arc::from(bytes));
        Ok(preview)
    }

    fn revoke(&mut self, preview: &PreviewRef) {
        self.blobs.remove(preview);
    }
}

/// Live set of preview handles for one gallery.
pub struct PreviewTracker {
    store: Box<dyn PreviewStore>,
    /// Handle → acquisition order, so `release_all` revokes oldest first.
    live: HashMap<PreviewRef, u64>,
    acquired: u64,
    released: u64,
}

impl PreviewTracker {
    pub fn new(store: impl PreviewStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            live: HashMap::new(),
            acquired: 0,
            released: 0,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryPreviewStore::new())
    }

    pub fn acquire(&mut self, bytes: &[u8], mime: &str) -> Result<PreviewRef, PreviewError> {
        let preview = self.store.create(bytes, mime)?;
        self.acquired += 1;
        self.live.insert(preview.clone(), self.acquired);
        Ok(preview)
    }

    /// Revoke a tracked handle. Returns `false` (and does nothing) when the
    /// handle is not live.
    pub fn release(&mut self, preview: &PreviewRef) -> bool {
        if self.live.remove(preview).is_none() {
            debug!(%preview, "release of untracked preview ignored");
            return false;
        }
        self.store.revoke(preview);
        self.released += 1;
        true
    }

    /// Revoke every live handle. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let ordered: BTreeMap<u64, PreviewRef> =
            self.live.drain().map(|(preview, seq)| (seq, preview)).collect();
        for preview in ordered.values() {
            self.store.revoke(preview);
        }
        self.released += ordered.len() as u64;
        ordered.len()
    }

    pub fn is_live(&self, preview: &PreviewRef) -> bool {
        self.live.contains_key(preview)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn released_count(&self) -> u64 {
        self.released
    }
}

impl Drop for PreviewTracker {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl fmt::Debug for PreviewTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewTracker")
            .field("live", &self.live.len())
            .field("acquired", &self.acquired)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingPreviewStore;

    #[test]
    fn acquire_tracks_and_release_revokes_once() {
        let (store, log) = RecordingPreviewStore::new();
        let mut tracker = PreviewTracker::new(store);

        let preview = tracker.acquire(b"abc", "image/webp").unwrap();
        assert!(tracker.is_live(&preview));

        assert!(tracker.release(&preview));
        assert!(!tracker.release(&preview));
        assert!(!tracker.is_live(&preview));
        assert_eq!(log.revocations_of(&preview), 1);
        assert_eq!(tracker.released_count(), 1);
    }

    #[test]
    fn release_of_unknown_handle_is_noop() {
        let (store, log) = RecordingPreviewStore::new();
        let mut tracker = PreviewTracker::new(store);
        assert!(!tracker.release(&PreviewRef::new("blob:elsewhere/1")));
        assert_eq!(log.total_revocations(), 0);
    }

    #[test]
    fn release_all_revokes_everything_in_acquisition_order() {
        let (store, log) = RecordingPreviewStore::new();
        let mut tracker = PreviewTracker::new(store);
        let a = tracker.acquire(b"a", "image/webp").unwrap();
        let b = tracker.acquire(b"b", "image/webp").unwrap();
        let c = tracker.acquire(b"c", "image/webp").unwrap();
        tracker.release(&b);

        assert_eq!(tracker.release_all(), 2);
        assert_eq!(tracker.live_count(), 0);
        assert_eq!(log.revoked(), vec![b, a, c]);
    }

    #[test]
    fn drop_releases_remaining_handles() {
        let (store, log) = RecordingPreviewStore::new();
        let preview = {
            let mut tracker = PreviewTracker::new(store);
            tracker.acquire(b"x", "image/webp").unwrap()
        };
        assert_eq!(log.revocations_of(&preview), 1);
    }

    #[test]
    fn memory_store_resolves_until_revoked() {
        let mut store = MemoryPreviewStore::new();
        let preview = store.create(b"pixels", "image/webp").unwrap();
        assert_eq!(store.resolve(&preview).as_deref(), Some(b"pixels".as_slice()));
        store.revoke(&preview);
        assert!(store.resolve(&preview).is_none());
    }

    #[test]
    fn memory_store_handles_are_unique_across_sessions() {
        let mut first = MemoryPreviewStore::new();
        let mut second = MemoryPreviewStore::new();
        let a = first.create(b"x", "image/webp").unwrap();
        let b = second.create(b"x", "image/webp").unwrap();
        assert_ne!(a, b);
    }
}
