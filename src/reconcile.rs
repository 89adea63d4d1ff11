//! Publishing a gallery: upload local entries, persist the final order.
//!
//! Where ingestion is partial-tolerant, publishing is all or nothing:
//!
//! 1. Every local entry is uploaded, in parallel, to a content-addressed path
//!    `<owner>/<listing_id>/<sha256>.<ext>`. Remote entries are carried
//!    through untouched.
//! 2. If any upload fails, the whole publish fails with one aggregate
//!    [`ReconcileError::UploadFailed`] and nothing is persisted. The gallery
//!    is left exactly as it was, so the caller can simply retry; since paths
//!    are derived from content, a retry rewrites the same objects.
//! 3. Otherwise one row per position is persisted (`is_main = position == 0`,
//!    `display_order = position`), local entries are promoted to remote ones,
//!    and objects of previously removed remote entries are deleted. A failed
//!    delete leaves an orphaned object behind but never fails the publish.

use crate::formats;
use crate::gallery::{EntrySource, Gallery};
use crate::storage::{GalleryRow, StorageBackend, StorageError, is_path_segment};
use crate::types::EntryId;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("invalid publish target: {0}")]
    InvalidTarget(String),
    #[error(
        "{count} of {attempted} upload(s) failed; nothing was published",
        count = .failures.len()
    )]
    UploadFailed {
        failures: Vec<UploadFailure>,
        attempted: usize,
    },
    #[error("could not persist gallery order: {0}")]
    Persist(#[source] StorageError),
    #[error("gallery is closed")]
    Closed,
}

/// One object whose upload failed, with every local entry that shares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub path: String,
    /// Entries holding these bytes, in gallery order.
    pub ids: Vec<EntryId>,
    pub names: Vec<String>,
    pub error: String,
}

/// Owner + listing a gallery is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRef {
    owner: String,
    listing_id: String,
}

impl ListingRef {
    pub fn new(owner: impl Into<String>, listing_id: impl Into<String>) -> Result<Self, ReconcileError> {
        let owner = owner.into();
        let listing_id = listing_id.into();
        for (what, value) in [("owner", &owner), ("listing id", &listing_id)] {
            if !is_path_segment(value) {
                return Err(ReconcileError::InvalidTarget(format!("{what} `{value}`")));
            }
        }
        Ok(Self { owner, listing_id })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn listing_id(&self) -> &str {
        &self.listing_id
    }
}

/// Storage path for an image: namespaced by owner and listing, named by content.
pub fn object_path(target: &ListingRef, bytes: &[u8], mime: &str) -> String {
    let digest = Sha256::digest(bytes);
    format!(
        "{}/{}/{:x}.{}",
        target.owner,
        target.listing_id,
        digest,
        formats::extension_for_mime(mime)
    )
}

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedGallery {
    pub listing_id: String,
    pub images: Vec<GalleryRow>,
    /// Local entries promoted to remote.
    pub uploaded: usize,
    pub deleted: Vec<String>,
    /// Objects whose deletion failed and are now unreferenced.
    pub orphaned: Vec<String>,
    /// Whether the main photo differs from what was last persisted.
    pub main_rewritten: bool,
}

pub fn reconcile(
    gallery: &mut Gallery,
    storage: &impl StorageBackend,
    target: &ListingRef,
) -> Result<PersistedGallery, ReconcileError> {
    if gallery.is_closed() {
        return Err(ReconcileError::Closed);
    }
    let entries = gallery.entries();

    let paths: Vec<Option<String>> = entries
        .par_iter()
        .map(|e| e.local_bytes().map(|bytes| object_path(target, bytes, &e.mime)))
        .collect();

    // Identical photos share a path; upload each object once.
    let mut distinct: HashMap<&str, (&[u8], &str)> = HashMap::new();
    for (entry, path) in entries.iter().zip(&paths) {
        if let (Some(path), Some(bytes)) = (path, entry.local_bytes()) {
            distinct
                .entry(path.as_str())
                .or_insert((bytes, entry.mime.as_str()));
        }
    }
    let attempted = distinct.len();
    let results: HashMap<&str, Result<String, StorageError>> = distinct
        .into_par_iter()
        .map(|(path, (bytes, mime))| (path, storage.upload(path, bytes, mime)))
        .collect();

    let mut rows = Vec::with_capacity(entries.len());
    let mut uploaded = HashMap::new();
    let mut failures: Vec<UploadFailure> = Vec::new();
    for (position, (entry, local_path)) in entries.iter().zip(&paths).enumerate() {
        let (url, path) = match (&entry.source, local_path) {
            (EntrySource::Remote { url, path }, _) => (url.clone(), path.clone()),
            (EntrySource::Local { .. }, Some(path)) => match results.get(path.as_str()) {
                Some(Ok(url)) => {
                    uploaded.insert(entry.id.clone(), (url.clone(), path.clone()));
                    (url.clone(), path.clone())
                }
                Some(Err(e)) => {
                    match failures.iter_mut().find(|f| f.path == *path) {
                        Some(failure) => {
                            failure.ids.push(entry.id.clone());
                            failure.names.push(entry.original_name.clone());
                        }
                        None => {
                            warn!(file = %entry.original_name, %path, error = %e, "upload failed");
                            failures.push(UploadFailure {
                                path: path.clone(),
                                ids: vec![entry.id.clone()],
                                names: vec![entry.original_name.clone()],
                                error: e.to_string(),
                            });
                        }
                    }
                    continue;
                }
                None => continue,
            },
            (EntrySource::Local { .. }, None) => continue,
        };
        rows.push(GalleryRow {
            url,
            path,
            is_main: position == 0,
            display_order: position as u32,
        });
    }

    if !failures.is_empty() {
        return Err(ReconcileError::UploadFailed {
            failures,
            attempted,
        });
    }

    let main_rewritten = gallery.main_changed();
    storage
        .persist_gallery_order(target.listing_id(), &rows)
        .map_err(ReconcileError::Persist)?;

    let promoted = gallery.promote(&uploaded);

    let referenced: HashSet<&str> = rows.iter().map(|row| row.path.as_str()).collect();
    let mut deleted = Vec::new();
    let mut orphaned = Vec::new();
    let scheduled: BTreeSet<String> = gallery.take_pending_deletes().into_iter().collect();
    for path in scheduled {
        if referenced.contains(path.as_str()) {
            debug!(%path, "object still referenced, not deleting");
            continue;
        }
        match storage.delete_object(&path) {
            Ok(()) | Err(StorageError::NotFound(_)) => deleted.push(path),
            Err(e) => {
                warn!(%path, error = %e, "could not delete removed image, leaving it orphaned");
                orphaned.push(path);
            }
        }
    }
    gallery.mark_saved();

    info!(
        listing = target.listing_id(),
        images = rows.len(),
        uploaded = promoted,
        deleted = deleted.len(),
        "gallery published"
    );
    Ok(PersistedGallery {
        listing_id: target.listing_id().to_string(),
        images: rows,
        uploaded: promoted,
        deleted,
        orphaned,
        main_rewritten,
    })
}
