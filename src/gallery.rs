//! Ordered gallery store for one listing.
//!
//! A [`Gallery`] is an ordered sequence of [`GalleryEntry`] values, unique by
//! id, holding existing remote images and freshly ingested local ones.
//!
//! # Main photo
//!
//! The main photo is whatever sits at index 0. There is no per-entry flag to
//! keep in sync with position: every read of [`Gallery::main`] derives it
//! from the current order, so after any sequence of inserts, removals and
//! reorders exactly one entry (or none, when empty) is main. Structural
//! changes that touch index 0 set [`main_changed`](Gallery::main_changed) so
//! the next save rewrites the persisted flag.
//!
//! # Previews
//!
//! The gallery owns the [`PreviewTracker`] for its local entries. Removing a
//! local entry releases its preview inside [`remove`](Gallery::remove);
//! [`close`](Gallery::close) (or dropping the gallery) releases the rest.
//!
//! # Concurrent batches
//!
//! A user may add more files while an earlier batch is still compressing.
//! Each batch takes a ticket from [`begin_batch`](Gallery::begin_batch),
//! which carries a monotonic sequence number and reserves the admitted slot
//! count against the tier limit. Processing happens without the gallery
//! ([`PendingBatch::process`] is `Send` and can run anywhere), and
//! [`commit_batch`](Gallery::commit_batch) lands finished batches strictly in
//! ticket order, parking any that finish early. So entries always appear in
//! the order their batches were started, whatever order they complete in.

use crate::formats;
use crate::imaging::MediaBackend;
use crate::ingest::{
    self, Capacity, FileOutcome, FileRejection, IngestError, IngestEvent, IngestSettings,
};
use crate::preview::{PreviewRef, PreviewTracker};
use crate::storage::GalleryRow;
use crate::types::{EntryId, IdSequence, SourceFile};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GalleryError {
    #[error("position {index} is out of range for a gallery of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("gallery holds at most {max} images; {requested} requested, {available} slot(s) free")]
    CapacityExceeded {
        max: usize,
        requested: usize,
        available: usize,
    },
    #[error("duplicate entry id `{0}`")]
    DuplicateId(EntryId),
    #[error("unknown or already committed batch #{0}")]
    UnknownBatch(u64),
    #[error("gallery is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySource {
    /// Session-owned bytes plus their ephemeral preview.
    Local { bytes: Vec<u8>, preview: PreviewRef },
    /// Durably stored; the URL doubles as the preview.
    Remote { url: String, path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    pub id: EntryId,
    pub source: EntrySource,
    pub byte_size: u64,
    pub mime: String,
    pub original_name: String,
}

impl GalleryEntry {
    pub fn local(id: EntryId, file: SourceFile, preview: PreviewRef, original_name: String) -> Self {
        Self {
            id,
            byte_size: file.byte_size(),
            mime: file.mime,
            source: EntrySource::Local {
                bytes: file.bytes,
                preview,
            },
            original_name,
        }
    }

    pub fn remote(id: EntryId, url: String, path: String) -> Self {
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        let mime = name
            .rsplit_once('.')
            .and_then(|(_, ext)| formats::mime_for_extension(ext))
            .unwrap_or_default()
            .to_string();
        Self {
            id,
            source: EntrySource::Remote { url, path },
            byte_size: 0,
            mime,
            original_name: name,
        }
    }

    pub fn origin(&self) -> Origin {
        match self.source {
            EntrySource::Local { .. } => Origin::Local,
            EntrySource::Remote { .. } => Origin::Remote,
        }
    }

    /// What a UI would put in `<img src>`.
    pub fn preview_ref(&self) -> &str {
        match &self.source {
            EntrySource::Local { preview, .. } => preview.as_str(),
            EntrySource::Remote { url, .. } => url,
        }
    }

    pub fn local_bytes(&self) -> Option<&[u8]> {
        match &self.source {
            EntrySource::Local { bytes, .. } => Some(bytes),
            EntrySource::Remote { .. } => None,
        }
    }

    pub fn local_preview(&self) -> Option<&PreviewRef> {
        match &self.source {
            EntrySource::Local { preview, .. } => Some(preview),
            EntrySource::Remote { .. } => None,
        }
    }

    pub fn remote_url(&self) -> Option<&str> {
        match &self.source {
            EntrySource::Remote { url, .. } => Some(url),
            EntrySource::Local { .. } => None,
        }
    }

    pub fn storage_path(&self) -> Option<&str> {
        match &self.source {
            EntrySource::Remote { path, .. } => Some(path),
            EntrySource::Local { .. } => None,
        }
    }
}

/// Where [`Gallery::insert_at`] puts new entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    #[default]
    End,
    Front,
}

/// A batch ticket: admitted files waiting to be processed.
#[derive(Debug)]
pub struct PendingBatch {
    seq: u64,
    files: Vec<SourceFile>,
    rejected_for_limit: usize,
}

impl PendingBatch {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn rejected_for_limit(&self) -> usize {
        self.rejected_for_limit
    }

    /// Normalize and compress the batch. Touches no gallery state.
    pub fn process(
        self,
        backend: &impl MediaBackend,
        settings: &IngestSettings,
        events: Option<&Sender<IngestEvent>>,
    ) -> ProcessedBatch {
        if let Some(tx) = events {
            tx.send(IngestEvent::BatchStarted {
                seq: self.seq,
                admitted: self.files.len(),
                rejected_for_limit: self.rejected_for_limit,
            })
            .ok();
        }
        let outcomes = ingest::process_files(backend, self.files, settings, events);
        ProcessedBatch {
            seq: self.seq,
            outcomes,
            rejected_for_limit: self.rejected_for_limit,
        }
    }
}

/// A processed batch, ready for [`Gallery::commit_batch`].
#[derive(Debug)]
pub struct ProcessedBatch {
    seq: u64,
    outcomes: Vec<FileOutcome>,
    rejected_for_limit: usize,
}

impl ProcessedBatch {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// What landing one batch did to the gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub seq: u64,
    /// Ids of the new entries, in selection order.
    pub added: Vec<EntryId>,
    pub rejected_for_limit: usize,
    pub rejections: Vec<FileRejection>,
    /// Processed files thrown away because the gallery was closed.
    pub discarded: usize,
}

#[derive(Debug)]
struct BatchQueue {
    next_seq: u64,
    next_to_land: u64,
    /// Ticket → admitted slot count, until the batch lands.
    reserved: BTreeMap<u64, usize>,
    /// Finished batches waiting on an earlier ticket; `None` marks an abandoned one.
    parked: BTreeMap<u64, Option<ProcessedBatch>>,
}

impl BatchQueue {
    fn new() -> Self {
        Self {
            next_seq: 1,
            next_to_land: 1,
            reserved: BTreeMap::new(),
            parked: BTreeMap::new(),
        }
    }

    fn reserved_slots(&self) -> usize {
        self.reserved.values().sum()
    }

    fn is_outstanding(&self, seq: u64) -> bool {
        self.reserved.contains_key(&seq) && !self.parked.contains_key(&seq)
    }
}

#[derive(Debug)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
    previews: PreviewTracker,
    ids: IdSequence,
    max_images: usize,
    main_changed: bool,
    dirty: bool,
    /// Storage paths of removed remote entries, deleted after the next publish.
    pending_deletes: Vec<String>,
    batches: BatchQueue,
    closed: bool,
}

impl Gallery {
    pub fn new(max_images: usize, previews: PreviewTracker) -> Self {
        Self {
            entries: Vec::new(),
            previews,
            ids: IdSequence::new(),
            max_images,
            main_changed: false,
            dirty: false,
            pending_deletes: Vec::new(),
            batches: BatchQueue::new(),
            closed: false,
        }
    }

    /// Rebuild a gallery from persisted rows.
    ///
    /// Rows are ordered by `display_order`. Rows written while main was a
    /// separate flag can disagree with their order; the flagged row wins,
    /// is moved to the front, and the main flag is rewritten on next save.
    /// Persisted images are never dropped, even when there are more than
    /// `max_images` of them; such a gallery just admits nothing new.
    pub fn hydrate(max_images: usize, previews: PreviewTracker, mut rows: Vec<GalleryRow>) -> Self {
        let mut gallery = Self::new(max_images, previews);
        rows.sort_by_key(|row| row.display_order);

        if let Some(flagged) = rows.iter().position(|row| row.is_main)
            && flagged != 0
        {
            let row = rows.remove(flagged);
            warn!(path = %row.path, from = flagged, "main flag disagrees with order, moving to front");
            rows.insert(0, row);
            gallery.main_changed = true;
        }
        let flagged = rows.iter().filter(|row| row.is_main).count();
        if !rows.is_empty() && flagged != 1 {
            gallery.main_changed = true;
        }

        let mut seen = HashSet::new();
        for row in rows {
            let id = unique_remote_id(&row.path, &mut seen);
            gallery
                .entries
                .push(GalleryEntry::remote(id, row.url, row.path));
        }
        gallery
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&GalleryEntry> {
        self.entries.get(index)
    }

    pub fn main(&self) -> Option<&GalleryEntry> {
        self.entries.first()
    }

    pub fn is_main(&self, id: &EntryId) -> bool {
        self.main().is_some_and(|main| &main.id == id)
    }

    pub fn position(&self, id: &EntryId) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id)
    }

    pub fn max_images(&self) -> usize {
        self.max_images
    }

    /// Free slots, net of batches still in flight.
    pub fn available_slots(&self) -> usize {
        self.max_images
            .saturating_sub(self.entries.len() + self.batches.reserved_slots())
    }

    pub fn main_changed(&self) -> bool {
        self.main_changed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn pending_deletes(&self) -> &[String] {
        &self.pending_deletes
    }

    pub fn previews(&self) -> &PreviewTracker {
        &self.previews
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Append entries. See [`insert_at`](Self::insert_at).
    pub fn insert(&mut self, entries: Vec<GalleryEntry>) -> Result<(), GalleryError> {
        self.insert_at(entries, Placement::End)
    }

    /// Insert a group of entries, all or nothing.
    ///
    /// A refused group (too many, duplicate id, closed gallery) leaves the
    /// gallery untouched and releases the group's previews.
    pub fn insert_at(
        &mut self,
        entries: Vec<GalleryEntry>,
        placement: Placement,
    ) -> Result<(), GalleryError> {
        if let Err(e) = self.check_insert(&entries) {
            for preview in entries.iter().filter_map(GalleryEntry::local_preview) {
                self.previews.release(preview);
            }
            return Err(e);
        }
        if entries.is_empty() {
            return Ok(());
        }

        let was_empty = self.entries.is_empty();
        match placement {
            Placement::End => self.entries.extend(entries),
            Placement::Front => {
                self.entries.splice(0..0, entries);
            }
        }
        if was_empty || placement == Placement::Front {
            self.main_changed = true;
        }
        self.dirty = true;
        Ok(())
    }

    fn check_insert(&self, entries: &[GalleryEntry]) -> Result<(), GalleryError> {
        if self.closed {
            return Err(GalleryError::Closed);
        }
        let available = self.available_slots();
        if entries.len() > available {
            return Err(GalleryError::CapacityExceeded {
                max: self.max_images,
                requested: entries.len(),
                available,
            });
        }
        let mut seen: HashSet<&EntryId> = self.entries.iter().map(|e| &e.id).collect();
        for entry in entries {
            if !seen.insert(&entry.id) {
                return Err(GalleryError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(())
    }

    /// Remove an entry. Returns `false` if no entry has this id.
    ///
    /// A local entry's preview is released here; a remote entry's object is
    /// scheduled for deletion after the next successful publish.
    pub fn remove(&mut self, id: &EntryId) -> bool {
        let Some(index) = self.position(id) else {
            debug!(%id, "remove of unknown entry ignored");
            return false;
        };
        let entry = self.entries.remove(index);
        match entry.source {
            EntrySource::Local { preview, .. } => {
                self.previews.release(&preview);
            }
            EntrySource::Remote { path, .. } => self.pending_deletes.push(path),
        }
        if index == 0 {
            self.main_changed = true;
        }
        self.dirty = true;
        true
    }

    /// Move the entry at `from` to `to`. Previews are not touched.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), GalleryError> {
        let len = self.entries.len();
        for index in [from, to] {
            if index >= len {
                return Err(GalleryError::IndexOutOfRange { index, len });
            }
        }
        if from == to {
            return Ok(());
        }
        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
        if from == 0 || to == 0 {
            self.main_changed = true;
        }
        self.dirty = true;
        Ok(())
    }

    pub fn set_main(&mut self, index: usize) -> Result<(), GalleryError> {
        self.reorder(index, 0)
    }

    /// Take a ticket for a new batch, reserving its slots.
    pub fn begin_batch(&mut self, mut files: Vec<SourceFile>) -> Result<PendingBatch, IngestError> {
        if self.closed {
            return Err(IngestError::Closed);
        }
        let plan = ingest::plan_admission(
            files.len(),
            Capacity {
                current: self.entries.len() + self.batches.reserved_slots(),
                max: self.max_images,
            },
        )?;
        files.truncate(plan.admitted);

        let seq = self.batches.next_seq;
        self.batches.next_seq += 1;
        self.batches.reserved.insert(seq, plan.admitted);
        Ok(PendingBatch {
            seq,
            files,
            rejected_for_limit: plan.rejected_for_limit,
        })
    }

    /// Hand back a processed batch.
    ///
    /// Returns the reports of every batch that landed as a result, in ticket
    /// order: empty when an earlier ticket is still outstanding. After
    /// [`close`](Self::close) the batch is discarded without creating any
    /// preview.
    pub fn commit_batch(&mut self, batch: ProcessedBatch) -> Result<Vec<IngestReport>, GalleryError> {
        if self.closed {
            return Ok(vec![discard(batch)]);
        }
        if !self.batches.is_outstanding(batch.seq) {
            return Err(GalleryError::UnknownBatch(batch.seq));
        }
        self.batches.parked.insert(batch.seq, Some(batch));
        Ok(self.land_ready())
    }

    /// Give up on a ticket whose processing was lost, so later ones can land.
    pub fn abandon_batch(&mut self, seq: u64) -> Result<Vec<IngestReport>, GalleryError> {
        if self.closed {
            return Ok(Vec::new());
        }
        if !self.batches.is_outstanding(seq) {
            return Err(GalleryError::UnknownBatch(seq));
        }
        self.batches.parked.insert(seq, None);
        Ok(self.land_ready())
    }

    fn land_ready(&mut self) -> Vec<IngestReport> {
        let mut reports = Vec::new();
        while let Some(slot) = self.batches.parked.remove(&self.batches.next_to_land) {
            self.batches.reserved.remove(&self.batches.next_to_land);
            self.batches.next_to_land += 1;
            if let Some(batch) = slot {
                reports.push(self.land(batch));
            }
        }
        reports
    }

    fn land(&mut self, batch: ProcessedBatch) -> IngestReport {
        let (entries, rejections) =
            ingest::materialize(batch.outcomes, &mut self.previews, &mut self.ids);
        let added: Vec<EntryId> = entries.iter().map(|e| e.id.clone()).collect();
        match self.insert(entries) {
            Ok(()) => IngestReport {
                seq: batch.seq,
                added,
                rejected_for_limit: batch.rejected_for_limit,
                rejections,
                discarded: 0,
            },
            Err(e) => {
                warn!(seq = batch.seq, error = %e, "batch could not be inserted");
                IngestReport {
                    seq: batch.seq,
                    discarded: added.len(),
                    added: Vec::new(),
                    rejected_for_limit: batch.rejected_for_limit,
                    rejections,
                }
            }
        }
    }

    /// Admit, process and land one batch on the calling thread.
    ///
    /// With another batch still outstanding, this one parks behind it and
    /// the returned reports may be empty (or include the earlier batch).
    pub fn ingest(
        &mut self,
        backend: &impl MediaBackend,
        settings: &IngestSettings,
        files: Vec<SourceFile>,
        events: Option<&Sender<IngestEvent>>,
    ) -> Result<Vec<IngestReport>, IngestError> {
        let batch = self.begin_batch(files)?.process(backend, settings, events);
        Ok(self.commit_batch(batch)?)
    }

    /// Tear the gallery down: drop every entry, release every preview, and
    /// make in-flight batches land nowhere. Returns the number of previews
    /// released.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        self.entries.clear();
        self.pending_deletes.clear();
        self.batches.reserved.clear();
        self.batches.parked.clear();
        self.previews.release_all()
    }

    /// Swap uploaded local entries for remote ones, releasing their previews.
    ///
    /// `uploaded` maps entry id → `(url, path)`. Ids are kept.
    pub(crate) fn promote(&mut self, uploaded: &HashMap<EntryId, (String, String)>) -> usize {
        let mut promoted = 0;
        for entry in &mut self.entries {
            let Some((url, path)) = uploaded.get(&entry.id) else {
                continue;
            };
            let previous = std::mem::replace(
                &mut entry.source,
                EntrySource::Remote {
                    url: url.clone(),
                    path: path.clone(),
                },
            );
            if let EntrySource::Local { preview, .. } = previous {
                self.previews.release(&preview);
                promoted += 1;
            }
        }
        promoted
    }

    pub(crate) fn take_pending_deletes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_deletes)
    }

    pub(crate) fn mark_saved(&mut self) {
        self.main_changed = false;
        self.dirty = false;
    }
}

fn discard(batch: ProcessedBatch) -> IngestReport {
    let mut discarded = 0;
    let mut rejections = Vec::new();
    for outcome in batch.outcomes {
        match outcome {
            FileOutcome::Ready(_) => discarded += 1,
            FileOutcome::Rejected(rejection) => rejections.push(rejection),
        }
    }
    debug!(seq = batch.seq, discarded, "batch discarded after close");
    IngestReport {
        seq: batch.seq,
        added: Vec::new(),
        rejected_for_limit: batch.rejected_for_limit,
        rejections,
        discarded,
    }
}

/// Remote id for `path`; identical paths (the same photo twice) get a suffix.
fn unique_remote_id(path: &str, seen: &mut HashSet<EntryId>) -> EntryId {
    let mut id = EntryId::remote(path);
    let mut n = 1;
    while seen.contains(&id) {
        n += 1;
        id = EntryId::new(format!("remote:{path}#{n}"));
    }
    seen.insert(id.clone());
    id
}
