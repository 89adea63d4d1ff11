//! Batch ingestion: admission → normalize → compress → preview → entries.
//!
//! ## Pipeline
//!
//! ```text
//! files ──plan_admission──▶ admitted ──process_files (rayon)──▶ outcomes ──materialize──▶ entries
//!        (tier limit)                  normalize + compress       (input order)   (previews, ids)
//! ```
//!
//! ## Failure policy
//!
//! Ingestion is partial-tolerant. Each file is processed independently:
//! conversion and compression failures are recovered inside their stages,
//! and anything that still goes wrong for one file (not an image, an
//! unsupported format, a panicking decoder, a refused preview) excludes only
//! that file and is reported as a [`FileRejection`]. Only the tier limit can
//! refuse a whole batch ([`IngestError::LimitReached`]), and files cut by the
//! limit are counted, never silently dropped.
//!
//! ## Ordering
//!
//! Files are processed concurrently but collected by input index, so the
//! entries come out in the order the user selected them.

use crate::compress::{Compression, compress};
use crate::formats::{self, MediaKind};
use crate::gallery::{GalleryEntry, GalleryError};
use crate::imaging::{CompressionProfile, MediaBackend, Quality};
use crate::normalize::{Conversion, NormalizeError, normalize};
use crate::preview::PreviewTracker;
use crate::types::{IdSequence, SourceFile};
use rayon::prelude::*;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("gallery is full ({max} images max); {overflow} file(s) not added")]
    LimitReached { max: usize, overflow: usize },
    #[error("gallery is closed")]
    Closed,
    #[error(transparent)]
    Gallery(#[from] GalleryError),
}

/// Why a single file was left out of a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("not an image (`{mime}`)")]
    NotAnImage { mime: String },
    #[error("unsupported image format `{mime}`")]
    UnsupportedFormat { mime: String },
    #[error("could not create preview: {0}")]
    Preview(String),
    #[error("processing panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRejection {
    /// Position in the admitted part of the batch.
    pub index: usize,
    pub name: String,
    pub reason: RejectReason,
}

/// Per-tier knobs for one ingestion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestSettings {
    pub profile: CompressionProfile,
    /// Fixed re-encode quality for HEIC/HEIF conversion.
    pub heif_quality: Quality,
}

impl IngestSettings {
    pub fn new(profile: CompressionProfile) -> Self {
        Self {
            profile,
            heif_quality: Quality::new(90),
        }
    }
}

/// Gallery fill level an ingestion is admitted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub current: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestPlan {
    pub admitted: usize,
    pub rejected_for_limit: usize,
}

/// Decide how many of `incoming` files fit. An empty selection always
/// yields an empty plan, even against a full gallery.
pub fn plan_admission(incoming: usize, capacity: Capacity) -> Result<IngestPlan, IngestError> {
    if incoming > 0 && capacity.current >= capacity.max {
        return Err(IngestError::LimitReached {
            max: capacity.max,
            overflow: incoming,
        });
    }
    let admitted = incoming.min(capacity.max.saturating_sub(capacity.current));
    Ok(IngestPlan {
        admitted,
        rejected_for_limit: incoming - admitted,
    })
}

/// A file that made it through normalize + compress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub index: usize,
    pub original_name: String,
    pub original_size: u64,
    pub file: SourceFile,
    pub conversion: Conversion,
    pub compression: Compression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Ready(ProcessedImage),
    Rejected(FileRejection),
}

/// Progress events, for the CLI printer or any other observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    BatchStarted {
        seq: u64,
        admitted: usize,
        rejected_for_limit: usize,
    },
    FileProcessed {
        index: usize,
        original_name: String,
        final_name: String,
        original_size: u64,
        final_size: u64,
        conversion: Conversion,
        compression: Compression,
    },
    FileRejected {
        index: usize,
        name: String,
        reason: String,
    },
}

/// Run one file through the normalizer and the compressor.
pub fn process_file(
    backend: &impl MediaBackend,
    index: usize,
    file: SourceFile,
    settings: &IngestSettings,
) -> FileOutcome {
    let reject = |name: String, reason| FileOutcome::Rejected(FileRejection { index, name, reason });

    if formats::classify(&file.mime, &file.name) == MediaKind::NotAnImage {
        return reject(file.name, RejectReason::NotAnImage { mime: file.mime });
    }

    let original_name = file.name.clone();
    let original_size = file.byte_size();
    let normalized = match normalize(backend, file, settings.heif_quality) {
        Ok(normalized) => normalized,
        Err(NormalizeError::UnsupportedFormat { name, mime }) => {
            return reject(name, RejectReason::UnsupportedFormat { mime });
        }
    };
    let conversion = normalized.conversion.clone();
    let compressed = compress(backend, normalized, &settings.profile);

    FileOutcome::Ready(ProcessedImage {
        index,
        original_name,
        original_size,
        file: compressed.file,
        conversion,
        compression: compressed.compression,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn event_for(outcome: &FileOutcome) -> IngestEvent {
    match outcome {
        FileOutcome::Ready(image) => IngestEvent::FileProcessed {
            index: image.index,
            original_name: image.original_name.clone(),
            final_name: image.file.name.clone(),
            original_size: image.original_size,
            final_size: image.file.byte_size(),
            conversion: image.conversion.clone(),
            compression: image.compression.clone(),
        },
        FileOutcome::Rejected(rejection) => IngestEvent::FileRejected {
            index: rejection.index,
            name: rejection.name.clone(),
            reason: rejection.reason.to_string(),
        },
    }
}

/// Process every file in parallel, isolating failures per file.
///
/// The result has one outcome per input, in input order.
pub fn process_files(
    backend: &impl MediaBackend,
    files: Vec<SourceFile>,
    settings: &IngestSettings,
    events: Option<&Sender<IngestEvent>>,
) -> Vec<FileOutcome> {
    files
        .into_par_iter()
        .enumerate()
        .map(|(index, file)| {
            let name = file.name.clone();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                process_file(backend, index, file, settings)
            }))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                warn!(file = %name, panic = %message, "file processing panicked");
                FileOutcome::Rejected(FileRejection {
                    index,
                    name,
                    reason: RejectReason::Panicked(message),
                })
            });
            if let Some(tx) = events {
                tx.send(event_for(&outcome)).ok();
            }
            outcome
        })
        .collect()
}

/// Turn processed files into local gallery entries, acquiring one preview each.
///
/// Rejected outcomes pass through to the returned rejection list, in order.
pub fn materialize(
    outcomes: Vec<FileOutcome>,
    previews: &mut PreviewTracker,
    ids: &mut IdSequence,
) -> (Vec<GalleryEntry>, Vec<FileRejection>) {
    let mut entries = Vec::new();
    let mut rejections = Vec::new();
    for outcome in outcomes {
        match outcome {
            FileOutcome::Ready(image) => match previews.acquire(&image.file.bytes, &image.file.mime)
            {
                Ok(preview) => entries.push(GalleryEntry::local(
                    ids.next_id(),
                    image.file,
                    preview,
                    image.original_name,
                )),
                Err(e) => rejections.push(FileRejection {
                    index: image.index,
                    name: image.original_name,
                    reason: RejectReason::Preview(e.to_string()),
                }),
            },
            FileOutcome::Rejected(rejection) => rejections.push(rejection),
        }
    }
    (entries, rejections)
}

/// Result of [`ingest`]: new entries (selection order) plus everything left out.
#[derive(Debug)]
pub struct IngestOutcome {
    pub entries: Vec<GalleryEntry>,
    pub rejected_for_limit: usize,
    pub rejections: Vec<FileRejection>,
}

/// Ingest a batch against a gallery holding `capacity.current` images.
///
/// Files past the limit are counted in `rejected_for_limit`; the first
/// `capacity.max - capacity.current` are processed.
pub fn ingest(
    backend: &impl MediaBackend,
    mut files: Vec<SourceFile>,
    capacity: Capacity,
    settings: &IngestSettings,
    previews: &mut PreviewTracker,
    ids: &mut IdSequence,
    events: Option<&Sender<IngestEvent>>,
) -> Result<IngestOutcome, IngestError> {
    let plan = plan_admission(files.len(), capacity)?;
    files.truncate(plan.admitted);
    let outcomes = process_files(backend, files, settings, events);
    let (entries, rejections) = materialize(outcomes, previews, ids);
    Ok(IngestOutcome {
        entries,
        rejected_for_limit: plan.rejected_for_limit,
        rejections,
    })
}
