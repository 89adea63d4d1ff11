//! # Listing Gallery
//!
//! Media ingestion and the ordered photo gallery behind a classified
//! listing. Sellers hand over a batch of files; each one is checked,
//! converted from HEIC when needed, compressed to the tier's byte budget,
//! and lands in the gallery in the order it was selected. Publishing
//! reconciles the gallery with object storage in one all-or-nothing step.
//!
//! # Pipeline
//!
//! ```text
//! 1. Admit      selected files  →  admitted + over-limit count   (capacity check)
//! 2. Normalize  HEIC/HEIF       →  JPEG                          (other formats pass through)
//! 3. Compress   raster          →  WebP within the byte budget   (vector kept as-is)
//! 4. Land       processed batch →  gallery entries + previews    (selection order kept)
//! 5. Publish    gallery         →  uploads, ordered rows, deletes
//! ```
//!
//! Stages 2 and 3 run in parallel across a batch on the rayon pool, but
//! results are collected by index, so processing time never reorders a
//! batch. Separate batches land in the order they were started, even when a
//! later one finishes first.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | `SourceFile`, entry ids and the seller tier |
//! | [`formats`] | MIME classification and the supported-format table |
//! | [`imaging`] | `MediaBackend` trait, pure-Rust decode/resize/encode |
//! | [`normalize`] | HEIC → JPEG with fall-back to the original bytes |
//! | [`compress`] | Budgeted WebP encoding with fall-back to the input |
//! | [`preview`] | Preview handles and their release bookkeeping |
//! | [`ingest`] | Admission, per-file processing, progress events |
//! | [`gallery`] | The ordered gallery: main photo, reorder, remove, batches |
//! | [`storage`] | `StorageBackend` trait + filesystem object store |
//! | [`reconcile`] | Publish: upload, persist order, delete removed objects |
//! | [`render`] | HTML preview of a published gallery |
//! | [`config`] | `media.toml` loading, merging with stock defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Errors
//!
//! Each stage has its own `thiserror` enum. Per-file problems during
//! ingestion (unsupported format, failed conversion, a panicking decoder)
//! never fail the batch: they are reported per file and the rest of the
//! batch still lands. Only structural problems fail an operation:
//!
//! - [`ingest::IngestError`]: the gallery is full, or closed.
//! - [`gallery::GalleryError`]: bad positions, capacity, unknown batches.
//! - [`reconcile::ReconcileError`]: any failed upload aborts the whole
//!   publish before anything is persisted.
//! - [`storage::StorageError`], [`config::ConfigError`]: I/O and parsing.
//!
//! # Main Photo
//!
//! The main photo is never stored on its own: it is whatever sits at
//! position 0. Moving, removing or promoting a photo changes the main photo
//! by changing the order, so the two can never disagree.

pub mod compress;
pub mod config;
pub mod formats;
pub mod gallery;
pub mod imaging;
pub mod ingest;
pub mod normalize;
pub mod output;
pub mod preview;
pub mod reconcile;
pub mod render;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
