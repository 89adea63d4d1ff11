//! CLI output formatting for ingestion, galleries, and publishing.
//!
//! # Information-First Display
//!
//! Every photo is shown by its 1-based position and file name first, with
//! what happened to it (sizes, conversion, compression, rejection) as
//! indented context lines underneath. Positions shown here are the ones the
//! `--remove` and `--main` flags take.
//!
//! # Output Format
//!
//! ## Ingest
//!
//! ```text
//! Batch #1: 3 files (2 over the limit)
//!     001 IMG_0042.HEIC → IMG_0042.webp
//!         Size: 3.1 MiB → 412.0 KiB
//!         Converted: HEIC → JPEG
//!         Encoded: 1920x1440, quality 80, 3 attempts
//!     002 brochure.pdf
//!         Skipped: not an image (`application/pdf`)
//! ```
//!
//! ## Gallery
//!
//! ```text
//! Gallery car-7 (2/10 photos)
//! 001 3f2a….webp [main]
//!     Source: https://img.example/u1/car-7/3f2a….webp
//! 002 side.jpg
//!     Source: local, 388.2 KiB
//! ```
//!
//! ## Publish
//!
//! ```text
//! Published car-7: 2 photos, 1 uploaded, 1 deleted
//!     Main photo rewritten
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::compress::Compression;
use crate::gallery::{EntrySource, Gallery, IngestReport};
use crate::ingest::IngestEvent;
use crate::normalize::Conversion;
use crate::reconcile::{PersistedGallery, ReconcileError};
use crate::storage::GalleryRow;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte size (binary units).
fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / (KIB * KIB))
    }
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn main_marker(position: usize) -> &'static str {
    if position == 1 { " [main]" } else { "" }
}

// ============================================================================
// Ingest
// ============================================================================

/// Format a single ingestion progress event as display lines.
pub fn format_ingest_event(event: &IngestEvent) -> Vec<String> {
    match event {
        IngestEvent::BatchStarted {
            seq,
            admitted,
            rejected_for_limit,
        } => {
            let mut header = format!("Batch #{seq}: {}", plural(*admitted, "file", "files"));
            if *rejected_for_limit > 0 {
                header.push_str(&format!(" ({rejected_for_limit} over the limit)"));
            }
            vec![header]
        }
        IngestEvent::FileProcessed {
            index,
            original_name,
            final_name,
            original_size,
            final_size,
            conversion,
            compression,
        } => {
            let mut lines = Vec::new();
            let title = if original_name == final_name {
                original_name.clone()
            } else {
                format!("{original_name} → {final_name}")
            };
            lines.push(format!("{}{} {}", indent(1), format_index(index + 1), title));
            lines.push(format!(
                "{}Size: {} → {}",
                indent(2),
                format_size(*original_size),
                format_size(*final_size)
            ));
            match conversion {
                Conversion::PassThrough => {}
                Conversion::Converted => lines.push(format!("{}Converted: HEIC → JPEG", indent(2))),
                Conversion::FellBack { reason } => lines.push(format!(
                    "{}Conversion failed, original kept: {reason}",
                    indent(2)
                )),
            }
            lines.push(match compression {
                Compression::Encoded {
                    quality,
                    width,
                    height,
                    attempts,
                    within_budget,
                } => {
                    let budget = if *within_budget { "" } else { ", over budget" };
                    format!(
                        "{}Encoded: {width}x{height}, quality {}, {}{budget}",
                        indent(2),
                        quality.value(),
                        plural(*attempts as usize, "attempt", "attempts")
                    )
                }
                Compression::Vector => format!("{}Vector, kept as-is", indent(2)),
                Compression::FellBack { reason } => {
                    format!("{}Compression failed, input kept: {reason}", indent(2))
                }
            });
            lines
        }
        IngestEvent::FileRejected {
            index,
            name,
            reason,
        } => vec![
            format!("{}{} {}", indent(1), format_index(index + 1), name),
            format!("{}Skipped: {reason}", indent(2)),
        ],
    }
}

pub fn print_ingest_event(event: &IngestEvent) {
    for line in format_ingest_event(event) {
        println!("{}", line);
    }
}

/// Summary of one landed batch.
pub fn format_ingest_report(report: &IngestReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Added {} from batch #{}",
        plural(report.added.len(), "photo", "photos"),
        report.seq
    )];
    if report.rejected_for_limit > 0 {
        lines.push(format!(
            "{}{} not added: gallery limit reached",
            indent(1),
            plural(report.rejected_for_limit, "file", "files")
        ));
    }
    if !report.rejections.is_empty() {
        lines.push(format!(
            "{}{} skipped",
            indent(1),
            plural(report.rejections.len(), "file", "files")
        ));
    }
    if report.discarded > 0 {
        lines.push(format!(
            "{}{} discarded: gallery closed",
            indent(1),
            plural(report.discarded, "file", "files")
        ));
    }
    lines
}

/// Warning for HEIC files selected in a build without HEIF decoding.
/// Empty when `heif_decoding` is on or there are no such files.
pub fn format_heif_notice(heif_files: usize, heif_decoding: bool) -> Vec<String> {
    if heif_decoding || heif_files == 0 {
        return Vec::new();
    }
    vec![
        format!(
            "Note: {} cannot be converted; this build lacks the `heif` feature",
            plural(heif_files, "HEIC file", "HEIC files")
        ),
        format!("{}Original bytes are kept and compression is skipped", indent(1)),
    ]
}

pub fn print_heif_notice(heif_files: usize, heif_decoding: bool) {
    for line in format_heif_notice(heif_files, heif_decoding) {
        println!("{}", line);
    }
}

pub fn print_ingest_report(report: &IngestReport) {
    for line in format_ingest_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Gallery
// ============================================================================

/// Format an in-memory gallery, main photo first.
pub fn format_gallery(listing_id: &str, gallery: &Gallery) -> Vec<String> {
    let mut lines = vec![format!(
        "Gallery {listing_id} ({}/{} photos)",
        gallery.len(),
        gallery.max_images()
    )];
    for (i, entry) in gallery.entries().iter().enumerate() {
        let pos = i + 1;
        lines.push(format!(
            "{} {}{}",
            format_index(pos),
            entry.original_name,
            main_marker(pos)
        ));
        let source = match &entry.source {
            EntrySource::Remote { url, .. } => url.clone(),
            EntrySource::Local { .. } => format!("local, {}", format_size(entry.byte_size)),
        };
        lines.push(format!("{}Source: {source}", indent(1)));
    }
    lines
}

pub fn print_gallery(listing_id: &str, gallery: &Gallery) {
    for line in format_gallery(listing_id, gallery) {
        println!("{}", line);
    }
}

/// Format persisted rows (as read back from storage).
pub fn format_rows(listing_id: &str, rows: &[GalleryRow]) -> Vec<String> {
    if rows.is_empty() {
        return vec![format!("Listing {listing_id} has no published photos")];
    }
    let mut lines = vec![format!(
        "Listing {listing_id} ({})",
        plural(rows.len(), "photo", "photos")
    )];
    for row in rows {
        let name = row.path.rsplit('/').next().unwrap_or(&row.path);
        let marker = if row.is_main { " [main]" } else { "" };
        lines.push(format!(
            "{} {name}{marker}",
            format_index(row.display_order as usize + 1)
        ));
        lines.push(format!("{}Source: {}", indent(1), row.url));
    }
    lines
}

pub fn print_rows(listing_id: &str, rows: &[GalleryRow]) {
    for line in format_rows(listing_id, rows) {
        println!("{}", line);
    }
}

// ============================================================================
// Publish
// ============================================================================

pub fn format_publish_output(persisted: &PersistedGallery) -> Vec<String> {
    let mut lines = vec![format!(
        "Published {}: {}, {} uploaded, {} deleted",
        persisted.listing_id,
        plural(persisted.images.len(), "photo", "photos"),
        persisted.uploaded,
        persisted.deleted.len()
    )];
    if persisted.main_rewritten {
        lines.push(format!("{}Main photo rewritten", indent(1)));
    }
    for path in &persisted.orphaned {
        lines.push(format!("{}Orphaned: {path}", indent(1)));
    }
    lines
}

pub fn print_publish_output(persisted: &PersistedGallery) {
    for line in format_publish_output(persisted) {
        println!("{}", line);
    }
}

/// Publish failure, with one line per failed upload.
pub fn format_reconcile_error(error: &ReconcileError) -> Vec<String> {
    let mut lines = vec![format!("Publish failed: {error}")];
    if let ReconcileError::UploadFailed { failures, .. } = error {
        for failure in failures {
            lines.push(format!(
                "{}{}: {}",
                indent(1),
                failure.names.join(", "),
                failure.error
            ));
        }
    }
    lines
}

pub fn print_reconcile_error(error: &ReconcileError) {
    for line in format_reconcile_error(error) {
        eprintln!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Quality;
    use crate::preview::PreviewTracker;
    use crate::reconcile::UploadFailure;
    use crate::types::EntryId;

    #[test]
    fn format_index_pads_to_three_digits() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(15), "015");
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(820), "820 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(3 * 1024 * 1024 + 100 * 1024), "3.1 MiB");
    }

    #[test]
    fn format_batch_started_with_overflow() {
        let lines = format_ingest_event(&IngestEvent::BatchStarted {
            seq: 2,
            admitted: 2,
            rejected_for_limit: 3,
        });
        assert_eq!(lines, vec!["Batch #2: 2 files (3 over the limit)"]);
    }

    #[test]
    fn format_converted_and_encoded_file() {
        let lines = format_ingest_event(&IngestEvent::FileProcessed {
            index: 0,
            original_name: "IMG_0042.HEIC".into(),
            final_name: "IMG_0042.webp".into(),
            original_size: 2048,
            final_size: 1024,
            conversion: Conversion::Converted,
            compression: Compression::Encoded {
                quality: Quality::new(80),
                width: 1920,
                height: 1440,
                attempts: 3,
                within_budget: true,
            },
        });
        assert_eq!(lines[0], "    001 IMG_0042.HEIC → IMG_0042.webp");
        assert_eq!(lines[1], "        Size: 2.0 KiB → 1.0 KiB");
        assert_eq!(lines[2], "        Converted: HEIC → JPEG");
        assert_eq!(lines[3], "        Encoded: 1920x1440, quality 80, 3 attempts");
    }

    #[test]
    fn format_fallbacks_are_visible() {
        let lines = format_ingest_event(&IngestEvent::FileProcessed {
            index: 4,
            original_name: "a.heic".into(),
            final_name: "a.heic".into(),
            original_size: 10,
            final_size: 10,
            conversion: Conversion::FellBack {
                reason: "corrupt".into(),
            },
            compression: Compression::FellBack {
                reason: "no decoder".into(),
            },
        });
        assert_eq!(lines[0], "    005 a.heic");
        assert_eq!(lines[2], "        Conversion failed, original kept: corrupt");
        assert_eq!(lines[3], "        Compression failed, input kept: no decoder");
    }

    #[test]
    fn format_rejected_file() {
        let lines = format_ingest_event(&IngestEvent::FileRejected {
            index: 1,
            name: "brochure.pdf".into(),
            reason: "not an image (`application/pdf`)".into(),
        });
        assert_eq!(
            lines,
            vec![
                "    002 brochure.pdf",
                "        Skipped: not an image (`application/pdf`)"
            ]
        );
    }

    #[test]
    fn heif_notice_only_without_decoder() {
        let lines = format_heif_notice(2, false);
        assert_eq!(
            lines[0],
            "Note: 2 HEIC files cannot be converted; this build lacks the `heif` feature"
        );
        assert!(format_heif_notice(2, true).is_empty());
        assert!(format_heif_notice(0, false).is_empty());
    }

    #[test]
    fn format_report_counts() {
        let report = IngestReport {
            seq: 1,
            added: vec![EntryId::new("local-1"), EntryId::new("local-2")],
            rejected_for_limit: 3,
            rejections: Vec::new(),
            discarded: 0,
        };
        assert_eq!(
            format_ingest_report(&report),
            vec![
                "Added 2 photos from batch #1",
                "    3 files not added: gallery limit reached"
            ]
        );
    }

    #[test]
    fn format_gallery_marks_main() {
        let rows = vec![
            GalleryRow {
                url: "https://cdn.test/u/l/a.webp".into(),
                path: "u/l/a.webp".into(),
                is_main: true,
                display_order: 0,
            },
            GalleryRow {
                url: "https://cdn.test/u/l/b.webp".into(),
                path: "u/l/b.webp".into(),
                is_main: false,
                display_order: 1,
            },
        ];
        let gallery = Gallery::hydrate(10, PreviewTracker::in_memory(), rows.clone());

        let lines = format_gallery("car-7", &gallery);
        assert_eq!(lines[0], "Gallery car-7 (2/10 photos)");
        assert_eq!(lines[1], "001 a.webp [main]");
        assert_eq!(lines[2], "    Source: https://cdn.test/u/l/a.webp");
        assert_eq!(lines[3], "002 b.webp");

        let lines = format_rows("car-7", &rows);
        assert_eq!(lines[0], "Listing car-7 (2 photos)");
        assert_eq!(lines[1], "001 a.webp [main]");
    }

    #[test]
    fn format_empty_rows() {
        assert_eq!(
            format_rows("car-7", &[]),
            vec!["Listing car-7 has no published photos"]
        );
    }

    #[test]
    fn format_publish_summary() {
        let persisted = PersistedGallery {
            listing_id: "car-7".into(),
            images: Vec::new(),
            uploaded: 1,
            deleted: vec!["u/l/x.webp".into()],
            orphaned: vec!["u/l/y.webp".into()],
            main_rewritten: true,
        };
        assert_eq!(
            format_publish_output(&persisted),
            vec![
                "Published car-7: 0 photos, 1 uploaded, 1 deleted",
                "    Main photo rewritten",
                "    Orphaned: u/l/y.webp"
            ]
        );
    }

    #[test]
    fn format_upload_failures_listed() {
        let error = ReconcileError::UploadFailed {
            failures: vec![UploadFailure {
                path: "u/l/abc.webp".into(),
                ids: vec![EntryId::new("local-2"), EntryId::new("local-4")],
                names: vec!["side.jpg".into(), "side-copy.jpg".into()],
                error: "timeout".into(),
            }],
            attempted: 3,
        };
        let lines = format_reconcile_error(&error);
        assert_eq!(
            lines[0],
            "Publish failed: 1 of 3 upload(s) failed; nothing was published"
        );
        assert_eq!(lines[1], "    side.jpg, side-copy.jpg: timeout");
    }
}
