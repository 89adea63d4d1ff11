//! Shared test utilities for the listing-gallery test suite.
//!
//! Provides synthetic image bytes, `SourceFile` shorthands, and preview
//! stores that record (or refuse) what the tracker asks of them.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let file = SourceFile::new("front.jpg", "image/jpeg", jpeg_bytes(640, 480));
//!
//! let (store, log) = RecordingPreviewStore::new();
//! let mut tracker = PreviewTracker::new(store);
//! let preview = tracker.acquire(&file.bytes, &file.mime).unwrap();
//! drop(tracker);
//! assert_eq!(log.revocations_of(&preview), 1);
//! ```

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

use crate::preview::{PreviewError, PreviewRef, PreviewStore};
use crate::types::SourceFile;

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    })
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// A gradient JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}

/// A gradient PNG of the given size (no alpha channel).
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Png)
}

/// A PNG whose left half is fully transparent.
pub fn rgba_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([200, 30, 30, 255])
        }
    });
    encode(DynamicImage::ImageRgba8(image), ImageFormat::Png)
}

/// A gradient JPEG carrying an EXIF APP1 segment with the given orientation
/// tag (1..=8), placed right after SOI.
pub fn jpeg_with_orientation(width: u32, height: u32, orientation: u16) -> Vec<u8> {
    let jpeg = jpeg_bytes(width, height);
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\x00\x2a");
    tiff.extend_from_slice(&8u32.to_be_bytes());
    // IFD0: a single Orientation (0x0112) SHORT entry, no next IFD.
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&3u16.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let mut payload = b"Exif\x00\x00".to_vec();
    payload.extend_from_slice(&tiff);

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// `SourceFile` with string bytes, for tests that never decode pixels.
pub fn source(name: &str, mime: &str, bytes: &str) -> SourceFile {
    SourceFile::new(name, mime, bytes.as_bytes().to_vec())
}

// =========================================================================
// Preview stores
// =========================================================================

#[derive(Default)]
struct LogState {
    created: Vec<PreviewRef>,
    revoked: Vec<PreviewRef>,
}

/// Shared view of everything a [`RecordingPreviewStore`] was asked to do.
#[derive(Clone, Default)]
pub struct PreviewLog(Arc<Mutex<LogState>>);

impl PreviewLog {
    pub fn created(&self) -> usize {
        self.0.lock().unwrap().created.len()
    }

    pub fn revoked(&self) -> Vec<PreviewRef> {
        self.0.lock().unwrap().revoked.clone()
    }

    pub fn revocations_of(&self, preview: &PreviewRef) -> usize {
        self.0
            .lock()
            .unwrap()
            .revoked
            .iter()
            .filter(|p| *p == preview)
            .count()
    }

    pub fn total_revocations(&self) -> usize {
        self.0.lock().unwrap().revoked.len()
    }

    /// Handles created but never revoked.
    pub fn outstanding(&self) -> Vec<PreviewRef> {
        let state = self.0.lock().unwrap();
        state
            .created
            .iter()
            .filter(|p| !state.revoked.contains(p))
            .cloned()
            .collect()
    }
}

/// Preview store that hands out `test:N` handles and logs every call.
pub struct RecordingPreviewStore {
    next: u64,
    log: PreviewLog,
}

impl RecordingPreviewStore {
    pub fn new() -> (Self, PreviewLog) {
        let log = PreviewLog::default();
        (
            Self {
                next: 0,
                log: log.clone(),
            },
            log,
        )
    }
}

impl PreviewStore for RecordingPreviewStore {
    fn create(&mut self, _bytes: &[u8], _mime: &str) -> Result<PreviewRef, PreviewError> {
        self.next += 1;
        let preview = PreviewRef::new(format!("test:{}", self.next));
        self.log.0.lock().unwrap().created.push(preview.clone());
        Ok(preview)
    }

    fn revoke(&mut self, preview: &PreviewRef) {
        self.log.0.lock().unwrap().revoked.push(preview.clone());
    }
}

/// Preview store that refuses exactly one creation (1-based).
pub struct FailingPreviewStore {
    calls: u64,
    refuse: u64,
}

impl FailingPreviewStore {
    pub fn refusing_nth(refuse: u64) -> Self {
        Self { calls: 0, refuse }
    }
}

impl PreviewStore for FailingPreviewStore {
    fn create(&mut self, _bytes: &[u8], _mime: &str) -> Result<PreviewRef, PreviewError> {
        self.calls += 1;
        if self.calls == self.refuse {
            return Err(PreviewError::Refused("quota exceeded".into()));
        }
        Ok(PreviewRef::new(format!("fail-store:{}", self.calls)))
    }

    fn revoke(&mut self, _preview: &PreviewRef) {}
}
