//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the pipeline stages ([`normalize`](crate::normalize),
//! [`compress`](crate::compress)) and the [`backend`](super::backend) that does
//! the pixel work, so a mock backend can stand in during tests.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`CompressionProfile`]: Tier budget: byte target, long-edge cap, quality, retry bounds.
//! - [`CompressParams`]: One compression request handed to the backend.

use crate::formats::SourceFormat;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Quality lowered by `points`, never below `floor`.
    pub fn lowered(self, points: u32, floor: Quality) -> Self {
        Self(self.0.saturating_sub(points).max(floor.0))
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Size/quality budget a compressed image must meet for one listing tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionProfile {
    /// Target upper bound for the encoded output.
    pub max_bytes: u64,
    /// Cap for the longer image edge. Smaller images are never upscaled.
    pub max_long_edge: u32,
    pub quality: Quality,
    /// Encode attempts before settling for the smallest output produced.
    pub max_iterations: u32,
    /// Quality floor for retries; below it, dimensions shrink instead.
    pub min_quality: Quality,
}

/// Bytes in one MiB, the unit tier budgets are written in.
pub const MIB: u64 = 1024 * 1024;

/// Convert a fractional MiB budget (`0.6`) to bytes.
pub fn mb_to_bytes(mb: f64) -> u64 {
    (mb * MIB as f64).round() as u64
}

impl CompressionProfile {
    /// Standard listings: ≈0.6 MB, 1920px long edge, quality 90.
    pub fn standard() -> Self {
        Self {
            max_bytes: mb_to_bytes(0.6),
            max_long_edge: 1920,
            quality: Quality::new(90),
            max_iterations: 10,
            min_quality: Quality::new(50),
        }
    }

    /// Premium ("featured") listings: ≈1.0 MB, 2560px long edge, quality 95.
    pub fn premium() -> Self {
        Self {
            max_bytes: mb_to_bytes(1.0),
            max_long_edge: 2560,
            quality: Quality::new(95),
            max_iterations: 10,
            min_quality: Quality::new(50),
        }
    }
}

impl Default for CompressionProfile {
    fn default() -> Self {
        Self::standard()
    }
}

/// A compression request: decode `bytes` as `format`, re-encode under `profile`.
#[derive(Debug, Clone, Copy)]
pub struct CompressParams<'a> {
    pub bytes: &'a [u8],
    pub format: SourceFormat,
    pub profile: &'a CompressionProfile,
}
