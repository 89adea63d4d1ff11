//! Image processing for the ingestion pipeline.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **HEIC → JPEG** | `libheif-rs` decode + `image` JPEG encoder |
//! | **Decode** | `image` (raster formats), `avif-parse` + `rav1d` (AVIF) |
//! | **Resize** | Lanczos3, long-edge capped, never upscaled |
//! | **Encode** | lossy WebP via `webp`, retried down to the byte budget |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and retry math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`MediaBackend`] trait + [`RustBackend`]

mod avif;
pub mod backend;
mod calculations;
mod heif;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, EncodedImage, MediaBackend};
pub use calculations::{EncodeAttempt, fit_long_edge, plan_attempt};
pub use params::{CompressParams, CompressionProfile, MIB, Quality, mb_to_bytes};
pub use rust_backend::RustBackend;

/// Whether this build can decode HEIC/HEIF (the `heif` feature).
pub const HEIF_DECODING: bool = cfg!(feature = "heif");
