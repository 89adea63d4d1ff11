//! Pure Rust image processing backend (plus libwebp for lossy WebP).
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG/APNG, GIF, WebP, BMP, TIFF) | `image` crate decoders, EXIF orientation applied |
//! | Decode (AVIF) | `avif-parse` + `rav1d` ([`super::avif`]) |
//! | Decode (HEIC/HEIF) | `libheif-rs` behind the `heif` feature ([`super::heif`]) |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → WebP (lossy) | `webp::Encoder` |
//! | Encode → JPEG (HEIC conversion) | `image::codecs::jpeg::JpegEncoder` |
//!
//! Re-encoding from decoded pixels never copies EXIF or other metadata into
//! the output.

use super::backend::{BackendError, EncodedImage, MediaBackend};
use super::calculations::plan_attempt;
use super::params::{CompressParams, Quality};
use crate::formats::SourceFormat;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn image_format(format: SourceFormat) -> Option<ImageFormat> {
    match format {
        SourceFormat::Jpeg => Some(ImageFormat::Jpeg),
        SourceFormat::Png | SourceFormat::Apng => Some(ImageFormat::Png),
        SourceFormat::Gif => Some(ImageFormat::Gif),
        SourceFormat::WebP => Some(ImageFormat::WebP),
        SourceFormat::Bmp => Some(ImageFormat::Bmp),
        SourceFormat::Tiff => Some(ImageFormat::Tiff),
        SourceFormat::Avif | SourceFormat::Heif | SourceFormat::Svg => None,
    }
}

/// Decode bytes of a known format, with EXIF orientation applied to the pixels.
fn load_image(bytes: &[u8], format: SourceFormat) -> Result<DynamicImage, BackendError> {
    match format {
        SourceFormat::Avif => return super::avif::decode(bytes),
        SourceFormat::Heif => return super::heif::decode(bytes),
        SourceFormat::Svg => return Err(BackendError::UnsupportedInput("SVG (vector)")),
        _ => {}
    }
    let image_format = image_format(format).ok_or(BackendError::UnsupportedInput(format.mime()))?;

    let decode_err =
        |e: image::ImageError| BackendError::ProcessingFailed(format!("Failed to decode {}: {e}", format.mime()));
    let mut decoder = ImageReader::with_format(Cursor::new(bytes), image_format)
        .into_decoder()
        .map_err(decode_err)?;
    let orientation = decoder.orientation().map_err(decode_err)?;
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Encode as lossy WebP. Alpha is kept only when the image has any.
fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let (width, height) = (img.width(), img.height());
    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height)
            .encode_simple(false, quality.value() as f32)
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height)
            .encode_simple(false, quality.value() as f32)
    };
    encoded
        .map(|memory| memory.to_vec())
        .map_err(|e| BackendError::ProcessingFailed(format!("WebP encode failed: {e:?}")))
}

/// Encode as baseline JPEG.
fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality.value() as u8);
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {e}")))?;
    Ok(out)
}

impl MediaBackend for RustBackend {
    fn convert_heif(&self, bytes: &[u8], quality: Quality) -> Result<Vec<u8>, BackendError> {
        let img = super::heif::decode(bytes)?;
        encode_jpeg(&img, quality)
    }

    fn compress(&self, params: &CompressParams<'_>) -> Result<EncodedImage, BackendError> {
        let img = load_image(params.bytes, params.format)?;
        let source = (img.width(), img.height());
        let profile = params.profile;
        let mut smallest: Option<EncodedImage> = None;

        for attempt in 0..profile.max_iterations.max(1) {
            let plan = plan_attempt(profile, source, attempt);
            let bytes = if (plan.width, plan.height) == source {
                encode_webp(&img, plan.quality)?
            } else {
                let resized = img.resize_exact(plan.width, plan.height, FilterType::Lanczos3);
                encode_webp(&resized, plan.quality)?
            };
            let size = bytes.len() as u64;
            debug!(
                attempt,
                quality = plan.quality.value(),
                width = plan.width,
                height = plan.height,
                size,
                budget = profile.max_bytes,
                "webp encode attempt"
            );

            let candidate = EncodedImage {
                bytes,
                width: plan.width,
                height: plan.height,
                quality: plan.quality,
                attempts: attempt + 1,
                within_budget: size <= profile.max_bytes,
            };
            if candidate.within_budget {
                return Ok(candidate);
            }
            let is_smaller = smallest
                .as_ref()
                .is_none_or(|best| candidate.bytes.len() < best.bytes.len());
            if is_smaller {
                smallest = Some(candidate);
            } else if let Some(best) = smallest.as_mut() {
                best.attempts = attempt + 1;
            }
        }

        smallest.ok_or_else(|| BackendError::ProcessingFailed("no encode attempt ran".into()))
    }
}
