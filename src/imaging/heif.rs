//! HEIC/HEIF decoding through libheif (feature `heif`).
//!
//! Without the feature, [`decode`] always fails, which the normalizer treats
//! as a conversion failure and answers by passing the original file through.

use super::backend::BackendError;
use image::DynamicImage;

/// Camera HEICs larger than this are refused before decoding.
#[cfg(feature = "heif")]
const HEIF_MAXIMUM_FILE_SIZE: usize = 1024 * 1024 * 48;

#[cfg(feature = "heif")]
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let heif_err = |e: libheif_rs::HeifError| BackendError::ProcessingFailed(format!("libheif: {e}"));

    if bytes.len() > HEIF_MAXIMUM_FILE_SIZE {
        return Err(BackendError::ProcessingFailed(format!(
            "HEIF input too large ({} bytes)",
            bytes.len()
        )));
    }

    let ctx = HeifContext::read_from_bytes(bytes).map_err(heif_err)?;
    let handle = ctx.primary_image_handle().map_err(heif_err)?;
    let decoded = LibHeif::new()
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(heif_err)?;

    let plane = decoded.planes().interleaved.ok_or_else(|| {
        BackendError::ProcessingFailed("HEIF image has no interleaved RGB plane".into())
    })?;

    // Rows may be padded past width * 3; copy only the pixel bytes.
    let row_len = plane.width as usize * 3;
    let mut rgb = Vec::with_capacity(row_len * plane.height as usize);
    for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
        let pixels = row.get(..row_len).ok_or_else(|| {
            BackendError::ProcessingFailed("HEIF plane row shorter than its width".into())
        })?;
        rgb.extend_from_slice(pixels);
    }

    image::RgbImage::from_raw(plane.width, plane.height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| BackendError::ProcessingFailed("HEIF plane size mismatch".into()))
}

#[cfg(not(feature = "heif"))]
pub fn decode(_bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    Err(BackendError::UnsupportedInput("HEIC/HEIF (built without `heif`)"))
}
