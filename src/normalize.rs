//! Format normalization: HEIC/HEIF → baseline raster, everything else untouched.
//!
//! Conversion is best effort. A HEIC that fails to decode is passed through
//! as-is (storage may hold a non-ideal format as a last resort) instead of
//! costing the user a photo. Only a file whose type is outside the supported
//! set is refused.

use crate::formats::{self, HEIF_CONVERSION_TARGET, MediaKind, SourceFormat};
use crate::imaging::{MediaBackend, Quality};
use crate::types::SourceFile;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("unsupported image format `{mime}` ({name})")]
    UnsupportedFormat { name: String, mime: String },
}

/// What the normalizer did to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion {
    /// Already a supported format.
    PassThrough,
    /// HEIC/HEIF re-encoded to the baseline raster format.
    Converted,
    /// HEIC/HEIF decode failed; the original bytes were kept.
    FellBack { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFile {
    pub file: SourceFile,
    /// Format of `file` after normalization.
    pub format: SourceFormat,
    pub conversion: Conversion,
}

/// Normalize one file.
///
/// `quality` is the fixed re-encode quality for HEIC/HEIF conversion.
pub fn normalize(
    backend: &impl MediaBackend,
    file: SourceFile,
    quality: Quality,
) -> Result<NormalizedFile, NormalizeError> {
    let format = match formats::classify(&file.mime, &file.name) {
        MediaKind::Image(format) => format,
        MediaKind::UnsupportedImage | MediaKind::NotAnImage => {
            return Err(NormalizeError::UnsupportedFormat {
                name: file.name,
                mime: file.mime,
            });
        }
    };

    if format != SourceFormat::Heif {
        return Ok(NormalizedFile {
            file,
            format,
            conversion: Conversion::PassThrough,
        });
    }

    match backend.convert_heif(&file.bytes, quality) {
        Ok(bytes) => Ok(NormalizedFile {
            file: SourceFile {
                name: formats::replace_extension(&file.name, HEIF_CONVERSION_TARGET.extension()),
                mime: HEIF_CONVERSION_TARGET.mime().to_string(),
                bytes,
            },
            format: HEIF_CONVERSION_TARGET,
            conversion: Conversion::Converted,
        }),
        Err(e) => {
            warn!(file = %file.name, error = %e, "HEIC conversion failed, keeping original");
            Ok(NormalizedFile {
                file,
                format,
                conversion: Conversion::FellBack {
                    reason: e.to_string(),
                },
            })
        }
    }
}
