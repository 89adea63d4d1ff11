//! Compression to the canonical output format under a tier budget.
//!
//! [`compress`] is infallible by contract: if the backend fails (corrupt
//! pixels, missing decoder, encoder error) the pre-compression file is
//! returned unchanged. A file present beats a file small.

use crate::formats::{self, CANONICAL_OUTPUT};
use crate::imaging::{CompressParams, CompressionProfile, MediaBackend, Quality};
use crate::normalize::NormalizedFile;
use crate::types::SourceFile;
use tracing::warn;

/// What the compressor did to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compression {
    Encoded {
        quality: Quality,
        width: u32,
        height: u32,
        attempts: u32,
        within_budget: bool,
    },
    /// Vector input, already final.
    Vector,
    /// Backend failed; the input was kept.
    FellBack { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedFile {
    pub file: SourceFile,
    pub compression: Compression,
}

pub fn compress(
    backend: &impl MediaBackend,
    normalized: NormalizedFile,
    profile: &CompressionProfile,
) -> CompressedFile {
    let NormalizedFile { file, format, .. } = normalized;
    if format.is_vector() {
        return CompressedFile {
            file,
            compression: Compression::Vector,
        };
    }

    let params = CompressParams {
        bytes: &file.bytes,
        format,
        profile,
    };
    match backend.compress(&params) {
        Ok(encoded) => CompressedFile {
            file: SourceFile {
                name: formats::replace_extension(&file.name, CANONICAL_OUTPUT.extension()),
                mime: CANONICAL_OUTPUT.mime().to_string(),
                bytes: encoded.bytes,
            },
            compression: Compression::Encoded {
                quality: encoded.quality,
                width: encoded.width,
                height: encoded.height,
                attempts: encoded.attempts,
                within_budget: encoded.within_budget,
            },
        },
        Err(e) => {
            warn!(file = %file.name, error = %e, "compression failed, keeping input");
            CompressedFile {
                file,
                compression: Compression::FellBack {
                    reason: e.to_string(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::SourceFormat;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp, mock_encoded};
    use crate::normalize::Conversion;

    fn normalized(name: &str, mime: &str, format: SourceFormat) -> NormalizedFile {
        NormalizedFile {
            file: SourceFile::new(name, mime, b"pixels".to_vec()),
            format,
            conversion: Conversion::PassThrough,
        }
    }

    #[test]
    fn raster_is_reencoded_with_canonical_extension() {
        let backend = MockBackend::new();
        let out = compress(
            &backend,
            normalized("side.png", "image/png", SourceFormat::Png),
            &CompressionProfile::standard(),
        );

        assert_eq!(out.file.name, "side.webp");
        assert_eq!(out.file.mime, "image/webp");
        assert_eq!(out.file.bytes, mock_encoded(b"pixels"));
        assert!(matches!(
            out.compression,
            Compression::Encoded {
                within_budget: true,
                ..
            }
        ));
    }

    #[test]
    fn profile_is_forwarded_to_backend() {
        let backend = MockBackend::new();
        compress(
            &backend,
            normalized("a.jpg", "image/jpeg", SourceFormat::Jpeg),
            &CompressionProfile::premium(),
        );
        assert_eq!(
            backend.get_operations(),
            vec![RecordedOp::Compress {
                input_len: 6,
                format: SourceFormat::Jpeg,
                quality: 95,
                max_long_edge: 2560,
            }]
        );
    }

    #[test]
    fn vector_passes_through_without_backend_call() {
        let backend = MockBackend::new();
        let input = normalized("logo.svg", "image/svg+xml", SourceFormat::Svg);
        let out = compress(&backend, input.clone(), &CompressionProfile::standard());

        assert_eq!(out.file, input.file);
        assert_eq!(out.compression, Compression::Vector);
        assert!(backend.get_operations().is_empty());
    }

    #[test]
    fn failed_compression_returns_input_unchanged() {
        let backend = MockBackend::failing_compression();
        let input = normalized("rear.jpg", "image/jpeg", SourceFormat::Jpeg);
        let out = compress(&backend, input.clone(), &CompressionProfile::standard());

        assert_eq!(out.file, input.file);
        assert!(matches!(out.compression, Compression::FellBack { .. }));
    }
}
