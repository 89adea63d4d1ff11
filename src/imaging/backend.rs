//! Image processing backend trait and shared types.
//!
//! The [`MediaBackend`] trait defines the two pixel operations the pipeline
//! needs: HEIC/HEIF → baseline raster conversion, and bounded re-encoding to
//! the canonical output format.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the recording
//! `MockBackend` below, which can be told to fail or panic on demand.

use super::params::{CompressParams, Quality};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("No decoder available for {0}")]
    UnsupportedInput(&'static str),
}

/// Result of a successful compression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
    /// Encode attempts made (1 when the first attempt met the byte budget).
    pub attempts: u32,
    pub within_budget: bool,
}

/// Trait for image processing backends.
///
/// Backends must be `Sync`: a batch is processed in parallel on the rayon
/// pool against one shared backend.
pub trait MediaBackend: Sync {
    /// Decode HEIC/HEIF bytes and re-encode them as JPEG at `quality`.
    fn convert_heif(&self, bytes: &[u8], quality: Quality) -> Result<Vec<u8>, BackendError>;

    /// Decode, orient, downscale and re-encode to the canonical lossy format.
    /// Metadata is not carried over.
    fn compress(&self, params: &CompressParams<'_>) -> Result<EncodedImage, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::CompressionProfile;
    use crate::formats::SourceFormat;
    use std::sync::Mutex;

    /// Mock backend that records operations without executing them.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        pub operations: Mutex<Vec<RecordedOp>>,
        pub fail_conversion: bool,
        pub fail_compression: bool,
        /// Inputs whose bytes equal this value make either operation panic.
        pub panic_on: Option<Vec<u8>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        ConvertHeif {
            input_len: usize,
            quality: u32,
        },
        Compress {
            input_len: usize,
            format: SourceFormat,
            quality: u32,
            max_long_edge: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_conversion() -> Self {
            Self {
                fail_conversion: true,
                ..Self::default()
            }
        }

        pub fn failing_compression() -> Self {
            Self {
                fail_compression: true,
                ..Self::default()
            }
        }

        pub fn panicking_on(bytes: &[u8]) -> Self {
            Self {
                panic_on: Some(bytes.to_vec()),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        fn check_panic(&self, bytes: &[u8]) {
            if self.panic_on.as_deref() == Some(bytes) {
                panic!("mock decoder exploded");
            }
        }
    }

    /// Mock compression output: `webp:` followed by the input bytes.
    pub fn mock_encoded(input: &[u8]) -> Vec<u8> {
        [b"webp:".as_slice(), input].concat()
    }

    impl MediaBackend for MockBackend {
        fn convert_heif(&self, bytes: &[u8], quality: Quality) -> Result<Vec<u8>, BackendError> {
            self.check_panic(bytes);
            self.operations.lock().unwrap().push(RecordedOp::ConvertHeif {
                input_len: bytes.len(),
                quality: quality.value(),
            });
            if self.fail_conversion {
                return Err(BackendError::ProcessingFailed("corrupt HEIC".into()));
            }
            Ok([b"jpeg:".as_slice(), bytes].concat())
        }

        fn compress(&self, params: &CompressParams<'_>) -> Result<EncodedImage, BackendError> {
            self.check_panic(params.bytes);
            self.operations.lock().unwrap().push(RecordedOp::Compress {
                input_len: params.bytes.len(),
                format: params.format,
                quality: params.profile.quality.value(),
                max_long_edge: params.profile.max_long_edge,
            });
            if self.fail_compression {
                return Err(BackendError::ProcessingFailed("worker unavailable".into()));
            }
            Ok(EncodedImage {
                bytes: mock_encoded(params.bytes),
                width: 100,
                height: 75,
                quality: params.profile.quality,
                attempts: 1,
                within_budget: true,
            })
        }
    }

    #[test]
    fn mock_records_conversion() {
        let backend = MockBackend::new();
        let out = backend.convert_heif(b"heic", Quality::new(90)).unwrap();
        assert_eq!(out, b"jpeg:heic");
        assert_eq!(
            backend.get_operations(),
            vec![RecordedOp::ConvertHeif {
                input_len: 4,
                quality: 90
            }]
        );
    }

    #[test]
    fn mock_records_compression_profile() {
        let backend = MockBackend::new();
        let profile = CompressionProfile::premium();
        backend
            .compress(&CompressParams {
                bytes: b"png",
                format: SourceFormat::Png,
                profile: &profile,
            })
            .unwrap();

        let ops = backend.get_operations();
        assert!(matches!(
            &ops[0],
            RecordedOp::Compress {
                format: SourceFormat::Png,
                quality: 95,
                max_long_edge: 2560,
                ..
            }
        ));
    }

    #[test]
    fn mock_failure_switches() {
        assert!(
            MockBackend::failing_conversion()
                .convert_heif(b"x", Quality::default())
                .is_err()
        );
        let profile = CompressionProfile::standard();
        assert!(
            MockBackend::failing_compression()
                .compress(&CompressParams {
                    bytes: b"x",
                    format: SourceFormat::Jpeg,
                    profile: &profile,
                })
                .is_err()
        );
    }
}
