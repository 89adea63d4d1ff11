//! MIME classification and file-name extension mapping.
//!
//! Every file entering the pipeline is classified once from its declared MIME
//! type into a [`MediaKind`]:
//!
//! | Declared type | Kind |
//! |---|---|
//! | `image/heic`, `image/heif`, `*-sequence`, `image/x-heic`, ... | `Image(Heif)` |
//! | JPEG, PNG, APNG, GIF, WebP, BMP, TIFF, AVIF (plus common aliases) | `Image(..)` |
//! | `image/svg+xml` | `Image(Svg)` (vector, never re-encoded) |
//! | any other `image/*` | `UnsupportedImage` |
//! | everything else | `NotAnImage` |
//!
//! Browsers frequently report an empty type for camera-native HEIC files, so
//! an empty or `application/octet-stream` declaration falls back to the file
//! name extension.

/// Image formats the pipeline accepts as input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Apng,
    Gif,
    WebP,
    Bmp,
    Tiff,
    Avif,
    Heif,
    Svg,
}

impl SourceFormat {
    pub fn mime(self) -> &'static str {
        match self {
            SourceFormat::Jpeg => "image/jpeg",
            SourceFormat::Png => "image/png",
            SourceFormat::Apng => "image/apng",
            SourceFormat::Gif => "image/gif",
            SourceFormat::WebP => "image/webp",
            SourceFormat::Bmp => "image/bmp",
            SourceFormat::Tiff => "image/tiff",
            SourceFormat::Avif => "image/avif",
            SourceFormat::Heif => "image/heic",
            SourceFormat::Svg => "image/svg+xml",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SourceFormat::Jpeg => "jpg",
            SourceFormat::Png | SourceFormat::Apng => "png",
            SourceFormat::Gif => "gif",
            SourceFormat::WebP => "webp",
            SourceFormat::Bmp => "bmp",
            SourceFormat::Tiff => "tiff",
            SourceFormat::Avif => "avif",
            SourceFormat::Heif => "heic",
            SourceFormat::Svg => "svg",
        }
    }

    pub fn is_vector(self) -> bool {
        self == SourceFormat::Svg
    }
}

/// The single format every compressed raster image is re-encoded to.
pub const CANONICAL_OUTPUT: SourceFormat = SourceFormat::WebP;

/// Format used when the normalizer converts HEIC/HEIF to a baseline raster.
pub const HEIF_CONVERSION_TARGET: SourceFormat = SourceFormat::Jpeg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image(SourceFormat),
    /// Declared as an image, but not a format we can handle.
    UnsupportedImage,
    NotAnImage,
}

/// Extension → declared MIME type, in the spirit of a browser file picker.
const EXTENSION_MIME: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("jpe", "image/jpeg"),
    ("png", "image/png"),
    ("apng", "image/apng"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("avif", "image/avif"),
    ("heic", "image/heic"),
    ("heics", "image/heic-sequence"),
    ("heif", "image/heif"),
    ("heifs", "image/heif-sequence"),
    ("svg", "image/svg+xml"),
];

/// Declared MIME type for a file extension (case-insensitive).
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    EXTENSION_MIME
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
}

/// Lowercase, parameter-free essence of a MIME string.
fn essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

/// True for HEIC/HEIF by exact match or vendor-prefixed variant.
pub fn is_heif_mime(mime: &str) -> bool {
    let essence = essence(mime);
    let Some(subtype) = essence.strip_prefix("image/") else {
        return false;
    };
    let subtype = subtype.strip_prefix("x-").unwrap_or(subtype);
    matches!(
        subtype,
        "heic" | "heif" | "heic-sequence" | "heif-sequence"
    )
}

fn format_for_mime(essence: &str) -> Option<SourceFormat> {
    let format = match essence {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => SourceFormat::Jpeg,
        "image/png" | "image/x-png" => SourceFormat::Png,
        "image/apng" => SourceFormat::Apng,
        "image/gif" => SourceFormat::Gif,
        "image/webp" => SourceFormat::WebP,
        "image/bmp" | "image/x-ms-bmp" | "image/x-bmp" => SourceFormat::Bmp,
        "image/tiff" | "image/tif" => SourceFormat::Tiff,
        "image/avif" => SourceFormat::Avif,
        "image/svg+xml" => SourceFormat::Svg,
        other if is_heif_mime(other) => SourceFormat::Heif,
        _ => return None,
    };
    Some(format)
}

fn extension_of(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

/// Classify a file from its declared MIME type, falling back to the name's
/// extension when the declaration is missing or generic.
pub fn classify(mime: &str, name: &str) -> MediaKind {
    let essence = essence(mime);
    if essence.is_empty() || essence == "application/octet-stream" {
        return extension_of(name)
            .and_then(mime_for_extension)
            .and_then(format_for_mime)
            .map_or(MediaKind::NotAnImage, MediaKind::Image);
    }
    match format_for_mime(&essence) {
        Some(format) => MediaKind::Image(format),
        None if essence.starts_with("image/") => MediaKind::UnsupportedImage,
        None => MediaKind::NotAnImage,
    }
}

/// Extension for a stored object with the given MIME type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match format_for_mime(&essence(mime)) {
        Some(format) => format.extension(),
        None => "bin",
    }
}

/// Rewrite a file name's extension, keeping the base name.
///
/// `photo.HEIC` → `photo.jpg`, `scan` → `scan.jpg`, `""` → `image.jpg`.
pub fn replace_extension(name: &str, ext: &str) -> String {
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    };
    if stem.is_empty() {
        format!("image.{ext}")
    } else {
        format!("{stem}.{ext}")
    }
}
