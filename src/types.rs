//! Shared types used by every stage of the media pipeline.
//!
//! A [`SourceFile`] is what the user hands us: a name, the MIME type the
//! picker declared, and the raw bytes. Each stage (normalize → compress →
//! gallery) consumes one and produces another, so the same type flows through
//! the whole pipeline.

use crate::formats;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A user-selected file: declared MIME type, original file name, raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Read a file from disk, declaring its MIME type from the extension the
    /// way a browser file picker does. Unknown extensions declare an empty type.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(formats::mime_for_extension)
            .unwrap_or("");
        Ok(Self::new(name, mime, bytes))
    }

    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Stable identifier of a gallery entry, unique within one gallery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id for a remote entry, inherited from its storage path.
    pub fn remote(path: &str) -> Self {
        Self(format!("remote:{path}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonic generator for ids of locally ingested entries.
#[derive(Debug, Default)]
pub struct IdSequence {
    next: u64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> EntryId {
        self.next += 1;
        EntryId(format!("local-{}", self.next))
    }
}

/// Listing plan. Governs both the image count limit and the compression profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Standard,
    /// "Featured" listings.
    Premium,
}

impl Tier {
    pub fn from_featured(featured: bool) -> Self {
        if featured {
            Tier::Premium
        } else {
            Tier::Standard
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Standard => f.write_str("standard"),
            Tier::Premium => f.write_str("premium"),
        }
    }
}
