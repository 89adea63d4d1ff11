//! Storage and database collaborator boundary.
//!
//! The pipeline needs a handful of capabilities from the outside world:
//! store bytes at a path and get a durable URL back, persist the ordered
//! per-listing image rows, delete an object, and read the rows back for
//! hydration. [`StorageBackend`] is that boundary; everything behind it
//! (buckets, databases, auth) is someone else's problem.
//!
//! # `FsStorage` layout
//!
//! ```text
//! <root>/
//! ├── objects/
//! │   └── <owner>/<listing_id>/<sha256>.<ext>    ← uploaded bytes
//! └── listings/
//!     └── <listing_id>/gallery.json              ← ordered rows
//! ```
//!
//! `gallery.json` is replaced as a whole file on every persist (written to a
//! temporary sibling, then renamed), the filesystem analogue of the
//! delete-then-bulk-insert a database would do. Public URLs are
//! `<public_base_url>/<object path>`.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

/// Version of the `gallery.json` format.
const GALLERY_FILE_VERSION: u32 = 1;
const GALLERY_FILENAME: &str = "gallery.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

/// One persisted gallery position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryRow {
    pub url: String,
    /// Object path the URL was issued for; needed to delete the object later.
    pub path: String,
    #[serde(default)]
    pub is_main: bool,
    pub display_order: u32,
}

/// Capabilities the pipeline requires from storage + database.
///
/// Implementations must be `Sync`: uploads of one gallery run in parallel.
pub trait StorageBackend: Sync {
    /// Store `bytes` at `path`, returning the durable URL.
    fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String, StorageError>;

    fn public_url(&self, path: &str) -> String;

    /// Replace the listing's persisted rows with `rows`.
    fn persist_gallery_order(&self, listing_id: &str, rows: &[GalleryRow])
    -> Result<(), StorageError>;

    fn delete_object(&self, path: &str) -> Result<(), StorageError>;

    /// Persisted rows for a listing; empty for a listing never published.
    fn load_gallery_order(&self, listing_id: &str) -> Result<Vec<GalleryRow>, StorageError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct GalleryFile {
    version: u32,
    images: Vec<GalleryRow>,
}

/// Filesystem-backed storage, for the CLI and integration tests.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
    public_base_url: String,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk location of an object path.
    pub fn object_file(&self, path: &str) -> Result<PathBuf, StorageError> {
        if !path.split('/').all(is_path_segment) {
            return Err(StorageError::Rejected(format!("invalid object path `{path}`")));
        }
        Ok(self.root.join("objects").join(path))
    }

    fn gallery_file(&self, listing_id: &str) -> Result<PathBuf, StorageError> {
        if !is_path_segment(listing_id) {
            return Err(StorageError::Rejected(format!(
                "invalid listing id `{listing_id}`"
            )));
        }
        Ok(self.root.join("listings").join(listing_id).join(GALLERY_FILENAME))
    }
}

/// A non-empty single path segment: no separators, no `.`/`..`.
pub fn is_path_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}

static NEXT_TMP: AtomicU64 = AtomicU64::new(0);

/// Write `contents` next to `path` and rename over it.
fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(
        ".{name}.{}.tmp",
        NEXT_TMP.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

impl StorageBackend for FsStorage {
    fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String, StorageError> {
        let file = self.object_file(path)?;
        replace_file(&file, bytes)?;
        debug!(path, content_type, bytes = bytes.len(), "object stored");
        Ok(self.public_url(path))
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), path)
    }

    fn persist_gallery_order(
        &self,
        listing_id: &str,
        rows: &[GalleryRow],
    ) -> Result<(), StorageError> {
        let file = self.gallery_file(listing_id)?;
        let json = serde_json::to_vec_pretty(&GalleryFile {
            version: GALLERY_FILE_VERSION,
            images: rows.to_vec(),
        })?;
        replace_file(&file, &json)?;
        Ok(())
    }

    fn delete_object(&self, path: &str) -> Result<(), StorageError> {
        let file = self.object_file(path)?;
        match std::fs::remove_file(&file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn load_gallery_order(&self, listing_id: &str) -> Result<Vec<GalleryRow>, StorageError> {
        let file = self.gallery_file(listing_id)?;
        let content = match std::fs::read_to_string(&file) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let parsed: GalleryFile = serde_json::from_str(&content)?;
        if parsed.version != GALLERY_FILE_VERSION {
            return Err(StorageError::Rejected(format!(
                "{} has version {}, expected {GALLERY_FILE_VERSION}",
                file.display(),
                parsed.version
            )));
        }
        Ok(parsed.images)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    pub type UploadPredicate = Box<dyn Fn(&str, &[u8]) -> bool + Send + Sync>;

    /// In-memory storage that records every call and can be told to fail.
    #[derive(Default)]
    pub struct MockStorage {
        pub uploads: Mutex<Vec<(String, String)>>,
        pub persisted: Mutex<Vec<(String, Vec<GalleryRow>)>>,
        pub deleted: Mutex<Vec<String>>,
        pub rows: Mutex<HashMap<String, Vec<GalleryRow>>>,
        pub fail_upload: Option<UploadPredicate>,
        pub fail_persist: bool,
        pub fail_delete: bool,
    }

    impl MockStorage {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every upload whose `(path, bytes)` matches.
        pub fn failing_uploads_when(
            predicate: impl Fn(&str, &[u8]) -> bool + Send + Sync + 'static,
        ) -> Self {
            Self {
                fail_upload: Some(Box::new(predicate)),
                ..Self::default()
            }
        }

        pub fn with_rows(self, listing_id: &str, rows: Vec<GalleryRow>) -> Self {
            self.rows.lock().unwrap().insert(listing_id.to_string(), rows);
            self
        }

        pub fn uploaded_paths(&self) -> Vec<String> {
            let mut paths: Vec<_> = self
                .uploads
                .lock()
                .unwrap()
                .iter()
                .map(|(path, _)| path.clone())
                .collect();
            paths.sort();
            paths
        }

        pub fn persist_calls(&self) -> usize {
            self.persisted.lock().unwrap().len()
        }

        pub fn deleted_paths(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }
    }

    impl StorageBackend for MockStorage {
        fn upload(
            &self,
            path: &str,
            bytes: &[u8],
            content_type: &str,
        ) -> Result<String, StorageError> {
            if self.fail_upload.as_ref().is_some_and(|fail| fail(path, bytes)) {
                return Err(StorageError::Rejected(format!("upload refused for {path}")));
            }
            self.uploads
                .lock()
                .unwrap()
                .push((path.to_string(), content_type.to_string()));
            Ok(self.public_url(path))
        }

        fn public_url(&self, path: &str) -> String {
            format!("https://cdn.test/{path}")
        }

        fn persist_gallery_order(
            &self,
            listing_id: &str,
            rows: &[GalleryRow],
        ) -> Result<(), StorageError> {
            if self.fail_persist {
                return Err(StorageError::Rejected("database unavailable".into()));
            }
            self.persisted
                .lock()
                .unwrap()
                .push((listing_id.to_string(), rows.to_vec()));
            self.rows
                .lock()
                .unwrap()
                .insert(listing_id.to_string(), rows.to_vec());
            Ok(())
        }

        fn delete_object(&self, path: &str) -> Result<(), StorageError> {
            if self.fail_delete {
                return Err(StorageError::Rejected(format!("delete refused for {path}")));
            }
            self.deleted.lock().unwrap().push(path.to_string());
            Ok(())
        }

        fn load_gallery_order(&self, listing_id: &str) -> Result<Vec<GalleryRow>, StorageError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(listing_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn row(path: &str, order: u32) -> GalleryRow {
        GalleryRow {
            url: format!("http://img.test/{path}"),
            path: path.to_string(),
            is_main: order == 0,
            display_order: order,
        }
    }

    #[test]
    fn upload_writes_object_and_returns_public_url() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path(), "http://img.test/");

        let url = storage
            .upload("u1/car-7/abc.webp", b"bytes", "image/webp")
            .unwrap();

        assert_eq!(url, "http://img.test/u1/car-7/abc.webp");
        let on_disk = std::fs::read(tmp.path().join("objects/u1/car-7/abc.webp")).unwrap();
        assert_eq!(on_disk, b"bytes");
    }

    #[test]
    fn upload_is_idempotent_for_same_path() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path(), "http://img.test");
        let first = storage.upload("u1/l/x.webp", b"same", "image/webp").unwrap();
        let second = storage.upload("u1/l/x.webp", b"same", "image/webp").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn traversal_paths_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path(), "http://img.test");
        for path in ["../escape.webp", "/etc/passwd", "", "u1/./x.webp"] {
            assert!(
                matches!(
                    storage.upload(path, b"x", "image/webp"),
                    Err(StorageError::Rejected(_))
                ),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn persist_then_load_round_trips_rows() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path(), "http://img.test");
        let rows = vec![row("u1/l/a.webp", 0), row("u1/l/b.webp", 1)];

        storage.persist_gallery_order("car-7", &rows).unwrap();

        assert_eq!(storage.load_gallery_order("car-7").unwrap(), rows);
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("listings/car-7"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, ["gallery.json"]);
    }

    #[test]
    fn persist_replaces_previous_rows() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path(), "http://img.test");
        storage
            .persist_gallery_order("car-7", &[row("a", 0), row("b", 1)])
            .unwrap();
        storage.persist_gallery_order("car-7", &[row("b", 0)]).unwrap();

        assert_eq!(storage.load_gallery_order("car-7").unwrap(), vec![row("b", 0)]);
    }

    #[test]
    fn unknown_listing_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path(), "http://img.test");
        assert!(storage.load_gallery_order("never-published").unwrap().is_empty());
    }

    #[test]
    fn invalid_listing_id_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path(), "http://img.test");
        assert!(matches!(
            storage.persist_gallery_order("../x", &[]),
            Err(StorageError::Rejected(_))
        ));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path(), "http://img.test");
        let dir = tmp.path().join("listings/car-7");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("gallery.json"), r#"{"version": 99, "images": []}"#).unwrap();

        assert!(matches!(
            storage.load_gallery_order("car-7"),
            Err(StorageError::Rejected(_))
        ));
    }

    #[test]
    fn delete_removes_object_and_reports_missing() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path(), "http://img.test");
        storage.upload("u1/l/a.webp", b"x", "image/webp").unwrap();

        storage.delete_object("u1/l/a.webp").unwrap();

        assert!(!tmp.path().join("objects/u1/l/a.webp").exists());
        assert!(matches!(
            storage.delete_object("u1/l/a.webp"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn legacy_rows_without_main_flag_deserialize() {
        let parsed: GalleryRow =
            serde_json::from_str(r#"{"url": "u", "path": "p", "display_order": 3}"#).unwrap();
        assert!(!parsed.is_main);
        assert_eq!(parsed.display_order, 3);
    }

    #[test]
    fn path_segment_validation() {
        assert!(is_path_segment("car-7"));
        assert!(!is_path_segment(""));
        assert!(!is_path_segment(".."));
        assert!(!is_path_segment("a/b"));
        assert!(!is_path_segment("a\\b"));
    }
}
