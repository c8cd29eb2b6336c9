//! Local filesystem storage implementation.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── master_index.json[.gz]      # Run summary, written last
//! ├── json/                       # One shard per chapter
//! │   └── {exam}_{subject}_{chapter}.jsonl[.gz]
//! └── images/                     # Local image backend only
//!     └── {exam}/{subject}/{chapter}/{role}_{index}_{sha1}{ext}
//! ```
//!
//! Writes go to a `.tmp` sibling first and are renamed into place, so readers
//! never observe a half-written file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::images::{ImageBackend, ImageObject};

/// Directory holding relocated images, relative to the output root.
pub const IMAGES_DIR: &str = "images";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    pub async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = tmp_path(&path);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Read bytes, returning None if file doesn't exist.
    pub async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Key of an image relative to the root, always `/`-separated.
    fn image_key(object: &ImageObject<'_>) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            IMAGES_DIR,
            object.scope.exam_id,
            object.scope.subject_id,
            object.scope.chapter_id,
            object.file_name()
        )
    }
}

/// `name.ext` → `name.ext.tmp`
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl ImageBackend for LocalStorage {
    async fn put(
        &self,
        object: &ImageObject<'_>,
        bytes: &[u8],
        _content_type: Option<&str>,
    ) -> Result<String> {
        let key = Self::image_key(object);
        self.write_bytes(&key, bytes).await?;
        Ok(key)
    }

    fn describe(&self) -> String {
        format!("local:{}", self.path(IMAGES_DIR).display())
    }
}
