//! Storage abstractions for crawl output.
//!
//! Three destinations, each with its own module:
//!
//! - `shard`: per-chapter JSONL files and the master index (always local)
//! - `images`: relocated question images, behind the [`ImageBackend`] trait
//!   (`local` filesystem or `s3`)
//! - `db`: optional relational mirror behind the [`RelationalSink`] trait
//!
//! ## Directory Structure
//!
//! ```text
//! getmarks_data/
//! ├── master_index.json
//! ├── json/
//! │   └── {exam}_{subject}_{chapter}.jsonl
//! └── images/
//!     └── {exam}/{subject}/{chapter}/
//! ```

pub mod db;
pub mod images;
pub mod local;
#[cfg(feature = "s3")]
pub mod s3;
pub mod shard;

// Re-export for convenience
pub use db::{ChapterRow, QuestionRow, RelationalSink, RowBuffer, open_sink};
pub use images::{HttpImageStore, ImageBackend, ImageHint, ImageRole, ImageStore};
pub use local::LocalStorage;
#[cfg(feature = "s3")]
pub use s3::S3Storage;
pub use shard::{ShardWriter, load_master_index, read_shard, write_master_index};

use crate::error::{AppError, Result};
use crate::models::{Config, ImageBackendKind};

/// Build the configured image backend.
pub async fn build_image_backend(config: &Config) -> Result<Box<dyn ImageBackend>> {
    match config.images.backend {
        ImageBackendKind::Local => Ok(Box::new(LocalStorage::new(&config.output.dir))),
        #[cfg(feature = "s3")]
        ImageBackendKind::S3 => Ok(Box::new(S3Storage::from_config(&config.images.s3).await?)),
        #[cfg(not(feature = "s3"))]
        ImageBackendKind::S3 => Err(AppError::config(
            "IMAGE_BACKEND=s3 requires the `s3` feature",
        )),
    }
}

/// Image store that fetches with the configured client settings.
pub async fn build_image_store(config: &Config) -> Result<HttpImageStore> {
    let backend = build_image_backend(config).await?;
    HttpImageStore::new(
        backend,
        &config.api.user_agent,
        config.images.timeout_secs,
    )
    .map_err(|e| AppError::config(format!("image client: {e}")))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_local_backend_is_default() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.output.dir = tmp.path().to_path_buf();

        let store = build_image_store(&config).await.unwrap();
        assert!(store.backend().describe().starts_with("local:"));
    }

    #[cfg(feature = "s3")]
    #[tokio::test]
    async fn test_s3_backend_requires_bucket() {
        let mut config = Config::default();
        config.images.backend = ImageBackendKind::S3;

        let err = build_image_backend(&config).await.err().unwrap();
        assert!(err.is_fatal());
    }
}
