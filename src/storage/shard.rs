//! Per-chapter JSONL shards and the master index.
//!
//! A shard is streamed to `json/<name>.tmp` and only renamed to its final
//! name once the stream has been flushed and closed, so anything listed in
//! the master index is complete.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_compression::tokio::bufread::GzipDecoder;
use async_compression::tokio::write::GzipEncoder;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::error::{AppError, Result};
use crate::models::{ChapterIndexEntry, ChapterScope, Compression, MasterIndex, Question};
use crate::storage::local::{LocalStorage, tmp_path};

/// Shard directory, relative to the output root.
pub const JSON_DIR: &str = "json";

/// Master index base name, relative to the output root.
pub const MASTER_INDEX: &str = "master_index.json";

const GZIP_SUFFIX: &str = ".gz";

type ShardSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Streams one chapter's questions to disk, one JSON document per line.
pub struct ShardWriter {
    path: PathBuf,
    tmp: PathBuf,
    file_name: String,
    sink: ShardSink,
    written: usize,
}

impl ShardWriter {
    /// Open `json/<exam>_<subject>_<chapter>.jsonl[.gz]` under `output_dir`.
    pub async fn create(
        output_dir: &Path,
        scope: &ChapterScope,
        compression: Compression,
    ) -> Result<Self> {
        let file_name = format!("{}{}", scope.shard_stem(), compression.suffix());
        let dir = output_dir.join(JSON_DIR);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(&file_name);
        let tmp = tmp_path(&path);
        let file = BufWriter::new(File::create(&tmp).await?);
        let sink: ShardSink = match compression {
            Compression::None => Box::new(file),
            Compression::Gzip => Box::new(GzipEncoder::new(file)),
        };

        Ok(Self {
            path,
            tmp,
            file_name,
            sink,
            written: 0,
        })
    }

    /// Append one question as a newline-terminated JSON line.
    pub async fn append(&mut self, question: &Question) -> Result<()> {
        let mut line = serde_json::to_vec(question)?;
        line.push(b'\n');
        self.sink.write_all(&line).await?;
        self.written += 1;
        Ok(())
    }

    /// Lines written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush, close, and move the shard into place. Returns its file name.
    pub async fn finish(mut self) -> Result<String> {
        self.sink.flush().await?;
        self.sink.shutdown().await?;
        drop(self.sink);

        tokio::fs::rename(&self.tmp, &self.path).await?;
        Ok(self.file_name)
    }

    /// Drop the partial stream without publishing it.
    pub async fn abandon(self) {
        drop(self.sink);
        if let Err(e) = tokio::fs::remove_file(&self.tmp).await {
            log::debug!("Could not remove {}: {}", self.tmp.display(), e);
        }
    }
}

/// Serialize the master index once, at the end of a run.
pub async fn write_master_index(
    storage: &LocalStorage,
    index: &MasterIndex,
    compression: Compression,
) -> Result<PathBuf> {
    let json = serde_json::to_vec_pretty(index)?;
    let bytes = match compression {
        Compression::None => json,
        Compression::Gzip => gzip_bytes(&json).await?,
    };

    let key = format!("{}{}", MASTER_INDEX, compression.suffix());
    storage.write_bytes(&key, &bytes).await?;
    Ok(storage.path(&key))
}

/// Load the most recent master index under `output_dir`, if any.
pub async fn load_master_index(output_dir: &Path) -> Result<Option<MasterIndex>> {
    let storage = LocalStorage::new(output_dir);

    let mut newest: Option<(SystemTime, String)> = None;
    for compression in [Compression::None, Compression::Gzip] {
        let key = format!("{}{}", MASTER_INDEX, compression.suffix());
        if let Ok(meta) = tokio::fs::metadata(storage.path(&key)).await {
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
                newest = Some((modified, key));
            }
        }
    }

    let Some((_, key)) = newest else {
        return Ok(None);
    };
    let Some(bytes) = storage.read_bytes(&key).await? else {
        return Ok(None);
    };
    let bytes = decode(&key, bytes).await?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Read every question of an indexed shard, in line order.
pub async fn read_shard(output_dir: &Path, entry: &ChapterIndexEntry) -> Result<Vec<Question>> {
    let storage = LocalStorage::new(output_dir);
    let key = format!("{}/{}", JSON_DIR, entry.shard_file);

    let bytes = storage
        .read_bytes(&key)
        .await?
        .ok_or_else(|| AppError::storage(&key, "shard listed in index but missing"))?;
    let bytes = decode(&key, bytes).await?;

    bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).map_err(AppError::from))
        .collect()
}

async fn decode(key: &str, bytes: Vec<u8>) -> Result<Vec<u8>> {
    if key.ends_with(GZIP_SUFFIX) {
        gunzip_bytes(&bytes).await
    } else {
        Ok(bytes)
    }
}

async fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzipEncoder::new(Vec::new());
    encoder.write_all(data).await?;
    encoder.shutdown().await?;
    Ok(encoder.into_inner())
}

async fn gunzip_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzipDecoder::new(BufReader::new(data));
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).await?;
    Ok(out)
}
