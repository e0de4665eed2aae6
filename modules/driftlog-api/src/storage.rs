//! Per-user file storage: an append-only `stream.jsonl` and a merged `bulk.json`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use driftlog_common::{BulkPayload, StreamRecord};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Upper bound on either file, in bytes.
pub const MAX_FILE_BYTES: u64 = 8 * 1024 * 1024;

const STREAM_FILE: &str = "stream.jsonl";
const BULK_FILE: &str = "bulk.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage limit reached")]
    LimitReached,

    #[error("write error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Reduce a user identifier to a safe directory name.
/// Keeps ASCII letters, digits, `-` and `_`; anything else is dropped.
pub fn user_subdir(user: &str) -> String {
    let cleaned: String = user
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone)]
pub struct UserFiles {
    dir: PathBuf,
    max_bytes: u64,
}

impl UserFiles {
    pub fn new(data_dir: &Path, user: &str, max_bytes: u64) -> Self {
        Self {
            dir: data_dir.join(user_subdir(user)),
            max_bytes,
        }
    }

    pub fn stream_path(&self) -> PathBuf {
        self.dir.join(STREAM_FILE)
    }

    pub fn bulk_path(&self) -> PathBuf {
        self.dir.join(BULK_FILE)
    }

    /// Append one record as a JSON line, then trim the file from the front if
    /// it grew past the limit.
    pub async fn append_stream(&self, record: &StreamRecord) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).await?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let path = self.stream_path();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        drop(file);

        trim_file(&path, self.max_bytes).await;
        Ok(())
    }

    /// Every parseable stream line, in append order. A line cut by trimming is
    /// skipped on its own, even when the cut split a multibyte character.
    pub async fn read_stream(&self) -> Vec<StreamRecord> {
        let raw = match fs::read(self.stream_path()).await {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(error = %e, "Failed to read stream file");
                }
                return Vec::new();
            }
        };
        raw.split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .filter_map(|line| serde_json::from_slice(line).ok())
            .collect()
    }

    pub async fn read_bulk(&self) -> BulkPayload {
        match fs::read(self.bulk_path()).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_default(),
            Err(_) => BulkPayload::default(),
        }
    }

    /// Merge an uploaded batch onto the stored snapshot and stamp `savedAt`.
    pub async fn merge_bulk(
        &self,
        batch: BulkPayload,
        saved_at: String,
    ) -> Result<BulkPayload, StorageError> {
        fs::create_dir_all(&self.dir).await?;
        let mut merged = self.read_bulk().await;
        merged.events.extend(batch.events);
        merged.saved_at = Some(saved_at);

        let data = serde_json::to_vec_pretty(&merged)?;
        if data.len() as u64 > self.max_bytes {
            return Err(StorageError::LimitReached);
        }
        fs::write(self.bulk_path(), data).await?;
        Ok(merged)
    }

    /// Remove both files. Missing files are not an error.
    pub async fn clear(&self) {
        for path in [self.stream_path(), self.bulk_path()] {
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove file");
                }
            }
        }
    }
}

/// Keep only the newest `max_bytes` of a file. Best-effort.
async fn trim_file(path: &Path, max_bytes: u64) {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(_) => return,
    };
    if raw.len() as u64 <= max_bytes {
        return;
    }
    let cut = raw.len() - max_bytes as usize;
    if let Err(e) = fs::write(path, &raw[cut..]).await {
        warn!(path = %path.display(), error = %e, "Failed to trim file");
    }
}
