//! Single-object bandwidth tests.
//!
//! An upload streams a zero-filled object of a given size through a
//! multipart upload; a download streams one object to a local file. Both
//! report bandwidth over the transfer time.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, WriteMultipart};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::TransferConfig;
use crate::error::{ControlError, ControlResult};
use crate::throughput::{bytes_f64, GB, MB};

/// Key the upload test writes an object of `size_gb` to.
#[must_use]
pub fn upload_key(size_gb: u64) -> String {
    format!("benchmark/{size_gb}GB")
}

/// Outcome of one transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    /// Object key.
    pub key: String,
    /// Local file written by a download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Bytes transferred.
    pub bytes: u64,
    /// Bytes transferred in GB.
    pub size_gb: f64,
    /// Transfer time in seconds.
    pub elapsed_secs: f64,
    /// MB/s.
    pub bandwidth_mbs: f64,
    /// Gbit/s.
    pub bandwidth_gbps: f64,
}

impl TransferResult {
    fn measure(key: &str, bytes: u64, elapsed_secs: f64) -> Self {
        let seconds = elapsed_secs.max(f64::EPSILON);
        let size = bytes_f64(bytes);
        Self {
            key: key.to_owned(),
            output_path: None,
            bytes,
            size_gb: size / GB,
            elapsed_secs,
            bandwidth_mbs: size / MB / seconds,
            bandwidth_gbps: size * 8.0 / seconds / 1e9,
        }
    }
}

/// Runs upload and download tests against one bucket.
#[derive(Clone)]
pub struct TransferTest {
    store: Arc<dyn ObjectStore>,
    part_size: usize,
    concurrency: usize,
}

impl std::fmt::Debug for TransferTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferTest")
            .field("part_size", &self.part_size)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl TransferTest {
    /// Create a test over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, config: &TransferConfig) -> Self {
        let part_size = config
            .part_size_mb
            .checked_mul(1024 * 1024)
            .and_then(|bytes| usize::try_from(bytes).ok())
            .unwrap_or(usize::MAX);
        Self {
            store,
            part_size: part_size.max(1),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Override the multipart part size in bytes.
    #[must_use]
    pub fn with_part_size(mut self, bytes: usize) -> Self {
        self.part_size = bytes.max(1);
        self
    }

    /// Upload `bytes` zeros to `key`.
    pub async fn upload(&self, key: &str, bytes: u64) -> ControlResult<TransferResult> {
        if bytes == 0 {
            return Err(ControlError::Config("upload size must be greater than zero".to_owned()));
        }
        let path = Path::from(key.trim_start_matches('/'));
        info!(key, bytes, part_size = self.part_size, "starting upload");

        let start = Instant::now();
        let upload = self
            .store
            .put_multipart(&path)
            .await
            .map_err(|e| ControlError::object_storage(format!("failed to start upload of {key}: {e}")))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, self.part_size);

        if let Err(e) = self.write_zeros(&mut writer, bytes).await {
            if let Err(abort) = writer.abort().await {
                warn!(key, error = %abort, "failed to abort upload");
            }
            return Err(ControlError::object_storage(format!("failed to upload {key}: {e}")));
        }
        writer
            .finish()
            .await
            .map_err(|e| ControlError::object_storage(format!("failed to complete upload of {key}: {e}")))?;

        let result = TransferResult::measure(key, bytes, start.elapsed().as_secs_f64());
        info!(key, seconds = result.elapsed_secs, mbps = result.bandwidth_mbs, "upload finished");
        Ok(result)
    }

    async fn write_zeros(&self, writer: &mut WriteMultipart, bytes: u64) -> object_store::Result<()> {
        let zeros = vec![0_u8; self.part_size];
        let mut remaining = bytes;
        while remaining > 0 {
            writer.wait_for_capacity(self.concurrency).await?;
            let take = usize::try_from(remaining).map_or(zeros.len(), |r| r.min(zeros.len()));
            writer.write(&zeros[..take]);
            remaining = remaining.saturating_sub(u64::try_from(take).unwrap_or(u64::MAX));
        }
        Ok(())
    }

    /// Download `key` into `dir`, named after the last segment of the key.
    pub async fn download(&self, key: &str, dir: &FsPath) -> ControlResult<TransferResult> {
        let name = key
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ControlError::Config(format!("object key {key:?} has no file name")))?;
        let output = dir.join(name);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ControlError::internal(format!("failed to create {}: {e}", dir.display())))?;
        info!(key, output = %output.display(), "starting download");

        let start = Instant::now();
        let path = Path::from(key.trim_start_matches('/'));
        let mut stream = self
            .store
            .get(&path)
            .await
            .map_err(|e| ControlError::object_storage(format!("failed to get {key}: {e}")))?
            .into_stream();

        let write_error = |e: std::io::Error| ControlError::internal(format!("failed to write {}: {e}", output.display()));
        let mut file = tokio::fs::File::create(&output).await.map_err(write_error)?;
        let mut bytes = 0_u64;
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| ControlError::object_storage(format!("failed to read {key}: {e}")))?
        {
            file.write_all(&chunk).await.map_err(write_error)?;
            bytes += u64::try_from(chunk.len()).unwrap_or(0);
        }
        file.flush().await.map_err(write_error)?;

        let mut result = TransferResult::measure(key, bytes, start.elapsed().as_secs_f64());
        result.output_path = Some(output);
        info!(key, seconds = result.elapsed_secs, mbps = result.bandwidth_mbs, "download finished");
        Ok(result)
    }
}
