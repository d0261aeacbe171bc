//! `arena transfer`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arena_control::{upload_key, TransferTest};
use tracing::warn;

use super::{connect_storage, print_json};

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

pub async fn upload(config: &Path, bucket: &str, size_gb: Option<u64>) -> Result<()> {
    let (config, _, storage) = connect_storage(config).await?;
    let size_gb = size_gb.unwrap_or(config.transfer.size_gb);
    let bytes = size_gb
        .checked_mul(BYTES_PER_GB)
        .with_context(|| format!("{size_gb} GB is too large"))?;

    if let Err(e) = storage.ensure_bucket(bucket).await {
        warn!(bucket, error = %e, "could not make sure the bucket exists, continuing");
    }
    let store = storage.store(bucket).await?;
    let result = TransferTest::new(store, &config.transfer)
        .upload(&upload_key(size_gb), bytes)
        .await?;

    eprintln!(
        "Uploaded {:.2} GB in {:.1}s: {:.1} MB/s ({:.2} Gbps)",
        result.size_gb, result.elapsed_secs, result.bandwidth_mbs, result.bandwidth_gbps
    );
    print_json(&result)
}

pub async fn download(config: &Path, bucket: &str, key: &str, dir: Option<PathBuf>) -> Result<()> {
    let (config, _, storage) = connect_storage(config).await?;
    let dir = dir.unwrap_or_else(|| config.transfer.work_dir.clone());

    let store = storage.store(bucket).await?;
    let result = TransferTest::new(store, &config.transfer)
        .download(key, &dir)
        .await?;

    eprintln!(
        "Downloaded {:.2} GB in {:.1}s: {:.1} MB/s ({:.2} Gbps)",
        result.size_gb, result.elapsed_secs, result.bandwidth_mbs, result.bandwidth_gbps
    );
    print_json(&result)
}
