//! `arena buckets`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use arena_control::EnsureOutcome;
use serde_json::Value;

use super::{connect_storage, print_json};

pub async fn list(config: &Path) -> Result<()> {
    let (_, _, storage) = connect_storage(config).await?;
    let buckets = storage.buckets().await?.list_buckets().await?;

    for bucket in &buckets {
        println!("{bucket}");
    }
    eprintln!("{} buckets via {}", buckets.len(), storage.endpoint());
    Ok(())
}

pub async fn create(config: &Path, bucket: &str) -> Result<()> {
    let (_, _, storage) = connect_storage(config).await?;

    match storage.ensure_bucket(bucket).await? {
        EnsureOutcome::Created => println!("Bucket '{bucket}' created in {}", storage.region()),
        EnsureOutcome::Existed => println!("Bucket '{bucket}' already exists"),
        EnsureOutcome::Forbidden => bail!("bucket '{bucket}' exists but access is denied"),
    }
    Ok(())
}

pub async fn delete(config: &Path, bucket: &str, force: bool) -> Result<()> {
    let (_, _, storage) = connect_storage(config).await?;

    if force {
        let deleted = storage.empty_bucket(bucket).await?;
        eprintln!("Deleted {deleted} objects from {bucket}");
    }
    storage.buckets().await?.delete_bucket(bucket).await?;
    println!("Bucket '{bucket}' deleted");
    Ok(())
}

pub async fn empty(config: &Path, bucket: &str) -> Result<()> {
    let (_, _, storage) = connect_storage(config).await?;
    let deleted = storage.empty_bucket(bucket).await?;
    println!("Deleted {deleted} objects from {bucket}");
    Ok(())
}

pub async fn get_policy(config: &Path, bucket: &str) -> Result<()> {
    let (_, _, storage) = connect_storage(config).await?;

    match storage.buckets().await?.get_bucket_policy(bucket).await? {
        Some(policy) => print_json(&policy),
        None => {
            eprintln!("No policy set on {bucket}");
            Ok(())
        }
    }
}

pub async fn put_policy(config: &Path, bucket: &str, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let policy: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let (_, _, storage) = connect_storage(config).await?;
    storage.buckets().await?.put_bucket_policy(bucket, &policy).await?;
    println!("Policy applied to {bucket}");
    Ok(())
}
