//! Subcommand implementations.

pub mod buckets;
pub mod cluster;
pub mod credentials;
pub mod storage;
pub mod throughput;
pub mod transfer;
pub mod warp;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arena_control::{create_cluster, ArenaConfig, ClusterClient, ObjectStorage};

/// Load configuration from `path` and the environment.
pub fn load_config(path: &Path) -> Result<ArenaConfig> {
    ArenaConfig::from_file(path).with_context(|| format!("failed to load {}", path.display()))
}

/// Configuration plus a connected cluster client.
pub async fn connect_cluster(path: &Path) -> Result<(ArenaConfig, Arc<dyn ClusterClient>)> {
    let config = load_config(path)?;
    let cluster = create_cluster(&config.cluster)
        .await
        .context("failed to connect to the cluster")?;
    Ok((config, cluster))
}

/// Configuration, cluster client and object storage session.
pub async fn connect_storage(path: &Path) -> Result<(ArenaConfig, Arc<dyn ClusterClient>, ObjectStorage)> {
    let (config, cluster) = connect_cluster(path).await?;
    let storage = ObjectStorage::connect(&config, cluster.as_ref()).await?;
    Ok((config, cluster, storage))
}

/// Print a value as pretty JSON.
pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
