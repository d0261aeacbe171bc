//! `arena nodes`, `arena region` and `arena apply`.

use std::path::Path;

use anyhow::{Context, Result};
use arena_control::storage::resolve_region;
use arena_control::{node_inventory, pod_region, ManifestApplier};

use super::{connect_cluster, print_json};

pub async fn nodes(config: &Path) -> Result<()> {
    let (_, cluster) = connect_cluster(config).await?;
    let inventory = node_inventory(cluster.as_ref()).await?;

    print_json(&inventory)?;
    eprintln!(
        "{} {} hosts, {} GPUs",
        inventory.host_count(),
        inventory.compute_class(),
        inventory.total_gpus()
    );
    Ok(())
}

pub async fn region(config: &Path) -> Result<()> {
    let (config, cluster) = connect_cluster(config).await?;

    if let Some(pod) = config.cluster.pod_name.as_deref() {
        match pod_region(cluster.as_ref(), Some(pod), Some(&config.cluster.namespace)).await? {
            Some(region) => eprintln!("Pod {pod} runs in {region}"),
            None => eprintln!("Pod {pod} has no region label"),
        }
    }

    let region = resolve_region(&config.storage, cluster.as_ref()).await?;
    println!("{region}");
    Ok(())
}

pub async fn apply(config: &Path, file: &Path, namespace: Option<&str>) -> Result<()> {
    let (config, cluster) = connect_cluster(config).await?;
    let namespace = namespace.unwrap_or(&config.cluster.namespace);

    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let result = ManifestApplier::new(cluster).apply_yaml(&text, namespace).await?;

    print_json(&result)
}
