//! Object storage region detection.

use tracing::debug;

use crate::cluster::ClusterClient;
use crate::config::StorageConfig;
use crate::error::{ControlError, ControlResult};
use crate::inventory::cluster_region;

/// Work out the region requests are signed for.
///
/// An explicit `storage.region` is used as-is. Otherwise the region prefix
/// comes from `AWS_DEFAULT_REGION` (`storage.default_region`) or, failing
/// that, from the region label of the cluster's first node, and the
/// availability zone is appended.
pub async fn resolve_region(config: &StorageConfig, cluster: &dyn ClusterClient) -> ControlResult<String> {
    if let Some(region) = non_empty(config.region.as_deref()) {
        return Ok(region.to_owned());
    }

    let prefix = if let Some(region) = non_empty(config.default_region.as_deref()) {
        debug!(region, "region from AWS_DEFAULT_REGION");
        region.to_owned()
    } else {
        let region = cluster_region(cluster)
            .await
            .map_err(|e| ControlError::MissingRegion(e.to_string()))?
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                ControlError::MissingRegion(
                    "AWS_DEFAULT_REGION is not set and no node carries a region label".to_owned(),
                )
            })?;
        debug!(region = %region, "region from cluster");
        region
    };

    Ok(format!("{prefix}{}", config.availability_zone))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
