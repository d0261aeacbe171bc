//! Idempotent create-or-patch of manifest resources.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cluster::ClusterClient;
use crate::error::{ControlError, ControlResult};
use crate::manifest::{parse_manifests, ResourceDescriptor, ResourceKind};

/// What happened to each resource of one apply call, in encounter order.
///
/// Entries are `Kind/name`; unchanged entries carry a parenthesised note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Resources that did not exist and were created.
    pub created: Vec<String>,
    /// Existing resources that were patched.
    pub updated: Vec<String>,
    /// Resources that were left alone.
    pub unchanged: Vec<String>,
}

impl ApplyResult {
    /// Returns true if `Kind/name` was created by this call.
    #[must_use]
    pub fn is_created(&self, id: &str) -> bool {
        self.created.iter().any(|c| c == id)
    }

    /// Total number of resources handled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.unchanged.len()
    }

    /// Returns true if nothing was handled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Applies resources to a cluster.
///
/// Holds no state between calls and makes no attempt at transactionality:
/// resources handled before a failure stay applied.
#[derive(Clone)]
pub struct ManifestApplier {
    cluster: Arc<dyn ClusterClient>,
}

impl std::fmt::Debug for ManifestApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestApplier").finish_non_exhaustive()
    }
}

impl ManifestApplier {
    /// Create an applier for `cluster`.
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster }
    }

    /// Parse multi-document YAML and apply it to `namespace`.
    pub async fn apply_yaml(&self, text: &str, namespace: &str) -> ControlResult<ApplyResult> {
        let resources = parse_manifests(text, namespace)?;
        self.apply(&resources).await
    }

    /// Apply resources in order.
    ///
    /// Missing resources are created and existing ones patched, except Jobs,
    /// which are immutable and left unchanged. Unsupported kinds are skipped.
    /// The first failure stops the batch with [`ControlError::Apply`], which
    /// carries what was applied so far.
    pub async fn apply(&self, resources: &[ResourceDescriptor]) -> ControlResult<ApplyResult> {
        let mut result = ApplyResult::default();

        for resource in resources {
            let id = resource.id();

            if !resource.kind.is_supported() {
                warn!(resource = %id, "skipping unsupported kind");
                result.unchanged.push(format!("{id} (kind not supported)"));
                continue;
            }

            if let Err(e) = self.apply_one(resource, &id, &mut result).await {
                return Err(ControlError::Apply {
                    resource: id,
                    applied: Box::new(result),
                    message: e.to_string(),
                });
            }
        }

        info!(
            created = result.created.len(),
            updated = result.updated.len(),
            unchanged = result.unchanged.len(),
            "applied manifest"
        );
        Ok(result)
    }

    async fn apply_one(
        &self,
        resource: &ResourceDescriptor,
        id: &str,
        result: &mut ApplyResult,
    ) -> ControlResult<()> {
        if !self.cluster.exists(resource).await? {
            self.cluster.create(resource).await?;
            debug!(resource = %id, namespace = %resource.namespace, "created");
            result.created.push(id.to_owned());
            return Ok(());
        }

        if resource.kind == ResourceKind::Job {
            debug!(resource = %id, "job exists, leaving it alone");
            result
                .unchanged
                .push(format!("{id} (already exists, jobs are immutable)"));
            return Ok(());
        }

        self.cluster.patch(resource).await?;
        debug!(resource = %id, namespace = %resource.namespace, "patched");
        result.updated.push(id.to_owned());
        Ok(())
    }
}
