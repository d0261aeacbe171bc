//! Access to the Kubernetes cluster benchmarks run in.
//!
//! Everything the control plane needs from Kubernetes goes through the
//! [`ClusterClient`] trait. [`KubeCluster`] talks to a real API server;
//! [`MemoryCluster`] keeps resources in memory for tests and dry runs.

mod kubernetes;
mod memory;

pub use kubernetes::KubeCluster;
pub use memory::MemoryCluster;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{ClusterBackend, ClusterConfig};
use crate::error::ControlResult;
use crate::manifest::ResourceDescriptor;

/// Label holding the node type, e.g. `gd-8xh100ib-i128`.
pub const NODE_TYPE_LABEL: &str = "node.coreweave.cloud/type";

/// Region label on nodes.
pub const REGION_LABEL: &str = "topology.kubernetes.io/region";

/// Deprecated region label still present on older nodes.
pub const LEGACY_REGION_LABEL: &str = "failure-domain.beta.kubernetes.io/region";

/// The parts of a node the control plane looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    /// Node name.
    pub name: String,
    /// Node labels.
    pub labels: BTreeMap<String, String>,
    /// `nvidia.com/gpu` capacity.
    pub gpus: u32,
    /// `cpu` capacity in whole cores.
    pub cpu_cores: u32,
}

impl NodeSummary {
    /// Node type label, or `unknown`.
    #[must_use]
    pub fn node_type(&self) -> &str {
        self.labels
            .get(NODE_TYPE_LABEL)
            .map_or("unknown", String::as_str)
    }

    /// Region label, falling back to the deprecated label.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.labels
            .get(REGION_LABEL)
            .or_else(|| self.labels.get(LEGACY_REGION_LABEL))
            .map(String::as_str)
    }
}

/// The parts of a pod the control plane looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodSummary {
    /// Pod name.
    pub name: String,
    /// `status.phase`, if reported.
    pub phase: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
}

/// Operations the control plane performs against a cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List all nodes.
    async fn list_nodes(&self) -> ControlResult<Vec<NodeSummary>>;

    /// The node a pod is scheduled on, if the pod exists and is scheduled.
    async fn node_of_pod(&self, namespace: &str, pod: &str) -> ControlResult<Option<NodeSummary>>;

    /// Returns true if the resource exists.
    ///
    /// A missing resource is `Ok(false)`; any other failure is an error.
    async fn exists(&self, resource: &ResourceDescriptor) -> ControlResult<bool>;

    /// Create the resource.
    async fn create(&self, resource: &ResourceDescriptor) -> ControlResult<()>;

    /// Strategic-merge patch the resource with its body.
    async fn patch(&self, resource: &ResourceDescriptor) -> ControlResult<()>;

    /// List pods matching an equality label selector (`k=v[,k=v]`).
    async fn list_pods(&self, namespace: &str, selector: &str) -> ControlResult<Vec<PodSummary>>;

    /// Fetch the logs of one container.
    async fn pod_logs(&self, namespace: &str, pod: &str, container: &str) -> ControlResult<String>;
}

/// Create a cluster client from configuration.
pub async fn create_cluster(config: &ClusterConfig) -> ControlResult<Arc<dyn ClusterClient>> {
    match config.backend {
        ClusterBackend::Kube => {
            let cluster = KubeCluster::connect(config).await?;
            Ok(Arc::new(cluster))
        }
        ClusterBackend::Memory => Ok(Arc::new(MemoryCluster::default())),
    }
}
