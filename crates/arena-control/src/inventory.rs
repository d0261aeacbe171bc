//! Node inventory and region lookup.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::cluster::{ClusterClient, NodeSummary};
use crate::error::{ControlError, ControlResult};

/// GPU nodes of one type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GpuNodeGroup {
    /// Number of nodes.
    pub node_count: u32,
    /// GPUs per node, taken from the first node seen.
    pub gpus_per_node: u32,
    /// Sum of GPUs over all nodes.
    pub total_gpus: u32,
    /// CPU cores per node, taken from the first node seen.
    pub cpu_cores_per_node: u32,
}

/// CPU-only nodes of one type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CpuNodeGroup {
    /// Number of nodes.
    pub node_count: u32,
    /// CPU cores per node, taken from the first node seen.
    pub cpu_cores_per_node: u32,
    /// Sum of CPU cores over all nodes.
    pub total_cpus: u32,
}

/// Nodes grouped by compute class and node type.
///
/// A node counts as a GPU node iff its `nvidia.com/gpu` capacity is non-zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeInventory {
    /// GPU nodes by node type.
    pub gpu: BTreeMap<String, GpuNodeGroup>,
    /// CPU nodes by node type.
    pub cpu: BTreeMap<String, CpuNodeGroup>,
}

/// Which kind of node a benchmark is scheduled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeClass {
    /// GPU nodes.
    Gpu,
    /// CPU-only nodes.
    Cpu,
}

impl ComputeClass {
    /// Value of the `node.coreweave.cloud/class` label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gpu => "gpu",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for ComputeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl NodeInventory {
    /// Group nodes by class and type.
    #[must_use]
    pub fn from_nodes(nodes: &[NodeSummary]) -> Self {
        let mut inventory = Self::default();

        for node in nodes {
            let node_type = node.node_type().to_owned();
            if node.gpus > 0 {
                let group = inventory.gpu.entry(node_type).or_insert_with(|| GpuNodeGroup {
                    gpus_per_node: node.gpus,
                    cpu_cores_per_node: node.cpu_cores,
                    ..GpuNodeGroup::default()
                });
                group.node_count += 1;
                group.total_gpus += node.gpus;
            } else {
                let group = inventory.cpu.entry(node_type).or_insert_with(|| CpuNodeGroup {
                    cpu_cores_per_node: node.cpu_cores,
                    ..CpuNodeGroup::default()
                });
                group.node_count += 1;
                group.total_cpus += node.cpu_cores;
            }
        }

        inventory
    }

    /// Class benchmarks run on: GPU if there are any GPU nodes.
    #[must_use]
    pub fn compute_class(&self) -> ComputeClass {
        if self.gpu.is_empty() {
            ComputeClass::Cpu
        } else {
            ComputeClass::Gpu
        }
    }

    /// Number of hosts of the compute class.
    #[must_use]
    pub fn host_count(&self) -> u32 {
        match self.compute_class() {
            ComputeClass::Gpu => self.gpu.values().map(|g| g.node_count).sum(),
            ComputeClass::Cpu => self.cpu.values().map(|g| g.node_count).sum(),
        }
    }

    /// Total GPUs across all GPU nodes.
    #[must_use]
    pub fn total_gpus(&self) -> u32 {
        self.gpu.values().map(|g| g.total_gpus).sum()
    }
}

/// Read the node inventory of the cluster.
pub async fn node_inventory(cluster: &dyn ClusterClient) -> ControlResult<NodeInventory> {
    let nodes = cluster.list_nodes().await?;
    let inventory = NodeInventory::from_nodes(&nodes);
    debug!(
        nodes = nodes.len(),
        gpu_types = inventory.gpu.len(),
        cpu_types = inventory.cpu.len(),
        "read node inventory"
    );
    Ok(inventory)
}

/// Region of the cluster, read from the first node.
///
/// Returns `None` for an empty cluster or an unlabelled first node.
pub async fn cluster_region(cluster: &dyn ClusterClient) -> ControlResult<Option<String>> {
    let nodes = cluster.list_nodes().await?;
    Ok(nodes.first().and_then(NodeSummary::region).map(ToOwned::to_owned))
}

/// Region of the node a pod runs on.
///
/// Both the pod name and namespace are required; callers usually take them
/// from `POD_NAME` and `POD_NAMESPACE`.
pub async fn pod_region(
    cluster: &dyn ClusterClient,
    pod: Option<&str>,
    namespace: Option<&str>,
) -> ControlResult<Option<String>> {
    let (Some(pod), Some(namespace)) = (
        pod.filter(|p| !p.is_empty()),
        namespace.filter(|ns| !ns.is_empty()),
    ) else {
        return Err(ControlError::kubernetes(
            "pod name and namespace must be provided or set via POD_NAME and POD_NAMESPACE",
        ));
    };

    let node = cluster.node_of_pod(namespace, pod).await?;
    Ok(node.as_ref().and_then(NodeSummary::region).map(ToOwned::to_owned))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::cluster::{MemoryCluster, NODE_TYPE_LABEL, REGION_LABEL};

    fn node(name: &str, node_type: &str, gpus: u32, cpus: u32) -> NodeSummary {
        NodeSummary {
            name: name.to_owned(),
            labels: BTreeMap::from([
                (NODE_TYPE_LABEL.to_owned(), node_type.to_owned()),
                (REGION_LABEL.to_owned(), "US-EAST-04".to_owned()),
            ]),
            gpus,
            cpu_cores: cpus,
        }
    }

    #[test]
    fn groups_by_class_and_type() {
        let inventory = NodeInventory::from_nodes(&[
            node("g1", "gd-8xh100ib-i128", 8, 128),
            node("g2", "gd-8xh100ib-i128", 8, 128),
            node("c1", "cd-gp-i64-erapids", 0, 64),
        ]);

        let gpu = &inventory.gpu["gd-8xh100ib-i128"];
        assert_eq!(gpu.node_count, 2);
        assert_eq!(gpu.gpus_per_node, 8);
        assert_eq!(gpu.total_gpus, 16);
        assert_eq!(gpu.cpu_cores_per_node, 128);

        let cpu = &inventory.cpu["cd-gp-i64-erapids"];
        assert_eq!(cpu.node_count, 1);
        assert_eq!(cpu.total_cpus, 64);
        assert_eq!(inventory.total_gpus(), 16);
    }

    #[rstest]
    #[case::cpu_only(vec![node("a", "t", 0, 8), node("b", "t", 0, 8), node("c", "u", 0, 4)], ComputeClass::Cpu, 3)]
    #[case::gpu_wins(
        vec![node("a", "t", 8, 8), node("b", "t", 8, 8), node("c", "t", 8, 8), node("d", "t", 8, 8), node("e", "u", 0, 4)],
        ComputeClass::Gpu,
        4
    )]
    #[case::empty(vec![], ComputeClass::Cpu, 0)]
    fn host_count(#[case] nodes: Vec<NodeSummary>, #[case] class: ComputeClass, #[case] hosts: u32) {
        let inventory = NodeInventory::from_nodes(&nodes);
        assert_eq!(inventory.compute_class(), class);
        assert_eq!(inventory.host_count(), hosts);
    }

    #[test]
    fn unlabelled_nodes_are_unknown() {
        let inventory = NodeInventory::from_nodes(&[NodeSummary {
            name: "n".to_owned(),
            cpu_cores: 2,
            ..NodeSummary::default()
        }]);
        assert!(inventory.cpu.contains_key("unknown"));
    }

    #[tokio::test]
    async fn regions() {
        let cluster = MemoryCluster::with_nodes(vec![node("g1", "t", 8, 8)]);
        cluster.add_pod("ns", "me", &[], Some("g1")).unwrap();

        assert_eq!(cluster_region(&cluster).await.unwrap().as_deref(), Some("US-EAST-04"));
        assert_eq!(
            pod_region(&cluster, Some("me"), Some("ns")).await.unwrap().as_deref(),
            Some("US-EAST-04")
        );
        assert!(pod_region(&cluster, Some("ghost"), Some("ns")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pod_region_needs_identity() {
        let cluster = MemoryCluster::default();
        let err = pod_region(&cluster, None, Some("ns")).await.unwrap_err();
        assert!(matches!(err, ControlError::Kubernetes(_)));
    }

    #[tokio::test]
    async fn empty_cluster_has_no_region() {
        let cluster = MemoryCluster::default();
        assert!(cluster_region(&cluster).await.unwrap().is_none());
    }
}
