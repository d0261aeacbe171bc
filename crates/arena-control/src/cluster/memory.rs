//! In-memory cluster for tests and dry runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{ClusterClient, NodeSummary, PodSummary};
use crate::error::{ControlError, ControlResult};
use crate::manifest::ResourceDescriptor;

type ResourceKey = (String, String, String);

#[derive(Debug, Default)]
struct MemoryPod {
    namespace: String,
    labels: BTreeMap<String, String>,
    node: Option<String>,
    summary: Option<PodSummary>,
    logs: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<NodeSummary>,
    pods: Vec<MemoryPod>,
    resources: BTreeMap<ResourceKey, Value>,
    creates: u32,
    patches: u32,
    failing_reads: HashSet<String>,
    failing_logs: bool,
}

/// Cluster held entirely in memory.
///
/// Created resources are stored by kind, namespace and name; patches replace
/// the stored body. Pods, nodes and logs are seeded by the caller. Reads of
/// selected resources and log fetches can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: RwLock<State>,
}

impl MemoryCluster {
    /// Create a cluster with the given nodes.
    #[must_use]
    pub fn with_nodes(nodes: Vec<NodeSummary>) -> Self {
        let cluster = Self::default();
        if let Ok(mut state) = cluster.state.write() {
            state.nodes = nodes;
        }
        cluster
    }

    fn read(&self) -> ControlResult<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))
    }

    fn write(&self) -> ControlResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))
    }

    /// Add a node.
    pub fn add_node(&self, node: NodeSummary) -> ControlResult<()> {
        self.write()?.nodes.push(node);
        Ok(())
    }

    /// Add a pod with labels, scheduled on `node` if given.
    pub fn add_pod(
        &self,
        namespace: &str,
        name: &str,
        labels: &[(&str, &str)],
        node: Option<&str>,
    ) -> ControlResult<()> {
        self.write()?.pods.push(MemoryPod {
            namespace: namespace.to_owned(),
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            node: node.map(ToOwned::to_owned),
            summary: Some(PodSummary {
                name: name.to_owned(),
                phase: None,
                created_at: Some(Utc::now()),
            }),
            logs: HashMap::new(),
        });
        Ok(())
    }

    /// Set a pod's phase.
    pub fn set_pod_phase(&self, namespace: &str, name: &str, phase: &str) -> ControlResult<()> {
        let mut state = self.write()?;
        let pod = find_pod(&mut state, namespace, name)?;
        if let Some(summary) = pod.summary.as_mut() {
            summary.phase = Some(phase.to_owned());
        }
        Ok(())
    }

    /// Set the logs of one container.
    pub fn set_logs(&self, namespace: &str, pod: &str, container: &str, logs: &str) -> ControlResult<()> {
        let mut state = self.write()?;
        find_pod(&mut state, namespace, pod)?
            .logs
            .insert(container.to_owned(), logs.to_owned());
        Ok(())
    }

    /// Make reads of `Kind/name` fail.
    pub fn fail_reads_of(&self, resource_id: &str) -> ControlResult<()> {
        self.write()?.failing_reads.insert(resource_id.to_owned());
        Ok(())
    }

    /// Make log fetches fail.
    pub fn fail_logs(&self, failing: bool) -> ControlResult<()> {
        self.write()?.failing_logs = failing;
        Ok(())
    }

    /// Stored body of a resource.
    pub fn resource(&self, kind: &str, namespace: &str, name: &str) -> ControlResult<Option<Value>> {
        let key = (kind.to_owned(), namespace.to_owned(), name.to_owned());
        Ok(self.read()?.resources.get(&key).cloned())
    }

    /// Names of stored resources of one kind.
    pub fn names_of(&self, kind: &str) -> ControlResult<Vec<String>> {
        Ok(self
            .read()?
            .resources
            .keys()
            .filter(|(k, _, _)| k == kind)
            .map(|(_, _, name)| name.clone())
            .collect())
    }

    /// Number of create calls so far.
    pub fn creates(&self) -> ControlResult<u32> {
        Ok(self.read()?.creates)
    }

    /// Number of patch calls so far.
    pub fn patches(&self) -> ControlResult<u32> {
        Ok(self.read()?.patches)
    }
}

fn key_of(resource: &ResourceDescriptor) -> ResourceKey {
    (
        resource.kind.to_string(),
        resource.namespace.clone(),
        resource.name.clone(),
    )
}

fn find_pod<'a>(state: &'a mut State, namespace: &str, name: &str) -> ControlResult<&'a mut MemoryPod> {
    state
        .pods
        .iter_mut()
        .find(|p| p.namespace == namespace && p.summary.as_ref().is_some_and(|s| s.name == name))
        .ok_or_else(|| ControlError::kubernetes(format!("pod {namespace}/{name} not found")))
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).is_some_and(|v| v == value.trim()),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn list_nodes(&self) -> ControlResult<Vec<NodeSummary>> {
        Ok(self.read()?.nodes.clone())
    }

    async fn node_of_pod(&self, namespace: &str, pod: &str) -> ControlResult<Option<NodeSummary>> {
        let state = self.read()?;
        let node_name = state
            .pods
            .iter()
            .find(|p| p.namespace == namespace && p.summary.as_ref().is_some_and(|s| s.name == pod))
            .and_then(|p| p.node.clone());

        Ok(node_name.and_then(|name| state.nodes.iter().find(|n| n.name == name).cloned()))
    }

    async fn exists(&self, resource: &ResourceDescriptor) -> ControlResult<bool> {
        let state = self.read()?;
        if state.failing_reads.contains(&resource.id()) {
            return Err(ControlError::kubernetes(format!(
                "failed to read {}: injected failure",
                resource.id()
            )));
        }
        Ok(state.resources.contains_key(&key_of(resource)))
    }

    async fn create(&self, resource: &ResourceDescriptor) -> ControlResult<()> {
        let mut state = self.write()?;
        let key = key_of(resource);
        if state.resources.contains_key(&key) {
            return Err(ControlError::kubernetes(format!(
                "failed to create {}: already exists",
                resource.id()
            )));
        }
        state.resources.insert(key, resource.body.clone());
        state.creates += 1;
        Ok(())
    }

    async fn patch(&self, resource: &ResourceDescriptor) -> ControlResult<()> {
        let mut state = self.write()?;
        let key = key_of(resource);
        if !state.resources.contains_key(&key) {
            return Err(ControlError::kubernetes(format!(
                "failed to patch {}: not found",
                resource.id()
            )));
        }
        state.resources.insert(key, resource.body.clone());
        state.patches += 1;
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> ControlResult<Vec<PodSummary>> {
        Ok(self
            .read()?
            .pods
            .iter()
            .filter(|p| p.namespace == namespace && matches_selector(&p.labels, selector))
            .filter_map(|p| p.summary.clone())
            .collect())
    }

    async fn pod_logs(&self, namespace: &str, pod: &str, container: &str) -> ControlResult<String> {
        let state = self.read()?;
        if state.failing_logs {
            return Err(ControlError::kubernetes(format!(
                "failed to read logs of {pod}/{container}: injected failure"
            )));
        }

        state
            .pods
            .iter()
            .find(|p| p.namespace == namespace && p.summary.as_ref().is_some_and(|s| s.name == pod))
            .map(|p| p.logs.get(container).cloned().unwrap_or_default())
            .ok_or_else(|| ControlError::kubernetes(format!("pod {namespace}/{pod} not found")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::manifest::ResourceKind;

    fn config_map(name: &str, value: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            kind: ResourceKind::ConfigMap,
            name: name.to_owned(),
            namespace: "ns".to_owned(),
            body: json!({ "kind": "ConfigMap", "metadata": { "name": name }, "data": { "v": value } }),
        }
    }

    #[tokio::test]
    async fn create_then_patch() {
        let cluster = MemoryCluster::default();
        let cm = config_map("c", "1");

        assert!(!cluster.exists(&cm).await.unwrap());
        cluster.create(&cm).await.unwrap();
        assert!(cluster.exists(&cm).await.unwrap());
        assert!(cluster.create(&cm).await.is_err());

        cluster.patch(&config_map("c", "2")).await.unwrap();
        let stored = cluster.resource("ConfigMap", "ns", "c").unwrap().unwrap();
        assert_eq!(stored["data"]["v"], "2");
        assert_eq!(cluster.creates().unwrap(), 1);
        assert_eq!(cluster.patches().unwrap(), 1);
    }

    #[tokio::test]
    async fn selector_matching() {
        let cluster = MemoryCluster::default();
        cluster
            .add_pod("ns", "warp-abc-1", &[("job-name", "warp-abc")], None)
            .unwrap();
        cluster
            .add_pod("ns", "other", &[("job-name", "warp-def")], None)
            .unwrap();
        cluster
            .add_pod("elsewhere", "warp-abc-2", &[("job-name", "warp-abc")], None)
            .unwrap();

        let pods = cluster.list_pods("ns", "job-name=warp-abc").await.unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].name, "warp-abc-1");
    }

    #[tokio::test]
    async fn injected_failures() {
        let cluster = MemoryCluster::default();
        cluster.fail_reads_of("ConfigMap/c").unwrap();
        assert!(cluster.exists(&config_map("c", "1")).await.is_err());

        cluster.add_pod("ns", "p", &[], None).unwrap();
        cluster.set_logs("ns", "p", "warp", "hello").unwrap();
        assert_eq!(cluster.pod_logs("ns", "p", "warp").await.unwrap(), "hello");

        cluster.fail_logs(true).unwrap();
        assert!(cluster.pod_logs("ns", "p", "warp").await.is_err());
    }

    #[tokio::test]
    async fn pod_node_lookup() {
        let cluster = MemoryCluster::with_nodes(vec![NodeSummary {
            name: "g1".to_owned(),
            ..NodeSummary::default()
        }]);
        cluster.add_pod("ns", "me", &[], Some("g1")).unwrap();
        cluster.add_pod("ns", "unscheduled", &[], None).unwrap();

        let node = cluster.node_of_pod("ns", "me").await.unwrap();
        assert_eq!(node.map(|n| n.name).as_deref(), Some("g1"));
        assert!(cluster.node_of_pod("ns", "unscheduled").await.unwrap().is_none());
        assert!(cluster.node_of_pod("ns", "missing").await.unwrap().is_none());
    }
}
