//! Cluster client backed by the Kubernetes API.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod, Service, ServiceAccount};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{ClusterClient, NodeSummary, PodSummary};
use crate::config::ClusterConfig;
use crate::error::{ControlError, ControlResult};
use crate::manifest::{ResourceDescriptor, ResourceKind};

/// Cluster client talking to a Kubernetes API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    /// Connect using the configured credentials.
    ///
    /// An explicit kubeconfig path wins; otherwise the in-cluster service
    /// account is used when `in_cluster` is set, and the default kubeconfig
    /// when it is not.
    pub async fn connect(config: &ClusterConfig) -> ControlResult<Self> {
        let kube_config = if let Some(path) = &config.kubeconfig {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| ControlError::KubernetesConfig(e.to_string()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| ControlError::KubernetesConfig(e.to_string()))?
        } else if config.in_cluster {
            Config::incluster().map_err(|e| ControlError::KubernetesConfig(e.to_string()))?
        } else {
            Config::from_kubeconfig(&KubeConfigOptions::default())
                .await
                .map_err(|e| ControlError::KubernetesConfig(e.to_string()))?
        };

        let client =
            Client::try_from(kube_config).map_err(|e| ControlError::KubernetesConfig(e.to_string()))?;

        debug!(in_cluster = config.in_cluster, "connected to kubernetes");
        Ok(Self::from_client(client))
    }

    /// Wrap an existing client.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn exists_as<K>(&self, resource: &ResourceDescriptor) -> ControlResult<bool>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let found = self
            .namespaced::<K>(&resource.namespace)
            .get_opt(&resource.name)
            .await
            .map_err(|e| ControlError::kubernetes(format!("failed to read {}: {e}", resource.id())))?;
        Ok(found.is_some())
    }

    async fn create_as<K>(&self, resource: &ResourceDescriptor) -> ControlResult<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
    {
        let object: K = serde_json::from_value(resource.body.clone()).map_err(|e| {
            ControlError::manifest(format!("{} is not a valid {}: {e}", resource.id(), resource.kind))
        })?;

        self.namespaced::<K>(&resource.namespace)
            .create(&PostParams::default(), &object)
            .await
            .map_err(|e| ControlError::kubernetes(format!("failed to create {}: {e}", resource.id())))?;
        Ok(())
    }

    async fn patch_as<K>(&self, resource: &ResourceDescriptor) -> ControlResult<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        self.namespaced::<K>(&resource.namespace)
            .patch(
                &resource.name,
                &PatchParams::default(),
                &Patch::Strategic(&resource.body),
            )
            .await
            .map_err(|e| ControlError::kubernetes(format!("failed to patch {}: {e}", resource.id())))?;
        Ok(())
    }
}

fn unsupported(kind: &str) -> ControlError {
    ControlError::manifest(format!("kind {kind} is not supported"))
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn list_nodes(&self) -> ControlResult<Vec<NodeSummary>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| ControlError::kubernetes(format!("failed to list nodes: {e}")))?;

        Ok(list.items.iter().map(node_summary).collect())
    }

    async fn node_of_pod(&self, namespace: &str, pod: &str) -> ControlResult<Option<NodeSummary>> {
        let pods: Api<Pod> = self.namespaced(namespace);
        let Some(pod) = pods
            .get_opt(pod)
            .await
            .map_err(|e| ControlError::kubernetes(format!("failed to read pod {pod}: {e}")))?
        else {
            return Ok(None);
        };

        let Some(node_name) = pod.spec.and_then(|s| s.node_name) else {
            return Ok(None);
        };

        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = nodes
            .get_opt(&node_name)
            .await
            .map_err(|e| ControlError::kubernetes(format!("failed to read node {node_name}: {e}")))?;

        Ok(node.as_ref().map(node_summary))
    }

    async fn exists(&self, resource: &ResourceDescriptor) -> ControlResult<bool> {
        match &resource.kind {
            ResourceKind::ServiceAccount => self.exists_as::<ServiceAccount>(resource).await,
            ResourceKind::ConfigMap => self.exists_as::<ConfigMap>(resource).await,
            ResourceKind::Service => self.exists_as::<Service>(resource).await,
            ResourceKind::StatefulSet => self.exists_as::<StatefulSet>(resource).await,
            ResourceKind::Job => self.exists_as::<Job>(resource).await,
            ResourceKind::Other(kind) => Err(unsupported(kind)),
        }
    }

    async fn create(&self, resource: &ResourceDescriptor) -> ControlResult<()> {
        match &resource.kind {
            ResourceKind::ServiceAccount => self.create_as::<ServiceAccount>(resource).await,
            ResourceKind::ConfigMap => self.create_as::<ConfigMap>(resource).await,
            ResourceKind::Service => self.create_as::<Service>(resource).await,
            ResourceKind::StatefulSet => self.create_as::<StatefulSet>(resource).await,
            ResourceKind::Job => self.create_as::<Job>(resource).await,
            ResourceKind::Other(kind) => Err(unsupported(kind)),
        }
    }

    async fn patch(&self, resource: &ResourceDescriptor) -> ControlResult<()> {
        match &resource.kind {
            ResourceKind::ServiceAccount => self.patch_as::<ServiceAccount>(resource).await,
            ResourceKind::ConfigMap => self.patch_as::<ConfigMap>(resource).await,
            ResourceKind::Service => self.patch_as::<Service>(resource).await,
            ResourceKind::StatefulSet => self.patch_as::<StatefulSet>(resource).await,
            ResourceKind::Job => self.patch_as::<Job>(resource).await,
            ResourceKind::Other(kind) => Err(unsupported(kind)),
        }
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> ControlResult<Vec<PodSummary>> {
        let pods: Api<Pod> = self.namespaced(namespace);
        let list = pods
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(|e| ControlError::kubernetes(format!("failed to list pods ({selector}): {e}")))?;

        Ok(list
            .items
            .into_iter()
            .map(|pod| PodSummary {
                name: pod.metadata.name.unwrap_or_default(),
                phase: pod.status.and_then(|s| s.phase),
                created_at: pod.metadata.creation_timestamp.map(|t| t.0),
            })
            .collect())
    }

    async fn pod_logs(&self, namespace: &str, pod: &str, container: &str) -> ControlResult<String> {
        let pods: Api<Pod> = self.namespaced(namespace);
        let params = LogParams {
            container: Some(container.to_owned()),
            ..LogParams::default()
        };

        pods.logs(pod, &params)
            .await
            .map_err(|e| ControlError::kubernetes(format!("failed to read logs of {pod}/{container}: {e}")))
    }
}

fn node_summary(node: &Node) -> NodeSummary {
    let capacity = node.status.as_ref().and_then(|s| s.capacity.as_ref());

    NodeSummary {
        name: node.metadata.name.clone().unwrap_or_default(),
        labels: node.metadata.labels.clone().unwrap_or_default(),
        gpus: capacity_count(capacity, "nvidia.com/gpu"),
        cpu_cores: capacity_count(capacity, "cpu"),
    }
}

fn capacity_count(capacity: Option<&BTreeMap<String, Quantity>>, resource: &str) -> u32 {
    capacity
        .and_then(|c| c.get(resource))
        .map_or(0, |q| parse_count(&q.0))
}

/// Parse an integer quantity, accepting millicore notation.
fn parse_count(quantity: &str) -> u32 {
    if let Some(milli) = quantity.strip_suffix('m') {
        return milli.parse::<u32>().map_or(0, |m| m / 1000);
    }
    quantity.parse().unwrap_or(0)
}
