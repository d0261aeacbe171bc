//! Rendering of the distributed Warp manifest.
//!
//! A run consists of a ConfigMap holding the Warp configuration file, a
//! headless Service and StatefulSet for the `N - 1` Warp clients, and a Job
//! running the coordinator on the remaining host.

use arena_credentials::SecretValue;
use serde_json::{json, Value};

use crate::config::WarpConfig;
use crate::error::ControlResult;
use crate::inventory::ComputeClass;
use crate::manifest::ResourceDescriptor;
use crate::state::JOB_PREFIX;
use crate::storage::endpoint_host;

/// Name shared by the ConfigMap, Service, StatefulSet and containers.
pub const WARP_NAME: &str = "warp";

/// ConfigMap holding the Warp configuration file.
pub const CONFIG_MAP_NAME: &str = "warp-config";

/// Key of the configuration file inside the ConfigMap.
pub const CONFIG_FILE_NAME: &str = "warp-config.yml";

/// Port Warp clients listen on.
pub const CLIENT_PORT: u16 = 7761;

const CONFIG_MOUNT: &str = "/config";
const RUN_AS: u32 = 1001;

/// Where the benchmark reads and writes.
#[derive(Debug, Clone)]
pub struct WarpTarget {
    /// Bucket to benchmark against.
    pub bucket: String,
    /// Region name.
    pub region: String,
    /// Endpoint URL; the scheme is stripped in the rendered config.
    pub endpoint: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret key.
    pub secret_access_key: SecretValue,
}

/// Sizing of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarpPlan {
    /// Hosts available, one coordinator plus `host_count - 1` clients.
    pub host_count: u32,
    /// Node class every pod is pinned to.
    pub compute_class: ComputeClass,
    /// Random suffix of the coordinator job name.
    pub job_suffix: String,
    /// Namespace to apply to.
    pub namespace: String,
}

impl WarpPlan {
    /// Coordinator job name.
    #[must_use]
    pub fn job_name(&self) -> String {
        format!("{JOB_PREFIX}{}", self.job_suffix)
    }

    /// Number of Warp clients.
    #[must_use]
    pub const fn client_count(&self) -> u32 {
        self.host_count.saturating_sub(1)
    }

    /// Warp client host pattern, `warp-{0...N-2}.warp`.
    #[must_use]
    pub fn client_hosts(&self) -> String {
        let last = self.host_count.saturating_sub(2);
        format!("{WARP_NAME}-{{0...{last}}}.{WARP_NAME}")
    }
}

/// Render the four resources of a run, in apply order.
pub fn render(
    plan: &WarpPlan,
    target: &WarpTarget,
    config: &WarpConfig,
) -> ControlResult<Vec<ResourceDescriptor>> {
    let documents = [
        config_map(plan, target, config)?,
        service(),
        stateful_set(plan, config),
        job(plan, config),
    ];

    documents
        .into_iter()
        .map(|body| ResourceDescriptor::from_value(body, &plan.namespace))
        .collect()
}

fn labels() -> Value {
    json!({
        "app.kubernetes.io/name": WARP_NAME,
        "app.kubernetes.io/instance": WARP_NAME,
    })
}

/// The Warp configuration file.
pub fn config_file(plan: &WarpPlan, target: &WarpTarget, config: &WarpConfig) -> ControlResult<String> {
    let file = json!({
        "warp": {
            "advanced": {
                "debug": false,
                "disable-http-keepalive": false,
                "host-select": "weighed",
                "http2": false,
                "rcvbuf": 32768,
                "resolve-host": false,
                "sndbuf": 32768,
                "stress": false,
            },
            "analyze": { "verbose": false },
            "api": "v1",
            "benchmark": config.benchmark,
            "io": {
                "disable-multipart": false,
                "md5": false,
                "no-prefix": false,
                "prefix": config.prefix,
                "sse-s3-encrypt": false,
                "storage-class": "STANDARD",
            },
            "json": false,
            "no-color": false,
            "params": {
                "autoterm": { "dur": "10s", "enabled": false, "pct": 7.5 },
                "concurrent": config.concurrent,
                "duration": config.duration,
                "keep-data": false,
                "no-clear": false,
                "obj": { "rand-size": false, "size": config.object_size },
                "objects": config.objects,
            },
            "quiet": false,
            "remote": {
                "access-key": target.access_key_id,
                "bucket": target.bucket,
                "host": [endpoint_host(&target.endpoint)],
                "insecure": true,
                "lookup": "host",
                "region": target.region,
                "secret-key": target.secret_access_key.expose(),
            },
            "warp-client": plan.client_hosts(),
        }
    });

    Ok(serde_yaml::to_string(&file)?)
}

fn config_map(plan: &WarpPlan, target: &WarpTarget, config: &WarpConfig) -> ControlResult<Value> {
    Ok(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": CONFIG_MAP_NAME, "labels": labels() },
        "data": { CONFIG_FILE_NAME: config_file(plan, target, config)? },
    }))
}

fn service() -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": WARP_NAME, "labels": labels() },
        "spec": {
            "publishNotReadyAddresses": true,
            "clusterIP": "None",
            "selector": labels(),
            "ports": [{ "port": CLIENT_PORT, "name": WARP_NAME }],
        },
    })
}

fn affinity(class: ComputeClass) -> Value {
    json!({
        "nodeAffinity": {
            "requiredDuringSchedulingIgnoredDuringExecution": {
                "nodeSelectorTerms": [{
                    "matchExpressions": [
                        { "key": "node.coreweave.cloud/state", "operator": "In", "values": ["production"] },
                        { "key": "node.coreweave.cloud/class", "operator": "In", "values": [class.as_str()] },
                    ],
                }],
            },
        },
        "podAntiAffinity": {
            "requiredDuringSchedulingIgnoredDuringExecution": [{
                "labelSelector": {
                    "matchExpressions": [
                        { "key": "app.kubernetes.io/instance", "operator": "In", "values": [WARP_NAME] },
                    ],
                },
                "topologyKey": "kubernetes.io/hostname",
            }],
        },
    })
}

fn tolerations() -> Value {
    json!([
        { "key": "is_gpu", "operator": "Exists" },
        { "key": "node.coreweave.cloud/reserved", "operator": "Exists" },
    ])
}

fn pod_security() -> Value {
    json!({ "fsGroup": RUN_AS, "runAsNonRoot": true, "runAsUser": RUN_AS })
}

fn stateful_set(plan: &WarpPlan, config: &WarpConfig) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "StatefulSet",
        "metadata": { "name": WARP_NAME, "labels": labels() },
        "spec": {
            "serviceName": WARP_NAME,
            "podManagementPolicy": "Parallel",
            "replicas": plan.client_count(),
            "selector": { "matchLabels": labels() },
            "template": {
                "metadata": { "name": WARP_NAME, "labels": labels() },
                "spec": {
                    "containers": [{
                        "name": WARP_NAME,
                        "image": config.image,
                        "imagePullPolicy": "IfNotPresent",
                        "args": ["client"],
                        "ports": [{ "name": "http", "containerPort": CLIENT_PORT }],
                        "securityContext": { "readOnlyRootFilesystem": true },
                    }],
                    "serviceAccountName": config.service_account,
                    "securityContext": pod_security(),
                    "affinity": affinity(plan.compute_class),
                    "tolerations": tolerations(),
                },
            },
        },
    })
}

fn job(plan: &WarpPlan, config: &WarpConfig) -> Value {
    json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": { "name": plan.job_name(), "labels": labels() },
        "spec": {
            "backoffLimit": config.backoff_limit,
            "template": {
                "metadata": { "annotations": { "rollme": "1" } },
                "spec": {
                    "restartPolicy": "Never",
                    "containers": [{
                        "name": WARP_NAME,
                        "image": config.image,
                        "imagePullPolicy": "IfNotPresent",
                        "args": ["run", format!("{CONFIG_MOUNT}/{CONFIG_FILE_NAME}")],
                        "securityContext": { "readOnlyRootFilesystem": true },
                        "volumeMounts": [{ "name": "config", "mountPath": CONFIG_MOUNT, "readOnly": true }],
                    }],
                    "serviceAccountName": config.service_account,
                    "securityContext": pod_security(),
                    "affinity": affinity(plan.compute_class),
                    "tolerations": tolerations(),
                    "volumes": [{ "name": "config", "configMap": { "name": CONFIG_MAP_NAME } }],
                },
            },
        },
    })
}
