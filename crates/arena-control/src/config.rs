//! Configuration for arena-control.

use std::path::{Path, PathBuf};

use arena_credentials::CredentialsConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};
use crate::storage::AddressingStyle;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "arena.toml";

/// Well-known environment variables and the keys they override.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("POD_NAMESPACE", "cluster.namespace"),
    ("POD_NAME", "cluster.pod_name"),
    ("AWS_DEFAULT_REGION", "storage.default_region"),
    ("AWS_S3_ADDRESSING_STYLE", "storage.addressing_style"),
    ("CW_TOKEN", "credentials.token"),
    ("ARENA_CREDENTIAL_DURATION", "credentials.duration_secs"),
];

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ArenaConfig {
    /// Kubernetes access.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Object storage endpoints and region.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Temporary credential acquisition.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Warp benchmark parameters.
    #[serde(default)]
    pub warp: WarpConfig,

    /// Shard download harness parameters.
    #[serde(default)]
    pub throughput: ThroughputConfig,

    /// Single-object upload and download tests.
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl ArenaConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `arena.toml` in the current directory (if present)
    /// 3. Environment variables with `ARENA_` prefix, nested with `__`
    /// 4. `POD_NAMESPACE`, `POD_NAME`, `AWS_DEFAULT_REGION`,
    ///    `AWS_S3_ADDRESSING_STYLE`, `CW_TOKEN` and `ARENA_CREDENTIAL_DURATION`
    pub fn load() -> ControlResult<Self> {
        Self::from_file(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific TOML file, then the environment.
    pub fn from_file(path: impl AsRef<Path>) -> ControlResult<Self> {
        Self::figment(path.as_ref())
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }

    fn figment(path: &Path) -> Figment {
        let mut figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ARENA_").split("__"));

        for &(var, key) in ENV_OVERRIDES {
            figment = figment.merge(Env::raw().only(&[var]).map(move |_| key.into()));
        }

        figment
    }
}

/// Which cluster client to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterBackend {
    /// Talk to a real cluster.
    #[default]
    Kube,

    /// In-memory cluster for dry runs.
    Memory,
}

/// Kubernetes access configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Cluster client implementation.
    #[serde(default)]
    pub backend: ClusterBackend,

    /// Use the service account mounted into the pod.
    #[serde(default = "default_in_cluster")]
    pub in_cluster: bool,

    /// Explicit kubeconfig path. Takes precedence over `in_cluster`.
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace benchmark resources are applied to.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Name of the pod this process runs in, if any.
    #[serde(default)]
    pub pod_name: Option<String>,
}

const fn default_in_cluster() -> bool {
    true
}

fn default_namespace() -> String {
    "tenant-slurm".to_owned()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            backend: ClusterBackend::default(),
            in_cluster: default_in_cluster(),
            kubeconfig: None,
            namespace: default_namespace(),
            pod_name: None,
        }
    }
}

/// Object storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Try the LOTA cache endpoint before CAIOS.
    #[serde(default = "default_prefer_lota")]
    pub prefer_lota: bool,

    /// LOTA endpoint URL.
    #[serde(default = "default_lota_url")]
    pub lota_url: String,

    /// CAIOS endpoint URL.
    #[serde(default = "default_caios_url")]
    pub caios_url: String,

    /// Full region name, used verbatim when set.
    #[serde(default)]
    pub region: Option<String>,

    /// Region prefix, usually from `AWS_DEFAULT_REGION`.
    #[serde(default)]
    pub default_region: Option<String>,

    /// Availability zone appended to a detected region.
    #[serde(default = "default_availability_zone")]
    pub availability_zone: String,

    /// S3 addressing style.
    #[serde(default)]
    pub addressing_style: AddressingStyle,

    /// Connect timeout for endpoint probes in seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

const fn default_prefer_lota() -> bool {
    true
}

fn default_lota_url() -> String {
    "http://cwlota.com".to_owned()
}

fn default_caios_url() -> String {
    "https://cwobject.com".to_owned()
}

fn default_availability_zone() -> String {
    "A".to_owned()
}

const fn default_probe_timeout_secs() -> u64 {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prefer_lota: default_prefer_lota(),
            lota_url: default_lota_url(),
            caios_url: default_caios_url(),
            region: None,
            default_region: None,
            availability_zone: default_availability_zone(),
            addressing_style: AddressingStyle::default(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

/// Warp benchmark configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WarpConfig {
    /// Container image for clients and the coordinator.
    #[serde(default = "default_warp_image")]
    pub image: String,

    /// Service account the pods run as.
    #[serde(default = "default_service_account")]
    pub service_account: String,

    /// Benchmark type (`get`, `put`, `mixed`, ...).
    #[serde(default = "default_benchmark")]
    pub benchmark: String,

    /// Concurrent operations per client.
    #[serde(default = "default_concurrent")]
    pub concurrent: u32,

    /// Benchmark duration in warp syntax.
    #[serde(default = "default_duration")]
    pub duration: String,

    /// Object size in warp syntax.
    #[serde(default = "default_object_size")]
    pub object_size: String,

    /// Number of objects to prepare.
    #[serde(default = "default_objects")]
    pub objects: u32,

    /// Key prefix for benchmark objects.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Coordinator job retry limit.
    #[serde(default = "default_backoff_limit")]
    pub backoff_limit: u32,

    /// Interval between status polls in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_warp_image() -> String {
    "minio/warp:v1.0.8".to_owned()
}

fn default_service_account() -> String {
    "arena".to_owned()
}

fn default_benchmark() -> String {
    "get".to_owned()
}

const fn default_concurrent() -> u32 {
    300
}

fn default_duration() -> String {
    "5m".to_owned()
}

fn default_object_size() -> String {
    "50MiB".to_owned()
}

const fn default_objects() -> u32 {
    1000
}

fn default_prefix() -> String {
    "benchmark-".to_owned()
}

const fn default_backoff_limit() -> u32 {
    4
}

const fn default_poll_interval_secs() -> u64 {
    5
}

impl Default for WarpConfig {
    fn default() -> Self {
        Self {
            image: default_warp_image(),
            service_account: default_service_account(),
            benchmark: default_benchmark(),
            concurrent: default_concurrent(),
            duration: default_duration(),
            object_size: default_object_size(),
            objects: default_objects(),
            prefix: default_prefix(),
            backoff_limit: default_backoff_limit(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Shard download harness configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ThroughputConfig {
    /// Number of concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Downloads each worker performs.
    #[serde(default = "default_downloads_per_worker")]
    pub downloads_per_worker: u32,

    /// Number of shards present in the bucket.
    #[serde(default = "default_num_shards")]
    pub num_shards: u32,

    /// Key prefix in front of `shard_NNNNNN.dummy`.
    #[serde(default)]
    pub prefix: String,

    /// GPUs on this host, used to label workers for the per-GPU breakdown.
    #[serde(default)]
    pub gpus: Option<u32>,

    /// Pause between runs when comparing endpoints, in seconds.
    #[serde(default = "default_comparison_pause_secs")]
    pub comparison_pause_secs: u64,
}

const fn default_workers() -> u32 {
    128
}

const fn default_downloads_per_worker() -> u32 {
    8
}

const fn default_num_shards() -> u32 {
    128
}

const fn default_comparison_pause_secs() -> u64 {
    5
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            downloads_per_worker: default_downloads_per_worker(),
            num_shards: default_num_shards(),
            prefix: String::new(),
            gpus: None,
            comparison_pause_secs: default_comparison_pause_secs(),
        }
    }
}

/// Single-object transfer test configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Size of the uploaded test object in GB.
    #[serde(default = "default_size_gb")]
    pub size_gb: u64,

    /// Multipart part size in MB.
    #[serde(default = "default_part_size_mb")]
    pub part_size_mb: u64,

    /// Parts in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Where downloaded objects are written.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

const fn default_size_gb() -> u64 {
    1
}

const fn default_part_size_mb() -> u64 {
    8
}

const fn default_concurrency() -> usize {
    20
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp/bandwidth-test")
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            size_gb: default_size_gb(),
            part_size_mb: default_part_size_mb(),
            concurrency: default_concurrency(),
            work_dir: default_work_dir(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ArenaConfig::default();
        assert_eq!(config.cluster.namespace, "tenant-slurm");
        assert_eq!(config.cluster.backend, ClusterBackend::Kube);
        assert!(config.storage.prefer_lota);
        assert_eq!(config.storage.availability_zone, "A");
        assert_eq!(config.storage.addressing_style, AddressingStyle::Virtual);
        assert_eq!(config.warp.concurrent, 300);
        assert_eq!(config.warp.poll_interval_secs, 5);
        assert_eq!(config.throughput.num_shards, 128);
        assert_eq!(config.throughput.comparison_pause_secs, 5);
        assert_eq!(config.transfer.size_gb, 1);
        assert_eq!(config.transfer.part_size_mb, 8);
        assert_eq!(config.credentials.duration_secs, 43_200);
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            [cluster]
            backend = "memory"
            namespace = "bench"

            [storage]
            prefer_lota = false
            region = "US-EAST-04A"
            addressing_style = "path"

            [warp]
            duration = "1m"
            objects = 50

            [throughput]
            workers = 16
            gpus = 8
        "#;

        let config: ArenaConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.cluster.backend, ClusterBackend::Memory);
        assert_eq!(config.cluster.namespace, "bench");
        assert!(!config.storage.prefer_lota);
        assert_eq!(config.storage.region.as_deref(), Some("US-EAST-04A"));
        assert_eq!(config.storage.addressing_style, AddressingStyle::Path);
        assert_eq!(config.warp.duration, "1m");
        assert_eq!(config.warp.objects, 50);
        assert_eq!(config.warp.image, "minio/warp:v1.0.8");
        assert_eq!(config.throughput.workers, 16);
        assert_eq!(config.throughput.gpus, Some(8));
    }

    #[test]
    fn environment_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "arena.toml",
                r#"
                    [cluster]
                    namespace = "from-file"

                    [warp]
                    concurrent = 10
                "#,
            )?;
            jail.set_env("POD_NAMESPACE", "from-env");
            jail.set_env("AWS_DEFAULT_REGION", "US-WEST-01");
            jail.set_env("AWS_S3_ADDRESSING_STYLE", "sideways");
            jail.set_env("ARENA_CREDENTIAL_DURATION", "3600");
            jail.set_env("ARENA_WARP__CONCURRENT", "20");

            let config = ArenaConfig::load().unwrap();
            assert_eq!(config.cluster.namespace, "from-env");
            assert_eq!(config.storage.default_region.as_deref(), Some("US-WEST-01"));
            assert_eq!(config.storage.addressing_style, AddressingStyle::Virtual);
            assert_eq!(config.credentials.duration_secs, 3600);
            assert_eq!(config.warp.concurrent, 20);
            Ok(())
        });
    }

    #[test]
    fn missing_file_uses_defaults() {
        Jail::expect_with(|_| {
            let config = ArenaConfig::from_file("does-not-exist.toml").unwrap();
            assert_eq!(config.cluster.namespace, "tenant-slurm");
            Ok(())
        });
    }
}
