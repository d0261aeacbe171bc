//! Arena control plane.
//!
//! Measures throughput between compute clusters and S3-compatible object
//! storage. The crate inspects the cluster it runs against, applies
//! Kubernetes manifests idempotently, orchestrates distributed Warp
//! benchmarks, and runs a shard download harness from the current host.
//!
//! # Components
//!
//! - **Cluster**: [`ClusterClient`] seam with a Kubernetes and an in-memory
//!   implementation, plus node [`inventory`] and region lookup
//! - **Applier**: [`ManifestApplier`] creates missing resources and patches
//!   existing ones, leaving immutable Jobs alone
//! - **Warp**: [`WarpRunner`] sizes a run from the inventory, renders and
//!   applies its manifest, and polls the coordinator pod
//! - **Storage**: [`ObjectStorage`] picks an authentication method and an
//!   endpoint (LOTA, falling back to CAIOS), hands out S3 clients and
//!   manages buckets
//! - **Throughput**: [`ThroughputHarness`] downloads shards from many
//!   concurrent workers and aggregates bandwidth, per endpoint when comparing
//! - **Transfer**: [`TransferTest`] times a single large upload or download
//!
//! # Run lifecycle
//!
//! Benchmark runs follow a typestate machine:
//!
//! ```text
//! Rendered ──submit──▶ Submitted ──observe──▶ Finished
//!                          ▲    │
//!                          └────┘ (not terminal)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use arena_control::{create_cluster, ArenaConfig, ObjectStorage, Submission, WarpRunner};
//!
//! let config = ArenaConfig::load()?;
//! let cluster = create_cluster(&config.cluster).await?;
//! let storage = ObjectStorage::connect(&config, cluster.as_ref()).await?;
//!
//! let runner = WarpRunner::new(cluster, config.warp.clone(), &config.cluster.namespace);
//! if let Submission::Started(run) = runner.start(&storage.warp_target("bench").await?).await? {
//!     let finished = runner.watch(run, runner.poll_interval()).await?;
//! }
//! ```

pub mod apply;
pub mod cluster;
pub mod config;
pub mod error;
pub mod inventory;
pub mod manifest;
pub mod state;
pub mod storage;
pub mod throughput;
pub mod transfer;
pub mod warp;

pub use apply::{ApplyResult, ManifestApplier};
pub use cluster::{create_cluster, ClusterClient, KubeCluster, MemoryCluster, NodeSummary, PodSummary};
pub use config::{
    ArenaConfig, ClusterBackend, ClusterConfig, StorageConfig, ThroughputConfig, TransferConfig,
    WarpConfig,
};
pub use error::{ControlError, ControlResult};
pub use inventory::{cluster_region, node_inventory, pod_region, ComputeClass, NodeInventory};
pub use manifest::{parse_manifests, ResourceDescriptor, ResourceKind};
pub use state::{
    BenchmarkRun, Finished, Observation, Rendered, RunState, RunStatus, Submission, Submitted,
    WarpRun,
};
pub use storage::{
    AddressingStyle, BucketApi, Endpoint, EnsureOutcome, ObjectStorage, ObjectSummary, PolicyClient,
};
pub use throughput::{
    best_endpoint, compare, summarize, EndpointSummary, ThroughputHarness, ThroughputReport,
    ThroughputSummary,
};
pub use transfer::{upload_key, TransferResult, TransferTest};
pub use warp::{WarpPlan, WarpRunner, WarpTarget};
