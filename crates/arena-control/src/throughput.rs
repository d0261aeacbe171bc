//! Shard download throughput harness.
//!
//! Many concurrent workers each download a fixed number of shard objects
//! (`shard_000000.dummy`, ...) from one bucket, the way per-GPU data loaders
//! do during training. Per-download bandwidth is recorded and aggregated over
//! the wall time of the whole run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ThroughputConfig;
use crate::error::{ControlError, ControlResult};

/// Bytes per MB as reported by the harness.
pub const MB: f64 = 1024.0 * 1024.0;

/// Bytes per GB as reported by the harness.
pub const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Key of shard `index` under `prefix`.
#[must_use]
pub fn shard_key(prefix: &str, index: u32) -> String {
    format!("{prefix}shard_{index:06}.dummy")
}

/// Shard downloaded by `worker` on its `download`-th download.
#[must_use]
pub fn shard_index(worker: u32, download: u32, downloads_per_worker: u32, num_shards: u32) -> u32 {
    let linear = u64::from(worker) * u64::from(downloads_per_worker) + u64::from(download);
    let index = linear % u64::from(num_shards.max(1));
    u32::try_from(index).unwrap_or(0)
}

/// What one worker achieved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    /// Worker number.
    pub worker_id: u32,
    /// GPU the worker is attributed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_id: Option<u32>,
    /// Successful downloads.
    pub num_downloads: u32,
    /// Bytes downloaded.
    pub total_bytes: u64,
    /// Seconds from the worker's first request to its last.
    pub total_duration: f64,
    /// Mean of `speeds`, 0 when nothing was downloaded.
    pub avg_speed: f64,
    /// MB/s of each successful download.
    pub speeds: Vec<f64>,
}

/// A worker that failed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerError {
    /// Worker number.
    pub worker_id: u32,
    /// What went wrong.
    pub error: String,
}

/// Raw outcome of one harness run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputReport {
    /// Bucket the shards were read from.
    pub bucket: String,
    /// Endpoint name, for display.
    pub endpoint: String,
    /// Workers started.
    pub workers: u32,
    /// Downloads per worker.
    pub downloads_per_worker: u32,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Wall time of the whole run in seconds.
    pub wall_seconds: f64,
    /// Workers that completed.
    pub results: Vec<WorkerResult>,
    /// Workers that failed.
    pub errors: Vec<WorkerError>,
}

/// Per-GPU aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuSummary {
    /// Workers attributed to the GPU.
    pub workers: u32,
    /// Mean of their average speeds in MB/s.
    pub avg_mbps: f64,
}

/// Aggregate over the successful workers of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputSummary {
    /// Workers started.
    pub workers: u32,
    /// Workers that completed.
    pub successful_workers: u32,
    /// Bytes downloaded.
    pub total_bytes: u64,
    /// Data downloaded in GB.
    pub total_data_gb: f64,
    /// Wall time in seconds.
    pub duration_secs: f64,
    /// Aggregate bandwidth over the wall time, MB/s.
    pub aggregate_mbps: f64,
    /// Aggregate bandwidth over the wall time, GB/s.
    pub aggregate_gbps: f64,
    /// Mean of per-worker average speeds, MB/s.
    pub avg_per_worker_mbps: f64,
    /// Breakdown by GPU, empty when workers carry no GPU ids.
    pub per_gpu: BTreeMap<u32, GpuSummary>,
}

/// Aggregate a report. Returns `None` when no worker completed.
#[must_use]
pub fn summarize(report: &ThroughputReport) -> Option<ThroughputSummary> {
    if report.results.is_empty() {
        return None;
    }

    let total_bytes: u64 = report.results.iter().map(|r| r.total_bytes).sum();
    let aggregate_mbps = if report.wall_seconds > 0.0 {
        bytes_f64(total_bytes) / report.wall_seconds / MB
    } else {
        0.0
    };

    let mut by_gpu: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for result in &report.results {
        if let Some(gpu) = result.gpu_id {
            by_gpu.entry(gpu).or_default().push(result.avg_speed);
        }
    }
    let per_gpu = by_gpu
        .into_iter()
        .map(|(gpu, speeds)| {
            let summary = GpuSummary {
                workers: count(speeds.len()),
                avg_mbps: mean(&speeds),
            };
            (gpu, summary)
        })
        .collect();

    let averages: Vec<f64> = report.results.iter().map(|r| r.avg_speed).collect();

    Some(ThroughputSummary {
        workers: report.workers,
        successful_workers: count(report.results.len()),
        total_bytes,
        total_data_gb: bytes_f64(total_bytes) / GB,
        duration_secs: report.wall_seconds,
        aggregate_mbps,
        aggregate_gbps: aggregate_mbps / 1024.0,
        avg_per_worker_mbps: mean(&averages),
        per_gpu,
    })
}

/// Summary of one endpoint in a comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointSummary {
    /// Endpoint name.
    pub endpoint: String,
    /// Aggregate of its run, `None` when no worker completed.
    pub summary: Option<ThroughputSummary>,
}

/// Summarise each report of an endpoint comparison.
#[must_use]
pub fn compare(reports: &[ThroughputReport]) -> Vec<EndpointSummary> {
    reports
        .iter()
        .map(|report| EndpointSummary {
            endpoint: report.endpoint.clone(),
            summary: summarize(report),
        })
        .collect()
}

/// The endpoint with the highest aggregate bandwidth.
///
/// Endpoints without a summary are ignored; the first wins a tie.
#[must_use]
pub fn best_endpoint(summaries: &[EndpointSummary]) -> Option<&EndpointSummary> {
    summaries
        .iter()
        .filter_map(|s| s.summary.as_ref().map(|summary| (s, summary.aggregate_gbps)))
        .fold(None, |best: Option<(&EndpointSummary, f64)>, (s, gbps)| match best {
            Some((_, top)) if top >= gbps => best,
            _ => Some((s, gbps)),
        })
        .map(|(s, _)| s)
}

/// Runs the shard download benchmark against one bucket.
#[derive(Clone)]
pub struct ThroughputHarness {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    endpoint: String,
    config: ThroughputConfig,
}

impl std::fmt::Debug for ThroughputHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThroughputHarness")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ThroughputHarness {
    /// Create a harness reading from `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        endpoint: impl Into<String>,
        config: ThroughputConfig,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            endpoint: endpoint.into(),
            config,
        }
    }

    /// Run all workers to completion.
    pub async fn run(&self) -> ThroughputReport {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(
            bucket = %self.bucket,
            endpoint = %self.endpoint,
            workers = self.config.workers,
            downloads_per_worker = self.config.downloads_per_worker,
            "starting shard download benchmark"
        );

        let handles: Vec<_> = (0..self.config.workers)
            .map(|worker_id| {
                let store = Arc::clone(&self.store);
                let config = self.config.clone();
                (worker_id, tokio::spawn(download_shards(store, worker_id, config)))
            })
            .collect();

        let mut results = Vec::new();
        let mut errors = Vec::new();
        for (worker_id, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(worker = worker_id, error = %e, "worker failed");
                    errors.push(WorkerError {
                        worker_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let report = ThroughputReport {
            bucket: self.bucket.clone(),
            endpoint: self.endpoint.clone(),
            workers: self.config.workers,
            downloads_per_worker: self.config.downloads_per_worker,
            started_at,
            wall_seconds: start.elapsed().as_secs_f64(),
            results,
            errors,
        };
        info!(
            successful = report.results.len(),
            failed = report.errors.len(),
            seconds = report.wall_seconds,
            "shard download benchmark finished"
        );
        report
    }
}

async fn download_shards(store: Arc<dyn ObjectStore>, worker_id: u32, config: ThroughputConfig) -> WorkerResult {
    let gpu_id = config.gpus.filter(|&g| g > 0).map(|g| worker_id % g);
    let mut speeds = Vec::new();
    let mut total_bytes = 0;
    let start = Instant::now();

    for download in 0..config.downloads_per_worker {
        let index = shard_index(worker_id, download, config.downloads_per_worker, config.num_shards);
        let key = shard_key(&config.prefix, index);

        match download_one(store.as_ref(), &key).await {
            Ok((bytes, speed)) => {
                total_bytes += bytes;
                speeds.push(speed);
            }
            Err(e) => warn!(worker = worker_id, gpu = ?gpu_id, download, key = %key, error = %e, "download failed"),
        }
    }

    let result = WorkerResult {
        worker_id,
        gpu_id,
        num_downloads: count(speeds.len()),
        total_bytes,
        total_duration: start.elapsed().as_secs_f64(),
        avg_speed: mean(&speeds),
        speeds,
    };
    debug!(worker = worker_id, downloads = result.num_downloads, mbps = result.avg_speed, "worker done");
    result
}

/// Download one object, discarding its contents. Returns bytes and MB/s.
async fn download_one(store: &dyn ObjectStore, key: &str) -> ControlResult<(u64, f64)> {
    let path = Path::from(key);
    let size = store
        .head(&path)
        .await
        .map_err(|e| ControlError::object_storage(format!("head {key}: {e}")))?
        .size;

    let start = Instant::now();
    store
        .get(&path)
        .await
        .map_err(|e| ControlError::object_storage(format!("get {key}: {e}")))?
        .into_stream()
        .try_for_each(|_chunk| async { Ok(()) })
        .await
        .map_err(|e| ControlError::object_storage(format!("read {key}: {e}")))?;
    let seconds = start.elapsed().as_secs_f64().max(f64::EPSILON);

    Ok((size, bytes_f64(size) / seconds / MB))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / f64::from(count(values.len()))
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

#[allow(clippy::as_conversions, clippy::cast_precision_loss)]
pub(crate) fn bytes_f64(bytes: u64) -> f64 {
    bytes as f64
}
