//! Submitting and following Warp runs.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use ulid::Ulid;

use super::template::{self, WarpPlan, WarpTarget, WARP_NAME};
use crate::apply::ManifestApplier;
use crate::cluster::ClusterClient;
use crate::config::WarpConfig;
use crate::error::{ControlError, ControlResult};
use crate::inventory::node_inventory;
use crate::state::{
    BenchmarkRun, Finished, Observation, Rendered, RunStatus, Submission, Submitted, WarpRun,
    JOB_PREFIX,
};

const SUFFIX_LEN: usize = 8;

/// Runs distributed Warp benchmarks on a cluster.
#[derive(Clone)]
pub struct WarpRunner {
    cluster: Arc<dyn ClusterClient>,
    applier: ManifestApplier,
    config: WarpConfig,
    namespace: String,
}

impl std::fmt::Debug for WarpRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarpRunner")
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WarpRunner {
    /// Create a runner applying to `namespace`.
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterClient>, config: WarpConfig, namespace: impl Into<String>) -> Self {
        Self {
            applier: ManifestApplier::new(Arc::clone(&cluster)),
            cluster,
            config,
            namespace: namespace.into(),
        }
    }

    /// Namespace runs are applied to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Size a run from the node inventory.
    ///
    /// GPU nodes are used when there are any, CPU nodes otherwise. Fewer than
    /// two hosts leave no room for a client and are rejected.
    pub async fn plan(&self) -> ControlResult<WarpPlan> {
        let inventory = node_inventory(self.cluster.as_ref()).await?;
        let host_count = inventory.host_count();
        if host_count < 2 {
            return Err(ControlError::InsufficientNodes { found: host_count });
        }

        Ok(WarpPlan {
            host_count,
            compute_class: inventory.compute_class(),
            job_suffix: job_suffix(),
            namespace: self.namespace.clone(),
        })
    }

    /// Render the manifest of a planned run.
    pub fn render(&self, plan: &WarpPlan, target: &WarpTarget) -> ControlResult<WarpRun<Rendered>> {
        let resources = template::render(plan, target, &self.config)?;
        Ok(WarpRun::render(&plan.job_suffix, &plan.namespace, resources))
    }

    /// Apply a rendered run.
    pub async fn submit(&self, run: WarpRun<Rendered>) -> ControlResult<Submission> {
        let applied = self.applier.apply(run.resources()).await?;
        let job_name = run.job_name().to_owned();

        let submission = run.submit(applied);
        match &submission {
            Submission::Started(_) => info!(job = %job_name, "warp benchmark started"),
            Submission::NotStarted { .. } => warn!(job = %job_name, "warp job already existed, not started"),
        }
        Ok(submission)
    }

    /// Plan, render and submit a run against `target`.
    pub async fn start(&self, target: &WarpTarget) -> ControlResult<Submission> {
        let plan = self.plan().await?;
        info!(
            hosts = plan.host_count,
            class = %plan.compute_class,
            job = %plan.job_name(),
            bucket = %target.bucket,
            "starting warp benchmark"
        );
        let run = self.render(&plan, target)?;
        self.submit(run).await
    }

    /// Take one snapshot of the coordinator pod of `job_name`.
    ///
    /// With several pods (retries) the newest is reported. Logs are fetched
    /// once the pod is running or done; a failed log fetch is reported as
    /// empty logs.
    pub async fn poll(&self, job_name: &str) -> ControlResult<BenchmarkRun> {
        let selector = format!("job-name={job_name}");
        let pods = self.cluster.list_pods(&self.namespace, &selector).await?;

        let mut snapshot = BenchmarkRun {
            job_name: job_name.to_owned(),
            job_suffix: job_name
                .strip_prefix(JOB_PREFIX)
                .unwrap_or(job_name)
                .to_owned(),
            namespace: self.namespace.clone(),
            pod_name: None,
            status: RunStatus::NoPodsFound,
            logs: None,
        };

        let Some(pod) = pods.into_iter().max_by_key(|p| p.created_at) else {
            debug!(job = %job_name, "no pods yet");
            return Ok(snapshot);
        };

        snapshot.status = RunStatus::from_phase(pod.phase.as_deref());
        if snapshot.status.has_logs() {
            let logs = match self.cluster.pod_logs(&self.namespace, &pod.name, WARP_NAME).await {
                Ok(logs) => logs,
                Err(e) => {
                    warn!(job = %job_name, pod = %pod.name, error = %e, "failed to fetch logs");
                    String::new()
                }
            };
            snapshot.logs = Some(logs);
        }
        snapshot.pod_name = Some(pod.name);

        debug!(job = %job_name, status = %snapshot.status, "polled warp job");
        Ok(snapshot)
    }

    /// Poll `run` until it reaches a terminal status.
    pub async fn watch(&self, run: WarpRun<Submitted>, interval: Duration) -> ControlResult<WarpRun<Finished>> {
        let mut run = run;
        loop {
            let snapshot = self.poll(run.job_name()).await?;
            match run.observe(snapshot) {
                Observation::Finished(done) => {
                    info!(job = %done.job_name(), succeeded = done.succeeded(), "warp benchmark finished");
                    return Ok(done);
                }
                Observation::Pending(pending) => run = pending,
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Poll interval from configuration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_secs)
    }
}

/// Random lowercase job suffix.
fn job_suffix() -> String {
    let id = Ulid::new().to_string().to_lowercase();
    id[id.len() - SUFFIX_LEN..].to_owned()
}
