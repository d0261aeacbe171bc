//! Typestate for a Warp benchmark run.
//!
//! A run is rendered, submitted by applying its manifest, then observed
//! until its coordinator pod reaches a terminal phase. Each step consumes the
//! previous state, so a run cannot be observed before it was submitted or
//! submitted twice.
//!
//! ```ignore
//! let rendered = WarpRun::render(suffix, namespace, resources);
//! match rendered.submit(applied) {
//!     Submission::Started(run) => match run.observe(snapshot) {
//!         Observation::Pending(run) => { /* poll again */ }
//!         Observation::Finished(run) => { /* report run.result() */ }
//!     },
//!     Submission::NotStarted { applied, .. } => { /* job already existed */ }
//! }
//! ```

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::apply::ApplyResult;
use crate::manifest::{resource_id, ResourceDescriptor, ResourceKind};

/// Prefix of every coordinator job name.
pub const JOB_PREFIX: &str = "warp-";

/// Status of a run as reported by one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum RunStatus {
    /// Pod scheduled but not started.
    Pending,
    /// Benchmark running.
    Running,
    /// Pod exited successfully.
    Succeeded,
    /// Pod failed.
    Failed,
    /// Job reported completion.
    Completed,
    /// No pod for the job exists yet.
    NoPodsFound,
    /// Any other phase, lowercased.
    Other(String),
}

impl RunStatus {
    /// Map a pod phase to a status.
    ///
    /// A pod without a reported phase is `unknown`.
    #[must_use]
    pub fn from_phase(phase: Option<&str>) -> Self {
        Self::parse(&phase.unwrap_or("Unknown").to_lowercase())
    }

    fn parse(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "completed" => Self::Completed,
            "no_pods_found" => Self::NoPodsFound,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Status name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::NoPodsFound => "no_pods_found",
            Self::Other(phase) => phase,
        }
    }

    /// Returns true once the run cannot change any more.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Completed)
    }

    /// Returns true if logs are fetched for this status.
    #[must_use]
    pub const fn has_logs(&self) -> bool {
        matches!(self, Self::Running | Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        status.as_str().to_owned()
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

/// One poll of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    /// Coordinator job name.
    pub job_name: String,
    /// Random part of the job name.
    pub job_suffix: String,
    /// Namespace the job runs in.
    pub namespace: String,
    /// Coordinator pod the status was read from.
    pub pod_name: Option<String>,
    /// Status at poll time.
    pub status: RunStatus,
    /// Container logs, when the pod has started.
    pub logs: Option<String>,
}

/// Marker trait for run states.
pub trait RunState: private::Sealed + Send + Sync {
    /// State name for logs.
    fn name() -> &'static str;
}

mod private {
    pub trait Sealed {}
}

/// Manifest rendered, nothing applied yet.
#[derive(Debug, Clone, Copy)]
pub struct Rendered;

/// Manifest applied and the coordinator job created.
#[derive(Debug, Clone, Copy)]
pub struct Submitted;

/// Coordinator pod reached a terminal phase.
#[derive(Debug, Clone, Copy)]
pub struct Finished;

impl private::Sealed for Rendered {}
impl private::Sealed for Submitted {}
impl private::Sealed for Finished {}

impl RunState for Rendered {
    fn name() -> &'static str {
        "rendered"
    }
}

impl RunState for Submitted {
    fn name() -> &'static str {
        "submitted"
    }
}

impl RunState for Finished {
    fn name() -> &'static str {
        "finished"
    }
}

#[derive(Debug, Clone)]
struct RunData {
    job_name: String,
    job_suffix: String,
    namespace: String,
    resources: Vec<ResourceDescriptor>,
    applied: Option<ApplyResult>,
    last: Option<BenchmarkRun>,
}

/// A benchmark run in state `S`.
#[derive(Debug, Clone)]
pub struct WarpRun<S: RunState> {
    data: RunData,
    _state: PhantomData<S>,
}

/// Outcome of [`WarpRun::submit`].
#[derive(Debug)]
pub enum Submission {
    /// The coordinator job was created by this apply.
    Started(WarpRun<Submitted>),
    /// The job already existed; nothing new was started.
    NotStarted {
        /// Job that was not started.
        job_name: String,
        /// What the apply did.
        applied: ApplyResult,
    },
}

/// Outcome of [`WarpRun::observe`].
#[derive(Debug)]
pub enum Observation {
    /// Still running; poll again.
    Pending(WarpRun<Submitted>),
    /// Reached a terminal status.
    Finished(WarpRun<Finished>),
}

impl<S: RunState> WarpRun<S> {
    /// Coordinator job name.
    #[must_use]
    pub fn job_name(&self) -> &str {
        &self.data.job_name
    }

    /// Random part of the job name.
    #[must_use]
    pub fn job_suffix(&self) -> &str {
        &self.data.job_suffix
    }

    /// Namespace of the run.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.data.namespace
    }

    /// State name.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        S::name()
    }

    /// Most recent snapshot, if any.
    #[must_use]
    pub const fn last(&self) -> Option<&BenchmarkRun> {
        self.data.last.as_ref()
    }

    fn transition<T: RunState>(self) -> WarpRun<T> {
        WarpRun {
            data: self.data,
            _state: PhantomData,
        }
    }
}

impl WarpRun<Rendered> {
    /// A freshly rendered run for job `warp-<suffix>`.
    #[must_use]
    pub fn render(
        job_suffix: impl Into<String>,
        namespace: impl Into<String>,
        resources: Vec<ResourceDescriptor>,
    ) -> Self {
        let job_suffix = job_suffix.into();
        Self {
            data: RunData {
                job_name: format!("{JOB_PREFIX}{job_suffix}"),
                job_suffix,
                namespace: namespace.into(),
                resources,
                applied: None,
                last: None,
            },
            _state: PhantomData,
        }
    }

    /// Resources to apply, in order.
    #[must_use]
    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.data.resources
    }

    /// Record the apply result.
    ///
    /// The run is started iff its job appears under `created`.
    #[must_use]
    pub fn submit(mut self, applied: ApplyResult) -> Submission {
        let job_id = resource_id(&ResourceKind::Job, &self.data.job_name);
        if !applied.is_created(&job_id) {
            return Submission::NotStarted {
                job_name: self.data.job_name,
                applied,
            };
        }

        self.data.applied = Some(applied);
        Submission::Started(self.transition())
    }
}

impl WarpRun<Submitted> {
    /// Pick up a run submitted earlier, e.g. by another process.
    #[must_use]
    pub fn resume(job_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let job_name = job_name.into();
        let job_suffix = job_name
            .strip_prefix(JOB_PREFIX)
            .unwrap_or(&job_name)
            .to_owned();
        Self {
            data: RunData {
                job_name,
                job_suffix,
                namespace: namespace.into(),
                resources: Vec::new(),
                applied: None,
                last: None,
            },
            _state: PhantomData,
        }
    }

    /// Apply result of the submission, unless the run was resumed.
    #[must_use]
    pub const fn applied(&self) -> Option<&ApplyResult> {
        self.data.applied.as_ref()
    }

    /// Record a snapshot and move on if it is terminal.
    #[must_use]
    pub fn observe(mut self, snapshot: BenchmarkRun) -> Observation {
        let terminal = snapshot.status.is_terminal();
        self.data.last = Some(snapshot);
        if terminal {
            Observation::Finished(self.transition())
        } else {
            Observation::Pending(self)
        }
    }
}

impl WarpRun<Finished> {
    /// The terminal snapshot.
    #[must_use]
    pub fn result(&self) -> Option<&BenchmarkRun> {
        self.data.last.as_ref()
    }

    /// Consume the run, returning the terminal snapshot.
    #[must_use]
    pub fn into_result(self) -> Option<BenchmarkRun> {
        self.data.last
    }

    /// Returns true if the run ended well.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result()
            .is_some_and(|r| matches!(r.status, RunStatus::Succeeded | RunStatus::Completed))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn snapshot(status: RunStatus) -> BenchmarkRun {
        BenchmarkRun {
            job_name: "warp-abcd1234".to_owned(),
            job_suffix: "abcd1234".to_owned(),
            namespace: "ns".to_owned(),
            pod_name: Some("warp-abcd1234-x".to_owned()),
            status,
            logs: None,
        }
    }

    fn applied_with(created: &[&str]) -> ApplyResult {
        ApplyResult {
            created: created.iter().map(|c| (*c).to_owned()).collect(),
            ..ApplyResult::default()
        }
    }

    #[rstest]
    #[case(Some("Running"), RunStatus::Running)]
    #[case(Some("Succeeded"), RunStatus::Succeeded)]
    #[case(Some("Pending"), RunStatus::Pending)]
    #[case(Some("Unknown"), RunStatus::Other("unknown".to_owned()))]
    #[case(None, RunStatus::Other("unknown".to_owned()))]
    fn phases(#[case] phase: Option<&str>, #[case] expected: RunStatus) {
        assert_eq!(RunStatus::from_phase(phase), expected);
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::NoPodsFound.is_terminal());
    }

    #[test]
    fn status_serialises_as_name() {
        let json = serde_json::to_string(&RunStatus::NoPodsFound);
        assert_eq!(json.ok().as_deref(), Some("\"no_pods_found\""));
    }

    #[test]
    fn started_only_when_job_created() {
        let run = WarpRun::render("abcd1234", "ns", Vec::new());
        assert_eq!(run.job_name(), "warp-abcd1234");
        assert_eq!(run.state_name(), "rendered");

        match run.submit(applied_with(&["ConfigMap/warp-config", "Job/warp-abcd1234"])) {
            Submission::Started(run) => assert_eq!(run.state_name(), "submitted"),
            Submission::NotStarted { .. } => panic!("job was created"),
        }

        let run = WarpRun::render("abcd1234", "ns", Vec::new());
        match run.submit(applied_with(&["ConfigMap/warp-config"])) {
            Submission::Started(_) => panic!("job was not created"),
            Submission::NotStarted { job_name, applied } => {
                assert_eq!(job_name, "warp-abcd1234");
                assert_eq!(applied.created.len(), 1);
            }
        }
    }

    #[test]
    fn observe_until_terminal() {
        let run = WarpRun::resume("warp-abcd1234", "ns");
        assert_eq!(run.job_suffix(), "abcd1234");

        let run = match run.observe(snapshot(RunStatus::Running)) {
            Observation::Pending(run) => run,
            Observation::Finished(_) => panic!("running is not terminal"),
        };
        assert_eq!(run.last().map(|s| &s.status), Some(&RunStatus::Running));

        match run.observe(snapshot(RunStatus::Succeeded)) {
            Observation::Finished(run) => assert!(run.succeeded()),
            Observation::Pending(_) => panic!("succeeded is terminal"),
        }
    }
}
