//! Warp benchmark lifecycle against an in-memory cluster.

mod common;

use std::sync::Arc;
use std::time::Duration;

use arena_control::cluster::{ClusterClient, MemoryCluster};
use arena_control::config::WarpConfig;
use arena_control::state::{Observation, RunStatus, Submission, WarpRun};
use arena_control::warp::{WarpRunner, WarpTarget, WARP_NAME};
use arena_control::ControlError;
use arena_credentials::SecretValue;
use common::fixtures::{gpu_nodes, NodeBuilder};

const NAMESPACE: &str = "bench";

fn target() -> WarpTarget {
    WarpTarget {
        bucket: "bench".to_owned(),
        region: "US-EAST-04A".to_owned(),
        endpoint: "http://cwlota.com".to_owned(),
        access_key_id: "AKIA00000001".to_owned(),
        secret_access_key: SecretValue::new("secret-1"),
    }
}

fn runner(cluster: &Arc<MemoryCluster>) -> WarpRunner {
    let shared: Arc<dyn ClusterClient> = cluster.clone();
    WarpRunner::new(shared, WarpConfig::default(), NAMESPACE)
}

#[tokio::test]
async fn start_applies_the_whole_manifest() {
    let cluster = Arc::new(MemoryCluster::with_nodes(gpu_nodes(4, "US-EAST-04")));
    let runner = runner(&cluster);

    let Submission::Started(run) = runner.start(&target()).await.unwrap() else {
        panic!("expected the run to start");
    };

    assert_eq!(run.state_name(), "submitted");
    assert!(run.job_name().starts_with("warp-"));
    assert_eq!(cluster.names_of("ConfigMap").unwrap(), vec!["warp-config"]);
    assert_eq!(cluster.names_of("Service").unwrap(), vec![WARP_NAME]);
    assert_eq!(cluster.names_of("StatefulSet").unwrap(), vec![WARP_NAME]);
    assert_eq!(cluster.names_of("Job").unwrap(), vec![run.job_name().to_owned()]);

    let statefulset = cluster
        .resource("StatefulSet", NAMESPACE, WARP_NAME)
        .unwrap()
        .unwrap();
    assert_eq!(statefulset["spec"]["replicas"], 3);

    let applied = run.applied().unwrap();
    assert_eq!(applied.created.len(), 4);
}

#[tokio::test]
async fn second_start_updates_shared_resources() {
    let cluster = Arc::new(MemoryCluster::with_nodes(gpu_nodes(2, "US-EAST-04")));
    let runner = runner(&cluster);

    assert!(matches!(runner.start(&target()).await.unwrap(), Submission::Started(_)));
    let Submission::Started(second) = runner.start(&target()).await.unwrap() else {
        panic!("a fresh suffix should start a new job");
    };

    let applied = second.applied().unwrap();
    assert_eq!(applied.created, vec![format!("Job/{}", second.job_name())]);
    assert_eq!(applied.updated.len(), 3);
    assert_eq!(cluster.names_of("Job").unwrap().len(), 2);
}

#[tokio::test]
async fn resubmitting_the_same_run_does_not_start_it() {
    let cluster = Arc::new(MemoryCluster::with_nodes(gpu_nodes(2, "US-EAST-04")));
    let runner = runner(&cluster);

    let plan = runner.plan().await.unwrap();
    let first = runner.render(&plan, &target()).unwrap();
    assert!(matches!(runner.submit(first).await.unwrap(), Submission::Started(_)));

    let again = runner.render(&plan, &target()).unwrap();
    match runner.submit(again).await.unwrap() {
        Submission::NotStarted { job_name, applied } => {
            assert_eq!(job_name, plan.job_name());
            assert!(applied
                .unchanged
                .iter()
                .any(|u| u.starts_with(&format!("Job/{job_name}"))));
        }
        Submission::Started(_) => panic!("job already existed"),
    }
}

#[tokio::test]
async fn a_single_host_is_not_enough() {
    let cluster = Arc::new(MemoryCluster::with_nodes(vec![NodeBuilder::new("cpu-0").build()]));
    let runner = runner(&cluster);

    let err = runner.start(&target()).await.unwrap_err();
    assert!(matches!(err, ControlError::InsufficientNodes { found: 1 }));
    assert_eq!(cluster.creates().unwrap(), 0);
}

#[tokio::test]
async fn poll_follows_the_coordinator_pod() {
    let cluster = Arc::new(MemoryCluster::with_nodes(gpu_nodes(2, "US-EAST-04")));
    let runner = runner(&cluster);
    let job = "warp-abc12345";

    let snapshot = runner.poll(job).await.unwrap();
    assert_eq!(snapshot.status, RunStatus::NoPodsFound);
    assert_eq!(snapshot.job_suffix, "abc12345");
    assert!(snapshot.pod_name.is_none());

    cluster
        .add_pod(NAMESPACE, "warp-abc12345-x1", &[("job-name", job)], Some("gpu-0"))
        .unwrap();
    let snapshot = runner.poll(job).await.unwrap();
    assert_eq!(snapshot.status, RunStatus::Other("unknown".to_owned()));
    assert!(snapshot.logs.is_none());

    cluster.set_pod_phase(NAMESPACE, "warp-abc12345-x1", "Pending").unwrap();
    assert_eq!(runner.poll(job).await.unwrap().status, RunStatus::Pending);

    cluster.set_pod_phase(NAMESPACE, "warp-abc12345-x1", "Running").unwrap();
    cluster
        .set_logs(NAMESPACE, "warp-abc12345-x1", WARP_NAME, "preparing objects")
        .unwrap();
    let snapshot = runner.poll(job).await.unwrap();
    assert_eq!(snapshot.status, RunStatus::Running);
    assert_eq!(snapshot.pod_name.as_deref(), Some("warp-abc12345-x1"));
    assert_eq!(snapshot.logs.as_deref(), Some("preparing objects"));
}

#[tokio::test]
async fn log_failures_are_reported_as_empty_logs() {
    let cluster = Arc::new(MemoryCluster::with_nodes(gpu_nodes(2, "US-EAST-04")));
    let runner = runner(&cluster);
    let job = "warp-deadbeef";

    cluster
        .add_pod(NAMESPACE, "warp-deadbeef-x1", &[("job-name", job)], None)
        .unwrap();
    cluster.set_pod_phase(NAMESPACE, "warp-deadbeef-x1", "Failed").unwrap();
    cluster.fail_logs(true).unwrap();

    let snapshot = runner.poll(job).await.unwrap();
    assert_eq!(snapshot.status, RunStatus::Failed);
    assert_eq!(snapshot.logs.as_deref(), Some(""));
}

#[tokio::test]
async fn poll_ignores_pods_of_other_jobs() {
    let cluster = Arc::new(MemoryCluster::with_nodes(gpu_nodes(2, "US-EAST-04")));
    let runner = runner(&cluster);

    cluster
        .add_pod(NAMESPACE, "warp-other-x1", &[("job-name", "warp-other")], None)
        .unwrap();
    cluster
        .add_pod("elsewhere", "warp-mine-x1", &[("job-name", "warp-mine")], None)
        .unwrap();

    assert_eq!(runner.poll("warp-mine").await.unwrap().status, RunStatus::NoPodsFound);
}

#[tokio::test]
async fn watch_returns_once_the_job_finishes() {
    let cluster = Arc::new(MemoryCluster::with_nodes(gpu_nodes(2, "US-EAST-04")));
    let runner = runner(&cluster);
    let job = "warp-feedface";

    cluster
        .add_pod(NAMESPACE, "warp-feedface-x1", &[("job-name", job)], None)
        .unwrap();
    cluster.set_pod_phase(NAMESPACE, "warp-feedface-x1", "Running").unwrap();

    let run = WarpRun::resume(job, NAMESPACE);
    let snapshot = runner.poll(job).await.unwrap();
    let Observation::Pending(run) = run.observe(snapshot) else {
        panic!("a running job is not finished");
    };

    let finisher = {
        let cluster = Arc::clone(&cluster);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cluster
                .set_logs(NAMESPACE, "warp-feedface-x1", WARP_NAME, "Throughput 9.1 GiB/s")
                .unwrap();
            cluster
                .set_pod_phase(NAMESPACE, "warp-feedface-x1", "Succeeded")
                .unwrap();
        })
    };

    let finished = runner.watch(run, Duration::from_millis(10)).await.unwrap();
    finisher.await.unwrap();

    assert!(finished.succeeded());
    let result = finished.into_result().unwrap();
    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.logs.as_deref(), Some("Throughput 9.1 GiB/s"));
}
