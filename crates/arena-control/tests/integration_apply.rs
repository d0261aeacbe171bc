//! Manifest application against an in-memory cluster.

mod common;

use std::sync::Arc;

use arena_control::apply::ManifestApplier;
use arena_control::cluster::{ClusterClient, MemoryCluster};
use arena_control::ControlError;

const MANIFEST: &str = r"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  mode: fast
---
apiVersion: batch/v1
kind: Job
metadata:
  name: once
  namespace: jobs
spec:
  template:
    spec:
      restartPolicy: Never
      containers:
        - name: main
          image: busybox
---
apiVersion: example.com/v1
kind: Widget
metadata:
  name: gadget
";

fn applier(cluster: &Arc<MemoryCluster>) -> ManifestApplier {
    let shared: Arc<dyn ClusterClient> = cluster.clone();
    ManifestApplier::new(shared)
}

#[tokio::test]
async fn applying_twice_is_idempotent() {
    let cluster = Arc::new(MemoryCluster::default());
    let applier = applier(&cluster);

    let first = applier.apply_yaml(MANIFEST, "bench").await.unwrap();
    assert_eq!(first.created, vec!["ConfigMap/settings", "Job/once"]);
    assert!(first.updated.is_empty());
    assert_eq!(first.unchanged, vec!["Widget/gadget (kind not supported)"]);

    let second = applier.apply_yaml(MANIFEST, "bench").await.unwrap();
    assert!(second.created.is_empty());
    assert_eq!(second.updated, vec!["ConfigMap/settings"]);
    assert_eq!(
        second.unchanged,
        vec![
            "Job/once (already exists, jobs are immutable)",
            "Widget/gadget (kind not supported)",
        ]
    );

    assert_eq!(cluster.creates().unwrap(), 2);
    assert_eq!(cluster.patches().unwrap(), 1);
    assert!(cluster.resource("ConfigMap", "bench", "settings").unwrap().is_some());
    assert!(cluster.resource("Job", "jobs", "once").unwrap().is_some());
}

#[tokio::test]
async fn a_failure_reports_what_was_already_applied() {
    let cluster = Arc::new(MemoryCluster::default());
    cluster.fail_reads_of("Job/once").unwrap();
    let applier = applier(&cluster);

    match applier.apply_yaml(MANIFEST, "bench").await {
        Err(ControlError::Apply { resource, applied, .. }) => {
            assert_eq!(resource, "Job/once");
            assert_eq!(applied.created, vec!["ConfigMap/settings"]);
        }
        other => panic!("expected an apply error, got {other:?}"),
    }

    assert!(cluster.resource("ConfigMap", "bench", "settings").unwrap().is_some());
    assert!(cluster.names_of("Widget").unwrap().is_empty());
}

#[tokio::test]
async fn invalid_yaml_applies_nothing() {
    let cluster = Arc::new(MemoryCluster::default());
    let applier = applier(&cluster);

    let err = applier.apply_yaml("kind: [unterminated", "bench").await.unwrap_err();
    assert!(matches!(err, ControlError::Manifest(_)));
    assert_eq!(cluster.creates().unwrap(), 0);
}
