//! `arena warp`.

use std::path::Path;

use anyhow::{bail, Result};
use arena_control::{Finished, Submission, WarpRun, WarpRunner};

use super::{connect_cluster, connect_storage, print_json};

pub async fn run(config: &Path, bucket: &str, watch: bool) -> Result<()> {
    let (config, cluster, storage) = connect_storage(config).await?;
    let target = storage.warp_target(bucket).await?;
    let runner = WarpRunner::new(cluster, config.warp, &config.cluster.namespace);

    match runner.start(&target).await? {
        Submission::Started(run) => {
            println!("Started {}", run.job_name());
            if let Some(applied) = run.applied() {
                print_json(applied)?;
            }
            if watch {
                let finished = runner.watch(run, runner.poll_interval()).await?;
                report(&finished)?;
            }
            Ok(())
        }
        Submission::NotStarted { job_name, applied } => {
            print_json(&applied)?;
            bail!("job {job_name} already exists, benchmark not started");
        }
    }
}

pub async fn status(config: &Path, job: &str) -> Result<()> {
    let (config, cluster) = connect_cluster(config).await?;
    let runner = WarpRunner::new(cluster, config.warp, &config.cluster.namespace);

    let snapshot = runner.poll(job).await?;
    print_json(&snapshot)
}

pub async fn watch(config: &Path, job: &str) -> Result<()> {
    let (config, cluster) = connect_cluster(config).await?;
    let runner = WarpRunner::new(cluster, config.warp, &config.cluster.namespace);

    let run = WarpRun::resume(job, runner.namespace());
    let finished = runner.watch(run, runner.poll_interval()).await?;
    report(&finished)
}

fn report(finished: &WarpRun<Finished>) -> Result<()> {
    if let Some(result) = finished.result() {
        if let Some(logs) = result.logs.as_deref() {
            println!("{logs}");
        }
        eprintln!("{} {}", finished.job_name(), result.status);
    }
    if !finished.succeeded() {
        bail!("benchmark {} did not succeed", finished.job_name());
    }
    Ok(())
}
