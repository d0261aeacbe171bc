//! `arena throughput`.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use arena_control::{
    best_endpoint, compare, summarize as summarize_report, Endpoint, ObjectStorage, ThroughputConfig,
    ThroughputHarness, ThroughputReport, ThroughputSummary,
};
use serde::Deserialize;
use tracing::warn;

use super::{connect_storage, print_json};

/// A saved report file: one run, or one run per compared endpoint.
#[derive(Deserialize)]
#[serde(untagged)]
enum SavedReports {
    Comparison(Vec<ThroughputReport>),
    Single(Box<ThroughputReport>),
}

pub async fn run(
    config: &Path,
    bucket: &str,
    workers: Option<u32>,
    endpoints: &[Endpoint],
    output: Option<&Path>,
) -> Result<()> {
    let (config, _, storage) = connect_storage(config).await?;
    let mut settings = config.throughput.clone();
    if let Some(workers) = workers {
        settings.workers = workers;
    }

    if endpoints.is_empty() {
        let report = run_one(&storage, bucket, settings).await?;
        write_output(output, &report).await?;
        return print_summary(&report);
    }

    let pause = Duration::from_secs(settings.comparison_pause_secs);
    let mut reports = Vec::new();
    for (i, &endpoint) in endpoints.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(pause).await;
        }
        let session = storage.for_endpoint(endpoint, &config.storage);
        eprintln!("Testing {endpoint} ({})", session.endpoint_url());
        match run_one(&session, bucket, settings.clone()).await {
            Ok(report) => reports.push(report),
            Err(e) => warn!(endpoint = %endpoint, error = %e, "endpoint run failed"),
        }
    }

    write_output(output, &reports).await?;
    print_comparison(&reports)
}

async fn run_one(storage: &ObjectStorage, bucket: &str, settings: ThroughputConfig) -> Result<ThroughputReport> {
    if let Err(e) = storage.ensure_bucket(bucket).await {
        warn!(bucket, error = %e, "could not make sure the bucket exists, continuing");
    }

    let store = storage.store(bucket).await?;
    let harness = ThroughputHarness::new(store, bucket, storage.endpoint().as_str(), settings);
    Ok(harness.run().await)
}

async fn write_output<T: serde::Serialize + ?Sized>(output: Option<&Path>, value: &T) -> Result<()> {
    let Some(path) = output else {
        return Ok(());
    };
    tokio::fs::write(path, serde_json::to_vec_pretty(value)?)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    eprintln!("Report written to {}", path.display());
    Ok(())
}

pub async fn summarize(file: &Path) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let saved: SavedReports = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a throughput report", file.display()))?;

    match saved {
        SavedReports::Single(report) => print_summary(&report),
        SavedReports::Comparison(reports) => print_comparison(&reports),
    }
}

fn print_summary(report: &ThroughputReport) -> Result<()> {
    for error in &report.errors {
        eprintln!("Worker {} failed: {}", error.worker_id, error.error);
    }

    let Some(summary) = summarize_report(report) else {
        bail!("no worker completed successfully");
    };
    print_table(&summary);
    print_json(&summary)
}

fn print_comparison(reports: &[ThroughputReport]) -> Result<()> {
    let summaries = compare(reports);

    eprintln!("{:<10} {:>10} {:>10}", "Endpoint", "Workers", "GB/s");
    for entry in &summaries {
        match &entry.summary {
            Some(summary) => eprintln!(
                "{:<10} {:>10} {:>10.2}",
                entry.endpoint,
                format!("{}/{}", summary.successful_workers, summary.workers),
                summary.aggregate_gbps
            ),
            None => eprintln!("{:<10} {:>10} {:>10}", entry.endpoint, "0", "-"),
        }
    }

    let Some(best) = best_endpoint(&summaries) else {
        bail!("no endpoint completed successfully");
    };
    let gbps = best.summary.as_ref().map_or(0.0, |s| s.aggregate_gbps);
    eprintln!("Best: {} ({gbps:.2} GB/s)", best.endpoint);

    print_json(&serde_json::json!({
        "endpoints": summaries,
        "best": best.endpoint,
    }))
}

fn print_table(summary: &ThroughputSummary) {
    eprintln!(
        "{}/{} workers, {:.2} GB in {:.1}s",
        summary.successful_workers, summary.workers, summary.total_data_gb, summary.duration_secs
    );
    eprintln!(
        "Aggregate {:.1} MB/s ({:.2} GB/s), {:.1} MB/s per worker",
        summary.aggregate_mbps, summary.aggregate_gbps, summary.avg_per_worker_mbps
    );
    for (gpu, stats) in &summary.per_gpu {
        eprintln!("  GPU {gpu}: {} workers, {:.1} MB/s", stats.workers, stats.avg_mbps);
    }
}
