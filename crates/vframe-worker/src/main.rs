//! Ingest worker binary.
//!
//! Reads newline-delimited JSON jobs from a file (or stdin when no path or `-`
//! is given), runs them in order and exits non-zero if any failed.

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vframe_models::Job;
use vframe_worker::{TaskExecutor, WorkerConfig};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,vframe=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Parse one job per line. Blank lines and `#` comments are skipped.
fn parse_jobs(input: &str) -> anyhow::Result<Vec<Job>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str::<Job>(line)
                .with_context(|| format!("Invalid job on line {}", index + 1))
        })
        .collect()
}

async fn read_jobs(source: Option<&str>) -> anyhow::Result<Vec<Job>> {
    let input = match source {
        Some(path) if path != "-" => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read jobs from {}", path))?,
        _ => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read jobs from stdin")?;
            buf
        }
    };
    parse_jobs(&input)
}

async fn run() -> anyhow::Result<bool> {
    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    let source = std::env::args().nth(1);
    let jobs = read_jobs(source.as_deref()).await?;
    if jobs.is_empty() {
        warn!("No jobs to run");
        return Ok(true);
    }

    let executor = TaskExecutor::from_config(config)?;
    executor.memory().on_high_memory(|reading| {
        warn!(
            usage_percent = reading.usage_percent,
            "Memory pressure; queued jobs will wait for admission"
        );
        Ok(())
    });
    executor.memory().start_monitoring();

    info!(jobs = jobs.len(), "Submitting jobs");
    let handles: Vec<_> = jobs.into_iter().map(|job| executor.submit(job)).collect();
    let results = futures_util::future::join_all(handles).await;
    executor.wait_idle().await;
    executor.memory().stop_monitoring();

    let mut failed = 0;
    let mut skipped = 0;
    for result in &results {
        match result {
            Ok(outcome) if outcome.existing => skipped += 1,
            Ok(_) => {}
            Err(_) => failed += 1,
        }
    }
    info!(
        total = results.len(),
        completed = results.len() - failed - skipped,
        skipped,
        failed,
        "All jobs finished"
    );

    Ok(failed == 0)
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for HTTPS webhooks)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting vframe-worker");

    match run().await {
        Ok(true) => info!("Worker finished"),
        Ok(false) => {
            error!("One or more jobs failed");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Worker error: {:#}", e);
            std::process::exit(2);
        }
    }
}
