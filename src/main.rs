mod collectors;
mod config;
mod counter;
mod error;
mod format;
mod logger;
mod reporter;
mod sampler;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use collectors::disk::DriveFilter;
use collectors::Sources;
use config::{Config, DEFAULT_CONFIG_PATH};
use reporter::PeriodicReporter;
use sampler::MetricsSampler;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// How long exit waits for blocking queries still running. A query stuck in
/// the OS keeps its thread, so this bounds shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("hostmon-worker")
        .enable_all()
        .build()
        .context("Failed building the tokio runtime")?;

    let result = runtime.block_on(run());
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    // --oneshot prints the report once and exits without the periodic sampler
    let oneshot = args.iter().any(|arg| arg == "--oneshot");
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = Config::load(&config_path)?;
    logger::init(&config.log_level);
    debug!("Loaded config: {:?}", config);

    let sampler = Arc::new(MetricsSampler::new(Sources::platform(DriveFilter::new(
        &config.drives,
    ))));

    if oneshot {
        let report = sampler::query(&sampler, config.query_timeout(), "report", |s| {
            Ok((s.collect_snapshot(), s.system_facts()))
        })
        .await;
        match report {
            Ok((snapshot, facts)) => {
                snapshot.lines().chain(facts.lines()).for_each(|line| println!("{}", line));
            }
            Err(e) => warn!("Report not collected: {}", e),
        }
        return Ok(());
    }

    // Every stdout line goes through one printer so report lines and periodic
    // CPU lines never interleave mid-line.
    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
    let printer = tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            println!("{}", line);
        }
    });

    info!(
        "Sampling CPU every {:?}, query timeout {:?}",
        config.sample_interval(),
        config.query_timeout()
    );
    let reporter = PeriodicReporter::spawn(
        sampler.clone(),
        config.sample_interval(),
        config.query_timeout(),
        line_tx.clone(),
    );

    let snapshot = sampler::collect_snapshot_bounded(&sampler, config.query_timeout()).await;
    for line in snapshot.lines() {
        line_tx.send(line).await?;
    }
    let facts = sampler::system_facts_bounded(&sampler, config.query_timeout()).await;
    for line in facts.lines() {
        line_tx.send(line).await?;
    }

    wait_for_exit().await;

    reporter.shutdown().await;
    drop(line_tx);
    printer.await?;
    Ok(())
}

/// Blocks until a line (or EOF) arrives on stdin, or Ctrl-C.
async fn wait_for_exit() {
    // A plain thread: a pending stdin read cannot be cancelled and must not
    // hold up runtime shutdown.
    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        let mut line = String::new();
        if let Err(e) = std::io::stdin().read_line(&mut line) {
            warn!("Failed to read stdin: {}", e);
        }
        let _ = tx.send(());
    });

    tokio::select! {
        _ = rx => debug!("Input received, shutting down"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Interrupted, shutting down"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        },
    }
}
