// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Command line driver for the paced executors.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use paced_executor::{
    from_fn, ExecutionReport, Executor, ExecutorConfig, Mode, RateLimitedExecutor, Work,
};
use paced_ratelimit::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::counter::{Counter, CounterStore, SINGLE_COUNTER_KEY};

mod counter;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.blue} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} ({per_sec})";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Increment one stored counter per invocation.
    Counter,
    /// Print a greeting per invocation.
    Hello,
}

#[derive(Debug, Parser)]
#[command(name = "paced")]
#[command(about = "Run work at a bounded rate, sequentially or concurrently", long_about = None)]
#[command(version)]
struct Args {
    /// YAML executor configuration. Flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum invocations per second.
    #[arg(short, long)]
    rate: Option<u32>,

    /// Number of invocations.
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Dispatch mode: sequential or concurrent.
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Upper bound for the whole run, e.g. "30s".
    #[arg(short, long)]
    timeout: Option<humantime::Duration>,

    /// What each invocation does.
    #[arg(short, long, value_enum, default_value = "counter")]
    scenario: Scenario,
}

impl Args {
    fn executor_config(&self) -> Result<ExecutorConfig> {
        let mut config = match &self.config {
            Some(path) => ExecutorConfig::from_path(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ExecutorConfig::default(),
        };
        if let Some(rate) = self.rate {
            config.rate_per_second = rate;
        }
        if let Some(count) = self.count {
            config.invocations = count;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = Some(timeout.into());
        }
        Ok(config.validated()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init()?;

    let args = Args::parse();
    let config = args.executor_config()?;

    let root = Context::background();
    let interrupt = root.clone();
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            interrupt.cancel();
        }
    });
    let ctx = config.context(&root);

    match args.scenario {
        Scenario::Counter => count_by_single_counter(&config, &ctx).await,
        Scenario::Hello => say_hello(&config, &ctx).await,
    }
}

/// Installs the global tracing subscriber, filtered by `RUST_LOG`.
fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    Ok(())
}

async fn say_hello(config: &ExecutorConfig, ctx: &Context) -> Result<()> {
    let report = run(config, from_fn(|| println!("OK!!")), ctx).await?;
    info!(invocations = report.invocations, elapsed = ?report.elapsed, "Done");
    Ok(())
}

async fn count_by_single_counter(config: &ExecutorConfig, ctx: &Context) -> Result<()> {
    let store = Arc::new(CounterStore::new());
    store.put(SINGLE_COUNTER_KEY, Counter::default());

    let (finished_tx, finished_rx) = mpsc::channel(config.invocations.max(1));
    let progress = tokio::spawn(track_progress(finished_rx, config.invocations));

    let work = counter::increment_work(Arc::clone(&store), SINGLE_COUNTER_KEY, finished_tx);
    let result = run(config, work, ctx).await;

    // The executor dropped the last sender, so the tracker sees the channel close.
    progress.await.context("progress tracker failed")?;
    let report = result?;

    let counter = store.get(SINGLE_COUNTER_KEY)?;
    println!("{counter}");
    info!(
        invocations = report.invocations,
        count = counter.count,
        elapsed = ?report.elapsed,
        "Done"
    );
    Ok(())
}

async fn run<W: Work>(config: &ExecutorConfig, work: W, ctx: &Context) -> Result<ExecutionReport> {
    let executor = RateLimitedExecutor::from_config(config, work)?;
    info!(
        mode = %executor.mode(),
        rate_per_second = config.rate_per_second,
        invocations = config.invocations,
        "Running"
    );
    executor.execute(ctx).await.context("run failed")
}

/// Renders one progress step per completion until every sender is gone.
async fn track_progress(mut finished: mpsc::Receiver<()>, total: usize) {
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template(PROGRESS_TEMPLATE) {
        pb.set_style(style);
    }
    while finished.recv().await.is_some() {
        pb.inc(1);
    }
    pb.finish();
}
