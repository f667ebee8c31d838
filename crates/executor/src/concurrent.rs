// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Fans the work out to one task per invocation.
//!
//! Every task shares a single limiter, so the admission rate is global no
//! matter how many tasks are waiting. There is no cap on the number of
//! tasks alive at once.
//!
//! The first failed permit wait ends admissions for the whole run: tasks
//! still waiting are cancelled, tasks already admitted finish their work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use paced_ratelimit::{Context, RateSpec, TokenBucketLimiter};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::ExecuteError;
use crate::plan::{ExecutionPlan, ExecutionReport};
use crate::work::Work;
use crate::Executor;

/// Spawns every invocation up front and waits for all of them.
#[derive(Debug, Clone)]
pub struct ConcurrentExecutor<W> {
    plan: ExecutionPlan<W>,
}

impl<W: Work> ConcurrentExecutor<W> {
    /// Creates an executor running `work` `invocations` times at no more
    /// than `permits_per_second` invocations per second.
    ///
    /// # Errors
    ///
    /// Returns `ExecuteError::Limiter` for a zero rate.
    pub fn new(
        permits_per_second: u32,
        invocations: usize,
        work: W,
    ) -> Result<Self, ExecuteError> {
        Ok(Self::from_plan(ExecutionPlan::new(
            permits_per_second,
            invocations,
            work,
        )?))
    }

    /// Creates an executor from a prepared plan.
    pub fn from_plan(plan: ExecutionPlan<W>) -> Self {
        Self { plan }
    }

    /// The plan this executor will run.
    pub fn plan(&self) -> &ExecutionPlan<W> {
        &self.plan
    }
}

impl<W: Work> Executor for ConcurrentExecutor<W> {
    async fn execute(self, ctx: &Context) -> Result<ExecutionReport, ExecuteError> {
        let (rate, total, work) = self.plan.into_parts();
        run(rate, total, Arc::new(work), ctx).await
    }
}

async fn run<W: Work>(
    rate: RateSpec,
    total: usize,
    work: Arc<W>,
    ctx: &Context,
) -> Result<ExecutionReport, ExecuteError> {
    info!(
        permits_per_second = rate.permits_per_second(),
        invocations = total,
        "Starting concurrent execution"
    );
    let limiter = Arc::new(TokenBucketLimiter::new(rate));
    let completed = Arc::new(AtomicUsize::new(0));
    let admissions = ctx.child();
    let start = Instant::now();

    let mut tasks = JoinSet::new();
    for _ in 0..total {
        let limiter = Arc::clone(&limiter);
        let work = Arc::clone(&work);
        let ctx = admissions.clone();
        let completed = Arc::clone(&completed);
        let _ = tasks.spawn(async move {
            limiter.acquire(&ctx).await?;
            work.invoke().await;
            let _ = completed.fetch_add(1, Ordering::Relaxed);
            Ok::<(), paced_ratelimit::Error>(())
        });
    }
    debug!(tasks = total, "Spawned invocation tasks");

    // Admitted work is never aborted, so drain the whole set even after a failure.
    let mut failure: Option<paced_ratelimit::Error> = None;
    let mut panicked = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if failure.is_none() {
                    debug!(error = %e, "Permit wait failed, stopping admissions");
                    admissions.cancel();
                    failure = Some(e);
                }
            }
            Err(join_error) if join_error.is_panic() => {
                panicked += 1;
                error!(error = %join_error, "Invocation panicked");
            }
            Err(join_error) => {
                warn!(error = %join_error, "Invocation task did not finish");
            }
        }
    }

    let completed = completed.load(Ordering::Relaxed);
    let elapsed = start.elapsed();
    if let Some(e) = failure {
        warn!(completed, total, error = %e, "Concurrent execution aborted");
        return Err(ExecuteError::aborted(e, completed, total));
    }

    info!(
        invocations = completed,
        panicked,
        ?elapsed,
        "Concurrent execution completed"
    );
    Ok(ExecutionReport {
        invocations: completed,
        elapsed,
    })
}
