// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Runs the work one invocation at a time.

use paced_ratelimit::{Context, RateSpec, TokenBucketLimiter};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ExecuteError;
use crate::plan::{ExecutionPlan, ExecutionReport};
use crate::work::Work;
use crate::Executor;

/// Awaits each invocation before asking for the next permit.
///
/// The limiter only matters when the work is faster than the configured
/// interval; slower work is paced by itself.
#[derive(Debug, Clone)]
pub struct SequentialExecutor<W> {
    plan: ExecutionPlan<W>,
}

impl<W: Work> SequentialExecutor<W> {
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

impl<W: Work> Executor for SequentialExecutor<W> {
    async fn execute(self, ctx: &Context) -> Result<ExecutionReport, ExecuteError> {
        let (rate, total, work) = self.plan.into_parts();
        run(rate, total, work, ctx).await
    }
}

async fn run<W: Work>(
    rate: RateSpec,
    total: usize,
    work: W,
    ctx: &Context,
) -> Result<ExecutionReport, ExecuteError> {
    info!(
        permits_per_second = rate.permits_per_second(),
        invocations = total,
        "Starting sequential execution"
    );
    let limiter = TokenBucketLimiter::new(rate);
    let start = Instant::now();

    for completed in 0..total {
        if let Err(e) = limiter.acquire(ctx).await {
            warn!(completed, total, error = %e, "Sequential execution aborted");
            return Err(ExecuteError::aborted(e, completed, total));
        }
        debug!(invocation = completed, "Permit granted");
        work.invoke().await;
    }

    let elapsed = start.elapsed();
    info!(invocations = total, ?elapsed, "Sequential execution completed");
    Ok(ExecutionReport {
        invocations: total,
        elapsed,
    })
}
