// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Rate-limited execution of a repeated unit of work.
//!
//! An executor runs a [`Work`] a fixed number of times, admitting at most a
//! configured number of invocations per second:
//!
//! - [`SequentialExecutor`] awaits each invocation before the next one.
//! - [`ConcurrentExecutor`] spawns one task per invocation; all tasks share
//!   one limiter and `execute` returns once every task has finished.
//!
//! Every permit wait observes the [`Context`] passed to `execute`. When it
//! fires, the run ends with a typed error. Work that was already admitted
//! is never interrupted.

use std::future::Future;
use std::path::Path;

use paced_ratelimit::Context;
use validator::Validate;

pub mod config;
pub mod error;
pub mod work;

mod concurrent;
mod plan;
mod sequential;

pub use concurrent::ConcurrentExecutor;
pub use config::{ExecutorConfig, Mode};
pub use error::{ConfigError, ExecuteError};
pub use plan::{ExecutionPlan, ExecutionReport};
pub use sequential::SequentialExecutor;
pub use work::{from_async, from_fn, AsyncFnWork, FnWork, Work};

/// Runs a plan to completion.
///
/// `execute` consumes the executor: a finished or aborted run cannot be
/// resumed or started again.
pub trait Executor {
    /// Runs every invocation, waiting for a permit before each one.
    ///
    /// # Errors
    ///
    /// - `ExecuteError::Cancelled` if `ctx` is cancelled before all permits
    ///   are granted.
    /// - `ExecuteError::DeadlineExceeded` if the deadline of `ctx` passes, or
    ///   would pass, before all permits are granted.
    fn execute(
        self,
        ctx: &Context,
    ) -> impl Future<Output = Result<ExecutionReport, ExecuteError>> + Send;
}

/// Either executor, picked at runtime.
#[derive(Debug, Clone)]
pub enum RateLimitedExecutor<W> {
    /// See [`SequentialExecutor`].
    Sequential(SequentialExecutor<W>),
    /// See [`ConcurrentExecutor`].
    Concurrent(ConcurrentExecutor<W>),
}

impl<W: Work> RateLimitedExecutor<W> {
    /// Builds the executor selected by `config.mode`.
    ///
    /// # Errors
    ///
    /// Returns `ExecuteError::Config` if a field is out of range.
    pub fn from_config(config: &ExecutorConfig, work: W) -> Result<Self, ExecuteError> {
        config.validate().map_err(ConfigError::from)?;
        let plan = ExecutionPlan::with_rate(config.rate()?, config.invocations, work);
        Ok(match config.mode {
            Mode::Sequential => Self::Sequential(SequentialExecutor::from_plan(plan)),
            Mode::Concurrent => Self::Concurrent(ConcurrentExecutor::from_plan(plan)),
        })
    }

    /// Loads a YAML configuration file and builds the executor it selects.
    ///
    /// The configuration is returned too, for [`ExecutorConfig::context`].
    ///
    /// # Errors
    ///
    /// Returns `ExecuteError::Config` if the file cannot be read, parsed or
    /// validated.
    pub fn from_path(
        path: impl AsRef<Path>,
        work: W,
    ) -> Result<(Self, ExecutorConfig), ExecuteError> {
        let config = ExecutorConfig::from_path(path)?;
        let executor = Self::from_config(&config, work)?;
        Ok((executor, config))
    }

    /// The dispatch mode of this executor.
    pub fn mode(&self) -> Mode {
        match self {
            Self::Sequential(_) => Mode::Sequential,
            Self::Concurrent(_) => Mode::Concurrent,
        }
    }

    /// The plan this executor will run.
    pub fn plan(&self) -> &ExecutionPlan<W> {
        match self {
            Self::Sequential(executor) => executor.plan(),
            Self::Concurrent(executor) => executor.plan(),
        }
    }
}

impl<W: Work> Executor for RateLimitedExecutor<W> {
    async fn execute(self, ctx: &Context) -> Result<ExecutionReport, ExecuteError> {
        match self {
            Self::Sequential(executor) => executor.execute(ctx).await,
            Self::Concurrent(executor) => executor.execute(ctx).await,
        }
    }
}

/// Sequential executor over a synchronous closure.
///
/// # Errors
///
/// Returns `ExecuteError::Limiter` for a zero rate.
pub fn sequential<F>(
    permits_per_second: u32,
    invocations: usize,
    f: F,
) -> Result<SequentialExecutor<FnWork<F>>, ExecuteError>
where
    F: Fn() + Send + Sync + 'static,
{
    SequentialExecutor::new(permits_per_second, invocations, from_fn(f))
}

/// Concurrent executor over a synchronous closure.
///
/// # Errors
///
/// Returns `ExecuteError::Limiter` for a zero rate.
pub fn concurrent<F>(
    permits_per_second: u32,
    invocations: usize,
    f: F,
) -> Result<ConcurrentExecutor<FnWork<F>>, ExecuteError>
where
    F: Fn() + Send + Sync + 'static,
{
    ConcurrentExecutor::new(permits_per_second, invocations, from_fn(f))
}
