// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! What an executor runs, and what it reports back.

use std::time::Duration;

use paced_ratelimit::RateSpec;

use crate::error::ExecuteError;

/// A unit of work, how many times to run it, and how fast.
///
/// Immutable once built. Consumed by the executor that owns it.
#[derive(Debug, Clone)]
pub struct ExecutionPlan<W> {
    rate: RateSpec,
    total_invocations: usize,
    work: W,
}

impl<W> ExecutionPlan<W> {
    /// Creates a plan running `work` `total_invocations` times at no more
    /// than `permits_per_second` invocations per second.
    ///
    /// # Errors
    ///
    /// Returns `ExecuteError::Limiter` for a zero rate.
    pub fn new(
        permits_per_second: u32,
        total_invocations: usize,
        work: W,
    ) -> Result<Self, ExecuteError> {
        Ok(Self::with_rate(
            RateSpec::new(permits_per_second)?,
            total_invocations,
            work,
        ))
    }

    /// Creates a plan from an already validated rate.
    pub fn with_rate(rate: RateSpec, total_invocations: usize, work: W) -> Self {
        Self {
            rate,
            total_invocations,
            work,
        }
    }

    /// The admission rate.
    pub fn rate(&self) -> RateSpec {
        self.rate
    }

    /// Number of invocations to run.
    pub fn total_invocations(&self) -> usize {
        self.total_invocations
    }

    /// The work being repeated.
    pub fn work(&self) -> &W {
        &self.work
    }

    pub(crate) fn into_parts(self) -> (RateSpec, usize, W) {
        (self.rate, self.total_invocations, self.work)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Invocations whose work returned.
    pub invocations: usize,
    /// Wall time from the first admission attempt until the last task finished.
    pub elapsed: Duration,
}
