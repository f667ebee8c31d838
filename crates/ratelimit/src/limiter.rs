// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared, awaitable token bucket.
//!
//! [`TokenBucketLimiter`] wraps the unsynchronized [`Limiter`] in a mutex so a
//! single instance can be shared by many tasks through an `Arc`. The lock is
//! only held while reserving or cancelling, never across an `.await`.

use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::context::Context;
use crate::tokenbucket::{Clock, Limit, Limiter, TokioClock};
use crate::Error;

/// Admission rate in permits per second.
///
/// The rate doubles as the burst capacity: at most one second's worth of
/// permits accumulates while idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSpec {
    /// Permits granted per second (must be positive).
    pub permits_per_second: NonZeroU32,
}

impl RateSpec {
    /// Creates a rate of `permits_per_second`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLimit` for a zero rate.
    pub fn new(permits_per_second: u32) -> Result<Self, Error> {
        NonZeroU32::new(permits_per_second)
            .map(|permits_per_second| Self { permits_per_second })
            .ok_or(Error::InvalidLimit {
                rate: f64::from(permits_per_second),
            })
    }

    /// Permits granted per second.
    pub fn permits_per_second(self) -> u32 {
        self.permits_per_second.get()
    }

    /// Steady-state spacing between two permits.
    pub fn interval(self) -> Duration {
        Duration::from_secs(1) / self.permits_per_second.get()
    }

    /// The rate as a token bucket limit.
    pub fn limit(self) -> Limit {
        Limit::per_second(self.permits_per_second)
    }

    /// Burst capacity, equal to one second's worth of permits.
    pub fn burst(self) -> NonZeroUsize {
        NonZeroUsize::new(self.permits_per_second.get() as usize).unwrap_or(NonZeroUsize::MIN)
    }
}

/// Token bucket that callers can wait on.
///
/// Waiters are not served in arrival order; the only guarantee is that
/// admissions over time never exceed the configured rate plus burst.
pub struct TokenBucketLimiter<C: Clock = TokioClock> {
    state: Mutex<Limiter<C>>,
}

impl TokenBucketLimiter<TokioClock> {
    /// Creates a limiter admitting `rate` permits per second with a burst of
    /// one second's worth of permits. The bucket starts full.
    pub fn new(rate: RateSpec) -> Self {
        debug!(
            permits_per_second = rate.permits_per_second(),
            "Creating token bucket limiter"
        );
        Self {
            state: Mutex::new(Limiter::with_burst(rate.limit(), rate.burst(), TokioClock)),
        }
    }
}

impl<C: Clock + Send> TokenBucketLimiter<C> {
    /// Creates a limiter from explicit parts.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBurst` if burst is zero.
    pub fn with_clock(limit: Limit, burst: usize, clock: C) -> Result<Self, Error> {
        Ok(Self {
            state: Mutex::new(Limiter::new(limit, burst, clock)?),
        })
    }

    /// Returns the maximum burst size.
    pub fn burst(&self) -> usize {
        self.lock().burst()
    }

    /// Returns the number of permits available now. Negative while waiters
    /// hold reservations.
    pub fn available(&self) -> f64 {
        self.lock().tokens()
    }

    /// Takes one permit if it is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        let now = state.now();
        state.reserve_n_within(now, 1, Some(Duration::ZERO)).is_ok()
    }

    /// Waits for one permit.
    ///
    /// # Errors
    ///
    /// See [`TokenBucketLimiter::acquire_n`].
    pub async fn acquire(&self, ctx: &Context) -> Result<(), Error> {
        self.acquire_n(ctx, 1).await
    }

    /// Waits until `n` permits are available and consumes them.
    ///
    /// # Errors
    ///
    /// - `Error::Cancelled` / `Error::DeadlineExceeded` if the context fires
    ///   first. Any tokens reserved for this call are returned to the bucket.
    /// - `Error::WouldExceedDeadline` if the permits cannot be granted before
    ///   the context deadline. Nothing is consumed.
    /// - `Error::InvalidTokenCount` / `Error::BurstExceeded` for `n == 0` or
    ///   `n` above the burst.
    pub async fn acquire_n(&self, ctx: &Context, n: usize) -> Result<(), Error> {
        if let Some(done) = ctx.err() {
            return Err(done.into());
        }

        let (reservation, now) = {
            let mut state = self.lock();
            let now = state.now();
            let max_wait = ctx
                .deadline()
                .map(|deadline| deadline.into_std().saturating_duration_since(now));
            (state.reserve_n_within(now, n, max_wait)?, now)
        };

        let delay = reservation.delay_from(now);
        if delay.is_zero() {
            return Ok(());
        }

        trace!(?delay, "Waiting for permit");
        tokio::select! {
            biased;

            _ = tokio::time::sleep(delay) => Ok(()),

            done = ctx.done() => {
                let mut state = self.lock();
                let now = state.now();
                state.cancel_at(&reservation, now);
                Err(done.into())
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Limiter<C>> {
        // Limiter state is consistent between calls, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
