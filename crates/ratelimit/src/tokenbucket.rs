// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Token bucket with booked, cancellable reservations.
//!
//! [`Limiter`] is plain state: it never sleeps and is not synchronized.
//! Callers book tokens and get back a [`Reservation`] saying when they may
//! proceed. Sharing one bucket between tasks, and sleeping until the
//! reservation comes due, is done by
//! [`TokenBucketLimiter`](crate::TokenBucketLimiter).

use std::num::{NonZeroU32, NonZeroUsize};
use std::time::{Duration, Instant};

use crate::Error;

/// Source of the current time for a [`Limiter`].
pub trait Clock {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// Wall-independent monotonic time from `std`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonoClock;

impl Clock for MonoClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time as seen by the tokio timer.
///
/// Honors `tokio::time::pause` and `advance`, so refill arithmetic and
/// `tokio::time::sleep` share one timeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

impl<T: Clock> Clock for &T {
    fn now(&self) -> Instant {
        T::now(self)
    }
}

/// Refill rate in tokens per second. Always finite and above zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit(f64);

impl Limit {
    /// Refill of `tokens_per_second`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLimit` for zero, negative, infinite or NaN rates.
    pub fn new(tokens_per_second: f64) -> Result<Self, Error> {
        if tokens_per_second.is_finite() && tokens_per_second > 0.0 {
            Ok(Limit(tokens_per_second))
        } else {
            Err(Error::InvalidLimit {
                rate: tokens_per_second,
            })
        }
    }

    /// Refill of one token per `interval`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLimit` for a zero interval.
    pub fn every(interval: Duration) -> Result<Self, Error> {
        Self::new(interval.as_secs_f64().recip())
    }

    /// Refill of a whole, non-zero number of tokens per second.
    pub fn per_second(tokens_per_second: NonZeroU32) -> Self {
        Limit(f64::from(tokens_per_second.get()))
    }

    /// Tokens added per second.
    pub fn rate(self) -> f64 {
        self.0
    }

    /// Time it takes to refill `tokens`. Zero for non-positive amounts.
    pub fn duration_from_tokens(self, tokens: f64) -> Duration {
        if tokens <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(tokens / self.0)
    }

    /// Tokens refilled over `duration`.
    pub fn tokens_from_duration(self, duration: Duration) -> f64 {
        self.0 * duration.as_secs_f64()
    }
}

/// Tokens booked for use at [`Reservation::time_to_act`].
///
/// Until that instant the booking can be returned with [`Limiter::cancel_at`].
#[derive(Debug, Clone)]
pub struct Reservation {
    tokens: usize,
    time_to_act: Instant,
    // Rate at booking time, used to size the refund on cancel.
    limit: Limit,
}

impl Reservation {
    /// How long after `now` the holder must wait. Zero once due.
    pub fn delay_from(&self, now: Instant) -> Duration {
        self.time_to_act.saturating_duration_since(now)
    }

    /// Instant at which the booked tokens may be used.
    pub fn time_to_act(&self) -> Instant {
        self.time_to_act
    }

    /// Number of booked tokens.
    pub fn tokens(&self) -> usize {
        self.tokens
    }
}

/// Token bucket refilled continuously at `limit` and capped at `burst`.
///
/// The bucket starts full. Reservations may drive the token count below
/// zero; each token of debt pushes the next booking one refill step further
/// into the future.
#[derive(Debug)]
pub struct Limiter<C: Clock> {
    limit: Limit,
    burst: usize,
    // Negative while bookings are outstanding.
    tokens: f64,
    // When `tokens` was last brought up to date.
    last: Instant,
    // Latest time_to_act handed out, possibly in the future.
    last_event: Instant,
    clock: C,
}

impl<C: Clock> Limiter<C> {
    /// Bucket refilled at `limit` holding at most `burst` tokens.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBurst` for a zero burst.
    pub fn new(limit: Limit, burst: usize, clock: C) -> Result<Self, Error> {
        match NonZeroUsize::new(burst) {
            Some(burst) => Ok(Self::with_burst(limit, burst, clock)),
            None => Err(Error::InvalidBurst { burst }),
        }
    }

    /// Same as [`Limiter::new`] for a burst that cannot be zero.
    pub fn with_burst(limit: Limit, burst: NonZeroUsize, clock: C) -> Self {
        let now = clock.now();
        Limiter {
            limit,
            burst: burst.get(),
            tokens: burst.get() as f64,
            last: now,
            last_event: now,
            clock,
        }
    }

    /// Reads the limiter's clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Refill rate.
    pub fn limit(&self) -> Limit {
        self.limit
    }

    /// Bucket capacity.
    pub fn burst(&self) -> usize {
        self.burst
    }

    /// Token count as of `at`, refill included.
    pub fn tokens_at(&self, at: Instant) -> f64 {
        self.advance_at(at)
    }

    /// Token count as of now.
    pub fn tokens(&self) -> f64 {
        self.tokens_at(self.clock.now())
    }

    /// Books `n` tokens starting now.
    ///
    /// # Errors
    ///
    /// `Error::InvalidTokenCount` for `n == 0`, `Error::BurstExceeded` when
    /// `n` can never fit in the bucket.
    pub fn reserve_n(&mut self, n: usize) -> Result<Reservation, Error> {
        let now = self.clock.now();
        self.reserve_n_at(now, n)
    }

    /// Books `n` tokens as of `at`, however long the wait.
    ///
    /// # Errors
    ///
    /// See [`Limiter::reserve_n`].
    pub fn reserve_n_at(&mut self, at: Instant, n: usize) -> Result<Reservation, Error> {
        self.reserve_n_within(at, n, None)
    }

    /// Books `n` tokens as of `at` unless that means waiting past `max_wait`.
    ///
    /// A refused booking changes nothing.
    ///
    /// # Errors
    ///
    /// `Error::WouldExceedDeadline` when the wait is longer than `max_wait`,
    /// plus the errors of [`Limiter::reserve_n`].
    pub fn reserve_n_within(
        &mut self,
        at: Instant,
        n: usize,
        max_wait: Option<Duration>,
    ) -> Result<Reservation, Error> {
        if n == 0 {
            return Err(Error::InvalidTokenCount { count: 0 });
        }
        if n > self.burst {
            return Err(Error::BurstExceeded {
                request: n,
                burst: self.burst,
            });
        }

        let tokens = self.advance_at(at) - n as f64;
        let wait = self.limit.duration_from_tokens(-tokens);
        match max_wait {
            Some(max_wait) if wait > max_wait => {
                return Err(Error::WouldExceedDeadline { wait, max_wait });
            }
            _ => {}
        }

        let time_to_act = at + wait;
        self.tokens = tokens;
        self.last = at;
        self.last_event = time_to_act;

        Ok(Reservation {
            tokens: n,
            time_to_act,
            limit: self.limit,
        })
    }

    /// Returns the tokens of a booking that will not be used.
    ///
    /// Only the part no later booking depends on is refunded. A booking
    /// already due at `at` is left alone.
    pub fn cancel_at(&mut self, reservation: &Reservation, at: Instant) {
        if reservation.tokens == 0 || reservation.time_to_act < at {
            return;
        }

        // Bookings made after this one were sized against its debt.
        let booked_later = self
            .last_event
            .saturating_duration_since(reservation.time_to_act);
        let refund =
            reservation.tokens as f64 - reservation.limit.tokens_from_duration(booked_later);
        if refund <= 0.0 {
            return;
        }

        self.tokens = (self.advance_at(at) + refund).min(self.burst as f64);
        self.last = at;

        if reservation.time_to_act == self.last_event {
            let span = reservation
                .limit
                .duration_from_tokens(reservation.tokens as f64);
            match reservation.time_to_act.checked_sub(span) {
                Some(previous) if previous >= at => self.last_event = previous,
                _ => {}
            }
        }
    }

    fn advance_at(&self, at: Instant) -> f64 {
        // Time running backwards refills nothing.
        let elapsed = at.saturating_duration_since(self.last.min(at));
        let refilled = self.tokens + self.limit.tokens_from_duration(elapsed);
        refilled.min(self.burst as f64)
    }
}
