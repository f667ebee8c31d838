// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Token bucket rate limiting with cancellable waits.
//!
//! - [`Limiter`] is the bare token bucket: continuous refill, burst cap and
//!   cancellable reservations, driven by an explicit [`Clock`].
//! - [`TokenBucketLimiter`] shares one bucket between tasks and lets them
//!   wait for permits under a [`Context`].

mod context;
mod error;
mod limiter;
mod tokenbucket;

pub use context::{Context, Done};
pub use error::Error;
pub use limiter::{RateSpec, TokenBucketLimiter};
pub use tokenbucket::{Clock, Limit, Limiter, MonoClock, Reservation, TokioClock};
