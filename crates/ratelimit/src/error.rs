// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the rate limit crate.

use std::time::Duration;

/// Failures of limiter construction and permit requests.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Refill rate is zero, negative or not finite.
    #[error("Rate must be a finite number of permits per second above zero, got {rate}")]
    InvalidLimit {
        /// Rejected rate.
        rate: f64,
    },

    /// Bucket capacity of zero.
    #[error("Burst must hold at least one permit, got {burst}")]
    InvalidBurst {
        /// Rejected burst.
        burst: usize,
    },

    /// Request for zero permits.
    #[error("Permit count must be at least one, got {count}")]
    InvalidTokenCount {
        /// Rejected count.
        count: usize,
    },

    /// The request is larger than the bucket can ever hold.
    #[error("Requested {request} permits but the burst is {burst}")]
    BurstExceeded {
        /// Permits requested.
        request: usize,
        /// Bucket capacity.
        burst: usize,
    },

    /// The context was cancelled before a permit was granted.
    #[error("Context cancelled while waiting for a permit")]
    Cancelled,

    /// The context deadline passed while waiting for a permit.
    #[error("Context deadline exceeded while waiting for a permit")]
    DeadlineExceeded,

    /// The permit could not be granted before the context deadline.
    /// Nothing was consumed from the bucket.
    #[error("Waiting {wait:?} for a permit would exceed the context deadline ({max_wait:?} left)")]
    WouldExceedDeadline {
        /// Wait required for the permit.
        wait: Duration,

        /// Time remaining until the deadline.
        max_wait: Duration,
    },
}

impl Error {
    /// Returns true if the error was caused by the context (cancellation or
    /// deadline) rather than by an invalid request.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Error::Cancelled | Error::DeadlineExceeded | Error::WouldExceedDeadline { .. }
        )
    }
}
