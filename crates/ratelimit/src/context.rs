// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Cancellation context threaded through every permit wait.
//!
//! A [`Context`] carries a shared cancellation flag and an optional deadline.
//! Clones observe the same cancellation; derived contexts may only tighten the
//! deadline. [`Context::child`] opens a scope that can be cancelled on its own
//! and still follows its parent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::Error;

/// Why a context finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Done {
    /// [`Context::cancel`] was called.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
}

impl From<Done> for Error {
    fn from(done: Done) -> Self {
        match done {
            Done::Cancelled => Error::Cancelled,
            Done::DeadlineExceeded => Error::DeadlineExceeded,
        }
    }
}

#[derive(Debug, Default)]
struct Signal {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<Signal>>>,
}

impl Signal {
    fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(&mut *self.lock_children());
        for child in children.iter().filter_map(Weak::upgrade) {
            let _ = child.cancel();
        }
        true
    }

    fn lock_children(&self) -> MutexGuard<'_, Vec<Weak<Signal>>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cancellation signal with an optional deadline.
#[derive(Clone, Debug, Default)]
pub struct Context {
    signal: Arc<Signal>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never done until cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a context sharing this one's cancellation, with the earlier of
    /// the existing deadline and `deadline`.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self {
            signal: Arc::clone(&self.signal),
            deadline: Some(deadline),
        }
    }

    /// Derives a context whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a context with its own cancellation scope.
    ///
    /// Cancelling the child leaves this context live. Cancelling this context
    /// cancels the child, including when it already happened.
    #[must_use]
    pub fn child(&self) -> Self {
        let signal = Arc::new(Signal::default());
        {
            let mut children = self.signal.lock_children();
            children.retain(|child| child.strong_count() > 0);
            children.push(Arc::downgrade(&signal));
        }
        // Flag is set before the children are drained, so one side always sees the other.
        if self.is_cancelled() {
            let _ = signal.cancel();
        }
        Self {
            signal,
            deadline: self.deadline,
        }
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels this context and every clone or derivative of it.
    ///
    /// Can be called multiple times safely.
    pub fn cancel(&self) {
        if self.signal.cancel() {
            debug!("Context cancelled");
        }
    }

    /// Returns true once [`Context::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.signal.cancelled.load(Ordering::SeqCst)
    }

    /// Returns why the context is done, or `None` if it is still live.
    pub fn err(&self) -> Option<Done> {
        if self.is_cancelled() {
            return Some(Done::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Done::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Done {
        let cancelled = async {
            // Registered on creation, so a cancel racing the flag check is not lost.
            let notified = self.signal.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = cancelled => Done::Cancelled,
                _ = tokio::time::sleep_until(deadline) => Done::DeadlineExceeded,
            },
            None => {
                cancelled.await;
                Done::Cancelled
            }
        }
    }
}
