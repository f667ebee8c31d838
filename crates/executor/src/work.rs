// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The unit of work an executor repeats.
//!
//! Work never reports a result to the executor. Anything that can fail is
//! expected to log or signal its own failure.

use std::future::Future;

/// A zero-argument unit of work.
pub trait Work: Send + Sync + 'static {
    /// Runs the work once.
    fn invoke(&self) -> impl Future<Output = ()> + Send;
}

/// [`Work`] backed by a synchronous closure.
#[derive(Debug, Clone)]
pub struct FnWork<F>(F);

impl<F> Work for FnWork<F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn invoke(&self) -> impl Future<Output = ()> + Send {
        async move { (self.0)() }
    }
}

/// [`Work`] backed by a closure returning a future.
#[derive(Debug, Clone)]
pub struct AsyncFnWork<F>(F);

impl<F, Fut> Work for AsyncFnWork<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    fn invoke(&self) -> impl Future<Output = ()> + Send {
        (self.0)()
    }
}

/// Wraps a synchronous closure as [`Work`].
pub fn from_fn<F>(f: F) -> FnWork<F>
where
    F: Fn() + Send + Sync + 'static,
{
    FnWork(f)
}

/// Wraps an async closure as [`Work`].
pub fn from_async<F, Fut>(f: F) -> AsyncFnWork<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    AsyncFnWork(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_work_runs_on_invoke() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let work = from_fn(move || {
            let _ = counted.fetch_add(1, Ordering::SeqCst);
        });

        let pending = work.invoke();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        pending.await;
        work.invoke().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_async_work() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let work = from_async(move || {
            let counted = Arc::clone(&counted);
            async move {
                tokio::task::yield_now().await;
                let _ = counted.fetch_add(1, Ordering::SeqCst);
            }
        });

        work.invoke().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
