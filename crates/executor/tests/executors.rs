// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end runs of both executors on paused tokio time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use paced_executor::{
    concurrent, from_async, sequential, ConcurrentExecutor, ExecuteError, Executor,
    ExecutorConfig, Mode, RateLimitedExecutor, SequentialExecutor,
};
use paced_ratelimit::Context;
use tokio::time::Instant;

/// Shared invocation counter plus the closure that bumps it.
fn counting() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    (calls, move || {
        let _ = counted.fetch_add(1, Ordering::SeqCst);
    })
}

/// Cancels `ctx` after `after` has elapsed.
fn cancel_after(ctx: &Context, after: Duration) {
    let ctx = ctx.clone();
    let _ = tokio::spawn(async move {
        tokio::time::sleep(after).await;
        ctx.cancel();
    });
}

/// Checks admissions against a bucket of `rate` tokens refilled at `rate`
/// per second: any span `[t_i, t_j]` holds at most `rate + rate * (t_j - t_i)`
/// admissions, with one admission of tolerance for timer rounding.
fn assert_rate_bound(mut admitted: Vec<Instant>, rate: u32) {
    admitted.sort();
    for i in 0..admitted.len() {
        for j in i..admitted.len() {
            let span = admitted[j].duration_since(admitted[i]).as_secs_f64();
            let allowed = f64::from(rate) * (1.0 + span) + 1.0;
            let count = (j - i + 1) as f64;
            assert!(
                count <= allowed,
                "{count} admissions within {span:.3}s exceed rate {rate}"
            );
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_sequential_counts_and_paces() {
    let (calls, work) = counting();
    let executor = sequential(5, 12, work).unwrap();
    let start = Instant::now();

    let report = executor.execute(&Context::background()).await.unwrap();

    assert_eq!(report.invocations, 12);
    assert_eq!(calls.load(Ordering::SeqCst), 12);
    // Five from the burst, then one every 200ms
    assert!(start.elapsed() >= Duration::from_millis(1390));
    assert!(report.elapsed >= Duration::from_millis(1390));
}

#[tokio::test(start_paused = true)]
async fn test_sequential_runs_one_at_a_time() {
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(Mutex::new(Vec::new()));

    let work = {
        let active = Arc::clone(&active);
        let max_active = Arc::clone(&max_active);
        let order = Arc::clone(&order);
        from_async(move || {
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            let order = Arc::clone(&order);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = max_active.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                order.lock().unwrap().push(Instant::now());
                let _ = active.fetch_sub(1, Ordering::SeqCst);
            }
        })
    };

    let report = SequentialExecutor::new(100, 8, work)
        .unwrap()
        .execute(&Context::background())
        .await
        .unwrap();

    assert_eq!(report.invocations, 8);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    let order = order.lock().unwrap();
    assert!(order.windows(2).all(|pair| pair[1] - pair[0] >= Duration::from_millis(50)));
}

#[tokio::test(start_paused = true)]
async fn test_rate_bound_holds_for_both_executors() {
    for mode in [Mode::Sequential, Mode::Concurrent] {
        let admitted = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&admitted);
        let work = paced_executor::from_fn(move || {
            recorded.lock().unwrap().push(Instant::now());
        });
        let config = ExecutorConfig {
            rate_per_second: 10,
            invocations: 40,
            mode,
            timeout: None,
        };
        let start = Instant::now();

        let report = RateLimitedExecutor::from_config(&config, work)
            .unwrap()
            .execute(&Context::background())
            .await
            .unwrap();

        assert_eq!(report.invocations, 40);
        // Ten from the burst, then thirty at 100ms spacing
        assert!(start.elapsed() >= Duration::from_millis(2990));
        let admitted = admitted.lock().unwrap().clone();
        assert_eq!(admitted.len(), 40);
        assert_rate_bound(admitted, 10);
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_waits_for_every_task() {
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    let work = {
        let started = Arc::clone(&started);
        let finished = Arc::clone(&finished);
        from_async(move || {
            let slot = started.fetch_add(1, Ordering::SeqCst);
            let finished = Arc::clone(&finished);
            async move {
                // Uneven work so that tasks finish out of admission order
                let delay = Duration::from_millis(((slot % 5) as u64 + 1) * 300);
                tokio::time::sleep(delay).await;
                let _ = finished.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let report = ConcurrentExecutor::new(20, 25, work)
        .unwrap()
        .execute(&Context::background())
        .await
        .unwrap();

    assert_eq!(report.invocations, 25);
    assert_eq!(finished.load(Ordering::SeqCst), 25);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start() {
    let ctx = Context::background();
    ctx.cancel();

    let (calls, work) = counting();
    let result = sequential(5, 10, work).unwrap().execute(&ctx).await;
    assert!(matches!(
        result,
        Err(ExecuteError::Cancelled { completed: 0, total: 10 })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let (calls, work) = counting();
    let result = concurrent(5, 10, work).unwrap().execute(&ctx).await;
    assert!(matches!(
        result,
        Err(ExecuteError::Cancelled { completed: 0, total: 10 })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_invocations() {
    let start = Instant::now();

    let (calls, work) = counting();
    let report = sequential(1, 0, work)
        .unwrap()
        .execute(&Context::background())
        .await
        .unwrap();
    assert_eq!(report.invocations, 0);

    let (_, work) = counting();
    let report = concurrent(1, 0, work)
        .unwrap()
        .execute(&Context::background())
        .await
        .unwrap();
    assert_eq!(report.invocations, 0);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_zero_rate_rejected() {
    let (_, work) = counting();
    assert!(matches!(
        sequential(0, 10, work),
        Err(ExecuteError::Limiter(paced_ratelimit::Error::InvalidLimit { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_sequential_cancelled_mid_run() {
    let ctx = Context::background();
    let (calls, work) = counting();
    let executor = sequential(1, 5, work).unwrap();

    // Admissions at 0s and 1s, the third wait is interrupted
    cancel_after(&ctx, Duration::from_millis(1500));
    let start = Instant::now();
    let result = executor.execute(&ctx).await;

    assert!(matches!(
        result,
        Err(ExecuteError::Cancelled { completed: 2, total: 5 })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_cancelled_mid_run() {
    let ctx = Context::background();
    let (calls, work) = counting();
    let executor = concurrent(2, 10, work).unwrap();

    // Admissions at 0s, 0s, 0.5s and 1s before the cancel
    cancel_after(&ctx, Duration::from_millis(1200));
    let result = executor.execute(&ctx).await;

    assert!(matches!(
        result,
        Err(ExecuteError::Cancelled { completed: 4, total: 10 })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_admitted_work_finishes_after_cancel() {
    let finished = Arc::new(AtomicUsize::new(0));
    let work = {
        let finished = Arc::clone(&finished);
        from_async(move || {
            let finished = Arc::clone(&finished);
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let _ = finished.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let ctx = Context::background();
    cancel_after(&ctx, Duration::from_millis(100));
    let start = Instant::now();
    let result = ConcurrentExecutor::new(2, 4, work)
        .unwrap()
        .execute(&ctx)
        .await;

    let err = result.unwrap_err();
    assert!(err.is_cancellation());
    assert_eq!(err.completed(), Some(2));
    assert_eq!(finished.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_ends_run() {
    let ctx = Context::background().with_timeout(Duration::from_millis(500));
    let (calls, work) = counting();

    let result = sequential(1, 3, work).unwrap().execute(&ctx).await;

    assert!(matches!(
        result,
        Err(ExecuteError::DeadlineExceeded { completed: 1, total: 3 })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_work_does_not_affect_siblings() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let work = move || {
        if counted.fetch_add(1, Ordering::SeqCst) == 2 {
            panic!("work failed");
        }
    };

    let report = concurrent(100, 5, work)
        .unwrap()
        .execute(&Context::background())
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(report.invocations, 4);
}

#[tokio::test(start_paused = true)]
async fn test_config_driven_run() {
    let config = ExecutorConfig::from_yaml(
        r#"
rate_per_second: 5
invocations: 7
mode: sequential
timeout: 10s
"#,
    )
    .unwrap();
    let (calls, work) = counting();
    let executor =
        RateLimitedExecutor::from_config(&config, paced_executor::from_fn(work)).unwrap();
    assert_eq!(executor.mode(), Mode::Sequential);
    assert_eq!(executor.plan().total_invocations(), 7);

    let ctx = config.context(&Context::background());
    let report = executor.execute(&ctx).await.unwrap();

    assert_eq!(report.invocations, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 7);
    assert!(report.elapsed >= Duration::from_millis(390));
}

#[tokio::test(start_paused = true)]
async fn test_first_failure_stops_concurrent_admissions() {
    // One permit per second: six fit before the deadline, the rest are refused up front
    let ctx = Context::background().with_timeout(Duration::from_millis(5500));
    let (calls, work) = counting();
    let start = Instant::now();

    let result = concurrent(1, 10, work).unwrap().execute(&ctx).await;

    assert!(matches!(
        result,
        Err(ExecuteError::DeadlineExceeded { completed: 1, total: 10 })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
    // The caller's context is left live
    assert!(!ctx.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_rejected() {
    let config = ExecutorConfig {
        rate_per_second: 0,
        ..ExecutorConfig::default()
    };
    let (_, work) = counting();
    let result = RateLimitedExecutor::from_config(&config, paced_executor::from_fn(work));
    assert!(matches!(
        result,
        Err(ExecuteError::Config(paced_executor::ConfigError::Invalid(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_executor_from_path() {
    let dir = std::env::temp_dir().join(format!("paced-executors-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let valid = dir.join("valid.yaml");
    std::fs::write(&valid, "rate_per_second: 5\ninvocations: 3\nmode: concurrent\n").unwrap();
    let (calls, work) = counting();
    let (executor, config) =
        RateLimitedExecutor::from_path(&valid, paced_executor::from_fn(work)).unwrap();
    assert_eq!(executor.mode(), Mode::Concurrent);
    let report = executor
        .execute(&config.context(&Context::background()))
        .await
        .unwrap();
    assert_eq!(report.invocations, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let invalid = dir.join("invalid.yaml");
    std::fs::write(&invalid, "rate_per_second: 0\n").unwrap();
    let (_, work) = counting();
    assert!(matches!(
        RateLimitedExecutor::from_path(&invalid, paced_executor::from_fn(work)),
        Err(ExecuteError::Config(paced_executor::ConfigError::Invalid(_)))
    ));

    let (_, work) = counting();
    assert!(matches!(
        RateLimitedExecutor::from_path(dir.join("missing.yaml"), paced_executor::from_fn(work)),
        Err(ExecuteError::Config(paced_executor::ConfigError::Io { .. }))
    ));

    std::fs::remove_dir_all(&dir).unwrap();
}
