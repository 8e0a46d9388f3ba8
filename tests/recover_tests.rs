use futures_util::FutureExt;
use rs2_flow::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

#[derive(Debug, thiserror::Error)]
#[error("transient failure")]
struct Transient;

#[derive(Debug, thiserror::Error)]
#[error("fatal failure")]
struct Fatal;

/// Emits `0..3` and fails with `Transient` on its first `failures` invocations
fn flaky(failures: usize, invocations: Arc<AtomicUsize>) -> Flow<i32> {
    flow(move |collector| {
        let attempt = invocations.fetch_add(1, Ordering::SeqCst);
        async move {
            collector.accept(0).await?;
            if attempt < failures {
                return Err(FlowError::failed(Transient));
            }
            collector.accept(1).await?;
            collector.accept(2).await
        }
        .boxed()
    })
}

fn is_transient(error: &FlowError) -> bool {
    error.downcast_ref::<Transient>().is_some()
}

#[test]
fn test_retry_restarts_from_scratch() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let invocations = Arc::new(AtomicUsize::new(0));
        let retried = flaky(2, Arc::clone(&invocations))
            .retry(3, is_transient)
            .unwrap();

        // Values of failed attempts are not retracted
        assert_eq!(retried.to_vec().await.unwrap(), vec![0, 0, 0, 1, 2]);
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    });
}

#[tokio::test]
async fn test_retry_gives_up_when_budget_is_exhausted() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let retried = flaky(10, Arc::clone(&invocations)).retry(2, is_transient).unwrap();

    let error = retried.to_vec().await.unwrap_err();
    assert!(is_transient(&error));
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_ignores_non_matching_failures() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);
    let fatal: Flow<i32> = flow(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err(FlowError::failed(Fatal)) }.boxed()
    });

    let error = fatal.retry(5, is_transient).unwrap().count().await.unwrap_err();
    assert!(error.downcast_ref::<Fatal>().is_some());
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_consumer_failure_is_never_retried() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);
    let source: Flow<i32> = flow(move |collector| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            for i in 0..5 {
                collector.accept(i).await?;
            }
            Ok(())
        }
        .boxed()
    });
    let retried = source.retry(100, |_| true).unwrap();

    let mut seen = 0;
    let mut collector = collector_fn(|_value: i32| {
        seen += 1;
        let result = if seen == 2 {
            Err(FlowError::failed(Transient))
        } else {
            Ok(())
        };
        futures::future::ready(result)
    });

    let error = retried.collect(&mut collector).await.unwrap_err();
    assert!(is_transient(&error));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[test]
fn test_retry_rejects_zero_retries() {
    let result = from_iter(vec![1]).retry(0, |_| true);
    assert!(matches!(result, Err(FlowError::Config(_))));

    let result = from_iter(vec![1]).retry_with_policy(RetryPolicy::Immediate { max_retries: 0 }, |_| true);
    assert!(matches!(result, Err(FlowError::Config(_))));
}

#[tokio::test]
async fn test_retry_with_fixed_policy_waits() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let policy = RetryPolicy::Fixed {
        max_retries: 2,
        delay: Duration::from_millis(30),
    };
    let started = Instant::now();
    let retried = flaky(2, Arc::clone(&invocations))
        .retry_with_policy(policy, is_transient)
        .unwrap();

    assert_eq!(retried.to_vec().await.unwrap(), vec![0, 0, 0, 1, 2]);
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[test]
fn test_exponential_policy_delays() {
    let policy = RetryPolicy::Exponential {
        max_retries: 4,
        initial_delay: Duration::from_millis(10),
        multiplier: 2.0,
    };
    assert_eq!(policy.delay_for(1), Some(Duration::from_millis(10)));
    assert_eq!(policy.delay_for(2), Some(Duration::from_millis(20)));
    assert_eq!(policy.delay_for(3), Some(Duration::from_millis(40)));
    assert_eq!(RetryPolicy::Immediate { max_retries: 1 }.delay_for(1), None);

    let huge = RetryPolicy::Exponential {
        max_retries: 1,
        initial_delay: Duration::from_secs(1),
        multiplier: 1e300,
    };
    assert_eq!(huge.delay_for(10), Some(Duration::MAX));
}

#[tokio::test]
async fn test_on_error_collect_switches_to_fallback() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let recovered = flaky(1, invocations).on_error_collect(from_iter(vec![10, 11]), is_transient);
    assert_eq!(recovered.to_vec().await.unwrap(), vec![0, 10, 11]);
}

#[tokio::test]
async fn test_on_error_return() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let recovered = flaky(1, invocations).on_error_return(-1, |_| true);
    assert_eq!(recovered.to_vec().await.unwrap(), vec![0, -1]);
}

#[tokio::test]
async fn test_on_error_predicate_mismatch_propagates() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let recovered = flaky(1, invocations).on_error_return(-1, |error| error.downcast_ref::<Fatal>().is_some());
    let error = recovered.to_vec().await.unwrap_err();
    assert!(is_transient(&error));
}

#[tokio::test]
async fn test_fallback_failure_propagates() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let failing_fallback: Flow<i32> = flow(|_| async { Err(FlowError::failed(Fatal)) }.boxed());
    let recovered = flaky(1, invocations).on_error_collect(failing_fallback, |_| true);

    let error = recovered.to_vec().await.unwrap_err();
    assert!(error.downcast_ref::<Fatal>().is_some());
}

#[tokio::test]
async fn test_consumer_failure_is_not_replaced_by_fallback() {
    let recovered = from_iter(vec![1, 2, 3]).on_error_return(0, |_| true);

    let mut collector = collector_fn(|value: i32| {
        futures::future::ready(if value == 2 {
            Err(FlowError::failed(Fatal))
        } else {
            Ok(())
        })
    });
    let error = recovered.collect(&mut collector).await.unwrap_err();
    assert!(error.downcast_ref::<Fatal>().is_some());
}

#[tokio::test]
async fn test_on_error_resume_with_handler() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let recovered = flaky(1, invocations).on_error_resume_with(|error| {
        if is_transient(&error) {
            Ok(emit(99))
        } else {
            Err(error)
        }
    });
    assert_eq!(recovered.to_vec().await.unwrap(), vec![0, 99]);
}

#[tokio::test]
async fn test_on_error_observes_upstream_failures_only() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&observed);
    let invocations = Arc::new(AtomicUsize::new(0));
    let observed_flow = flaky(1, invocations).on_error(move |error| {
        log.lock().unwrap().push(error.to_string());
    });

    let error = observed_flow.to_vec().await.unwrap_err();
    assert!(is_transient(&error));
    assert_eq!(*observed.lock().unwrap(), vec!["transient failure".to_string()]);
}
