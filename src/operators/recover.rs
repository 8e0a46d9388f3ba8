//! Failure recovery
//!
//! A recovery operator only ever handles failures raised by the flow it wraps.
//! Failures raised by the downstream (a consumer error passing back through
//! the upstream's `accept`) are re-raised unchanged: they are not the
//! upstream's to recover from. Abort signals of limiting operators are never
//! recovered either.

use async_trait::async_trait;
use futures_util::future::FutureExt;
use std::sync::Arc;

use crate::collector::Collector;
use crate::error::{FlowError, FlowResult, RetryPolicy};
use crate::flow::{unchecked_flow, Flow};

/// Forwards values and remembers whether the downstream failed
struct OriginCollector<'a, T> {
    downstream: &'a mut dyn Collector<T>,
    from_downstream: bool,
}

impl<'a, T> OriginCollector<'a, T> {
    fn new(downstream: &'a mut dyn Collector<T>) -> Self {
        Self {
            downstream,
            from_downstream: false,
        }
    }
}

#[async_trait]
impl<'a, T> Collector<T> for OriginCollector<'a, T>
where
    T: Send + 'static,
{
    async fn accept(&mut self, value: T) -> FlowResult<()> {
        let result = self.downstream.accept(value).await;
        if result.is_err() {
            self.from_downstream = true;
        }
        result
    }
}

/// Outcome of one attempt to collect the upstream
enum Attempt {
    Completed,
    /// Failure to re-raise unchanged
    Propagate(FlowError),
    /// Failure raised by the upstream itself
    Recoverable(FlowError),
}

async fn attempt<T>(upstream: &Flow<T>, downstream: &mut dyn Collector<T>) -> Attempt
where
    T: Send + 'static,
{
    let mut origin = OriginCollector::new(downstream);
    match upstream.collect(&mut origin).await {
        Ok(()) => Attempt::Completed,
        Err(error) if error.is_abort() || origin.from_downstream => Attempt::Propagate(error),
        Err(error) => Attempt::Recoverable(error),
    }
}

/// Re-collect the upstream after a failure matching `predicate`, at most
/// `retries` times. Values emitted before a failure are not retracted.
pub fn retry<T, P>(upstream: Flow<T>, retries: usize, predicate: P) -> FlowResult<Flow<T>>
where
    T: Send + 'static,
    P: Fn(&FlowError) -> bool + Send + Sync + 'static,
{
    retry_with_policy(
        upstream,
        RetryPolicy::Immediate {
            max_retries: retries,
        },
        predicate,
    )
}

/// Re-collect the upstream after a failure matching `predicate`, waiting
/// between attempts as `policy` says.
pub fn retry_with_policy<T, P>(upstream: Flow<T>, policy: RetryPolicy, predicate: P) -> FlowResult<Flow<T>>
where
    T: Send + 'static,
    P: Fn(&FlowError) -> bool + Send + Sync + 'static,
{
    if policy.max_retries() == 0 {
        return Err(FlowError::Config(format!(
            "Expected positive amount of retries, but had {}",
            policy.max_retries()
        )));
    }
    let predicate = Arc::new(predicate);
    Ok(unchecked_flow(move |downstream| {
        let upstream = upstream.clone();
        let policy = policy.clone();
        let predicate = Arc::clone(&predicate);
        async move {
            let mut retries = 0;
            loop {
                match attempt(&upstream, &mut *downstream).await {
                    Attempt::Completed => return Ok(()),
                    Attempt::Propagate(error) => return Err(error),
                    Attempt::Recoverable(error) => {
                        if retries >= policy.max_retries() || !predicate(&error) {
                            return Err(error);
                        }
                        retries += 1;
                        log::debug!(
                            "Retrying flow after failure ({}/{}): {}",
                            retries,
                            policy.max_retries(),
                            error
                        );
                        if let Some(delay) = policy.delay_for(retries) {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }
        .boxed()
    }))
}

/// On a failure matching `predicate`, continue with `fallback`.
///
/// Recovery happens at most once: a failure of the fallback propagates.
pub fn on_error_collect<T, P>(upstream: Flow<T>, fallback: Flow<T>, predicate: P) -> Flow<T>
where
    T: Send + 'static,
    P: Fn(&FlowError) -> bool + Send + Sync + 'static,
{
    on_error_resume_with(upstream, move |error| {
        if predicate(&error) {
            Ok(fallback.clone())
        } else {
            Err(error)
        }
    })
}

/// On a failure matching `predicate`, emit `value` and complete
pub fn on_error_return<T, P>(upstream: Flow<T>, value: T, predicate: P) -> Flow<T>
where
    T: Clone + Send + Sync + 'static,
    P: Fn(&FlowError) -> bool + Send + Sync + 'static,
{
    on_error_collect(upstream, crate::constructors::emit(value), predicate)
}

/// On an upstream failure, ask `handler` for a flow to continue with. The
/// handler returns the error (or another one) to let the failure propagate.
pub fn on_error_resume_with<T, H>(upstream: Flow<T>, handler: H) -> Flow<T>
where
    T: Send + 'static,
    H: Fn(FlowError) -> FlowResult<Flow<T>> + Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    unchecked_flow(move |downstream| {
        let upstream = upstream.clone();
        let handler = Arc::clone(&handler);
        async move {
            match attempt(&upstream, &mut *downstream).await {
                Attempt::Completed => Ok(()),
                Attempt::Propagate(error) => Err(error),
                Attempt::Recoverable(error) => {
                    log::debug!("Recovering from flow failure: {}", error);
                    let fallback = handler(error)?;
                    fallback.collect(downstream).await
                }
            }
        }
        .boxed()
    })
}

/// Run `action` with the failure of the upstream, if any, then let it propagate.
/// Failures of the downstream are not reported.
pub fn on_error<T, F>(upstream: Flow<T>, action: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(&FlowError) + Send + Sync + 'static,
{
    on_error_resume_with(upstream, move |error| {
        action(&error);
        Err(error)
    })
}
