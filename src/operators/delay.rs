//! Time-based operators

use futures_util::future::FutureExt;
use std::time::Duration;

use crate::flow::{unchecked_flow, Flow};
use crate::operators::transform::transform;

/// Wait for `delay` before the upstream starts producing
pub fn delay_flow<T>(upstream: Flow<T>, delay: Duration) -> Flow<T>
where
    T: Send + 'static,
{
    unchecked_flow(move |collector| {
        let upstream = upstream.clone();
        async move {
            tokio::time::sleep(delay).await;
            upstream.collect(collector).await
        }
        .boxed()
    })
}

/// Wait for `delay` before passing on each value
pub fn delay_each<T>(upstream: Flow<T>, delay: Duration) -> Flow<T>
where
    T: Send + 'static,
{
    transform(upstream, move |value, downstream| {
        async move {
            tokio::time::sleep(delay).await;
            downstream.accept(value).await
        }
        .boxed()
    })
}
