//! Flow constructors
//!
//! Every constructor returns a cold flow: its source is re-read from scratch
//! on each collection.

use futures_core::Stream;
use futures_util::future::{self, FutureExt};
use futures_util::pin_mut;
use futures_util::stream::StreamExt;
use std::future::Future;

use crate::flow::{unchecked_flow, Flow};

/// Create a flow that completes immediately without emitting anything
pub fn empty<T>() -> Flow<T>
where
    T: Send + 'static,
{
    unchecked_flow(|_| future::ready(Ok(())).boxed())
}

/// Emit a single element
pub fn emit<T>(value: T) -> Flow<T>
where
    T: Clone + Send + Sync + 'static,
{
    unchecked_flow(move |collector| collector.accept(value.clone()))
}

/// Create a flow from an iterable. The iterable is cloned for every collection,
/// which covers vectors, arrays and numeric ranges.
///
/// # Examples
/// ```
/// use rs2_flow::*;
///
/// # async fn example() -> FlowResult<()> {
/// assert_eq!(from_iter(1..=3).to_vec().await?, vec![1, 2, 3]);
/// # Ok(())
/// # }
/// ```
pub fn from_iter<I>(iter: I) -> Flow<I::Item>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    unchecked_flow(move |collector| {
        let items = iter.clone();
        async move {
            for item in items {
                collector.accept(item).await?;
            }
            Ok(())
        }
        .boxed()
    })
}

/// Emit the value returned by `f`, calling it once per collection
pub fn from_fn<T, F>(f: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    unchecked_flow(move |collector| collector.accept(f()))
}

/// Evaluate an async function once per collection and emit its output
pub fn eval<T, F, Fut>(f: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    unchecked_flow(move |collector| {
        let fut = f();
        async move {
            let value = fut.await;
            collector.accept(value).await
        }
        .boxed()
    })
}

/// Create a flow from a stream factory. A fresh stream is built and drained for
/// every collection.
pub fn from_stream<T, S, F>(factory: F) -> Flow<T>
where
    T: Send + 'static,
    S: Stream<Item = T> + Send + 'static,
    F: Fn() -> S + Send + Sync + 'static,
{
    unchecked_flow(move |collector| {
        let stream = factory();
        async move {
            pin_mut!(stream);
            while let Some(item) = stream.next().await {
                collector.accept(item).await?;
            }
            Ok(())
        }
        .boxed()
    })
}
