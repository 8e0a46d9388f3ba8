//! Sequential composition
//!
//! [`transform`] is the building block of every one-at-a-time operator. The
//! upstream cannot emit its next value before the body has returned for the
//! current one, so a body that suspends (including inside the downstream
//! `accept`) holds the whole upstream. That is all the backpressure these
//! operators need.

use async_trait::async_trait;
use futures_util::future::{self, BoxFuture, FutureExt};
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;

use crate::collector::Collector;
use crate::error::FlowResult;
use crate::flow::{Flow, Producer};

/// A finished step that emits nothing
pub(crate) fn skip<'a>() -> BoxFuture<'a, FlowResult<()>> {
    future::ready(Ok(())).boxed()
}

/// Apply `body` to each value of `upstream`. The body may emit zero, one or
/// many values to the downstream collector it is given.
///
/// # Examples
/// ```
/// use rs2_flow::*;
/// use futures_util::FutureExt;
///
/// # async fn example() -> FlowResult<()> {
/// // Emit only even values, but twice
/// let doubled = transform(from_iter(1..=4), |value: i32, downstream| {
///     async move {
///         if value % 2 == 0 {
///             downstream.accept(value).await?;
///             downstream.accept(value).await?;
///         }
///         Ok(())
///     }
///     .boxed()
/// });
/// assert_eq!(doubled.to_vec().await?, vec![2, 2, 4, 4]);
/// # Ok(())
/// # }
/// ```
pub fn transform<T, U, B>(upstream: Flow<T>, body: B) -> Flow<U>
where
    T: Send + 'static,
    U: Send + 'static,
    B: for<'a> Fn(T, &'a mut dyn Collector<U>) -> BoxFuture<'a, FlowResult<()>>
        + Send
        + Sync
        + 'static,
{
    transform_with_state(upstream, || (), move |_, value, downstream| body(value, downstream))
}

/// Like [`transform`], with a local state created by `init` at the start of
/// every collection and handed to each invocation of `body`.
pub fn transform_with_state<T, U, S, I, B>(upstream: Flow<T>, init: I, body: B) -> Flow<U>
where
    T: Send + 'static,
    U: Send + 'static,
    S: Send + 'static,
    I: Fn() -> S + Send + Sync + 'static,
    B: for<'a> Fn(&'a mut S, T, &'a mut dyn Collector<U>) -> BoxFuture<'a, FlowResult<()>>
        + Send
        + Sync
        + 'static,
{
    Flow::unchecked(Transform {
        upstream,
        init,
        body,
        _state: PhantomData,
    })
}

struct Transform<T, S, I, B> {
    upstream: Flow<T>,
    init: I,
    body: B,
    _state: PhantomData<fn() -> S>,
}

#[async_trait]
impl<T, U, S, I, B> Producer<U> for Transform<T, S, I, B>
where
    T: Send + 'static,
    U: Send + 'static,
    S: Send + 'static,
    I: Fn() -> S + Send + Sync,
    B: for<'a> Fn(&'a mut S, T, &'a mut dyn Collector<U>) -> BoxFuture<'a, FlowResult<()>>
        + Send
        + Sync,
{
    async fn produce(&self, downstream: &mut dyn Collector<U>) -> FlowResult<()> {
        let mut collector = TransformCollector {
            state: (self.init)(),
            body: &self.body,
            downstream,
        };
        self.upstream.collect(&mut collector).await
    }
}

struct TransformCollector<'a, S, B, U> {
    state: S,
    body: &'a B,
    downstream: &'a mut dyn Collector<U>,
}

#[async_trait]
impl<'a, T, U, S, B> Collector<T> for TransformCollector<'a, S, B, U>
where
    T: Send + 'static,
    U: Send + 'static,
    S: Send,
    B: for<'b> Fn(&'b mut S, T, &'b mut dyn Collector<U>) -> BoxFuture<'b, FlowResult<()>> + Sync,
{
    async fn accept(&mut self, value: T) -> FlowResult<()> {
        (self.body)(&mut self.state, value, &mut *self.downstream).await
    }
}

/// Transform every value with `f`
pub fn map<T, U, F>(upstream: Flow<T>, f: F) -> Flow<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    transform(upstream, move |value, downstream| downstream.accept(f(value)))
}

/// Transform every value with an async function
pub fn eval_map<T, U, F, Fut>(upstream: Flow<T>, f: F) -> Flow<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = U> + Send + 'static,
{
    transform(upstream, move |value, downstream| {
        let fut = f(value);
        async move {
            let mapped = fut.await;
            downstream.accept(mapped).await
        }
        .boxed()
    })
}

/// Keep only the values matching `predicate`
pub fn filter<T, F>(upstream: Flow<T>, predicate: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    transform(upstream, move |value, downstream| {
        if predicate(&value) {
            downstream.accept(value)
        } else {
            skip()
        }
    })
}

/// Keep only the values not matching `predicate`
pub fn filter_not<T, F>(upstream: Flow<T>, predicate: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    filter(upstream, move |value| !predicate(value))
}

/// Transform every value and keep only the `Some` results
pub fn filter_map<T, U, F>(upstream: Flow<T>, f: F) -> Flow<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Option<U> + Send + Sync + 'static,
{
    transform(upstream, move |value, downstream| match f(value) {
        Some(mapped) => downstream.accept(mapped),
        None => skip(),
    })
}

/// Drop the `None` values of a flow of options
pub fn filter_some<T>(upstream: Flow<Option<T>>) -> Flow<T>
where
    T: Send + 'static,
{
    filter_map(upstream, |value| value)
}

/// Keep only the values whose runtime type is `R`
pub fn filter_downcast<R>(upstream: Flow<Box<dyn Any + Send>>) -> Flow<R>
where
    R: Send + 'static,
{
    filter_map(upstream, |value| value.downcast::<R>().ok().map(|boxed| *boxed))
}

/// Run `action` on every value before passing it on
pub fn on_each<T, F>(upstream: Flow<T>, action: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    transform(upstream, move |value, downstream| {
        action(&value);
        downstream.accept(value)
    })
}

/// Skip the first `count` values
pub fn drop_first<T>(upstream: Flow<T>, count: usize) -> Flow<T>
where
    T: Send + 'static,
{
    transform_with_state(
        upstream,
        || 0usize,
        move |skipped, value, downstream| {
            if *skipped < count {
                *skipped += 1;
                skip()
            } else {
                downstream.accept(value)
            }
        },
    )
}

/// Skip values while `predicate` holds, then pass everything through
pub fn drop_while<T, F>(upstream: Flow<T>, predicate: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    transform_with_state(
        upstream,
        || true,
        move |dropping, value, downstream| {
            if *dropping {
                if predicate(&value) {
                    return skip();
                }
                *dropping = false;
            }
            downstream.accept(value)
        },
    )
}

/// Flatten inner flows one after another, without interleaving
pub fn concatenate<T>(flows: Flow<Flow<T>>) -> Flow<T>
where
    T: Send + 'static,
{
    flat_map_concat(flows, |inner| inner)
}

/// Map every value to a flow and collect the inner flows one after another
pub fn flat_map_concat<T, U, F>(upstream: Flow<T>, mapper: F) -> Flow<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Flow<U> + Send + Sync + 'static,
{
    transform(upstream, move |value, downstream| {
        let inner = mapper(value);
        async move { inner.collect(downstream).await }.boxed()
    })
}
