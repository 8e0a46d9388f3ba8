//! Early termination
//!
//! A limiting operator stops its upstream by failing the upstream's `accept`
//! with an abort signal it alone owns. The signal unwinds through every frame
//! between the two, and the limiting frame turns it back into a normal
//! completion. Signals owned by any other frame pass through untouched, so
//! nested limits never swallow each other's stop.

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use std::marker::PhantomData;

use crate::collector::Collector;
use crate::error::{AbortOwner, FlowError, FlowResult};
use crate::flow::{Flow, Producer};

/// What a limiting body wants after handling one value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    Stop,
}

/// Run `body` for every upstream value until it returns [`Step::Stop`], then
/// cancel the upstream and complete normally.
pub(crate) fn limit<T, U, S, I, B>(upstream: Flow<T>, init: I, body: B) -> Flow<U>
where
    T: Send + 'static,
    U: Send + 'static,
    S: Send + 'static,
    I: Fn() -> S + Send + Sync + 'static,
    B: for<'a> Fn(&'a mut S, T, &'a mut dyn Collector<U>) -> BoxFuture<'a, FlowResult<Step>>
        + Send
        + Sync
        + 'static,
{
    Flow::unchecked(Limit {
        upstream,
        init,
        body,
        _state: PhantomData,
    })
}

struct Limit<T, S, I, B> {
    upstream: Flow<T>,
    init: I,
    body: B,
    _state: PhantomData<fn() -> S>,
}

#[async_trait]
impl<T, U, S, I, B> Producer<U> for Limit<T, S, I, B>
where
    T: Send + 'static,
    U: Send + 'static,
    S: Send + 'static,
    I: Fn() -> S + Send + Sync,
    B: for<'a> Fn(&'a mut S, T, &'a mut dyn Collector<U>) -> BoxFuture<'a, FlowResult<Step>>
        + Send
        + Sync,
{
    async fn produce(&self, downstream: &mut dyn Collector<U>) -> FlowResult<()> {
        let owner = AbortOwner::new();
        let mut collector = LimitCollector {
            state: (self.init)(),
            body: &self.body,
            owner: &owner,
            downstream,
        };
        match self.upstream.collect(&mut collector).await {
            Err(error) if owner.owns(&error) => {
                log::trace!("Upstream stopped by limit");
                Ok(())
            }
            result => result,
        }
    }
}

struct LimitCollector<'a, S, B, U> {
    state: S,
    body: &'a B,
    owner: &'a AbortOwner,
    downstream: &'a mut dyn Collector<U>,
}

#[async_trait]
impl<'a, T, U, S, B> Collector<T> for LimitCollector<'a, S, B, U>
where
    T: Send + 'static,
    U: Send + 'static,
    S: Send,
    B: for<'b> Fn(&'b mut S, T, &'b mut dyn Collector<U>) -> BoxFuture<'b, FlowResult<Step>>
        + Sync,
{
    async fn accept(&mut self, value: T) -> FlowResult<()> {
        match (self.body)(&mut self.state, value, &mut *self.downstream).await? {
            Step::Continue => Ok(()),
            Step::Stop => Err(self.owner.signal()),
        }
    }
}

/// Emit at most the first `count` values, then cancel the upstream.
///
/// The upstream is stopped as soon as the last allowed value was accepted, so
/// it never produces more than needed. A `count` of zero is rejected.
///
/// # Examples
/// ```
/// use rs2_flow::*;
///
/// # async fn example() -> FlowResult<()> {
/// let first = take(from_iter(1..), 3)?;
/// assert_eq!(first.to_vec().await?, vec![1, 2, 3]);
/// # Ok(())
/// # }
/// ```
pub fn take<T>(upstream: Flow<T>, count: usize) -> FlowResult<Flow<T>>
where
    T: Send + 'static,
{
    if count == 0 {
        return Err(FlowError::Config(format!(
            "Take count should be positive, but had {}",
            count
        )));
    }
    Ok(limit(
        upstream,
        || 0usize,
        move |consumed, value, downstream| {
            async move {
                downstream.accept(value).await?;
                *consumed += 1;
                Ok(if *consumed == count {
                    Step::Stop
                } else {
                    Step::Continue
                })
            }
            .boxed()
        },
    ))
}

/// Emit values while `predicate` holds. The first failing value is not
/// emitted and stops the upstream.
pub fn take_while<T, F>(upstream: Flow<T>, predicate: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    limit(
        upstream,
        || (),
        move |_, value, downstream| {
            if predicate(&value) {
                downstream.accept(value).map(|result| result.map(|_| Step::Continue)).boxed()
            } else {
                futures_util::future::ready(Ok(Step::Stop)).boxed()
            }
        },
    )
}

/// Emit the first value of the flow, if any, and stop the upstream right after
pub(crate) fn first<T>(upstream: Flow<T>) -> Flow<T>
where
    T: Send + 'static,
{
    limit(
        upstream,
        || (),
        |_, value, downstream| {
            downstream
                .accept(value)
                .map(|result| result.map(|_| Step::Stop))
                .boxed()
        },
    )
}
