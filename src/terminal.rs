//! Terminal operations
//!
//! Terminals are the only code that starts a collection. Each one runs
//! exactly one collection with an accumulating collector and returns once it
//! finished. Accumulators model "nothing seen yet" with `Option`, so flows of
//! any value type, including `Option` itself, are handled uniformly.

use async_trait::async_trait;
use futures_core::Stream;
use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::collector::{collector_fn, Collector};
use crate::error::{FlowError, FlowResult};
use crate::flow::Flow;
use crate::operators::limit;

struct FoldCollector<A, F> {
    acc: Option<A>,
    op: F,
}

#[async_trait]
impl<T, A, F, Fut> Collector<T> for FoldCollector<A, F>
where
    T: Send + 'static,
    A: Send,
    F: FnMut(A, T) -> Fut + Send,
    Fut: Future<Output = A> + Send,
{
    async fn accept(&mut self, value: T) -> FlowResult<()> {
        if let Some(acc) = self.acc.take() {
            self.acc = Some((self.op)(acc, value).await);
        }
        Ok(())
    }
}

/// Accumulate every value with `op`, starting from `init`
///
/// # Examples
/// ```
/// use rs2_flow::*;
///
/// # async fn example() -> FlowResult<()> {
/// let sum = fold(&from_iter(1..=4), 0, |acc, value| async move { acc + value }).await?;
/// assert_eq!(sum, 10);
/// # Ok(())
/// # }
/// ```
pub async fn fold<T, A, F, Fut>(flow: &Flow<T>, init: A, op: F) -> FlowResult<A>
where
    T: Send + 'static,
    A: Send,
    F: FnMut(A, T) -> Fut + Send,
    Fut: Future<Output = A> + Send,
{
    let mut collector = FoldCollector {
        acc: Some(init),
        op,
    };
    flow.collect(&mut collector).await?;
    collector.acc.ok_or(FlowError::Cancelled)
}

struct ReduceCollector<T, F> {
    acc: Option<T>,
    op: F,
}

#[async_trait]
impl<T, F> Collector<T> for ReduceCollector<T, F>
where
    T: Send + 'static,
    F: FnMut(T, T) -> T + Send,
{
    async fn accept(&mut self, value: T) -> FlowResult<()> {
        self.acc = Some(match self.acc.take() {
            Some(acc) => (self.op)(acc, value),
            None => value,
        });
        Ok(())
    }
}

/// Accumulate values starting with the first one. Fails with
/// [`FlowError::Empty`] on an empty flow.
pub async fn reduce<T, F>(flow: &Flow<T>, op: F) -> FlowResult<T>
where
    T: Send + 'static,
    F: FnMut(T, T) -> T + Send,
{
    let mut collector = ReduceCollector { acc: None, op };
    flow.collect(&mut collector).await?;
    collector.acc.ok_or(FlowError::Empty)
}

struct SingleCollector<T> {
    value: Option<T>,
}

#[async_trait]
impl<T> Collector<T> for SingleCollector<T>
where
    T: Send + 'static,
{
    async fn accept(&mut self, value: T) -> FlowResult<()> {
        if self.value.is_some() {
            return Err(FlowError::TooManyElements);
        }
        self.value = Some(value);
        Ok(())
    }
}

/// The only value of the flow. Fails with [`FlowError::Empty`] or
/// [`FlowError::TooManyElements`] otherwise.
pub async fn single<T>(flow: &Flow<T>) -> FlowResult<T>
where
    T: Send + 'static,
{
    single_or_none(flow).await?.ok_or(FlowError::Empty)
}

/// The only value of the flow, or `None` if it is empty. Fails with
/// [`FlowError::TooManyElements`] as soon as a second value is emitted.
pub async fn single_or_none<T>(flow: &Flow<T>) -> FlowResult<Option<T>>
where
    T: Send + 'static,
{
    let mut collector = SingleCollector { value: None };
    flow.collect(&mut collector).await?;
    Ok(collector.value)
}

/// The first value of the flow. The upstream is stopped right after it.
pub async fn first<T>(flow: &Flow<T>) -> FlowResult<T>
where
    T: Send + 'static,
{
    first_or_none(flow).await?.ok_or(FlowError::Empty)
}

/// The first value of the flow, or `None` if it is empty
pub async fn first_or_none<T>(flow: &Flow<T>) -> FlowResult<Option<T>>
where
    T: Send + 'static,
{
    single_or_none(&limit::first(flow.clone())).await
}

/// Number of values emitted
pub async fn count<T>(flow: &Flow<T>) -> FlowResult<usize>
where
    T: Send + 'static,
{
    count_matching(flow, |_| true).await
}

/// Number of values matching `predicate`
pub async fn count_matching<T, P>(flow: &Flow<T>, predicate: P) -> FlowResult<usize>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync,
{
    let mut count = 0usize;
    let mut collector = collector_fn(|value: T| {
        if predicate(&value) {
            count += 1;
        }
        futures_util::future::ready(Ok(()))
    });
    flow.collect(&mut collector).await?;
    Ok(count)
}

/// Append every value to `container`
pub async fn collect_into<T, C>(flow: &Flow<T>, container: &mut C) -> FlowResult<()>
where
    T: Send + 'static,
    C: Extend<T> + Send,
{
    let mut collector = collector_fn(|value: T| {
        container.extend(std::iter::once(value));
        futures_util::future::ready(Ok(()))
    });
    flow.collect(&mut collector).await
}

/// Collect every value into a vector, in emission order
pub async fn to_vec<T>(flow: &Flow<T>) -> FlowResult<Vec<T>>
where
    T: Send + 'static,
{
    let mut values = Vec::new();
    collect_into(flow, &mut values).await?;
    Ok(values)
}

/// Collect every distinct value into a set
pub async fn to_set<T>(flow: &Flow<T>) -> FlowResult<HashSet<T>>
where
    T: Eq + Hash + Send + 'static,
{
    let mut values = HashSet::new();
    collect_into(flow, &mut values).await?;
    Ok(values)
}

/// Run `action` for every value
pub async fn for_each<T, F, Fut>(flow: &Flow<T>, action: F) -> FlowResult<()>
where
    T: Send + 'static,
    F: FnMut(T) -> Fut + Send,
    Fut: Future<Output = FlowResult<()>> + Send,
{
    let mut collector = collector_fn(action);
    flow.collect(&mut collector).await
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Collect the flow on a spawned tokio task and expose its values as a stream.
///
/// A failure of the flow is the last item of the stream. Dropping the stream
/// cancels the collection.
///
/// # Panics
/// When called outside of a tokio runtime.
pub fn into_stream<T>(flow: Flow<T>) -> impl Stream<Item = FlowResult<T>> + Send
where
    T: Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<FlowResult<T>>(1);
    let task = AbortOnDrop(tokio::spawn(async move {
        let sender = tx.clone();
        let mut collector = collector_fn(move |value: T| {
            let sender = sender.clone();
            async move {
                sender
                    .send(Ok(value))
                    .await
                    .map_err(|_| FlowError::Cancelled)
            }
        });
        if let Err(error) = flow.collect(&mut collector).await {
            let _ = tx.send(Err(error)).await;
        }
    }));

    async_stream::stream! {
        let _task = task;
        while let Some(item) = rx.recv().await {
            yield item;
        }
    }
}
