//! Flow - a cold, push-based asynchronous stream
//!
//! A [`Flow`] is an immutable blueprint describing how to produce values into a
//! [`Collector`]. Nothing happens until it is collected, and every collection
//! re-executes the producer from scratch.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;

use crate::collector::{Collector, SafeCollector};
use crate::error::FlowResult;

/// The producing side of a flow: drives values into the given collector.
///
/// `produce` may suspend any number of times; cancellation only takes effect
/// at a suspension point.
#[async_trait]
pub trait Producer<T>: Send + Sync {
    async fn produce(&self, collector: &mut dyn Collector<T>) -> FlowResult<()>;
}

/// A cold asynchronous flow of values of type `T`.
///
/// Cloning is cheap and clones share the same blueprint.
pub struct Flow<T> {
    producer: Arc<dyn Producer<T>>,
}

impl<T> Clone for Flow<T> {
    fn clone(&self) -> Self {
        Flow {
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<T> Flow<T>
where
    T: Send + 'static,
{
    /// Create a flow from a producer. Every emission of a collection must happen
    /// in the execution context that started the collection.
    pub fn from_producer<P>(producer: P) -> Self
    where
        P: Producer<T> + 'static,
    {
        Flow {
            producer: Arc::new(Guarded(producer)),
        }
    }

    /// Create a flow without the context check. Only for operators that never
    /// leave the context of their own collection.
    pub(crate) fn unchecked<P>(producer: P) -> Self
    where
        P: Producer<T> + 'static,
    {
        Flow {
            producer: Arc::new(producer),
        }
    }

    /// Run one collection of this flow into `collector`
    pub async fn collect(&self, collector: &mut dyn Collector<T>) -> FlowResult<()> {
        self.producer.produce(collector).await
    }
}

/// Create a flow from an async block driving a collector.
///
/// # Examples
/// ```
/// use rs2_flow::*;
///
/// # async fn example() -> FlowResult<()> {
/// let numbers: Flow<u32> = flow(|collector| Box::pin(async move {
///     for i in 1..=3 {
///         collector.accept(i).await?;
///     }
///     Ok(())
/// }));
///
/// assert_eq!(numbers.to_vec().await?, vec![1, 2, 3]);
/// # Ok(())
/// # }
/// ```
pub fn flow<T, F>(block: F) -> Flow<T>
where
    T: Send + 'static,
    F: for<'a> Fn(&'a mut dyn Collector<T>) -> BoxFuture<'a, FlowResult<()>>
        + Send
        + Sync
        + 'static,
{
    Flow::from_producer(FnProducer(block))
}

/// Same as [`flow`], without the context check
pub(crate) fn unchecked_flow<T, F>(block: F) -> Flow<T>
where
    T: Send + 'static,
    F: for<'a> Fn(&'a mut dyn Collector<T>) -> BoxFuture<'a, FlowResult<()>>
        + Send
        + Sync
        + 'static,
{
    Flow::unchecked(FnProducer(block))
}

struct FnProducer<F>(F);

#[async_trait]
impl<T, F> Producer<T> for FnProducer<F>
where
    T: Send + 'static,
    F: for<'a> Fn(&'a mut dyn Collector<T>) -> BoxFuture<'a, FlowResult<()>> + Send + Sync,
{
    async fn produce(&self, collector: &mut dyn Collector<T>) -> FlowResult<()> {
        (self.0)(collector).await
    }
}

struct Guarded<P>(P);

#[async_trait]
impl<T, P> Producer<T> for Guarded<P>
where
    T: Send + 'static,
    P: Producer<T>,
{
    async fn produce(&self, collector: &mut dyn Collector<T>) -> FlowResult<()> {
        let mut guard = SafeCollector::new(collector);
        self.0.produce(&mut guard).await
    }
}
