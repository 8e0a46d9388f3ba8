//! The consuming side of a flow
//!
//! A [`Collector`] accepts the values of one collection, one at a time. Taking
//! `&mut self` means ordinary operators can never call a collector from two
//! places at once; the merge engine is the only code that has to uphold that
//! at runtime.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use crate::error::{FlowError, FlowResult};

/// Intermediate or terminal consumer of the values emitted by a flow.
///
/// Implementations are not required to be thread-safe: callers never invoke
/// `accept` concurrently on the same instance.
#[async_trait]
pub trait Collector<T>: Send {
    /// Consume one value. Returning an error fails the collection.
    async fn accept(&mut self, value: T) -> FlowResult<()>;
}

/// A collector backed by an async closure
pub struct FnCollector<F, T> {
    f: F,
    _item: PhantomData<fn(T)>,
}

/// Create a collector that hands every value to `f`
pub fn collector_fn<T, F, Fut>(f: F) -> FnCollector<F, T>
where
    F: FnMut(T) -> Fut + Send,
    Fut: Future<Output = FlowResult<()>> + Send,
    T: Send + 'static,
{
    FnCollector {
        f,
        _item: PhantomData,
    }
}

#[async_trait]
impl<T, F, Fut> Collector<T> for FnCollector<F, T>
where
    F: FnMut(T) -> Fut + Send,
    Fut: Future<Output = FlowResult<()>> + Send,
    T: Send + 'static,
{
    async fn accept(&mut self, value: T) -> FlowResult<()> {
        (self.f)(value).await
    }
}

/// Identity of the execution context a collection runs in.
///
/// Inside a tokio task this is the task id; outside of any task (for example
/// in the body of `Runtime::block_on`) it is the id of the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    Task(tokio::task::Id),
    Thread(std::thread::ThreadId),
}

impl ContextId {
    /// The context the caller is currently running in
    pub fn current() -> Self {
        match tokio::task::try_id() {
            Some(id) => ContextId::Task(id),
            None => ContextId::Thread(std::thread::current().id()),
        }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Task(id) => write!(f, "task {}", id),
            ContextId::Thread(id) => write!(f, "thread {:?}", id),
        }
    }
}

/// Collector bound to the context its collection started in.
pub(crate) struct SafeCollector<'a, T> {
    downstream: &'a mut dyn Collector<T>,
    context: ContextId,
}

impl<'a, T> SafeCollector<'a, T> {
    pub(crate) fn new(downstream: &'a mut dyn Collector<T>) -> Self {
        Self {
            downstream,
            context: ContextId::current(),
        }
    }
}

#[async_trait]
impl<'a, T> Collector<T> for SafeCollector<'a, T>
where
    T: Send + 'static,
{
    async fn accept(&mut self, value: T) -> FlowResult<()> {
        let current = ContextId::current();
        if current != self.context {
            log::error!(
                "Flow emitted from {} while its collection runs in {}",
                current,
                self.context
            );
            return Err(FlowError::ContextViolation {
                expected: self.context.to_string(),
                actual: current.to_string(),
            });
        }
        self.downstream.accept(value).await
    }
}
