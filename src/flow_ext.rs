use futures_core::Stream;
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::collector::Collector;
use crate::error::{FlowError, FlowResult, RetryPolicy};
use crate::flow::Flow;
use crate::flow_configuration::MergeConfig;
use crate::launch::{self, LaunchBuilder};
use crate::operators;
use crate::pipe::Pipe;
use crate::terminal;

/// Extension trait providing method syntax for every operator and terminal
pub trait FlowExt<T>: Sized
where
    T: Send + 'static,
{
    fn into_flow(self) -> Flow<T>;

    fn as_flow(&self) -> &Flow<T>;

    /// Apply `body` to each value, see [`operators::transform`]
    fn transform<U, B>(self, body: B) -> Flow<U>
    where
        U: Send + 'static,
        B: for<'a> Fn(T, &'a mut dyn Collector<U>) -> BoxFuture<'a, FlowResult<()>>
            + Send
            + Sync
            + 'static,
    {
        operators::transform(self.into_flow(), body)
    }

    /// Map elements of the flow with a function
    fn map<U, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        operators::map(self.into_flow(), f)
    }

    /// Map elements of the flow with an async function
    fn eval_map<U, F, Fut>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = U> + Send + 'static,
    {
        operators::eval_map(self.into_flow(), f)
    }

    fn filter<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        operators::filter(self.into_flow(), predicate)
    }

    fn filter_not<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        operators::filter_not(self.into_flow(), predicate)
    }

    fn filter_map<U, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Option<U> + Send + Sync + 'static,
    {
        operators::filter_map(self.into_flow(), f)
    }

    fn on_each<F>(self, action: F) -> Flow<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        operators::on_each(self.into_flow(), action)
    }

    /// Skip the first `count` elements
    fn drop_first(self, count: usize) -> Flow<T> {
        operators::drop_first(self.into_flow(), count)
    }

    fn drop_while<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        operators::drop_while(self.into_flow(), predicate)
    }

    /// Take at most `count` elements, failing right away if `count` is zero
    fn take(self, count: usize) -> FlowResult<Flow<T>> {
        operators::take(self.into_flow(), count)
    }

    fn take_while<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        operators::take_while(self.into_flow(), predicate)
    }

    fn distinct_until_changed(self) -> Flow<T>
    where
        T: PartialEq + Clone,
    {
        operators::distinct_until_changed(self.into_flow())
    }

    fn distinct_until_changed_by<K, F>(self, key_fn: F) -> Flow<T>
    where
        K: PartialEq + Send + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        operators::distinct_until_changed_by(self.into_flow(), key_fn)
    }

    fn distinct_until_changed_with<F>(self, are_equivalent: F) -> Flow<T>
    where
        T: Clone,
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        operators::distinct_until_changed_with(self.into_flow(), are_equivalent)
    }

    fn delay_flow(self, delay: Duration) -> Flow<T> {
        operators::delay_flow(self.into_flow(), delay)
    }

    fn delay_each(self, delay: Duration) -> Flow<T> {
        operators::delay_each(self.into_flow(), delay)
    }

    /// Map every element to a flow and merge them concurrently
    fn flat_map<U, F>(self, mapper: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Flow<U> + Send + Sync + 'static,
    {
        operators::flat_map(self.into_flow(), mapper)
    }

    fn flat_map_with<U, F>(self, config: MergeConfig, mapper: F) -> FlowResult<Flow<U>>
    where
        U: Send + 'static,
        F: Fn(T) -> Flow<U> + Send + Sync + 'static,
    {
        operators::flat_map_with(self.into_flow(), config, mapper)
    }

    /// Map every element to a flow and collect them one after another
    fn flat_map_concat<U, F>(self, mapper: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Flow<U> + Send + Sync + 'static,
    {
        operators::flat_map_concat(self.into_flow(), mapper)
    }

    /// Merge this flow with another one, interleaving their elements
    fn merge_with(self, other: Flow<T>) -> Flow<T> {
        operators::merge(vec![self.into_flow(), other])
    }

    fn retry<P>(self, retries: usize, predicate: P) -> FlowResult<Flow<T>>
    where
        P: Fn(&FlowError) -> bool + Send + Sync + 'static,
    {
        operators::retry(self.into_flow(), retries, predicate)
    }

    fn retry_with_policy<P>(self, policy: RetryPolicy, predicate: P) -> FlowResult<Flow<T>>
    where
        P: Fn(&FlowError) -> bool + Send + Sync + 'static,
    {
        operators::retry_with_policy(self.into_flow(), policy, predicate)
    }

    fn on_error_collect<P>(self, fallback: Flow<T>, predicate: P) -> Flow<T>
    where
        P: Fn(&FlowError) -> bool + Send + Sync + 'static,
    {
        operators::on_error_collect(self.into_flow(), fallback, predicate)
    }

    fn on_error_return<P>(self, value: T, predicate: P) -> Flow<T>
    where
        T: Clone + Sync,
        P: Fn(&FlowError) -> bool + Send + Sync + 'static,
    {
        operators::on_error_return(self.into_flow(), value, predicate)
    }

    fn on_error_resume_with<H>(self, handler: H) -> Flow<T>
    where
        H: Fn(FlowError) -> FlowResult<Flow<T>> + Send + Sync + 'static,
    {
        operators::on_error_resume_with(self.into_flow(), handler)
    }

    fn on_error<F>(self, action: F) -> Flow<T>
    where
        F: Fn(&FlowError) + Send + Sync + 'static,
    {
        operators::on_error(self.into_flow(), action)
    }

    /// Apply a pipe to this flow
    fn through<U>(self, pipe: &Pipe<T, U>) -> Flow<U> {
        pipe.apply(self.into_flow())
    }

    fn fold<'a, A, F, Fut>(&'a self, init: A, op: F) -> BoxFuture<'a, FlowResult<A>>
    where
        A: Send + 'a,
        F: FnMut(A, T) -> Fut + Send + 'a,
        Fut: Future<Output = A> + Send + 'a,
    {
        terminal::fold(self.as_flow(), init, op).boxed()
    }

    fn reduce<'a, F>(&'a self, op: F) -> BoxFuture<'a, FlowResult<T>>
    where
        F: FnMut(T, T) -> T + Send + 'a,
    {
        terminal::reduce(self.as_flow(), op).boxed()
    }

    fn single(&self) -> BoxFuture<'_, FlowResult<T>> {
        terminal::single(self.as_flow()).boxed()
    }

    fn single_or_none(&self) -> BoxFuture<'_, FlowResult<Option<T>>> {
        terminal::single_or_none(self.as_flow()).boxed()
    }

    fn first(&self) -> BoxFuture<'_, FlowResult<T>> {
        terminal::first(self.as_flow()).boxed()
    }

    fn first_or_none(&self) -> BoxFuture<'_, FlowResult<Option<T>>> {
        terminal::first_or_none(self.as_flow()).boxed()
    }

    fn count(&self) -> BoxFuture<'_, FlowResult<usize>> {
        terminal::count(self.as_flow()).boxed()
    }

    fn count_matching<'a, P>(&'a self, predicate: P) -> BoxFuture<'a, FlowResult<usize>>
    where
        P: Fn(&T) -> bool + Send + Sync + 'a,
    {
        terminal::count_matching(self.as_flow(), predicate).boxed()
    }

    fn to_vec(&self) -> BoxFuture<'_, FlowResult<Vec<T>>> {
        terminal::to_vec(self.as_flow()).boxed()
    }

    fn to_set(&self) -> BoxFuture<'_, FlowResult<HashSet<T>>>
    where
        T: Eq + Hash,
    {
        terminal::to_set(self.as_flow()).boxed()
    }

    fn collect_into<'a, C>(&'a self, container: &'a mut C) -> BoxFuture<'a, FlowResult<()>>
    where
        C: Extend<T> + Send,
    {
        terminal::collect_into(self.as_flow(), container).boxed()
    }

    fn for_each<'a, F, Fut>(&'a self, action: F) -> BoxFuture<'a, FlowResult<()>>
    where
        F: FnMut(T) -> Fut + Send + 'a,
        Fut: Future<Output = FlowResult<()>> + Send + 'a,
    {
        terminal::for_each(self.as_flow(), action).boxed()
    }

    /// Collect on a spawned task and expose the elements as a stream
    fn into_stream(self) -> impl Stream<Item = FlowResult<T>> + Send {
        terminal::into_stream(self.into_flow())
    }

    /// Collect on a spawned task with the handlers of `builder`
    fn launch(self, builder: LaunchBuilder<T>) -> FlowResult<JoinHandle<FlowResult<()>>> {
        launch::launch(self.into_flow(), builder)
    }
}

impl<T> FlowExt<T> for Flow<T>
where
    T: Send + 'static,
{
    fn into_flow(self) -> Flow<T> {
        self
    }

    fn as_flow(&self) -> &Flow<T> {
        self
    }
}

/// Method syntax for flows of optional values
pub trait OptionFlowExt<T>
where
    T: Send + 'static,
{
    /// Drop the `None` elements
    fn filter_some(self) -> Flow<T>;
}

impl<T> OptionFlowExt<T> for Flow<Option<T>>
where
    T: Send + 'static,
{
    fn filter_some(self) -> Flow<T> {
        operators::filter_some(self)
    }
}

/// Method syntax for flows of flows
pub trait NestedFlowExt<T>
where
    T: Send + 'static,
{
    /// Collect the inner flows concurrently
    fn flatten_merge(self) -> Flow<T>;

    /// Collect the inner flows one after another
    fn concatenate(self) -> Flow<T>;
}

impl<T> NestedFlowExt<T> for Flow<Flow<T>>
where
    T: Send + 'static,
{
    fn flatten_merge(self) -> Flow<T> {
        operators::flatten_merge(self)
    }

    fn concatenate(self) -> Flow<T> {
        operators::concatenate(self)
    }
}
