//! Concurrent merging of flows
//!
//! `flat_map` collects one child flow per upstream value, all of them
//! concurrently inside a structured region, and funnels their values into the
//! single downstream collector.
//!
//! The downstream is only ever entered by the current *writer*. A child that
//! wins the `writing` flag emits its value directly, after any value queued
//! before it, and then drains whatever other children queued meanwhile. A
//! child that loses the flag queues its value in the bounded overflow queue
//! (suspending while it is full) and then tries the flag once more, because
//! the writer may have seen an empty queue and left just before the value
//! arrived. The writer re-checks the queue after giving the flag up for the
//! same reason.

use async_trait::async_trait;
use futures_util::pin_mut;
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, Semaphore};

use crate::collector::Collector;
use crate::constructors::from_iter;
use crate::error::{FlowError, FlowResult};
use crate::flow::{Flow, Producer};
use crate::flow_configuration::MergeConfig;
use crate::region::{RegionHandle, TaskRegion};

/// Map every value to a flow and merge all of them concurrently, with the
/// default [`MergeConfig`].
///
/// There is no ordering guarantee between values of different children.
pub fn flat_map<T, U, F>(upstream: Flow<T>, mapper: F) -> Flow<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Flow<U> + Send + Sync + 'static,
{
    Flow::unchecked(FlatMap {
        upstream,
        mapper,
        config: MergeConfig::default(),
    })
}

/// Map every value to a flow and merge all of them concurrently.
///
/// `config.buffer_size` bounds the values queued across all children while the
/// downstream is busy; `config.concurrency` bounds the number of children
/// collected at the same time and suspends the upstream when reached.
pub fn flat_map_with<T, U, F>(upstream: Flow<T>, config: MergeConfig, mapper: F) -> FlowResult<Flow<U>>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Flow<U> + Send + Sync + 'static,
{
    config.validate()?;
    Ok(Flow::unchecked(FlatMap {
        upstream,
        mapper,
        config,
    }))
}

/// Collect every inner flow concurrently and merge their values
pub fn flatten_merge<T>(flows: Flow<Flow<T>>) -> Flow<T>
where
    T: Send + 'static,
{
    flat_map(flows, |inner| inner)
}

/// Merge the given flows into a single flow with no guarantees on the order
///
/// # Examples
/// ```
/// use rs2_flow::*;
/// use std::collections::HashSet;
///
/// # async fn example() -> FlowResult<()> {
/// let merged = merge(vec![from_iter(vec![1, 2]), from_iter(vec![3, 4])]);
/// let values: HashSet<i32> = merged.to_set().await?;
/// assert_eq!(values, HashSet::from([1, 2, 3, 4]));
/// # Ok(())
/// # }
/// ```
pub fn merge<T, I>(flows: I) -> Flow<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Flow<T>>,
{
    let flows: Vec<Flow<T>> = flows.into_iter().collect();
    flatten_merge(from_iter(flows))
}

struct FlatMap<T, F> {
    upstream: Flow<T>,
    mapper: F,
    config: MergeConfig,
}

#[async_trait]
impl<T, U, F> Producer<U> for FlatMap<T, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Flow<U> + Send + Sync,
{
    async fn produce(&self, downstream: &mut dyn Collector<U>) -> FlowResult<()> {
        let state = MergeState::new(downstream, self.config.buffer_size);
        let (region, handle) = TaskRegion::new();

        let spawner = ChildSpawner {
            mapper: &self.mapper,
            state: &state,
            region: handle,
            slots: self.config.concurrency.map(|n| Arc::new(Semaphore::new(n))),
        };
        let upstream = &self.upstream;
        let outer = async move {
            let mut spawner = spawner;
            let result = upstream.collect(&mut spawner).await;
            // Closing the handle lets the region finish once the children are done
            drop(spawner);
            result
        };

        region.run(outer).await
    }
}

/// Upstream collector: starts one child per value
struct ChildSpawner<'r, 'd, F, U> {
    mapper: &'r F,
    state: &'r MergeState<'d, U>,
    region: RegionHandle<'r>,
    slots: Option<Arc<Semaphore>>,
}

#[async_trait]
impl<'r, 'd, T, U, F> Collector<T> for ChildSpawner<'r, 'd, F, U>
where
    'd: 'r,
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Flow<U> + Sync,
{
    async fn accept(&mut self, value: T) -> FlowResult<()> {
        let permit = match &self.slots {
            Some(slots) => Some(
                Arc::clone(slots)
                    .acquire_owned()
                    .await
                    .map_err(|_| FlowError::Cancelled)?,
            ),
            None => None,
        };
        let inner = (self.mapper)(value);
        let state = self.state;
        self.region.spawn(async move {
            let _permit = permit;
            let mut pusher = PushCollector { state };
            inner.collect(&mut pusher).await
        })
    }
}

/// Child collector: hands every value to the writer protocol
struct PushCollector<'r, 'd, U> {
    state: &'r MergeState<'d, U>,
}

#[async_trait]
impl<'r, 'd, U> Collector<U> for PushCollector<'r, 'd, U>
where
    'd: 'r,
    U: Send + 'static,
{
    async fn accept(&mut self, value: U) -> FlowResult<()> {
        self.state.push(value).await
    }
}

/// Per-collection state of one merge
struct MergeState<'d, U> {
    writing: AtomicBool,
    downstream: UnsafeCell<&'d mut dyn Collector<U>>,
    queue: OverflowQueue<U>,
}

// SAFETY: `downstream` is only dereferenced by the caller that moved `writing`
// from false to true, and only until it stores false again, so the mutable
// reference is never reachable from two places at once.
unsafe impl<U: Send> Sync for MergeState<'_, U> {}

impl<'d, U> MergeState<'d, U>
where
    U: Send + 'static,
{
    fn new(downstream: &'d mut dyn Collector<U>, buffer_size: usize) -> Self {
        Self {
            writing: AtomicBool::new(false),
            downstream: UnsafeCell::new(downstream),
            queue: OverflowQueue::new(buffer_size),
        }
    }

    fn try_acquire(&self) -> bool {
        self.writing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    async fn push(&self, value: U) -> FlowResult<()> {
        if self.try_acquire() {
            return self.write(Some(value)).await;
        }

        let seq = self.queue.push(value);
        loop {
            let changed = self.queue.changed.notified();
            pin_mut!(changed);
            changed.as_mut().enable();

            if self.queue.is_admitted(seq) {
                break;
            }
            // Rendezvous or full queue: the writer may have left without taking
            // our value, in which case nobody else will.
            if self.try_acquire() {
                return self.write(None).await;
            }
            changed.await;
        }

        if self.try_acquire() {
            return self.write(None).await;
        }
        Ok(())
    }

    /// Must only be called after winning `writing`. A failing `accept` leaves the
    /// flag set: the region is torn down anyway.
    ///
    /// Values already queued go before `own`, which may come from a child whose
    /// previous value is still in the queue.
    async fn write(&self, mut own: Option<U>) -> FlowResult<()> {
        loop {
            {
                // SAFETY: this caller owns the `writing` flag.
                let downstream: &mut dyn Collector<U> = unsafe { &mut **self.downstream.get() };
                while let Some(value) = self.queue.pop() {
                    downstream.accept(value).await?;
                }
                if let Some(value) = own.take() {
                    downstream.accept(value).await?;
                }
                while let Some(value) = self.queue.pop() {
                    downstream.accept(value).await?;
                }
            }

            self.writing.store(false, Ordering::Release);
            self.queue.changed.notify_waiters();

            if self.queue.is_empty() || !self.try_acquire() {
                return Ok(());
            }
        }
    }
}

/// FIFO queue of values waiting for the writer.
///
/// A value counts against the capacity from the moment it is queued until the
/// writer takes it. The queuing child suspends while its value is beyond the
/// capacity, so with a capacity of 0 it waits until its value was emitted.
struct OverflowQueue<U> {
    capacity: u64,
    inner: Mutex<QueueInner<U>>,
    changed: Notify,
}

struct QueueInner<U> {
    items: VecDeque<U>,
    enqueued: u64,
    dequeued: u64,
}

impl<U> OverflowQueue<U> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity as u64,
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                enqueued: 0,
                dequeued: 0,
            }),
            changed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner<U>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a value and return its sequence number
    fn push(&self, value: U) -> u64 {
        let mut inner = self.lock();
        let seq = inner.enqueued;
        inner.enqueued += 1;
        inner.items.push_back(value);
        seq
    }

    fn is_admitted(&self, seq: u64) -> bool {
        let inner = self.lock();
        seq < inner.dequeued + self.capacity
    }

    fn pop(&self) -> Option<U> {
        let value = {
            let mut inner = self.lock();
            let value = inner.items.pop_front();
            if value.is_some() {
                inner.dequeued += 1;
            }
            value
        };
        if value.is_some() {
            self.changed.notify_waiters();
        }
        value
    }

    fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}
