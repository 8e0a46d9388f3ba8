//! Structured regions of concurrently running child tasks
//!
//! A region is owned by one collection. Its children are polled by the task
//! that runs the collection, next to the outer iteration, so none of them can
//! outlive it. The first failure ends the region: every other child is
//! dropped together with the outer iteration.
//!
//! Each region carries a [`CancelScope`] that is flagged as soon as the region
//! is over, whether it completed, failed or was dropped from outside. Code a
//! child handed work to (a callback thread feeding a channel, say) watches
//! the scope to learn that nobody is listening any more.

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::pin_mut;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;

use crate::error::{FlowError, FlowResult};

/// Cancellation flag shared by a region and everything it spawned
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    cancelled: Arc<AtomicBool>,
}

impl CancelScope {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether the region owning this scope is over
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Flags the scope when the region is left, including by being dropped
struct CancelOnExit(CancelScope);

impl Drop for CancelOnExit {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

type Child<'r> = BoxFuture<'r, FlowResult<()>>;

/// Spawns children into a [`TaskRegion`]
pub(crate) struct RegionHandle<'r> {
    children: UnboundedSender<Child<'r>>,
    scope: CancelScope,
}

impl<'r> RegionHandle<'r> {
    pub(crate) fn spawn<F>(&self, child: F) -> FlowResult<()>
    where
        F: Future<Output = FlowResult<()>> + Send + 'r,
    {
        self.children
            .unbounded_send(child.boxed())
            .map_err(|_| FlowError::Cancelled)
    }

    /// Scope of the region, to hand to children
    pub(crate) fn scope(&self) -> &CancelScope {
        &self.scope
    }
}

pub(crate) struct TaskRegion<'r> {
    children: FuturesUnordered<Child<'r>>,
    incoming: UnboundedReceiver<Child<'r>>,
    scope: CancelScope,
}

impl<'r> TaskRegion<'r> {
    pub(crate) fn new() -> (Self, RegionHandle<'r>) {
        let scope = CancelScope::new();
        let (tx, rx) = mpsc::unbounded();
        let region = TaskRegion {
            children: FuturesUnordered::new(),
            incoming: rx,
            scope: scope.clone(),
        };
        (region, RegionHandle { children: tx, scope })
    }

    /// Drive `outer` and every child spawned through the region's handles.
    ///
    /// Completes once `outer` has finished, every handle is gone and every child
    /// has finished, or with the first failure of any of them.
    pub(crate) async fn run<F>(mut self, outer: F) -> FlowResult<()>
    where
        F: Future<Output = FlowResult<()>>,
    {
        let _exit = CancelOnExit(self.scope.clone());
        pin_mut!(outer);
        let mut outer_done = false;
        let mut handles_closed = false;

        let result: FlowResult<()> = future::poll_fn(|cx| {
            if !outer_done {
                if let Poll::Ready(result) = outer.as_mut().poll(cx) {
                    if let Err(error) = result {
                        self.scope.cancel();
                        return Poll::Ready(Err(error));
                    }
                    outer_done = true;
                }
            }

            while !handles_closed {
                match self.incoming.poll_next_unpin(cx) {
                    Poll::Ready(Some(child)) => self.children.push(child),
                    Poll::Ready(None) => handles_closed = true,
                    Poll::Pending => break,
                }
            }

            while let Poll::Ready(Some(result)) = self.children.poll_next_unpin(cx) {
                if let Err(error) = result {
                    // Flag before any sibling gets polled again
                    self.scope.cancel();
                    return Poll::Ready(Err(error));
                }
            }

            if outer_done && handles_closed && self.children.is_empty() {
                Poll::Ready(Ok(()))
            } else {
                Poll::Pending
            }
        })
        .await;

        if let Err(error) = &result {
            log::debug!(
                "Cancelling {} child task(s) after failure: {}",
                self.children.len(),
                error
            );
        }
        result
    }
}
