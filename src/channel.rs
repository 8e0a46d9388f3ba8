//! Bridge from push-based sources into a flow
//!
//! [`from_channel`] lets callback-style or otherwise externally driven code
//! push values into a flow through a [`FlowSender`]. The sending block runs
//! concurrently with the forwarding loop inside the collection's region, and
//! a bounded buffer between the two applies backpressure to the sender.

use async_trait::async_trait;
use futures::channel::mpsc;
use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::collector::Collector;
use crate::error::{FlowError, FlowResult};
use crate::flow::{Flow, Producer};
use crate::flow_configuration::ChannelConfig;
use crate::region::{CancelScope, TaskRegion};

enum Event<T> {
    Value(T),
    Error(FlowError),
}

type CloseHook = Box<dyn FnOnce() + Send + 'static>;

/// Hooks to run once the channel is closed. `None` once they ran.
struct CloseHooks {
    hooks: Mutex<Option<Vec<CloseHook>>>,
}

impl CloseHooks {
    fn new() -> Self {
        Self {
            hooks: Mutex::new(Some(Vec::new())),
        }
    }

    fn register(&self, hook: CloseHook) {
        let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        match hooks.as_mut() {
            Some(pending) => pending.push(hook),
            None => {
                drop(hooks);
                hook();
            }
        }
    }

    fn run(&self) {
        let pending = self
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pending) = pending {
            log::trace!("Running {} close hook(s)", pending.len());
            for hook in pending {
                hook();
            }
        }
    }
}

/// Runs the close hooks when the collection ends, however it ends
struct CloseGuard(Arc<CloseHooks>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.run();
    }
}

/// Sending side of a [`from_channel`] flow
pub struct FlowSender<T> {
    tx: mpsc::Sender<Event<T>>,
    hooks: Arc<CloseHooks>,
    scope: CancelScope,
}

impl<T> Clone for FlowSender<T> {
    fn clone(&self) -> Self {
        FlowSender {
            tx: self.tx.clone(),
            hooks: Arc::clone(&self.hooks),
            scope: self.scope.clone(),
        }
    }
}

impl<T> FlowSender<T>
where
    T: Send + 'static,
{
    /// Send a value, suspending while the buffer is full.
    ///
    /// Fails with [`FlowError::Cancelled`] once the channel is closed, which
    /// also happens when the collector stopped early.
    pub async fn send(&mut self, value: T) -> FlowResult<()> {
        self.tx
            .send(Event::Value(value))
            .await
            .map_err(|_| FlowError::Cancelled)
    }

    /// Send a value without suspending
    pub fn try_send(&mut self, value: T) -> FlowResult<()> {
        self.tx.try_send(Event::Value(value)).map_err(|err| {
            if err.is_full() {
                FlowError::BackpressureOverflow
            } else {
                FlowError::Cancelled
            }
        })
    }

    /// Fail the flow with `error` and close the channel. Values sent before
    /// are still delivered first.
    pub async fn fail(&mut self, error: FlowError) -> FlowResult<()> {
        let result = self
            .tx
            .send(Event::Error(error))
            .await
            .map_err(|_| FlowError::Cancelled);
        self.close();
        result
    }

    /// Close the channel for every sender. The flow completes once the
    /// buffered values were delivered.
    pub fn close(&mut self) {
        self.tx.close_channel();
        self.hooks.run();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether the collection this sender feeds is over. Work handed off to
    /// other threads polls this to stop once nobody is listening.
    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// Scope of the collection, for code that does not own a sender
    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    /// Register `hook` to run once the channel is closed or the collection
    /// ends. Runs it right away if that already happened.
    pub fn on_close<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks.register(Box::new(hook));
    }
}

/// Create a flow fed by `block` through a [`FlowSender`].
///
/// `block` is started anew for every collection. The flow completes when every
/// sender was dropped or closed and the buffer is drained, and fails with the
/// error of `block` or the one passed to [`FlowSender::fail`].
///
/// Each sender may get one value past `config.buffer_size` into the buffer, so
/// a buffer size of 0 lets every sender run at most one value ahead.
///
/// Once the collection is over, for any reason, [`FlowSender::is_cancelled`]
/// turns true for every clone of the sender, including clones living on other
/// threads.
pub fn from_channel<T, F, Fut>(config: ChannelConfig, block: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(FlowSender<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FlowResult<()>> + Send + 'static,
{
    Flow::unchecked(ChannelProducer { config, block })
}

struct ChannelProducer<F> {
    config: ChannelConfig,
    block: F,
}

#[async_trait]
impl<T, F, Fut> Producer<T> for ChannelProducer<F>
where
    T: Send + 'static,
    F: Fn(FlowSender<T>) -> Fut + Send + Sync,
    Fut: Future<Output = FlowResult<()>> + Send + 'static,
{
    async fn produce(&self, downstream: &mut dyn Collector<T>) -> FlowResult<()> {
        let (tx, mut rx) = mpsc::channel(self.config.buffer_size);
        let hooks = Arc::new(CloseHooks::new());
        let _guard = CloseGuard(Arc::clone(&hooks));

        let (region, handle) = TaskRegion::new();
        let sender = FlowSender {
            tx,
            hooks,
            scope: handle.scope().clone(),
        };
        handle.spawn((self.block)(sender))?;
        drop(handle);

        let forward = async move {
            while let Some(event) = rx.next().await {
                match event {
                    Event::Value(value) => downstream.accept(value).await?,
                    Event::Error(error) => return Err(error),
                }
            }
            Ok(())
        };
        region.run(forward).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn hooks_run_once() {
        let hooks = CloseHooks::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        hooks.register(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        hooks.run();
        hooks.run();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_hook_runs_immediately() {
        let hooks = CloseHooks::new();
        hooks.run();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        hooks.register(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
