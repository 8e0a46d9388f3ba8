//! Background collection with ordered handlers
//!
//! Handlers are registered on a [`LaunchBuilder`] in a fixed order:
//! `on_each` first, then any number of `catch` handlers (one per error type),
//! then at most one `finally`. Any other order is rejected right away.

use futures_util::future::{BoxFuture, FutureExt};
use std::any::{type_name, TypeId};
use std::error::Error as StdError;
use std::future::Future;
use tokio::task::JoinHandle;

use crate::collector::collector_fn;
use crate::error::{FlowError, FlowResult};
use crate::flow::Flow;

type EachHandler<T> = Box<dyn FnMut(T) -> BoxFuture<'static, FlowResult<()>> + Send>;
type FinallyHandler = Box<dyn FnOnce(Option<&FlowError>) + Send>;

struct CatchHandler {
    type_id: TypeId,
    type_name: &'static str,
    handle: Box<dyn Fn(&FlowError) -> Option<FlowResult<()>> + Send + Sync>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Empty,
    Each,
    Catch,
    Finally,
}

/// Handlers of a launched collection
pub struct LaunchBuilder<T> {
    stage: Stage,
    each: Option<EachHandler<T>>,
    catches: Vec<CatchHandler>,
    finally: Option<FinallyHandler>,
}

impl<T> Default for LaunchBuilder<T> {
    fn default() -> Self {
        Self {
            stage: Stage::Empty,
            each: None,
            catches: Vec::new(),
            finally: None,
        }
    }
}

impl<T> LaunchBuilder<T>
where
    T: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler for every value. Must be registered first, and only once.
    pub fn on_each<F, Fut>(mut self, mut handler: F) -> FlowResult<Self>
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = FlowResult<()>> + Send + 'static,
    {
        if self.stage != Stage::Empty {
            return Err(FlowError::Config(
                "on_each should be the first registered handler".to_string(),
            ));
        }
        self.each = Some(Box::new(move |value: T| handler(value).boxed()));
        self.stage = Stage::Each;
        Ok(self)
    }

    /// Handler for failures of type `E`, found either in the failure payload or
    /// as the flow error itself. Its result becomes the result of the task.
    pub fn catch<E, F>(mut self, handler: F) -> FlowResult<Self>
    where
        E: StdError + 'static,
        F: Fn(&E) -> FlowResult<()> + Send + Sync + 'static,
    {
        match self.stage {
            Stage::Each | Stage::Catch => {}
            Stage::Empty => {
                return Err(FlowError::Config(
                    "catch should be registered after on_each".to_string(),
                ))
            }
            Stage::Finally => {
                return Err(FlowError::Config(
                    "catch should be registered before finally".to_string(),
                ))
            }
        }
        let type_id = TypeId::of::<E>();
        if self.catches.iter().any(|catch| catch.type_id == type_id) {
            return Err(FlowError::Config(format!(
                "catch for {} is already registered",
                type_name::<E>()
            )));
        }
        self.catches.push(CatchHandler {
            type_id,
            type_name: type_name::<E>(),
            handle: Box::new(move |error: &FlowError| error.downcast_ref::<E>().map(&handler)),
        });
        self.stage = Stage::Catch;
        Ok(self)
    }

    /// Handler run once the collection finished, with its failure if any
    pub fn finally<F>(mut self, handler: F) -> FlowResult<Self>
    where
        F: FnOnce(Option<&FlowError>) + Send + 'static,
    {
        match self.stage {
            Stage::Each | Stage::Catch => {}
            Stage::Empty => {
                return Err(FlowError::Config(
                    "finally should be registered after on_each".to_string(),
                ))
            }
            Stage::Finally => {
                return Err(FlowError::Config(
                    "finally is already registered".to_string(),
                ))
            }
        }
        self.finally = Some(Box::new(handler));
        self.stage = Stage::Finally;
        Ok(self)
    }
}

/// Start collecting `flow` on a new tokio task with the handlers of `builder`.
///
/// A failure goes to the first `catch` handler matching it; without one it is
/// logged and becomes the result of the task.
///
/// # Examples
/// ```
/// use rs2_flow::*;
///
/// # async fn example() -> FlowResult<()> {
/// let builder = LaunchBuilder::new()
///     .on_each(|value: i32| async move {
///         println!("{}", value);
///         Ok(())
///     })?
///     .catch::<std::io::Error, _>(|_| Ok(()))?
///     .finally(|cause| assert!(cause.is_none()))?;
///
/// let handle = launch(from_iter(1..=3), builder)?;
/// handle.await.map_err(FlowError::failed)??;
/// # Ok(())
/// # }
/// ```
pub fn launch<T>(flow: Flow<T>, builder: LaunchBuilder<T>) -> FlowResult<JoinHandle<FlowResult<()>>>
where
    T: Send + 'static,
{
    let LaunchBuilder {
        each,
        catches,
        finally,
        ..
    } = builder;
    let each = each.ok_or_else(|| {
        FlowError::Config("on_each should be registered before launch".to_string())
    })?;
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|err| FlowError::Config(format!("launch requires a tokio runtime: {}", err)))?;

    Ok(runtime.spawn(async move {
        let mut collector = collector_fn(each);
        let cause = flow.collect(&mut collector).await.err();

        let result = match &cause {
            None => Ok(()),
            Some(error) => match catches
                .iter()
                .find_map(|catch| (catch.handle)(error).map(|result| (catch.type_name, result)))
            {
                Some((type_name, result)) => {
                    log::debug!("Launched flow failure handled as {}: {}", type_name, error);
                    result
                }
                None => {
                    log::warn!("Launched flow failed without a matching handler: {}", error);
                    Err(error.clone())
                }
            },
        };

        if let Some(finally) = finally {
            finally(cause.as_ref());
        }
        result
    }))
}
