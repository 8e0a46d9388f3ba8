//! Error types and handling for flows
//!
//! This module provides the single error type shared by every collection,
//! the private abort signal used by limiting operators, and the retry
//! policies understood by the recovery operators.

use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared, type-erased failure payload
pub type BoxError = Arc<dyn StdError + Send + Sync + 'static>;

/// Main error type for flow operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlowError {
    /// Invalid operator argument or handler registration, raised before any collection starts
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// A collector was invoked from a different execution context than the one that started it
    #[error("Flow invariant is violated: emission from {actual}, but collection was started in {expected}")]
    ContextViolation { expected: String, actual: String },
    /// The flow produced no element where at least one was required
    #[error("Expected at least one element")]
    Empty,
    /// The flow produced more than one element where exactly one was required
    #[error("Expected only one element")]
    TooManyElements,
    /// The collection was cancelled
    #[error("Flow was cancelled")]
    Cancelled,
    /// A bounded buffer could not accept a value without suspending
    #[error("Backpressure buffer overflow")]
    BackpressureOverflow,
    /// Custom error with message
    #[error("Flow error: {0}")]
    Custom(String),
    /// Arbitrary failure raised by producer or consumer code
    #[error("{0}")]
    Failed(BoxError),
    /// Early-termination signal of a limiting operator. Never escapes the operator that raised it.
    #[doc(hidden)]
    #[error("Flow limit is reached")]
    Aborted(AbortSignal),
}

impl FlowError {
    /// Wrap any error as a flow failure
    pub fn failed<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        FlowError::Failed(Arc::new(error))
    }

    /// Create a custom error with the given message
    pub fn custom(msg: impl Into<String>) -> Self {
        FlowError::Custom(msg.into())
    }

    /// Look for an error of type `E`, either inside a [`FlowError::Failed`] payload
    /// or as the flow error itself.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        let inner = match self {
            FlowError::Failed(inner) => inner.downcast_ref::<E>(),
            _ => None,
        };
        inner.or_else(|| (self as &(dyn StdError + 'static)).downcast_ref::<E>())
    }

    /// Whether this is the early-termination signal of a limiting operator
    pub fn is_abort(&self) -> bool {
        matches!(self, FlowError::Aborted(_))
    }

    /// Whether the collection was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FlowError::Cancelled)
    }
}

impl From<std::io::Error> for FlowError {
    fn from(err: std::io::Error) -> Self {
        FlowError::failed(err)
    }
}

impl From<tokio::time::error::Elapsed> for FlowError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        FlowError::Cancelled
    }
}

/// Result type for flow operations
pub type FlowResult<T> = Result<T, FlowError>;

/// Payload-less stop signal, tagged with the identity of the frame that raised it
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AbortSignal {
    owner: u64,
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal").finish_non_exhaustive()
    }
}

/// One limiting frame. Each collection of a limiting operator creates its own owner.
pub(crate) struct AbortOwner {
    id: u64,
}

impl AbortOwner {
    pub(crate) fn new() -> Self {
        static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub(crate) fn signal(&self) -> FlowError {
        FlowError::Aborted(AbortSignal { owner: self.id })
    }

    pub(crate) fn owns(&self, error: &FlowError) -> bool {
        matches!(error, FlowError::Aborted(signal) if signal.owner == self.id)
    }
}

/// Retry policy for the recovery operators
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// Immediate retry up to max_retries
    Immediate { max_retries: usize },
    /// Fixed delay between retries
    Fixed { max_retries: usize, delay: Duration },
    /// Exponential backoff
    Exponential {
        max_retries: usize,
        initial_delay: Duration,
        multiplier: f64,
    },
}

impl RetryPolicy {
    /// Maximum number of restarts after the first attempt
    pub fn max_retries(&self) -> usize {
        match self {
            RetryPolicy::Immediate { max_retries } => *max_retries,
            RetryPolicy::Fixed { max_retries, .. } => *max_retries,
            RetryPolicy::Exponential { max_retries, .. } => *max_retries,
        }
    }

    /// Delay before the given retry (1-based)
    pub fn delay_for(&self, retry: usize) -> Option<Duration> {
        match self {
            RetryPolicy::Immediate { .. } => None,
            RetryPolicy::Fixed { delay, .. } => Some(*delay),
            RetryPolicy::Exponential {
                initial_delay,
                multiplier,
                ..
            } => {
                let exponent = retry.saturating_sub(1).min(i32::MAX as usize) as i32;
                let secs = initial_delay.as_secs_f64() * multiplier.powi(exponent);
                Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Fixed {
            max_retries: 3,
            delay: Duration::from_millis(100),
        }
    }
}
