//! Cold, push-based asynchronous flows
//!
//! A [`Flow`] describes how to push values into a [`Collector`]; nothing runs
//! until a terminal operation collects it. Operators compose flows without
//! buffering, so a slow consumer suspends the whole chain up to the original
//! producer. The only concurrency is introduced by the merge operators, and
//! only inside a region bounded by the collection that started it.

pub mod channel;
pub mod collector;
pub mod constructors;
pub mod error;
pub mod flow;
pub mod flow_configuration;
pub mod flow_ext;
pub mod launch;
pub mod operators;
pub mod pipe;
pub mod region;
pub mod terminal;

pub use channel::{from_channel, FlowSender};
pub use collector::{collector_fn, Collector, ContextId, FnCollector};
pub use constructors::{emit, empty, eval, from_fn, from_iter, from_stream};
pub use error::{BoxError, FlowError, FlowResult, RetryPolicy};
pub use flow::{flow, Flow, Producer};
pub use flow_configuration::{ChannelConfig, MergeConfig, DEFAULT_BUFFER_SIZE};
pub use flow_ext::{FlowExt, NestedFlowExt, OptionFlowExt};
pub use launch::{launch, LaunchBuilder};
pub use operators::*;
pub use pipe::{Pipe, PipeExt};
pub use region::CancelScope;
pub use terminal::{
    collect_into, count, count_matching, first, first_or_none, fold, for_each, into_stream,
    reduce, single, single_or_none, to_set, to_vec,
};
