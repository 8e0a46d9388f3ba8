//! Intermediate operators
//!
//! Every operator here takes a [`Flow`](crate::Flow) and returns a new one
//! without starting any collection.

pub mod delay;
pub mod distinct;
pub mod limit;
pub mod merge;
pub mod recover;
pub mod transform;

pub use delay::{delay_each, delay_flow};
pub use distinct::{distinct_until_changed, distinct_until_changed_by, distinct_until_changed_with};
pub use limit::{take, take_while};
pub use merge::{flat_map, flat_map_with, flatten_merge, merge};
pub use recover::{
    on_error, on_error_collect, on_error_resume_with, on_error_return, retry, retry_with_policy,
};
pub use transform::{
    concatenate, drop_first, drop_while, eval_map, filter, filter_downcast, filter_map,
    filter_not, filter_some, flat_map_concat, map, on_each, transform, transform_with_state,
};
