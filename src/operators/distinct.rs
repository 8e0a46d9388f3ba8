//! Suppression of consecutive duplicates

use crate::flow::Flow;
use crate::operators::transform::{skip, transform_with_state};

/// Drop every value equal to the one emitted just before it.
///
/// The first value is always emitted, so a flow whose first value happens to
/// look like a "nothing" value is still handled correctly.
pub fn distinct_until_changed<T>(upstream: Flow<T>) -> Flow<T>
where
    T: PartialEq + Clone + Send + 'static,
{
    distinct_until_changed_by(upstream, |value: &T| value.clone())
}

/// Drop every value whose key equals the key of the value emitted just before it
pub fn distinct_until_changed_by<T, K, F>(upstream: Flow<T>, key_fn: F) -> Flow<T>
where
    T: Send + 'static,
    K: PartialEq + Send + 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    transform_with_state(
        upstream,
        || Option::<K>::None,
        move |previous, value, downstream| {
            let key = key_fn(&value);
            if previous.as_ref() == Some(&key) {
                return skip();
            }
            *previous = Some(key);
            downstream.accept(value)
        },
    )
}

/// Same as [`distinct_until_changed_by`] with an explicit equivalence, for
/// keys that do not implement `PartialEq`.
pub fn distinct_until_changed_with<T, F>(upstream: Flow<T>, are_equivalent: F) -> Flow<T>
where
    T: Clone + Send + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    transform_with_state(
        upstream,
        || Option::<T>::None,
        move |previous, value, downstream| {
            if let Some(last) = previous.as_ref() {
                if are_equivalent(last, &value) {
                    return skip();
                }
            }
            *previous = Some(value.clone());
            downstream.accept(value)
        },
    )
}
