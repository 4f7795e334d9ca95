//! The observable-cell capability.
//!
//! Synced signals only need three things from a reactive primitive: read the
//! current value, replace it, and let observers hear about replacements.
//! [`ValueCell`] captures exactly that, so any reactive framework (or the
//! crate's own [`Signal`](super::Signal)) can sit underneath a synced signal.

use super::SubscriberId;

/// Callback invoked with the new value after every write.
pub type Observer<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A mutable, observable container of a `T`.
pub trait ValueCell<T>: Send + Sync {
    /// Return the current value. Never blocks on I/O.
    fn get(&self) -> T;

    /// Replace the current value and notify observers.
    fn set(&self, value: T);

    /// Register an observer, returning the id needed to remove it.
    fn subscribe(&self, observer: Observer<T>) -> SubscriberId;

    /// Remove an observer. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriberId);
}
