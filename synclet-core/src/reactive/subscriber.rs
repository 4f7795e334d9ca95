//! Subscriber types for the reactive container.
//!
//! A Subscriber is an observer callback registered on a signal. It is
//! invoked with the new value every time the signal is written.

use std::sync::atomic::{AtomicU64, Ordering};

use super::cell::Observer;

/// Unique identifier for a subscriber.
///
/// Returned by `subscribe` so the caller can later unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// An observer of a signal's value.
pub struct Subscriber<T> {
    id: SubscriberId,
    notify: Observer<T>,
}

impl<T> Subscriber<T> {
    /// Wrap an observer callback, assigning it a fresh ID.
    pub fn new(notify: Observer<T>) -> Self {
        Self {
            id: SubscriberId::new(),
            notify,
        }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Hand the new value to the observer.
    pub fn notify(&self, value: &T) {
        (self.notify)(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::sync::Arc;

    #[test]
    fn subscribers_keep_their_own_id_and_callback() {
        let seen = Arc::new(AtomicI32::new(0));
        let add = seen.clone();
        let sub = seen.clone();

        let plus: Subscriber<i32> = Subscriber::new(Box::new(move |v| {
            add.fetch_add(*v, Ordering::SeqCst);
        }));
        let minus: Subscriber<i32> = Subscriber::new(Box::new(move |v| {
            sub.fetch_sub(*v, Ordering::SeqCst);
        }));

        assert_ne!(plus.id(), minus.id());
        plus.notify(&10);
        minus.notify(&3);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn subscriber_notify_passes_value() {
        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = seen.clone();

        let subscriber: Subscriber<i32> = Subscriber::new(Box::new(move |v| {
            seen_clone.store(*v, Ordering::SeqCst);
        }));

        subscriber.notify(&7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }
}
