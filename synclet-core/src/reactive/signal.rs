//! Signal Implementation
//!
//! A Signal is the reactive value container behind every synced signal. It
//! holds a value and a list of observers, and notifies those observers on
//! every write.
//!
//! # Thread Safety
//!
//! The value and the observer list each sit behind a `parking_lot` RwLock.
//! Observers are called after the value lock is released, so an observer may
//! read the signal it is observing. Observers must not subscribe or
//! unsubscribe on the same signal from inside the callback.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::cell::{Observer, ValueCell};
use super::readonly::ReadSignal;
use super::subscriber::{Subscriber, SubscriberId};

/// Counter for generating unique signal IDs.
static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_signal_id() -> u64 {
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Equality used to decide whether a write changes the value.
pub type EqualFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// A reactive signal holding a value of type T.
///
/// Cloning a signal yields another handle to the same value.
///
/// ```rust,ignore
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: u64,
    value: Arc<RwLock<T>>,
    subscribers: Arc<RwLock<Vec<Subscriber<T>>>>,

    /// When set, a write whose value is equal to the current one is dropped
    /// without notifying anyone.
    equal: Option<EqualFn<T>>,

    debug_name: Option<Arc<str>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            id: next_signal_id(),
            value: Arc::new(RwLock::new(value)),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            equal: None,
            debug_name: None,
        }
    }

    /// Use `equal` to skip writes that would not change the value.
    pub fn with_equality(mut self, equal: EqualFn<T>) -> Self {
        self.equal = Some(equal);
        self
    }

    /// Label the signal in `Debug` output.
    pub fn with_debug_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.debug_name = Some(name.into());
        self
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn debug_name(&self) -> Option<&str> {
        self.debug_name.as_deref()
    }

    /// Get the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Set a new value and notify subscribers.
    ///
    /// With an equality function configured, a value equal to the current
    /// one is ignored.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.value.write();
            if let Some(equal) = &self.equal {
                if equal(&*guard, &value) {
                    return;
                }
            }
            *guard = value.clone();
        }

        self.notify_subscribers(&value);
    }

    /// Register an observer. It is called with the new value on every write.
    pub fn subscribe<F>(&self, notify: F) -> SubscriberId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_boxed(Box::new(notify))
    }

    fn subscribe_boxed(&self, notify: Observer<T>) -> SubscriberId {
        let subscriber = Subscriber::new(notify);
        let id = subscriber.id();
        self.subscribers.write().push(subscriber);
        id
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.subscribers
            .write()
            .retain(|subscriber| subscriber.id() != subscriber_id);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// A view of this signal with no mutation surface.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal::new(Arc::new(self.clone()))
    }

    fn notify_subscribers(&self, value: &T) {
        let subscribers = self.subscribers.read();
        for subscriber in subscribers.iter() {
            subscriber.notify(value);
        }
    }
}

impl<T> ValueCell<T> for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Signal::get(self)
    }

    fn set(&self, value: T) {
        Signal::set(self, value)
    }

    fn subscribe(&self, observer: Observer<T>) -> SubscriberId {
        self.subscribe_boxed(observer)
    }

    fn unsubscribe(&self, id: SubscriberId) {
        Signal::unsubscribe(self, id)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            subscribers: Arc::clone(&self.subscribers),
            equal: self.equal.clone(),
            debug_name: self.debug_name.clone(),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("name", &self.debug_name)
            .field("value", &self.get())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn repeated_value_still_notifies_without_equality() {
        let signal = Signal::new(String::from("light"));
        let writes = Arc::new(AtomicI32::new(0));
        let writes_clone = writes.clone();

        signal.subscribe(move |_| {
            writes_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set("light".to_string());
        signal.set("light".to_string());
        assert_eq!(writes.load(Ordering::SeqCst), 2);
        assert_eq!(signal.get(), "light");
    }

    #[test]
    fn signal_notifies_subscribers_with_new_value() {
        let signal = Signal::new(0);
        let last_seen = Arc::new(AtomicI32::new(-1));
        let last_seen_clone = last_seen.clone();

        signal.subscribe(move |v| {
            last_seen_clone.store(*v, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(last_seen.load(Ordering::SeqCst), 1);

        signal.set(2);
        assert_eq!(last_seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let id = signal.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        signal.unsubscribe(id);
        signal.set(2);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn observer_can_read_the_signal() {
        let signal = Signal::new(0);
        let reader = signal.clone();
        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = seen.clone();

        signal.subscribe(move |_| {
            seen_clone.store(reader.get(), Ordering::SeqCst);
        });

        signal.set(9);
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn equality_suppresses_unchanged_writes() {
        let signal = Signal::new(3).with_equality(Arc::new(|a: &i32, b: &i32| a == b));
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        signal.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(3);
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        signal.set(4);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_only_view_follows_writes_from_any_clone() {
        let signal = Signal::new(vec![1]).with_debug_name("history");
        let writer = signal.clone();
        let view = signal.read_only();

        writer.set(vec![1, 2]);
        assert_eq!(view.get(), vec![1, 2]);
        assert_eq!(signal.get(), vec![1, 2]);
        assert_eq!(writer.debug_name(), Some("history"));
    }

    #[test]
    fn debug_output_includes_name() {
        let signal = Signal::new(1).with_debug_name("counter");
        let rendered = format!("{signal:?}");
        assert!(rendered.contains("counter"));
        assert_eq!(signal.debug_name(), Some("counter"));
    }
}
