//! Host scope lifecycle.
//!
//! A [`TeardownScope`] stands in for whatever owns a synced signal (a
//! component, a session, a service). Callbacks registered with
//! [`on_teardown`](TeardownScope::on_teardown) run exactly once when the
//! scope ends, either through [`end`](TeardownScope::end) or on drop.

use std::fmt::{self, Debug};

use parking_lot::Mutex;

type Teardown = Box<dyn FnOnce() + Send>;

/// Owner scope that runs registered teardown callbacks exactly once.
pub struct TeardownScope {
    /// `None` once the scope has ended.
    callbacks: Mutex<Option<Vec<Teardown>>>,
}

impl TeardownScope {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Some(Vec::new())),
        }
    }

    /// Register `callback` to run when the scope ends.
    ///
    /// If the scope has already ended the callback runs immediately.
    pub fn on_teardown<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut callbacks = self.callbacks.lock();
        if let Some(pending) = callbacks.as_mut() {
            pending.push(Box::new(callback));
            return;
        }
        drop(callbacks);
        callback();
    }

    /// End the scope, running every registered callback in registration
    /// order. Later calls do nothing.
    pub fn end(&self) {
        let pending = self.callbacks.lock().take();
        if let Some(pending) = pending {
            tracing::debug!(count = pending.len(), "running teardown callbacks");
            for callback in pending {
                callback();
            }
        }
    }

    pub fn is_ended(&self) -> bool {
        self.callbacks.lock().is_none()
    }
}

impl Default for TeardownScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TeardownScope {
    fn drop(&mut self) {
        self.end();
    }
}

impl Debug for TeardownScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.callbacks.lock().as_ref().map(Vec::len);
        f.debug_struct("TeardownScope")
            .field("pending", &pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn callbacks_run_once_on_end() {
        let scope = TeardownScope::new();
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();

        scope.on_teardown(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        scope.end();
        scope.end();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(scope.is_ended());
    }

    #[test]
    fn drop_ends_the_scope() {
        let count = Arc::new(AtomicI32::new(0));
        {
            let scope = TeardownScope::new();
            let count_clone = count.clone();
            scope.on_teardown(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_registration_runs_immediately() {
        let scope = TeardownScope::new();
        scope.end();

        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        scope.on_teardown(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
