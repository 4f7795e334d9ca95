//! Synced Signal Implementation
//!
//! A `SyncedSignal` decorates a reactive value cell with durable persistence
//! and cross-context synchronization.
//!
//! # Lifecycle
//!
//! ```text
//!   new() ──> Loading ──(initial read finished, any outcome)──> Ready
//!                │                                                │
//!                └──────────────── dispose() ─────────────────────┴──> Disposed
//! ```
//!
//! # Event handling
//!
//! - Local write (`set_value`/`update_value`): the cell is updated before the
//!   call returns. The value is then published to other contexts and queued
//!   for persistence; neither is awaited, and a failure in one does not
//!   affect the other.
//! - Remote message: the cell is updated. Nothing is persisted or
//!   re-published; the sender persists through its own instance.
//! - Initial load: the stored value, if any, is written to the cell unless a
//!   local write or remote message already reached it. Those events are newer
//!   than anything read from the store, so they are never overwritten by it.
//!
//! Storage failures never reach callers. They are logged, the default (or
//! last applied value) stays in effect, and the signal keeps working.

use std::cell::Cell;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::{Mutex, ReentrantMutex};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::options::SyncedOptions;
use super::persist::{spawn_writer, PersistCommand, PersistQueue};
use crate::channel::{scope_for_key, BroadcastEndpoint, Broadcaster, MessageStream};
use crate::error::SyncError;
use crate::lifecycle::TeardownScope;
use crate::reactive::{ReadSignal, Signal, SubscriberId, ValueCell};
use crate::storage::{DurableStore, StorageEngine};

/// A signal persisted to a local store and kept in step across contexts.
///
/// Cloning yields another handle to the same signal. Disposing through any
/// handle disposes all of them.
///
/// # Example
///
/// ```rust,ignore
/// let engine = Arc::new(MemoryEngine::new());
/// let hub = LocalBroadcaster::new();
///
/// let theme = SyncedSignal::new(SyncedOptions::new("theme"), "light".to_string(), engine, &hub)?;
/// theme.wait_until_ready().await;
/// theme.set_value("dark".to_string());
/// assert_eq!(theme.get(), "dark");
/// ```
pub struct SyncedSignal<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    key: String,
    cell: Arc<dyn ValueCell<T>>,
    endpoint: Arc<dyn BroadcastEndpoint>,

    /// Taken on dispose; dropping it lets the writer drain and close the
    /// store.
    persist: Mutex<Option<PersistQueue>>,

    listener: Mutex<Option<JoinHandle<()>>>,
    ready: watch::Receiver<bool>,

    /// Shared with the load task, which closes the store itself if it
    /// finishes after disposal.
    disposed: Arc<AtomicBool>,

    load_gate: Arc<LoadGate>,
}

/// Records whether a local or remote event reached the cell before the
/// initial load finished. The stored value is applied only if none did.
///
/// Reentrant so that an observer notified by the load may write back.
#[derive(Default)]
struct LoadGate(ReentrantMutex<Cell<bool>>);

impl LoadGate {
    /// Call before the event's value is written to the cell.
    fn supersede(&self) {
        self.0.lock().set(true);
    }

    /// Run `apply` while holding the gate, unless an event came first.
    fn apply_unless_superseded(&self, apply: impl FnOnce()) -> bool {
        let superseded = self.0.lock();
        if superseded.get() {
            return false;
        }
        apply();
        true
    }
}

impl<T> SyncedSignal<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Create a synced signal backed by a [`Signal`] holding `default`.
    ///
    /// Loading starts immediately in the background, and so does listening
    /// for other contexts.
    ///
    /// # Errors
    ///
    /// [`SyncError::NoRuntime`] outside a tokio runtime;
    /// [`SyncError::Channel`] if the broadcast endpoint cannot be opened.
    pub fn new(
        options: SyncedOptions<T>,
        default: T,
        engine: Arc<dyn StorageEngine>,
        broadcaster: &dyn Broadcaster,
    ) -> Result<Self, SyncError> {
        let mut signal = Signal::new(default);
        if let Some(equal) = options.equal.clone() {
            signal = signal.with_equality(equal);
        }
        if let Some(name) = options.debug_name.clone() {
            signal = signal.with_debug_name(name);
        }
        Self::with_cell(options, Arc::new(signal), engine, broadcaster)
    }

    /// Create a synced signal on top of an existing value cell.
    ///
    /// The cell's current value acts as the default. The `equal` and
    /// `debug_name` options are not applied; configure them on the cell.
    pub fn with_cell(
        options: SyncedOptions<T>,
        cell: Arc<dyn ValueCell<T>>,
        engine: Arc<dyn StorageEngine>,
        broadcaster: &dyn Broadcaster,
    ) -> Result<Self, SyncError> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let SyncedOptions {
            key,
            db_name,
            store_name,
            ..
        } = options;

        let endpoint = broadcaster.open(&scope_for_key(&key))?;
        let messages = endpoint.messages()?;

        let store = Arc::new(DurableStore::new(engine, db_name, store_name));
        let (persist, _writer) = spawn_writer(&runtime, Arc::clone(&store), key.clone());

        let disposed = Arc::new(AtomicBool::new(false));
        let load_gate = Arc::new(LoadGate::default());
        let (ready_tx, ready) = watch::channel(false);
        runtime.spawn(load_initial(
            store,
            key.clone(),
            Arc::clone(&cell),
            ready_tx,
            Arc::clone(&disposed),
            Arc::clone(&load_gate),
        ));
        let listener = runtime.spawn(apply_remote(
            key.clone(),
            Arc::clone(&cell),
            messages,
            Arc::clone(&load_gate),
        ));

        tracing::debug!(key = %key, scope = %endpoint.scope(), "created synced signal");

        Ok(Self {
            inner: Arc::new(Inner {
                key,
                cell,
                endpoint,
                persist: Mutex::new(Some(persist)),
                listener: Mutex::new(Some(listener)),
                ready,
                disposed,
                load_gate,
            }),
        })
    }

    /// Create a synced signal that is disposed when `scope` ends.
    pub fn in_scope(
        scope: &TeardownScope,
        options: SyncedOptions<T>,
        default: T,
        engine: Arc<dyn StorageEngine>,
        broadcaster: &dyn Broadcaster,
    ) -> Result<Self, SyncError> {
        let signal = Self::new(options, default, engine, broadcaster)?;
        let handle = signal.clone();
        scope.on_teardown(move || handle.dispose());
        Ok(signal)
    }

    /// Get the current value.
    pub fn get(&self) -> T {
        self.inner.cell.get()
    }

    /// Replace the value, then publish and persist it in the background.
    ///
    /// Encoding failures are logged; use [`try_set_value`](Self::try_set_value)
    /// to observe them.
    pub fn set_value(&self, value: T) {
        if let Err(err) = self.try_set_value(value) {
            tracing::error!(key = %self.inner.key, error = %err, "value not synced");
        }
    }

    /// Like [`set_value`](Self::set_value), but reports a value that cannot be
    /// encoded. The in-memory value is replaced either way.
    ///
    /// # Errors
    ///
    /// [`SyncError::Encode`] if `value` cannot be serialized; nothing is then
    /// published or persisted.
    pub fn try_set_value(&self, value: T) -> Result<(), SyncError> {
        if self.is_disposed() {
            tracing::warn!(key = %self.inner.key, "write to disposed synced signal ignored");
            return Ok(());
        }

        let encoded = serde_json::to_value(&value);
        self.inner.load_gate.supersede();
        self.inner.cell.set(value);
        let encoded = encoded?;

        self.inner.publish(encoded.clone());
        self.inner.enqueue(PersistCommand::Write(encoded));
        Ok(())
    }

    /// Replace the value with `f(current)`. `f` runs once, synchronously,
    /// with the value current at the time of the call.
    pub fn update_value<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        if self.is_disposed() {
            tracing::warn!(key = %self.inner.key, "update of disposed synced signal ignored");
            return;
        }
        let current = self.inner.cell.get();
        self.set_value(f(&current));
    }

    /// A view that always reflects this signal and cannot write to it.
    pub fn as_readonly(&self) -> ReadSignal<T> {
        ReadSignal::new(Arc::clone(&self.inner.cell))
    }

    pub fn subscribe<F>(&self, notify: F) -> SubscriberId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.cell.subscribe(Box::new(notify))
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.cell.unsubscribe(id);
    }
}

impl<T> SyncedSignal<T> {
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn scope(&self) -> &str {
        self.inner.endpoint.scope()
    }

    /// Resolve once the initial load has finished, whether it found a value,
    /// found nothing, or failed.
    pub async fn wait_until_ready(&self) {
        let mut ready = self.inner.ready.clone();
        // An error means the load task is gone; there is nothing left to
        // wait for.
        let _ = ready.wait_for(|ready| *ready).await;
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Wait until every persist queued before this call has been attempted.
    /// Returns immediately after disposal.
    pub async fn flush(&self) {
        let queue = self.inner.persist.lock().clone();
        let Some(queue) = queue else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if queue.send(PersistCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Stop listening, close the channel, and close the store once pending
    /// writes are done. Safe to call more than once.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown();
        tracing::debug!(key = %self.inner.key, "disposed synced signal");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl<T> Inner<T> {
    fn publish(&self, message: Value) {
        if let Err(err) = self.endpoint.publish(message) {
            tracing::error!(key = %self.key, error = %err, "failed to publish signal value");
        }
    }

    fn enqueue(&self, command: PersistCommand) {
        let sent = match self.persist.lock().as_ref() {
            Some(queue) => queue.send(command).is_ok(),
            None => false,
        };
        if !sent {
            tracing::error!(key = %self.key, "persistence writer is not running");
        }
    }

    fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        self.endpoint.close();
        self.persist.lock().take();
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.shutdown();
        }
    }
}

impl<T> Clone for SyncedSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for SyncedSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedSignal")
            .field("key", &self.inner.key)
            .field("value", &self.inner.cell.get())
            .field("ready", &self.is_ready())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

async fn load_initial<T>(
    store: Arc<DurableStore>,
    key: String,
    cell: Arc<dyn ValueCell<T>>,
    ready: watch::Sender<bool>,
    disposed: Arc<AtomicBool>,
    load_gate: Arc<LoadGate>,
) where
    T: DeserializeOwned,
{
    match store.get(&key).await {
        Ok(Some(raw)) => match serde_json::from_value::<T>(raw) {
            Ok(value) => {
                if load_gate.apply_unless_superseded(|| cell.set(value)) {
                    tracing::debug!(key = %key, "restored stored value");
                } else {
                    tracing::debug!(key = %key, "stored value superseded by a newer write");
                }
            }
            Err(err) => {
                tracing::warn!(
                    key = %key,
                    error = %err,
                    "stored value does not decode, keeping default"
                );
            }
        },
        Ok(None) => tracing::debug!(key = %key, "no stored value, keeping default"),
        Err(err) => {
            tracing::error!(
                key = %key,
                error = %err,
                "failed to load stored value, keeping default"
            );
        }
    }

    ready.send_replace(true);

    if disposed.load(Ordering::Acquire) {
        store.close();
    }
}

async fn apply_remote<T>(
    key: String,
    cell: Arc<dyn ValueCell<T>>,
    mut messages: MessageStream,
    load_gate: Arc<LoadGate>,
) where
    T: DeserializeOwned,
{
    while let Some(raw) = messages.next().await {
        match serde_json::from_value::<T>(raw) {
            Ok(value) => {
                load_gate.supersede();
                cell.set(value);
                tracing::debug!(key = %key, "applied remote value");
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "ignoring undecodable remote value");
            }
        }
    }
}
