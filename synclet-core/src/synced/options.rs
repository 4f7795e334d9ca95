//! Construction options for synced signals.

use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::reactive::EqualFn;

/// Database used when none is configured.
pub const DEFAULT_DB_NAME: &str = "synclet";

/// Store used when none is configured.
pub const DEFAULT_STORE_NAME: &str = "signals";

/// Options for a [`SyncedSignal`](super::SyncedSignal).
///
/// Only the key is required. It names the stored entry and the broadcast
/// scope, so two signals built with the same key (in any context) share
/// both. Keeping keys unique per logical signal is up to the caller.
///
/// # Examples
///
/// ```
/// use synclet_core::synced::SyncedOptions;
///
/// let options = SyncedOptions::<u32>::new("unread-count")
///     .with_db_name("inbox")
///     .with_equal(|a, b| a == b);
/// assert_eq!(options.key(), "unread-count");
/// assert_eq!(options.store_name(), "signals");
/// ```
pub struct SyncedOptions<T> {
    pub(crate) key: String,
    pub(crate) db_name: String,
    pub(crate) store_name: String,

    /// Passed through to the underlying signal.
    pub(crate) equal: Option<EqualFn<T>>,
    pub(crate) debug_name: Option<String>,
}

impl<T> SyncedOptions<T> {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            db_name: DEFAULT_DB_NAME.to_string(),
            store_name: DEFAULT_STORE_NAME.to_string(),
            equal: None,
            debug_name: None,
        }
    }

    pub fn with_db_name(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = db_name.into();
        self
    }

    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = store_name.into();
        self
    }

    /// Treat writes for which `equal(old, new)` holds as no change.
    pub fn with_equal<F>(mut self, equal: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.equal = Some(Arc::new(equal));
        self
    }

    pub fn with_debug_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = Some(name.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }
}

impl<T> Clone for SyncedOptions<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            db_name: self.db_name.clone(),
            store_name: self.store_name.clone(),
            equal: self.equal.clone(),
            debug_name: self.debug_name.clone(),
        }
    }
}

impl<T> Debug for SyncedOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedOptions")
            .field("key", &self.key)
            .field("db_name", &self.db_name)
            .field("store_name", &self.store_name)
            .field("equal", &self.equal.is_some())
            .field("debug_name", &self.debug_name)
            .finish()
    }
}
