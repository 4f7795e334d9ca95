//! Read-only view over a value cell.

use std::fmt::{self, Debug};
use std::sync::Arc;

use super::cell::ValueCell;
use super::subscriber::SubscriberId;

/// A derived view that always reflects the cell it was created from.
///
/// It has no mutation surface and owns no resources of its own: dropping it
/// needs no cleanup, and it keeps working for as long as the cell lives.
pub struct ReadSignal<T> {
    cell: Arc<dyn ValueCell<T>>,
}

impl<T> ReadSignal<T> {
    pub(crate) fn new(cell: Arc<dyn ValueCell<T>>) -> Self {
        Self { cell }
    }

    /// Get the current value of the underlying cell.
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Observe writes to the underlying cell.
    pub fn subscribe<F>(&self, notify: F) -> SubscriberId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.cell.subscribe(Box::new(notify))
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.cell.unsubscribe(id);
    }
}

impl<T> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Debug> Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSignal")
            .field("value", &self.cell.get())
            .finish()
    }
}
