//! Background persistence writer.
//!
//! Every synced signal owns one writer task. Mutations enqueue their encoded
//! value without waiting; the writer stores them one at a time, in the order
//! they were enqueued. A failed write is logged and dropped. When the queue
//! is closed, the writer drains what is left and closes the store.

use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::storage::DurableStore;

pub(crate) enum PersistCommand {
    Write(Value),

    /// Answered once every command queued before it has been handled.
    Flush(oneshot::Sender<()>),
}

pub(crate) type PersistQueue = mpsc::UnboundedSender<PersistCommand>;

pub(crate) fn spawn_writer(
    runtime: &Handle,
    store: Arc<DurableStore>,
    key: String,
) -> (PersistQueue, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = runtime.spawn(run_writer(store, key, rx));
    (tx, task)
}

async fn run_writer(
    store: Arc<DurableStore>,
    key: String,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            PersistCommand::Write(value) => {
                if let Err(err) = store.set(&key, value).await {
                    tracing::error!(key = %key, error = %err, "failed to persist signal value");
                }
            }
            PersistCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    store.close();
    tracing::debug!(key = %key, "persistence writer stopped");
}
