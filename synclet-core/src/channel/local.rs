//! In-process broadcast hub.
//!
//! `LocalBroadcaster` routes messages between endpoints through one tokio
//! broadcast channel per scope. Clones share the hub, so endpoints opened
//! from clones behave like same-origin contexts.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use super::{BroadcastEndpoint, Broadcaster, MessageStream};
use crate::error::ChannelError;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Envelope {
    origin: u64,
    payload: Value,
}

/// Broadcast primitive connecting endpoints within one process.
#[derive(Debug, Clone)]
pub struct LocalBroadcaster {
    scopes: Arc<DashMap<String, broadcast::Sender<Envelope>>>,
    capacity: usize,
    next_endpoint: Arc<AtomicU64>,
}

impl Default for LocalBroadcaster {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LocalBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer up to `capacity` messages per scope for slow receivers. A
    /// receiver that falls further behind skips the oldest messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            scopes: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            next_endpoint: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Broadcaster for LocalBroadcaster {
    fn open(&self, scope: &str) -> Result<Arc<dyn BroadcastEndpoint>, ChannelError> {
        let sender = self
            .scopes
            .entry(scope.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();
        let receiver = sender.subscribe();
        let (closed_tx, _) = watch::channel(false);

        Ok(Arc::new(LocalEndpoint {
            scope: scope.to_string(),
            id: self.next_endpoint.fetch_add(1, Ordering::Relaxed),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            closed: AtomicBool::new(false),
            closed_tx,
            scopes: Arc::clone(&self.scopes),
        }))
    }
}

struct LocalEndpoint {
    scope: String,
    id: u64,
    sender: Mutex<Option<broadcast::Sender<Envelope>>>,

    /// Subscribed at open so nothing published before `messages` is lost.
    receiver: Mutex<Option<broadcast::Receiver<Envelope>>>,

    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    scopes: Arc<DashMap<String, broadcast::Sender<Envelope>>>,
}

impl BroadcastEndpoint for LocalEndpoint {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn publish(&self, message: Value) -> Result<(), ChannelError> {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or_else(|| ChannelError::Closed {
            scope: self.scope.clone(),
        })?;
        // An error only means nobody is listening right now.
        let _ = sender.send(Envelope {
            origin: self.id,
            payload: message,
        });
        Ok(())
    }

    fn messages(&self) -> Result<MessageStream, ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed {
                scope: self.scope.clone(),
            });
        }
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| ChannelError::StreamTaken {
                scope: self.scope.clone(),
            })?;

        let state = Incoming {
            receiver,
            closed: self.closed_tx.subscribe(),
            origin: self.id,
            scope: self.scope.clone(),
        };
        Ok(stream::unfold(state, |mut state| async move {
            let payload = state.next().await?;
            Some((payload, state))
        })
        .boxed())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.closed_tx.send_replace(true);
        self.receiver.lock().take();
        if let Some(sender) = self.sender.lock().take() {
            drop(sender);
            // Forget the scope once the last endpoint in it is gone.
            self.scopes
                .remove_if(&self.scope, |_, tx| tx.receiver_count() == 0);
        }
        tracing::debug!(scope = %self.scope, "closed broadcast endpoint");
    }
}

impl Drop for LocalEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

struct Incoming {
    receiver: broadcast::Receiver<Envelope>,
    closed: watch::Receiver<bool>,
    origin: u64,
    scope: String,
}

impl Incoming {
    async fn next(&mut self) -> Option<Value> {
        loop {
            if *self.closed.borrow_and_update() {
                return None;
            }
            tokio::select! {
                changed = self.closed.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                received = self.receiver.recv() => match received {
                    Ok(envelope) if envelope.origin == self.origin => {}
                    Ok(envelope) => return Some(envelope.payload),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(scope = %self.scope, skipped, "broadcast receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn next_within(stream: &mut MessageStream, ms: u64) -> Option<Value> {
        tokio::time::timeout(Duration::from_millis(ms), stream.next())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn other_endpoints_receive_messages() {
        let hub = LocalBroadcaster::new();
        let a = hub.open("synclet:k").unwrap();
        let b = hub.clone().open("synclet:k").unwrap();
        let mut b_messages = b.messages().unwrap();

        a.publish(json!(1)).unwrap();
        a.publish(json!(2)).unwrap();

        assert_eq!(next_within(&mut b_messages, 100).await, Some(json!(1)));
        assert_eq!(next_within(&mut b_messages, 100).await, Some(json!(2)));
    }

    #[tokio::test]
    async fn sender_does_not_hear_itself() {
        let hub = LocalBroadcaster::new();
        let a = hub.open("synclet:k").unwrap();
        let mut a_messages = a.messages().unwrap();

        a.publish(json!("mine")).unwrap();
        assert_eq!(next_within(&mut a_messages, 50).await, None);
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let hub = LocalBroadcaster::new();
        let a = hub.open("synclet:one").unwrap();
        let b = hub.open("synclet:two").unwrap();
        let mut b_messages = b.messages().unwrap();

        a.publish(json!(true)).unwrap();
        assert_eq!(next_within(&mut b_messages, 50).await, None);
    }

    #[tokio::test]
    async fn stream_can_only_be_taken_once() {
        let hub = LocalBroadcaster::new();
        let a = hub.open("synclet:k").unwrap();

        let _first = a.messages().unwrap();
        assert!(matches!(
            a.messages(),
            Err(ChannelError::StreamTaken { .. })
        ));
    }

    #[tokio::test]
    async fn close_ends_stream_and_rejects_publish() {
        let hub = LocalBroadcaster::new();
        let a = hub.open("synclet:k").unwrap();
        let mut a_messages = a.messages().unwrap();

        a.close();
        a.close();

        assert_eq!(next_within(&mut a_messages, 100).await, None);
        assert!(matches!(
            a.publish(json!(1)),
            Err(ChannelError::Closed { .. })
        ));
    }
}
