//! Cross-Context Channel
//!
//! Synced signals publish every local write to the other contexts (tabs,
//! windows, workers) that hold a signal with the same key, and apply what
//! those contexts publish in return.
//!
//! # Scopes
//!
//! Endpoints are grouped by a scope string derived from the signal key with
//! [`scope_for_key`]. Endpoints in the same scope hear each other; endpoints
//! in different scopes never do.
//!
//! # Delivery
//!
//! - `publish` is fire-and-forget: no acknowledgement, no retry.
//! - Messages from one endpoint arrive in the order it sent them.
//! - An endpoint never receives its own messages.
//! - Reception is a single stream per endpoint, valid until the endpoint is
//!   closed.

mod local;

pub use local::LocalBroadcaster;

use std::sync::Arc;

use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::error::ChannelError;

/// Prefix joined with a signal key to form its channel scope.
pub const CHANNEL_PREFIX: &str = "synclet:";

/// The channel scope shared by every signal constructed with `key`.
pub fn scope_for_key(key: &str) -> String {
    format!("{CHANNEL_PREFIX}{key}")
}

/// Messages published by other endpoints in the same scope.
pub type MessageStream = BoxStream<'static, Value>;

/// A same-origin broadcast primitive.
pub trait Broadcaster: Send + Sync + 'static {
    /// Create an endpoint bound to `scope`.
    fn open(&self, scope: &str) -> Result<Arc<dyn BroadcastEndpoint>, ChannelError>;
}

/// One participant in a broadcast scope.
pub trait BroadcastEndpoint: Send + Sync {
    fn scope(&self) -> &str;

    /// Send `message` to every other endpoint in the scope.
    fn publish(&self, message: Value) -> Result<(), ChannelError>;

    /// Take the stream of received messages. It ends when the endpoint is
    /// closed. Only the first call succeeds.
    fn messages(&self) -> Result<MessageStream, ChannelError>;

    /// Tear the endpoint down. Idempotent.
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_is_prefixed_key() {
        assert_eq!(scope_for_key("theme"), "synclet:theme");
    }

    #[test]
    fn distinct_keys_get_distinct_scopes() {
        assert_ne!(scope_for_key("a"), scope_for_key("b"));
        assert_eq!(scope_for_key("a"), scope_for_key("a"));
    }
}
