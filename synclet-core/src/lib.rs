//! Synclet Core
//!
//! Signals that survive restarts and stay in step across every open context
//! of the same origin. It provides:
//!
//! - A reactive value container with synchronous reads and notify-on-write
//! - A durable store adapter over a pluggable local key/value engine
//! - A cross-context broadcast channel scoped by signal key
//! - The synced signal facade that ties the three together
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the value container and the cell capability
//! - `storage`: storage engines and the durable store adapter
//! - `channel`: broadcast capability and the in-process hub
//! - `synced`: the synced signal facade and its options
//! - `lifecycle`: owner scopes that dispose signals on teardown
//! - `error`: error types
//!
//! Storage engines and broadcast primitives are injected, so the same signal
//! runs against in-memory fakes in tests and real backends in applications.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use synclet_core::channel::LocalBroadcaster;
//! use synclet_core::storage::FileEngine;
//! use synclet_core::synced::{SyncedOptions, SyncedSignal};
//!
//! let engine = Arc::new(FileEngine::new("./state"));
//! let hub = LocalBroadcaster::new();
//!
//! let count = SyncedSignal::new(SyncedOptions::new("count"), 0u32, engine.clone(), &hub)?;
//! count.wait_until_ready().await;
//! count.update_value(|n| n + 1);
//!
//! // A second context with the same key sees the write.
//! let other = SyncedSignal::new(SyncedOptions::new("count"), 0u32, engine, &hub)?;
//! ```

pub mod channel;
pub mod error;
pub mod lifecycle;
pub mod reactive;
pub mod storage;
pub mod synced;

pub use channel::{BroadcastEndpoint, Broadcaster, LocalBroadcaster};
pub use error::{ChannelError, EngineError, StoreError, SyncError};
pub use lifecycle::TeardownScope;
pub use reactive::{ReadSignal, Signal, ValueCell};
pub use storage::{DurableStore, FileEngine, MemoryEngine, StorageConnection, StorageEngine};
pub use synced::{SyncedOptions, SyncedSignal};
