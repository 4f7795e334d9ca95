//! Synced Signals
//!
//! This module composes the three building blocks into the public facade:
//!
//! - a reactive value cell ([`crate::reactive`]) holding the current value,
//! - a durable store ([`crate::storage`]) the value is loaded from and
//!   persisted to,
//! - a broadcast endpoint ([`crate::channel`]) that carries writes between
//!   contexts sharing the same key.
//!
//! Reads are always synchronous. Writes update the cell synchronously and
//! leave persistence and broadcast to background work, so a slow or broken
//! store never stalls a caller.

mod options;
mod persist;
mod signal;

pub use options::{SyncedOptions, DEFAULT_DB_NAME, DEFAULT_STORE_NAME};
pub use signal::SyncedSignal;
