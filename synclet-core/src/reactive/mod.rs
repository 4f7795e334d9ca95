//! Reactive Primitives
//!
//! This module implements the reactive value container that a synced signal
//! decorates.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. Reads are synchronous and
//! side-effect free. Every write replaces the value and notifies the
//! signal's observers with the new value.
//!
//! ## Value cells
//!
//! [`ValueCell`] is the minimal interface a synced signal needs from a
//! reactive primitive: `get`, `set`, `subscribe`, `unsubscribe`. `Signal`
//! implements it; so can an adapter around another framework's primitive.
//!
//! ## Read-only views
//!
//! [`ReadSignal`] exposes the reading half of a cell without any way to
//! write it.
//!
//! There is no `update` at this layer. Functional updates are composed by
//! the synced signal out of `get` and `set`.

mod cell;
mod readonly;
mod signal;
mod subscriber;

pub use cell::{Observer, ValueCell};
pub use readonly::ReadSignal;
pub use signal::{EqualFn, Signal};
pub use subscriber::{Subscriber, SubscriberId};
