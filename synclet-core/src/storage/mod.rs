//! Durable Storage
//!
//! Synced signals persist through a local, asynchronous key/value engine.
//! The engine is an injected capability ([`StorageEngine`]) so that the same
//! signal code runs against an in-memory engine in tests and a file-backed
//! engine in applications.
//!
//! # Engine model
//!
//! Engines follow a versioned-database model:
//!
//! - A database is identified by name and carries an integer version.
//! - Opening at a version higher than the stored one (or opening a database
//!   that does not exist yet) runs an upgrade hook, which is the only place
//!   object stores can be created.
//! - A connection reads and writes single entries inside a named store.
//!   Each `get`/`put` is its own transaction.
//!
//! [`DurableStore`] sits on top of an engine and owns the connection for one
//! `(database, store)` pair.

mod durable;
mod file;
mod memory;

pub use durable::DurableStore;
pub use file::FileEngine;
pub use memory::MemoryEngine;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineError;

/// Callback run while a database is being created or upgraded.
pub type UpgradeHook = dyn Fn(&mut dyn Schema) -> Result<(), EngineError> + Send + Sync;

/// The store layout visible to an upgrade hook.
pub trait Schema {
    /// Version the database had before this upgrade. `0` for a new database.
    fn old_version(&self) -> u32;

    fn contains_store(&self, name: &str) -> bool;

    /// Create an empty store. Creating an existing store is a no-op.
    fn create_store(&mut self, name: &str);
}

/// A local asynchronous key/value storage engine.
#[async_trait]
pub trait StorageEngine: Send + Sync + 'static {
    /// Open `db_name`.
    ///
    /// With `version: None` the database opens at its current version, or at
    /// version 1 if it does not exist. If the target version is above the
    /// stored one, `upgrade` runs before the connection is returned; if it is
    /// below, the open fails with [`EngineError::Blocked`].
    async fn open(
        &self,
        db_name: &str,
        version: Option<u32>,
        upgrade: &UpgradeHook,
    ) -> Result<Arc<dyn StorageConnection>, EngineError>;
}

/// An open connection to one database.
#[async_trait]
pub trait StorageConnection: Send + Sync {
    fn version(&self) -> u32;

    fn contains_store(&self, store: &str) -> bool;

    /// Read the entry stored under `key`, or `None` if there is none.
    async fn get(&self, store: &str, key: &str) -> Result<Option<Value>, EngineError>;

    /// Store `value` under `key`, replacing any previous entry.
    async fn put(&self, store: &str, key: &str, value: Value) -> Result<(), EngineError>;

    /// Release the connection. Later operations fail with
    /// [`EngineError::Closed`]. Idempotent.
    fn close(&self);
}

/// Schema handed to upgrade hooks. Engines apply `created` once the hook
/// succeeds.
pub(crate) struct StagedSchema {
    old_version: u32,
    existing: HashSet<String>,
    pub(crate) created: Vec<String>,
}

impl Schema for StagedSchema {
    fn old_version(&self) -> u32 {
        self.old_version
    }

    fn contains_store(&self, name: &str) -> bool {
        self.existing.contains(name) || self.created.iter().any(|s| s == name)
    }

    fn create_store(&mut self, name: &str) {
        if !self.contains_store(name) {
            self.created.push(name.to_string());
        }
    }
}

/// Outcome of resolving an open request against a database's stored version.
pub(crate) struct Upgrade {
    pub(crate) version: u32,
    pub(crate) created: Vec<String>,
}

/// Decide the version an open request lands on and run the upgrade hook if
/// that version is new. Returns `None` when no upgrade is needed.
pub(crate) fn plan_upgrade<'a>(
    current: u32,
    stores: impl Iterator<Item = &'a String>,
    requested: Option<u32>,
    upgrade: &UpgradeHook,
) -> Result<Option<Upgrade>, EngineError> {
    let target = requested.unwrap_or(current.max(1));
    if target < current {
        return Err(EngineError::Blocked(format!(
            "requested version {target} is below current version {current}"
        )));
    }
    if target == current {
        return Ok(None);
    }

    let mut schema = StagedSchema {
        old_version: current,
        existing: stores.cloned().collect(),
        created: Vec::new(),
    };
    upgrade(&mut schema).map_err(|err| match err {
        EngineError::UpgradeFailed(_) => err,
        other => EngineError::UpgradeFailed(other.to_string()),
    })?;

    Ok(Some(Upgrade {
        version: target,
        created: schema.created,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(name: &'static str) -> impl Fn(&mut dyn Schema) -> Result<(), EngineError> {
        move |schema: &mut dyn Schema| {
            schema.create_store(name);
            Ok(())
        }
    }

    #[test]
    fn new_database_upgrades_to_version_one() {
        let hook = create("signals");
        let planned = plan_upgrade(0, std::iter::empty(), None, &hook)
            .unwrap()
            .unwrap();
        assert_eq!(planned.version, 1);
        assert_eq!(planned.created, vec!["signals".to_string()]);
    }

    #[test]
    fn current_version_skips_the_hook() {
        let existing = vec!["signals".to_string()];
        let hook = |_: &mut dyn Schema| -> Result<(), EngineError> {
            panic!("hook must not run");
        };
        let planned = plan_upgrade(3, existing.iter(), None, &hook).unwrap();
        assert!(planned.is_none());
    }

    #[test]
    fn lower_version_is_blocked() {
        let hook = create("signals");
        let err = plan_upgrade(4, std::iter::empty(), Some(2), &hook)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Blocked(_)));
    }

    #[test]
    fn existing_stores_are_not_recreated() {
        let existing = vec!["signals".to_string()];
        let hook = create("signals");
        let planned = plan_upgrade(1, existing.iter(), Some(2), &hook)
            .unwrap()
            .unwrap();
        assert_eq!(planned.version, 2);
        assert!(planned.created.is_empty());
    }

    #[test]
    fn hook_failure_becomes_upgrade_failed() {
        let hook = |_: &mut dyn Schema| -> Result<(), EngineError> { Err(EngineError::Closed) };
        let err = plan_upgrade(0, std::iter::empty(), None, &hook)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::UpgradeFailed(_)));
    }
}
