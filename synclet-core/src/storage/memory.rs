//! In-process storage engine.
//!
//! `MemoryEngine` keeps every database in memory. Clones share the same
//! databases, so two synced signals built from clones of one engine behave
//! like two tabs of the same origin: each opens its own connection, and both
//! see the same entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use super::{plan_upgrade, StorageConnection, StorageEngine, UpgradeHook};
use crate::error::EngineError;

#[derive(Debug, Default)]
struct MemoryDatabase {
    /// `0` until the first successful open.
    version: u32,
    stores: HashMap<String, HashMap<String, Value>>,
    open_connections: usize,
}

/// Storage engine backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    databases: Arc<DashMap<String, Arc<Mutex<MemoryDatabase>>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections currently open on `db_name`.
    pub fn open_connections(&self, db_name: &str) -> usize {
        self.databases
            .get(db_name)
            .map(|db| db.lock().open_connections)
            .unwrap_or(0)
    }

    /// Current version of `db_name`, if it has ever been opened.
    pub fn version(&self, db_name: &str) -> Option<u32> {
        self.databases
            .get(db_name)
            .map(|db| db.lock().version)
            .filter(|version| *version > 0)
    }

    /// Read an entry directly, bypassing connections.
    pub fn stored(&self, db_name: &str, store: &str, key: &str) -> Option<Value> {
        let db = self.databases.get(db_name)?;
        let guard = db.lock();
        guard.stores.get(store)?.get(key).cloned()
    }

    fn database(&self, db_name: &str) -> Arc<Mutex<MemoryDatabase>> {
        self.databases
            .entry(db_name.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    async fn open(
        &self,
        db_name: &str,
        version: Option<u32>,
        upgrade: &UpgradeHook,
    ) -> Result<Arc<dyn StorageConnection>, EngineError> {
        let db = self.database(db_name);
        let opened_version = {
            let mut guard = db.lock();
            let planned = plan_upgrade(guard.version, guard.stores.keys(), version, upgrade)?;
            if let Some(planned) = planned {
                for store in planned.created {
                    guard.stores.entry(store).or_default();
                }
                guard.version = planned.version;
            }
            guard.open_connections += 1;
            guard.version
        };

        Ok(Arc::new(MemoryConnection {
            db,
            version: opened_version,
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryConnection {
    db: Arc<Mutex<MemoryDatabase>>,
    version: u32,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::Acquire) {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageConnection for MemoryConnection {
    fn version(&self) -> u32 {
        self.version
    }

    fn contains_store(&self, store: &str) -> bool {
        self.db.lock().stores.contains_key(store)
    }

    async fn get(&self, store: &str, key: &str) -> Result<Option<Value>, EngineError> {
        self.ensure_open()?;
        let guard = self.db.lock();
        let entries = guard
            .stores
            .get(store)
            .ok_or_else(|| EngineError::MissingStore(store.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, store: &str, key: &str, value: Value) -> Result<(), EngineError> {
        self.ensure_open()?;
        let mut guard = self.db.lock();
        let entries = guard
            .stores
            .get_mut(store)
            .ok_or_else(|| EngineError::MissingStore(store.to_string()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.db.lock().open_connections -= 1;
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}
