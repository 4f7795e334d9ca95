//! Durable Store Adapter
//!
//! `DurableStore` owns one connection to one `(database, store)` pair and
//! exposes get/set by key on top of it.
//!
//! # Connection lifecycle
//!
//! - The connection is opened lazily by the first `get`/`set`/`open` and then
//!   reused by every later operation.
//! - Overlapping opens all wait on the same in-flight attempt; the engine is
//!   never asked for two connections at once.
//! - If the database exists but lacks the store, the adapter reopens at the
//!   next version so the upgrade hook can create it.
//! - `close` releases the connection. A later operation opens a fresh one.
//!   An open that was in flight when `close` ran is discarded instead of
//!   being installed.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::{Schema, StorageConnection, StorageEngine};
use crate::error::{EngineError, StoreError};

/// Persistence adapter for a single store within a single database.
pub struct DurableStore {
    engine: Arc<dyn StorageEngine>,
    db_name: String,
    store_name: String,

    connection: Mutex<Option<Arc<dyn StorageConnection>>>,

    /// Held for the duration of an open so overlapping callers queue behind
    /// it and then pick up its connection.
    opening: tokio::sync::Mutex<()>,

    /// Bumped by every `close`. An open that started under an older
    /// generation must not install its connection.
    generation: AtomicU64,
}

impl DurableStore {
    pub fn new(
        engine: Arc<dyn StorageEngine>,
        db_name: impl Into<String>,
        store_name: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            db_name: db_name.into(),
            store_name: store_name.into(),
            connection: Mutex::new(None),
            opening: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Whether a connection is currently held.
    pub fn is_open(&self) -> bool {
        self.connection.lock().is_some()
    }

    /// Open the connection if it is not open yet and return it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the engine refuses to open the
    /// database or the store cannot be created. A failed open leaves the
    /// adapter closed; the next call tries again.
    pub async fn open(&self) -> Result<Arc<dyn StorageConnection>, StoreError> {
        if let Some(conn) = self.current() {
            return Ok(conn);
        }

        let _opening = self.opening.lock().await;
        if let Some(conn) = self.current() {
            return Ok(conn);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let conn = self.connect().await.map_err(|source| StoreError::Connection {
            db_name: self.db_name.clone(),
            source,
        })?;

        if !self.install(generation, &conn) {
            conn.close();
            return Err(StoreError::Connection {
                db_name: self.db_name.clone(),
                source: EngineError::Closed,
            });
        }

        tracing::debug!(
            db_name = %self.db_name,
            store_name = %self.store_name,
            version = conn.version(),
            "opened durable store"
        );
        Ok(conn)
    }

    /// Read the entry stored under `key`. `Ok(None)` means no entry exists.
    ///
    /// # Errors
    ///
    /// [`StoreError::Connection`] if the store cannot be opened,
    /// [`StoreError::Read`] if the read itself fails.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let conn = self.open().await?;
        conn.get(&self.store_name, key)
            .await
            .map_err(|source| StoreError::Read {
                key: key.to_string(),
                source,
            })
    }

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// [`StoreError::Connection`] if the store cannot be opened,
    /// [`StoreError::Write`] if the write itself fails.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let conn = self.open().await?;
        conn.put(&self.store_name, key, value)
            .await
            .map_err(|source| StoreError::Write {
                key: key.to_string(),
                source,
            })
    }

    /// Release the connection. Idempotent.
    pub fn close(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let conn = self.connection.lock().take();
        if let Some(conn) = conn {
            conn.close();
            tracing::debug!(db_name = %self.db_name, "closed durable store");
        }
    }

    fn current(&self) -> Option<Arc<dyn StorageConnection>> {
        self.connection.lock().clone()
    }

    fn install(&self, generation: u64, conn: &Arc<dyn StorageConnection>) -> bool {
        let mut slot = self.connection.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        *slot = Some(Arc::clone(conn));
        true
    }

    async fn connect(&self) -> Result<Arc<dyn StorageConnection>, EngineError> {
        let store_name = self.store_name.clone();
        let ensure_store = move |schema: &mut dyn Schema| -> Result<(), EngineError> {
            if !schema.contains_store(&store_name) {
                schema.create_store(&store_name);
            }
            Ok(())
        };

        let conn = self.engine.open(&self.db_name, None, &ensure_store).await?;
        if conn.contains_store(&self.store_name) {
            return Ok(conn);
        }

        // The database predates this store; bump the version so the upgrade
        // hook gets a chance to create it.
        let next_version = conn.version() + 1;
        conn.close();
        tracing::debug!(
            db_name = %self.db_name,
            store_name = %self.store_name,
            version = next_version,
            "store missing, upgrading database"
        );

        let conn = self
            .engine
            .open(&self.db_name, Some(next_version), &ensure_store)
            .await?;
        if conn.contains_store(&self.store_name) {
            Ok(conn)
        } else {
            conn.close();
            Err(EngineError::MissingStore(self.store_name.clone()))
        }
    }
}

impl Debug for DurableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableStore")
            .field("db_name", &self.db_name)
            .field("store_name", &self.store_name)
            .field("open", &self.is_open())
            .finish()
    }
}
