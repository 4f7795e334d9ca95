//! File-backed storage engine.
//!
//! Each database is one JSON document under the engine's directory:
//!
//! ```text
//! <dir>/
//!     <db_name>.json      -- {"version": 1, "stores": {"signals": {"theme": "dark"}}}
//! ```
//!
//! Writes go to a temporary file that is renamed over the document, so a
//! crash mid-write leaves the previous contents intact. Writers in this
//! process serialize on a per-file lock shared by every engine instance;
//! writers in other processes are not coordinated and the last rename wins.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{plan_upgrade, StorageConnection, StorageEngine, UpgradeHook};
use crate::error::EngineError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct DatabaseFile {
    version: u32,
    #[serde(default)]
    stores: BTreeMap<String, BTreeMap<String, Value>>,
}

/// Per-file write locks, keyed by canonical path.
fn file_locks() -> &'static DashMap<PathBuf, Arc<Mutex<()>>> {
    static LOCKS: OnceLock<DashMap<PathBuf, Arc<Mutex<()>>>> = OnceLock::new();
    LOCKS.get_or_init(DashMap::new)
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Storage engine that keeps one JSON file per database.
#[derive(Debug, Clone)]
pub struct FileEngine {
    dir: PathBuf,
}

impl FileEngine {
    /// Create an engine rooted at `dir`. The directory is created on the
    /// first open if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn validate(db_name: &str) -> Result<(), EngineError> {
        let valid = !db_name.is_empty()
            && db_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !db_name.starts_with('.');
        if !valid {
            return Err(EngineError::Blocked(format!(
                "invalid database name `{db_name}`"
            )));
        }
        Ok(())
    }

    /// Canonical path of the database document. Creates the directory so
    /// that engines given different spellings of it agree on the path.
    async fn path_for(&self, db_name: &str) -> Result<PathBuf, EngineError> {
        Self::validate(db_name)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let dir = tokio::fs::canonicalize(&self.dir).await?;
        Ok(dir.join(format!("{db_name}.json")))
    }
}

fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    file_locks().entry(path.to_path_buf()).or_default().clone()
}

#[async_trait]
impl StorageEngine for FileEngine {
    async fn open(
        &self,
        db_name: &str,
        version: Option<u32>,
        upgrade: &UpgradeHook,
    ) -> Result<Arc<dyn StorageConnection>, EngineError> {
        let path = self.path_for(db_name).await?;
        let lock = lock_for(&path);

        let file = {
            let _guard = lock.lock().await;
            let mut file = read_database(&path).await?;
            let planned = plan_upgrade(file.version, file.stores.keys(), version, upgrade)?;
            if let Some(planned) = planned {
                for store in planned.created {
                    file.stores.entry(store).or_default();
                }
                file.version = planned.version;
                write_database(&path, &file).await?;
                tracing::debug!(db_name, version = file.version, "upgraded database file");
            }
            file
        };

        Ok(Arc::new(FileConnection {
            path,
            lock,
            version: file.version,
            stores: file.stores.into_keys().collect(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FileConnection {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
    version: u32,
    /// Stores present when the connection opened. Only an upgrade adds
    /// stores, and an upgrade needs a new connection.
    stores: BTreeSet<String>,
    closed: AtomicBool,
}

impl FileConnection {
    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::Acquire) {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageConnection for FileConnection {
    fn version(&self) -> u32 {
        self.version
    }

    fn contains_store(&self, store: &str) -> bool {
        self.stores.contains(store)
    }

    async fn get(&self, store: &str, key: &str) -> Result<Option<Value>, EngineError> {
        self.ensure_open()?;
        let file = read_database(&self.path).await?;
        let entries = file
            .stores
            .get(store)
            .ok_or_else(|| EngineError::MissingStore(store.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, store: &str, key: &str, value: Value) -> Result<(), EngineError> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        let mut file = read_database(&self.path).await?;
        let entries = file
            .stores
            .get_mut(store)
            .ok_or_else(|| EngineError::MissingStore(store.to_string()))?;
        entries.insert(key.to_string(), value);
        write_database(&self.path, &file).await
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

async fn read_database(path: &Path) -> Result<DatabaseFile, EngineError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(DatabaseFile::default()),
        Err(err) => Err(err.into()),
    }
}

async fn write_database(path: &Path, file: &DatabaseFile) -> Result<(), EngineError> {
    let bytes = serde_json::to_vec_pretty(file)?;
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
    tokio::fs::write(&tmp, &bytes).await?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Schema;
    use serde_json::json;

    fn create_signals(schema: &mut dyn Schema) -> Result<(), EngineError> {
        schema.create_store("signals");
        Ok(())
    }

    #[tokio::test]
    async fn entries_survive_a_new_engine() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");

        let engine = FileEngine::new(dir.path());
        let conn = engine.open("app", None, &create_signals).await.unwrap();
        conn.put("signals", "theme", json!({"mode": "dark"})).await.unwrap();
        conn.close();

        let reopened = FileEngine::new(dir.path());
        let conn = reopened.open("app", None, &create_signals).await.unwrap();
        assert_eq!(conn.version(), 1);
        assert_eq!(
            conn.get("signals", "theme").await.unwrap(),
            Some(json!({"mode": "dark"}))
        );
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty_until_upgraded() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let engine = FileEngine::new(dir.path().join("nested"));

        let conn = engine.open("app", None, &create_signals).await.unwrap();
        assert!(conn.contains_store("signals"));
        assert_eq!(conn.get("signals", "absent").await.unwrap(), None);
        assert!(dir.path().join("nested").join("app.json").exists());
    }

    #[tokio::test]
    async fn rejects_path_like_names() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let engine = FileEngine::new(dir.path());

        let err = engine
            .open("../escape", None, &create_signals)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Blocked(_)));
    }

    #[tokio::test]
    async fn closed_connection_refuses_writes() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let engine = FileEngine::new(dir.path());
        let conn = engine.open("app", None, &create_signals).await.unwrap();

        conn.close();
        assert!(matches!(
            conn.put("signals", "k", json!(1)).await,
            Err(EngineError::Closed)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn independent_engines_do_not_lose_each_others_writes() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let first = FileEngine::new(dir.path());
        // Same directory, spelled differently.
        let second = FileEngine::new(dir.path().join("."));

        let a = first.open("app", None, &create_signals).await.unwrap();
        let b = second.open("app", None, &create_signals).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..50 {
            let a = Arc::clone(&a);
            let b = Arc::clone(&b);
            tasks.push(tokio::spawn(async move {
                a.put("signals", &format!("a{i}"), json!(i)).await
            }));
            tasks.push(tokio::spawn(async move {
                b.put("signals", &format!("b{i}"), json!(i)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let reader = FileEngine::new(dir.path());
        let conn = reader.open("app", None, &create_signals).await.unwrap();
        for i in 0..50 {
            assert_eq!(conn.get("signals", &format!("a{i}")).await.unwrap(), Some(json!(i)));
            assert_eq!(conn.get("signals", &format!("b{i}")).await.unwrap(), Some(json!(i)));
        }

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn store_set_is_fixed_at_open() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let engine = FileEngine::new(dir.path());
        let conn = engine.open("app", None, &create_signals).await.unwrap();

        // A corrupt document on disk does not change what the open connection saw.
        std::fs::write(dir.path().join("app.json"), b"not json").unwrap();
        assert!(conn.contains_store("signals"));
        assert!(!conn.contains_store("other"));
    }
}
