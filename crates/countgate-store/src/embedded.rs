//! EmbeddedStore: redb-backed counters.
//!
//! Values are stored as decimal strings in a single table. redb serializes
//! write transactions, so read-modify-write inside one transaction is atomic
//! with respect to every other writer. All database work runs on the
//! blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::{KvStore, ServerInfo, StoreFuture, fields};
use crate::tables::COUNTERS;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe embedded store backed by redb.
#[derive(Clone)]
pub struct EmbeddedStore {
    db: Arc<Database>,
    path: Option<PathBuf>,
    commands: Arc<AtomicU64>,
}

impl EmbeddedStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(map_err!(Open))?;
        }
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_db(db, Some(path.to_path_buf()));
        store.ensure_tables()?;
        debug!(?path, "embedded store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_db(db, None);
        store.ensure_tables()?;
        debug!("in-memory embedded store opened");
        Ok(store)
    }

    fn from_db(db: Database, path: Option<PathBuf>) -> Self {
        Self {
            db: Arc::new(db),
            path,
            commands: Arc::new(AtomicU64::new(0)),
        }
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Run `op` against the database on the blocking pool.
    fn run<T, F>(&self, op: F) -> StoreFuture<'static, T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
    {
        self.commands.fetch_add(1, Ordering::Relaxed);
        let db = Arc::clone(&self.db);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || op(&db))
                .await
                .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
        })
    }
}

fn read_value(db: &Database, key: &str) -> StoreResult<Option<String>> {
    let txn = db.begin_read().map_err(map_err!(Transaction))?;
    let table = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
    let value = table
        .get(key)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value().to_string());
    Ok(value)
}

fn add(db: &Database, key: &str, delta: i64) -> StoreResult<i64> {
    let txn = db.begin_write().map_err(map_err!(Transaction))?;
    let updated;
    {
        let mut table = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        let current = table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string());
        let current = match current {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| StoreError::NotInteger(key.to_string()))?,
            None => 0,
        };
        updated = current
            .checked_add(delta)
            .ok_or_else(|| StoreError::NotInteger(key.to_string()))?;
        table
            .insert(key, updated.to_string().as_str())
            .map_err(map_err!(Write))?;
    }
    txn.commit().map_err(map_err!(Transaction))?;
    Ok(updated)
}

impl KvStore for EmbeddedStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        let key = key.to_string();
        self.run(move |db| read_value(db, &key))
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        let key = key.to_string();
        let value = value.to_string();
        self.run(move |db| {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            {
                let mut table = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
                table
                    .insert(key.as_str(), value.as_str())
                    .map_err(map_err!(Write))?;
            }
            txn.commit().map_err(map_err!(Transaction))?;
            debug!(%key, "value stored");
            Ok(())
        })
    }

    fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        let key = key.to_string();
        self.run(move |db| add(db, &key, delta))
    }

    fn decr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        let key = key.to_string();
        self.run(move |db| {
            let delta = delta
                .checked_neg()
                .ok_or_else(|| StoreError::NotInteger(key.clone()))?;
            add(db, &key, delta)
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        let key = key.to_string();
        self.run(move |db| {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            let existed;
            {
                let mut table = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
                existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
            }
            txn.commit().map_err(map_err!(Transaction))?;
            debug!(%key, existed, "key deleted");
            Ok(existed)
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        let key = key.to_string();
        self.run(move |db| Ok(read_value(db, &key)?.is_some()))
    }

    fn dbsize(&self) -> StoreFuture<'_, u64> {
        self.run(|db| {
            let txn = db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
            table.len().map_err(map_err!(Read))
        })
    }

    fn info<'a>(&'a self, section: Option<&'a str>) -> StoreFuture<'a, ServerInfo> {
        let section = section.map(str::to_ascii_lowercase);
        let path = self.path.clone();
        let commands = Arc::clone(&self.commands);
        self.run(move |db| {
            let mut info = ServerInfo::default();
            let wants = |name: &str| section.as_deref().is_none_or(|s| s == name);

            if wants("server") {
                info.insert(fields::EMBEDDED_VERSION, "redb 3");
                info.insert(
                    "storage",
                    if path.is_some() { "disk" } else { "memory" },
                );
            }
            if wants("memory") {
                if let Some(path) = &path {
                    let bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                    info.insert(fields::USED_MEMORY, bytes);
                    info.insert(fields::USED_MEMORY_HUMAN, human_bytes(bytes));
                }
            }
            if wants("stats") {
                info.insert(
                    fields::TOTAL_COMMANDS_PROCESSED,
                    commands.load(Ordering::Relaxed),
                );
            }
            if wants("keyspace") {
                let txn = db.begin_read().map_err(map_err!(Transaction))?;
                let table = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
                info.insert(fields::KEYS, table.len().map_err(map_err!(Read))?);
            }
            Ok(info)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        self.run(|db| {
            db.begin_read().map_err(map_err!(Transaction))?;
            Ok(())
        })
    }

    fn backend(&self) -> &'static str {
        "embedded"
    }
}

/// Render a byte count the way Redis renders `used_memory_human`.
fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "K", "M", "G"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.2}{}", UNITS[unit])
    }
}
