use crate::error::Result;
use chrono::Utc;
use orgmap_scanner::Connection;
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Object catalogs and describes
pub const META_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Short-lived query data
pub const DATA_TTL: Duration = Duration::from_secs(3 * 60);

const CACHE_FILE_NAME: &str = "orgmap-cache.db";

pub fn sobjects_key(connection: &Connection) -> String {
    format!(
        "meta:{}:sobjects:{}",
        connection.origin(),
        connection.api_version()
    )
}

pub fn describe_key(connection: &Connection, object_name: &str) -> String {
    format!(
        "meta:{}:describe:{}:{}",
        connection.origin(),
        connection.api_version(),
        object_name
    )
}

/// Source of "now" for expiry computations, in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// SQLite file backing the cache across runs
pub struct SqliteTier {
    conn: rusqlite::Connection,
}

impl SqliteTier {
    /// Volatile location under the system temp dir
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join(CACHE_FILE_NAME)
    }

    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        let tier = SqliteTier { conn };
        tier.init_schema()?;
        Ok(tier)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let tier = SqliteTier {
            conn: rusqlite::Connection::open_in_memory()?,
        };
        tier.init_schema()?;
        Ok(tier)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL,
                value TEXT NOT NULL  -- JSON
            );
            CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
            ",
        )
    }

    fn load(&self, key: &str) -> rusqlite::Result<Option<(i64, String)>> {
        self.conn
            .query_row(
                "SELECT expires_at, value FROM cache_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
    }

    fn store(&self, key: &str, expires_at: i64, value: &str) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO cache_entries (key, expires_at, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET expires_at = excluded.expires_at, value = excluded.value",
            params![key, expires_at, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> rusqlite::Result<()> {
        self.conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn purge_expired(&self, now_millis: i64) -> rusqlite::Result<usize> {
        self.conn.execute(
            "DELETE FROM cache_entries WHERE expires_at <= ?1",
            params![now_millis],
        )
    }

    pub fn count(&self) -> rusqlite::Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    expires_at: i64,
    value: Value,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Two-tier TTL cache for metadata, keyed by connection and resource.
///
/// Reads check the in-process map, then the SQLite tier, promoting hits.
/// Writes go to both. SQLite failures are logged and otherwise ignored, so
/// the cache degrades to memory-only rather than failing a crawl.
pub struct MetadataCache {
    memory: Mutex<HashMap<String, Entry>>,
    durable: Option<Mutex<SqliteTier>>,
    clock: Arc<dyn Clock>,
}

impl MetadataCache {
    pub fn in_memory() -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            durable: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_durable(tier: SqliteTier) -> Self {
        Self {
            durable: Some(Mutex::new(tier)),
            ..Self::in_memory()
        }
    }

    /// Opens (or creates) the SQLite tier at `path`
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::with_durable(SqliteTier::open(path)?))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn has_durable_tier(&self) -> bool {
        self.durable.is_some()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = self.clock.now_millis();
        let value = self
            .memory_get(key, now)
            .or_else(|| self.durable_get(key, now))?;

        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Not caching {}: {}", key, e);
                return;
            }
        };
        let entry = Entry {
            expires_at: self.clock.now_millis() + ttl.as_millis() as i64,
            value,
        };

        if let Some(ref durable) = self.durable {
            let payload = entry.value.to_string();
            if let Err(e) = lock(durable).store(key, entry.expires_at, &payload) {
                warn!("Durable cache write failed for {}: {}", key, e);
            }
        }
        lock(&self.memory).insert(key.to_string(), entry);
    }

    /// Drops every in-process entry; the durable tier is untouched
    pub fn clear_memory(&self) {
        lock(&self.memory).clear();
    }

    pub fn memory_len(&self) -> usize {
        lock(&self.memory).len()
    }

    fn memory_get(&self, key: &str, now: i64) -> Option<Value> {
        let mut memory = lock(&self.memory);
        match memory.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                debug!("Evicting stale cache entry {}", key);
                memory.remove(key);
                None
            }
            None => None,
        }
    }

    fn durable_get(&self, key: &str, now: i64) -> Option<Value> {
        let durable = self.durable.as_ref()?;
        let loaded = {
            let tier = lock(durable);
            match tier.load(key) {
                Ok(Some((expires_at, _))) if expires_at <= now => {
                    debug!("Evicting stale durable cache entry {}", key);
                    if let Err(e) = tier.remove(key) {
                        warn!("Durable cache eviction failed for {}: {}", key, e);
                    }
                    None
                }
                Ok(found) => found,
                Err(e) => {
                    warn!("Durable cache read failed for {}: {}", key, e);
                    None
                }
            }
        };

        let (expires_at, payload) = loaded?;
        let value: Value = match serde_json::from_str(&payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("Discarding corrupt durable cache entry {}: {}", key, e);
                return None;
            }
        };

        lock(&self.memory).insert(
            key.to_string(),
            Entry {
                expires_at,
                value: value.clone(),
            },
        );
        Some(value)
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_cache_keys() {
        let conn = Connection::new(
            Url::parse("https://acme.my.salesforce.com/").unwrap(),
            "00D000000000001!tok",
            "60.0",
        );
        assert_eq!(
            sobjects_key(&conn),
            "meta:https://acme.my.salesforce.com:sobjects:60.0"
        );
        assert_eq!(
            describe_key(&conn, "Account"),
            "meta:https://acme.my.salesforce.com:describe:60.0:Account"
        );
    }

    #[test]
    fn test_expiry_is_exclusive() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = MetadataCache::in_memory().with_clock(clock.clone());

        cache.set("k", &"v", Duration::from_millis(500));
        clock.advance(Duration::from_millis(499));
        assert_eq!(cache.get::<String>("k").as_deref(), Some("v"));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get::<String>("k"), None);
        assert_eq!(cache.memory_len(), 0);
    }
}
