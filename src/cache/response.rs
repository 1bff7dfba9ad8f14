//! Disk-backed response cache.
//!
//! [`ResponseCache`] maps `(endpoint, payload)` to a previously decoded
//! response so that identical requests are not paid for twice.
//!
//! # Layout
//!
//! ```text
//! <dir>/index.json        key → { timestamp, endpoint, file }
//! <dir>/<key>.json        { key, response, timestamp, endpoint }
//! ```
//!
//! The index is rewritten in full (temp file + rename) on every mutation.
//! A store writes the entry file first and the index second; if the process
//! dies in between, the orphan file is removed on the next [`open`] and an
//! index entry without a readable file is pruned on the next lookup.
//!
//! # Eviction
//!
//! Entries expire `ttl` after insertion. When the index is full, inserting a
//! new key evicts the entry with the oldest insertion timestamp (FIFO, not
//! LRU; lookups do not refresh an entry).
//!
//! Caching is best-effort: I/O failures while storing are logged and
//! swallowed, and unreadable entries read as misses.
//!
//! [`open`]: ResponseCache::open

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::telemetry;
use crate::{HuginnError, Result};

const INDEX_FILE: &str = "index.json";

/// Configuration for the response cache.
///
/// ```rust
/// # use huginn::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .dir("/tmp/huginn-cache")
///     .max_entries(500)
///     .ttl(Duration::from_secs(3600));
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether the client keeps a cache at all. Default: true.
    pub enabled: bool,
    /// Directory holding the index and entry files.
    /// Default: `<user cache dir>/huginn/responses`.
    pub dir: PathBuf,
    /// Maximum number of cached entries. Default: 1,000.
    pub max_entries: usize,
    /// Time-to-live for cached entries. Default: 24 hours.
    #[serde(rename = "ttl_secs", with = "crate::config::secs")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
            max_entries: 1_000,
            ttl: Duration::from_secs(24 * 3600),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache directory.
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable caching.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.max_entries == 0 {
            return Err(HuginnError::Configuration(
                "cache.max_entries must be positive when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default cache directory: `~/.cache/huginn/responses`.
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("huginn")
        .join("responses")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    timestamp: f64,
    endpoint: String,
    file: String,
}

/// One cached response as persisted on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    response: Value,
    timestamp: f64,
    endpoint: String,
}

type Index = BTreeMap<String, IndexEntry>;

/// Content-addressed, disk-backed response cache.
///
/// A single async mutex serializes every lookup, store, eviction and clear,
/// including the file I/O, so the index and the entry files never diverge
/// through concurrent read-modify-write.
#[derive(Debug)]
pub struct ResponseCache {
    dir: PathBuf,
    max_entries: usize,
    ttl: Duration,
    index: Mutex<Index>,
}

impl ResponseCache {
    /// Open (or create) the cache directory and load its index.
    ///
    /// A corrupt index is logged and replaced by an empty one. Entry files
    /// that the index does not reference are deleted.
    pub fn open(config: &CacheConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.dir).map_err(|e| {
            HuginnError::Configuration(format!(
                "failed to create cache dir {}: {e}",
                config.dir.display()
            ))
        })?;

        let index = load_index(&config.dir);
        remove_orphans(&config.dir, &index);

        Ok(Self {
            dir: config.dir.clone(),
            max_entries: config.max_entries,
            ttl: config.ttl,
            index: Mutex::new(index),
        })
    }

    /// Look up a cached response.
    ///
    /// Returns `None` on miss, on expiry and on an unreadable entry; the
    /// latter two also delete the entry.
    pub async fn lookup(&self, endpoint: &str, payload: &Value) -> Option<Value> {
        self.lookup_at(endpoint, payload, unix_now()).await
    }

    /// Cache a response. Never fails; I/O errors are logged.
    pub async fn store(&self, endpoint: &str, payload: &Value, response: &Value) {
        self.store_at(endpoint, payload, response, unix_now()).await;
    }

    /// Remove every entry and rewrite an empty index.
    pub async fn clear(&self) {
        let mut index = self.index.lock().await;
        for key in index.keys() {
            remove_file_logged(&self.entry_path(key)).await;
        }
        index.clear();
        if let Err(e) = self.persist_index(&index).await {
            warn!(dir = %self.dir.display(), error = %e, "failed to persist cleared cache index");
        }
    }

    /// Whether the index holds an entry for this request (expired or not).
    pub async fn contains(&self, endpoint: &str, payload: &Value) -> bool {
        let key = request_key(endpoint, payload);
        self.index.lock().await.contains_key(&key)
    }

    /// Number of indexed entries.
    pub async fn len(&self) -> usize {
        self.index.lock().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn lookup_at(&self, endpoint: &str, payload: &Value, now: f64) -> Option<Value> {
        let key = request_key(endpoint, payload);
        let mut index = self.index.lock().await;

        let Some(entry) = index.get(&key).cloned() else {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
            return None;
        };

        if now - entry.timestamp > self.ttl.as_secs_f64() {
            debug!(key, endpoint, "cache entry expired");
            self.remove_entry(&mut index, &key).await;
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
            return None;
        }

        match self.read_entry(&key).await {
            Ok(stored) => {
                debug!(key, endpoint, "cache hit");
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                Some(stored.response)
            }
            Err(e) => {
                warn!(key, error = %e, "dropping unreadable cache entry");
                self.remove_entry(&mut index, &key).await;
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                None
            }
        }
    }

    async fn store_at(&self, endpoint: &str, payload: &Value, response: &Value, now: f64) {
        let key = request_key(endpoint, payload);
        let mut index = self.index.lock().await;
        if let Err(e) = self
            .try_store(&mut index, &key, endpoint, response, now)
            .await
        {
            warn!(key, endpoint, error = %e, "failed to cache response");
        }
    }

    async fn try_store(
        &self,
        index: &mut Index,
        key: &str,
        endpoint: &str,
        response: &Value,
        now: f64,
    ) -> io::Result<()> {
        if !index.contains_key(key) && index.len() >= self.max_entries {
            self.evict_oldest(index).await;
        }

        let file = entry_file_name(key);
        let entry = CacheEntry {
            key: key.to_string(),
            response: response.clone(),
            timestamp: now,
            endpoint: endpoint.to_string(),
        };
        tokio::fs::write(self.dir.join(&file), serde_json::to_vec(&entry)?).await?;

        index.insert(
            key.to_string(),
            IndexEntry {
                timestamp: now,
                endpoint: endpoint.to_string(),
                file,
            },
        );
        self.persist_index(index).await
    }

    async fn evict_oldest(&self, index: &mut Index) {
        let oldest = index
            .iter()
            .min_by(|(_, a), (_, b)| a.timestamp.total_cmp(&b.timestamp))
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            debug!(key = %key, "evicting oldest cache entry");
            remove_file_logged(&self.entry_path(&key)).await;
            index.remove(&key);
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
        }
    }

    /// Entry paths are always derived from the key, never from the
    /// `file` field stored in the index.
    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(entry_file_name(key))
    }

    async fn read_entry(&self, key: &str) -> io::Result<CacheEntry> {
        let bytes = tokio::fs::read(self.entry_path(key)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn remove_entry(&self, index: &mut Index, key: &str) {
        remove_file_logged(&self.entry_path(key)).await;
        index.remove(key);
        if let Err(e) = self.persist_index(index).await {
            warn!(dir = %self.dir.display(), error = %e, "failed to persist cache index");
        }
    }

    /// Rewrite the whole index (atomic write via tmp + rename).
    async fn persist_index(&self, index: &Index) -> io::Result<()> {
        let path = self.dir.join(INDEX_FILE);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, serde_json::to_vec_pretty(index)?).await?;
        tokio::fs::rename(&tmp_path, &path).await
    }
}

/// Compute the cache key for a request.
///
/// MD5 (32 lowercase hex characters) over the endpoint and the payload
/// serialized with object keys sorted at every depth, so payloads that differ
/// only in key insertion order share a key.
pub fn request_key(endpoint: &str, payload: &Value) -> String {
    let mut hasher = Md5::new();
    hasher.update(endpoint.as_bytes());
    hasher.update(b":");
    hasher.update(canonicalize(payload).to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Rebuild `value` with object keys in sorted order at every depth.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn load_index(dir: &Path) -> Index {
    let path = dir.join(INDEX_FILE);
    let content = match std::fs::read(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Index::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read cache index");
            return Index::new();
        }
    };
    match serde_json::from_slice::<Index>(&content) {
        Ok(mut index) => {
            index.retain(|key, _| {
                let valid = is_request_key(key);
                if !valid {
                    warn!(key, "ignoring malformed cache index key");
                }
                valid
            });
            index
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt cache index, starting empty");
            Index::new()
        }
    }
}

fn entry_file_name(key: &str) -> String {
    format!("{key}.json")
}

/// Whether `key` has the shape produced by [`request_key`].
fn is_request_key(key: &str) -> bool {
    key.len() == 32 && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Delete entry files that no index entry refers to.
///
/// Only names shaped like `<request key>.json` are considered, so other
/// files sharing the directory are left alone.
fn remove_orphans(dir: &Path, index: &Index) {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return;
    };
    for dir_entry in read_dir.flatten() {
        let name = dir_entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(key) = name.strip_suffix(".json").filter(|k| is_request_key(k)) else {
            continue;
        };
        if !index.contains_key(key) {
            debug!(file = name, "removing orphaned cache file");
            if let Err(e) = std::fs::remove_file(dir_entry.path()) {
                warn!(file = name, error = %e, "failed to remove orphaned cache file");
            }
        }
    }
}

async fn remove_file_logged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove cache file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HOUR: f64 = 3600.0;

    fn open_cache(dir: &Path, max_entries: usize) -> ResponseCache {
        ResponseCache::open(
            &CacheConfig::new()
                .dir(dir)
                .max_entries(max_entries)
                .ttl(Duration::from_secs(3600)),
        )
        .unwrap()
    }

    #[test]
    fn request_key_is_md5_hex() {
        let key = request_key("/chat/completions", &json!({"model": "m"}));
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn request_key_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": [1, {"q": 1, "p": 2}], "x": 2}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 2, "y": [1, {"p": 2, "q": 1}]}, "b": 1}"#).unwrap();
        assert_eq!(request_key("/e", &a), request_key("/e", &b));
    }

    #[test]
    fn request_key_differs_on_endpoint_and_payload() {
        let p = json!({"model": "m"});
        assert_ne!(request_key("/a", &p), request_key("/b", &p));
        assert_ne!(request_key("/a", &p), request_key("/a", &json!({"model": "n"})));
    }

    #[test]
    fn array_order_is_significant() {
        assert_ne!(
            request_key("/e", &json!([1, 2])),
            request_key("/e", &json!([2, 1]))
        );
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(dir.path(), 10);
        let payload = json!({"q": 1});
        let t0 = 1_700_000_000.0;

        cache
            .store_at("/e", &payload, &json!({"a": 1}), t0)
            .await;
        assert_eq!(
            cache.lookup_at("/e", &payload, t0 + 59.0 * 60.0).await,
            Some(json!({"a": 1}))
        );

        assert!(cache.lookup_at("/e", &payload, t0 + 61.0 * 60.0).await.is_none());
        assert!(!cache.contains("/e", &payload).await);
        assert!(!dir.path().join(format!("{}.json", request_key("/e", &payload))).exists());

        let on_disk: Index =
            serde_json::from_slice(&std::fs::read(dir.path().join(INDEX_FILE)).unwrap()).unwrap();
        assert!(on_disk.is_empty());
    }

    #[tokio::test]
    async fn full_cache_evicts_smallest_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(dir.path(), 3);
        let t0 = 1_700_000_000.0;

        // Insertion order differs from timestamp order on purpose.
        cache.store_at("/e", &json!({"n": 1}), &json!(1), t0 + 20.0).await;
        cache.store_at("/e", &json!({"n": 2}), &json!(2), t0 + 5.0).await;
        cache.store_at("/e", &json!({"n": 3}), &json!(3), t0 + 30.0).await;
        cache.store_at("/e", &json!({"n": 4}), &json!(4), t0 + 40.0).await;

        assert_eq!(cache.len().await, 3);
        assert!(!cache.contains("/e", &json!({"n": 2})).await);
        for n in [1, 3, 4] {
            assert!(cache.contains("/e", &json!({"n": n})).await);
        }
        let files = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name() != INDEX_FILE)
            .count();
        assert_eq!(files, 3);
    }

    #[tokio::test]
    async fn overwriting_existing_key_does_not_evict() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(dir.path(), 2);
        let t0 = 1_700_000_000.0;

        cache.store_at("/e", &json!({"n": 1}), &json!("old"), t0).await;
        cache.store_at("/e", &json!({"n": 2}), &json!(2), t0 + 1.0).await;
        cache.store_at("/e", &json!({"n": 1}), &json!("new"), t0 + 2.0).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(
            cache.lookup_at("/e", &json!({"n": 1}), t0 + 3.0).await,
            Some(json!("new"))
        );
        assert!(cache.contains("/e", &json!({"n": 2})).await);
    }

    #[tokio::test]
    async fn lookups_do_not_refresh_insertion_time() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(dir.path(), 2);
        let t0 = 1_700_000_000.0;

        cache.store_at("/e", &json!({"n": 1}), &json!(1), t0).await;
        cache.store_at("/e", &json!({"n": 2}), &json!(2), t0 + 1.0).await;
        assert!(cache.lookup_at("/e", &json!({"n": 1}), t0 + 2.0).await.is_some());
        cache.store_at("/e", &json!({"n": 3}), &json!(3), t0 + 3.0).await;

        assert!(!cache.contains("/e", &json!({"n": 1})).await);
        assert!(cache.contains("/e", &json!({"n": 2})).await);
    }
}
