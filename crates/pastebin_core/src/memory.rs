//! crates/pastebin_core/src/memory.rs
//!
//! In-process implementations of the storage ports. `MemoryStore` backs the
//! service when no Redis URL is configured and doubles as the store for tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::ports::{BlobStorage, KeyValueStore, PortError, PortResult};

//=========================================================================================
// MemoryStore
//=========================================================================================

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            // A TTL too large to represent never expires.
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// A `KeyValueStore` held in a single ordered map behind a mutex.
///
/// Expired entries are treated as absent. They are purged when the key is
/// touched, on every prefix scan, and by the sweeper task when one is running.
/// Every operation runs under one lock, which makes the conditional writes and
/// the counter atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Spawns a task that calls `purge_expired` every `period`.
    ///
    /// Keys that are never read or scanned again would otherwise stay in memory.
    /// The task runs until the returned handle is aborted.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(removed, "Purged expired keys");
                }
            }
        })
    }

    fn live_entry<'a>(
        entries: &'a mut BTreeMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        let mut entries = self.entries.lock();
        Ok(Self::live_entry(&mut entries, key, Instant::now()).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> PortResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> PortResult<bool> {
        let mut entries = self.entries.lock();
        if Self::live_entry(&mut entries, key, Instant::now()).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(true)
    }

    async fn set_if_present(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> PortResult<bool> {
        let mut entries = self.entries.lock();
        match Self::live_entry(&mut entries, key, Instant::now()) {
            Some(entry) => {
                *entry = Entry::new(value, ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn compare_and_swap(&self, key: &str, expected: &str, value: &str) -> PortResult<bool> {
        let mut entries = self.entries.lock();
        match Self::live_entry(&mut entries, key, Instant::now()) {
            Some(entry) if entry.value == expected => {
                entry.value = value.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> PortResult<bool> {
        let mut entries = self.entries.lock();
        let live = Self::live_entry(&mut entries, key, Instant::now()).is_some();
        entries.remove(key);
        Ok(live)
    }

    async fn increment(&self, key: &str) -> PortResult<u64> {
        let mut entries = self.entries.lock();
        match Self::live_entry(&mut entries, key, Instant::now()) {
            Some(entry) => {
                let current: u64 = entry.value.parse().map_err(|e| {
                    PortError::backend(format!("incrementing non-integer key {key}"), e)
                })?;
                let next = current + 1;
                entry.value = next.to_string();
                Ok(next)
            }
            None => {
                entries.insert(key.to_string(), Entry::new("1", None));
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> PortResult<bool> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match Self::live_entry(&mut entries, key, now) {
            Some(entry) => {
                entry.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> PortResult<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        // A scan already costs a pass over the map, so expired keys go here too.
        entries.retain(|_, entry| entry.is_live(now));
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> PortResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let doomed: Vec<String> = entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in doomed {
            if entries.remove(&key).is_some_and(|e| e.is_live(now)) {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

//=========================================================================================
// MemoryBlobStorage
//=========================================================================================

/// A `BlobStorage` that keeps blobs in a map keyed by `name + extension`.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStorage {
    blobs: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn store(&self, name: &str, bytes: &[u8], extension: &str) -> PortResult<String> {
        let reference = format!("{name}{extension}");
        self.blobs
            .lock()
            .insert(reference.clone(), Bytes::copy_from_slice(bytes));
        Ok(reference)
    }

    async fn exists(&self, reference: &str) -> PortResult<bool> {
        Ok(self.blobs.lock().contains_key(reference))
    }

    async fn read(&self, reference: &str) -> PortResult<Bytes> {
        self.blobs
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("file {reference}")))
    }

    async fn remove(&self, reference: &str) -> PortResult<()> {
        self.blobs.lock().remove(reference);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conditional_writes_respect_existing_keys() {
        let store = MemoryStore::new();

        assert!(store.set_if_absent("k", "a", None).await.unwrap());
        assert!(!store.set_if_absent("k", "b", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));

        assert!(store.set_if_present("k", "c", None).await.unwrap());
        assert!(!store.set_if_present("missing", "c", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("c"));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_behave_as_absent() {
        let store = MemoryStore::new();
        store
            .set("short", "v", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        store.set("forever", "v", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert!(store.set_if_absent("short", "again", None).await.unwrap());
        assert!(!store.expire("gone", Duration::from_secs(1)).await.unwrap());
        assert_eq!(store.get("forever").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn increment_keeps_ttl_of_existing_counter() {
        let store = MemoryStore::new();
        store
            .set("n", "4", Some(Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(store.increment("n").await.unwrap(), 5);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.increment("n").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn increment_rejects_non_integer_values() {
        let store = MemoryStore::new();
        store.set("n", "abc", None).await.unwrap();

        let err = store.increment("n").await.unwrap_err();
        assert!(matches!(err, PortError::Backend { .. }));
    }

    #[tokio::test]
    async fn prefix_operations_stay_inside_the_prefix() {
        let store = MemoryStore::new();
        for key in ["user:a", "user:b", "users", "bin:x"] {
            store.set(key, "v", None).await.unwrap();
        }

        let mut keys = store.scan_prefix("user:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["user:a".to_string(), "user:b".to_string()]);

        assert_eq!(store.delete_prefix("user:").await.unwrap(), 2);
        assert_eq!(store.len(), 2);
        assert!(store.get("users").await.unwrap().is_some());
        assert!(store.get("bin:x").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn compare_and_swap_requires_the_expected_value() {
        let store = MemoryStore::new();
        assert!(!store.compare_and_swap("k", "a", "b").await.unwrap());

        store.set("k", "a", None).await.unwrap();
        assert!(!store.compare_and_swap("k", "stale", "b").await.unwrap());
        assert!(store.compare_and_swap("k", "a", "b").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn compare_and_swap_keeps_the_ttl() {
        let store = MemoryStore::new();
        store
            .set("k", "a", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(store.compare_and_swap("k", "a", "b").await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn scans_release_expired_entries() {
        let store = MemoryStore::new();
        for i in 0..1000 {
            store
                .set(&format!("bin:record:{i}"), "v", Some(Duration::from_secs(60)))
                .await
                .unwrap();
            store
                .set(&format!("bin:alias:{i}"), "v", Some(Duration::from_secs(60)))
                .await
                .unwrap();
        }
        store.set("user:email:a", "v", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(120)).await;

        assert!(store.scan_prefix("bin:record:").await.unwrap().is_empty());
        assert_eq!(store.entries.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_keys_nobody_touches() {
        let store = MemoryStore::new();
        store
            .set("stale", "v", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        store.set("kept", "v", None).await.unwrap();
        let sweeper = store.spawn_sweeper(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.entries.lock().len(), 1);
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn huge_ttls_do_not_overflow() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(u64::MAX)))
            .await
            .unwrap();
        assert!(store.expire("k", Duration::MAX).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn blob_storage_round_trips_and_overwrites() {
        let blobs = MemoryBlobStorage::new();
        let reference = blobs.store("foo", b"one", ".txt").await.unwrap();
        assert_eq!(reference, "foo.txt");

        blobs.store("foo", b"two", ".txt").await.unwrap();
        assert_eq!(blobs.read(&reference).await.unwrap(), Bytes::from_static(b"two"));

        blobs.remove(&reference).await.unwrap();
        assert!(!blobs.exists(&reference).await.unwrap());
        assert!(matches!(
            blobs.read(&reference).await,
            Err(PortError::NotFound(_))
        ));
    }
}
