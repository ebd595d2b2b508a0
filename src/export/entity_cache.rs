//! Per-entity cache partitioned by scope.
//!
//! Entries live at `<root>/<scope>/<entity>.json` and are never evicted: an
//! entity's data is treated as fixed within its scope. A small LRU sits in
//! front of the disk layer for repeated lookups within one process.

use std::future::Future;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::files::{read_if_exists, sha256_hex, write_atomic};
use crate::error::{Result, YahooError};
use crate::EntityId;

const DEFAULT_MEMORY_CAPACITY: usize = 256;

/// Whether a value came from the cache or the remote API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Refreshed,
}

/// One cached entity payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub entity_id: EntityId,
    pub scope: String,
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
    pub content_hash: String,
}

impl CacheEntry {
    pub fn new(scope: &str, entity_id: &EntityId, payload: Value) -> Result<Self> {
        let content_hash = sha256_hex(&serde_json::to_vec(&payload)?);
        Ok(Self {
            entity_id: entity_id.clone(),
            scope: scope.to_string(),
            payload,
            fetched_at: Utc::now(),
            content_hash,
        })
    }
}

type MemoryKey = (String, EntityId);

pub struct EntityCache {
    root: PathBuf,
    memory: Mutex<LruCache<MemoryKey, CacheEntry>>,
}

impl EntityCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_capacity(root, DEFAULT_MEMORY_CAPACITY)
    }

    pub fn with_capacity(root: impl Into<PathBuf>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            root: root.into(),
            memory: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding `(scope, entity_id)`.
    pub fn entry_path(&self, scope: &str, entity_id: &EntityId) -> PathBuf {
        self.root
            .join(EntityId::new(scope).file_stem())
            .join(format!("{}.json", entity_id.file_stem()))
    }

    /// Cached entry without fetching. Unreadable files count as absent.
    pub fn peek(&self, scope: &str, entity_id: &EntityId) -> Option<CacheEntry> {
        let key = (scope.to_string(), entity_id.clone());
        if let Some(entry) = self.lock_memory().get(&key) {
            return Some(entry.clone());
        }

        let entry = self.read_from_disk(scope, entity_id)?;
        self.lock_memory().put(key, entry.clone());
        Some(entry)
    }

    /// Return the cached entry or run `fetch` and persist its payload.
    ///
    /// With `refresh` set the cached entry is ignored and replaced. A failed
    /// fetch caches nothing, so the entity is fetched again next time.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        scope: &str,
        entity_id: &EntityId,
        refresh: bool,
        fetch: F,
    ) -> Result<(CacheEntry, CacheStatus)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if !refresh {
            if let Some(entry) = self.peek(scope, entity_id) {
                debug!("Cache hit for {}/{}", scope, entity_id);
                return Ok((entry, CacheStatus::Hit));
            }
        }

        let payload = fetch().await?;
        let entry = CacheEntry::new(scope, entity_id, payload)?;
        self.store(&entry)?;

        let status = if refresh {
            CacheStatus::Refreshed
        } else {
            CacheStatus::Miss
        };
        debug!("Cached {}/{} ({:?})", scope, entity_id, status);
        Ok((entry, status))
    }

    fn store(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.entry_path(&entry.scope, &entry.entity_id);
        let cache_write = |source: std::io::Error| YahooError::CacheWrite {
            entity_id: entry.entity_id.to_string(),
            source,
        };

        let bytes = serde_json::to_vec_pretty(entry)
            .map_err(|e| cache_write(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        write_atomic(&path, &bytes).map_err(cache_write)?;

        self.lock_memory()
            .put((entry.scope.clone(), entry.entity_id.clone()), entry.clone());
        Ok(())
    }

    fn read_from_disk(&self, scope: &str, entity_id: &EntityId) -> Option<CacheEntry> {
        let path = self.entry_path(scope, entity_id);
        let contents = match read_if_exists(&path) {
            Ok(Some(contents)) => contents,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cannot read cache file {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&contents) {
            Ok(entry) if entry.entity_id == *entity_id && entry.scope == scope => Some(entry),
            Ok(_) => {
                warn!("Cache file {} belongs to another entity; ignoring", path.display());
                None
            }
            Err(e) => {
                warn!("Ignoring corrupt cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    fn lock_memory(&self) -> std::sync::MutexGuard<'_, LruCache<MemoryKey, CacheEntry>> {
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn player(key: &str) -> EntityId {
        EntityId::new(key)
    }

    #[tokio::test]
    async fn test_miss_then_hit_without_fetching() {
        let dir = tempdir().unwrap();
        let cache = EntityCache::new(dir.path());
        let calls = AtomicUsize::new(0);

        let (first, status) = cache
            .get_or_fetch("season-2024", &player("453.p.6743"), false, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"points": 42}))
            })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);

        let (second, status) = cache
            .get_or_fetch("season-2024", &player("453.p.6743"), false, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"points": 0}))
            })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entries_survive_a_new_process() {
        let dir = tempdir().unwrap();
        EntityCache::new(dir.path())
            .get_or_fetch("season-2024", &player("453.p.1"), false, || async {
                Ok(json!({"goals": 3}))
            })
            .await
            .unwrap();

        let reopened = EntityCache::new(dir.path());
        let entry = reopened.peek("season-2024", &player("453.p.1")).unwrap();
        assert_eq!(entry.payload, json!({"goals": 3}));
        assert_eq!(entry.content_hash, sha256_hex(b"{\"goals\":3}"));
    }

    #[tokio::test]
    async fn test_ids_with_rewritten_characters_do_not_share_a_file() {
        let dir = tempdir().unwrap();
        let cache = EntityCache::new(dir.path());
        for key in ["a/b", "a_b"] {
            cache
                .get_or_fetch("season-2024", &player(key), false, || async {
                    Ok(json!({ "key": key }))
                })
                .await
                .unwrap();
        }

        assert_ne!(
            cache.entry_path("season-2024", &player("a/b")),
            cache.entry_path("season-2024", &player("a_b"))
        );

        let reopened = EntityCache::new(dir.path());
        for key in ["a/b", "a_b"] {
            let entry = reopened.peek("season-2024", &player(key)).unwrap();
            assert_eq!(entry.payload["key"], key);
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let dir = tempdir().unwrap();
        let cache = EntityCache::new(dir.path());

        let err = cache
            .get_or_fetch("season-2024", &player("453.p.2"), false, || async {
                Err(YahooError::TransientNetwork {
                    message: "reset".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, YahooError::TransientNetwork { .. }));
        assert!(cache.peek("season-2024", &player("453.p.2")).is_none());
        assert!(!cache.entry_path("season-2024", &player("453.p.2")).exists());
    }

    #[tokio::test]
    async fn test_scopes_do_not_collide() {
        let dir = tempdir().unwrap();
        let cache = EntityCache::new(dir.path());
        let id = player("453.p.3");

        cache
            .get_or_fetch("season-2023", &id, false, || async { Ok(json!(2023)) })
            .await
            .unwrap();
        let (entry, status) = cache
            .get_or_fetch("season-2024", &id, false, || async { Ok(json!(2024)) })
            .await
            .unwrap();

        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(entry.payload, json!(2024));
        assert_eq!(cache.peek("season-2023", &id).unwrap().payload, json!(2023));
    }

    #[tokio::test]
    async fn test_refresh_replaces_entry() {
        let dir = tempdir().unwrap();
        let cache = EntityCache::new(dir.path());
        let id = player("453.p.4");

        cache
            .get_or_fetch("season-2024", &id, false, || async { Ok(json!(1)) })
            .await
            .unwrap();
        let (entry, status) = cache
            .get_or_fetch("season-2024", &id, true, || async { Ok(json!(2)) })
            .await
            .unwrap();

        assert_eq!(status, CacheStatus::Refreshed);
        assert_eq!(entry.payload, json!(2));
        assert_eq!(
            EntityCache::new(dir.path())
                .peek("season-2024", &id)
                .unwrap()
                .payload,
            json!(2)
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = EntityCache::new(dir.path());
        let id = player("453.p.5");
        let path = cache.entry_path("season-2024", &id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let (_, status) = cache
            .get_or_fetch("season-2024", &id, false, || async { Ok(json!("fresh")) })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);
    }

    #[tokio::test]
    async fn test_write_failure_reports_cache_write() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "file, not a directory").unwrap();
        let cache = EntityCache::new(&blocker);

        let err = cache
            .get_or_fetch("season-2024", &player("453.p.6"), false, || async {
                Ok(json!({}))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, YahooError::CacheWrite { .. }));
        assert!(cache.peek("season-2024", &player("453.p.6")).is_none());
    }

    #[test]
    fn test_entry_path_is_deterministic() {
        let cache = EntityCache::new("/tmp/cache");
        let a = cache.entry_path("season-2024", &player("453.p.6743"));
        let b = cache.entry_path("season-2024", &player("453.p.6743"));
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/tmp/cache/season-2024/453.p.6743.json"));
    }
}
