//! Folder Cache — an LRU of listing pages keyed by
//! `(accountId?, bucket, prefix)`, with TTL-based expiry and
//! prefix-aware invalidation.
//!
//! Deliberately hand-rolled rather than built on a caching crate: a plain
//! `HashMap` plus a recency `VecDeque` is small enough to audit directly
//! and matches the density of structure the rest of this codebase
//! hand-rolls for comparable needs (a token-bucket rate limiter, for
//! instance). Guarded by a single `tokio::sync::Mutex` since it is always
//! consulted from inside an async broker handler.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use r2box_core::domain::cache::{CacheEntry, CacheKey, DEFAULT_STALENESS_SECS, DEFAULT_TTL_SECS};
use r2box_core::domain::newtypes::BucketName;
use r2box_core::domain::object_store::ListingPage;

/// Default number of entries the cache holds before evicting the LRU.
pub const DEFAULT_CAPACITY: usize = 100;

/// Running counters for cache behavior, exposed via `statistics()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    // Front = least recently used, back = most recently used.
    recency: VecDeque<CacheKey>,
    capacity: usize,
    ttl: Duration,
    staleness: Duration,
    stats: CacheStatistics,
}

impl Inner {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(pos);
        }
        self.recency.push_back(key.clone());
    }

    fn evict_one(&mut self) {
        if let Some(lru_key) = self.recency.pop_front() {
            self.entries.remove(&lru_key);
            self.stats.evictions += 1;
            debug!(bucket = %lru_key.bucket, prefix = %lru_key.prefix, "folder cache: evicted LRU entry");
        }
    }

    fn remove_key(&mut self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            if let Some(pos) = self.recency.iter().position(|k| k == key) {
                self.recency.remove(pos);
            }
        }
        removed
    }
}

/// The Folder Cache. All mutating paths (`get`, `put`, `invalidate*`,
/// `clear`) take the single internal lock for their whole duration, so
/// each call is atomic with respect to every other call.
pub struct FolderCache {
    inner: Mutex<Inner>,
}

impl FolderCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_ttl(
            capacity,
            Duration::seconds(DEFAULT_TTL_SECS),
            Duration::seconds(DEFAULT_STALENESS_SECS),
        )
    }

    #[must_use]
    pub fn with_ttl(capacity: usize, ttl: Duration, staleness: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: VecDeque::new(),
                capacity: capacity.max(1),
                ttl,
                staleness,
                stats: CacheStatistics::default(),
            }),
        }
    }

    /// Returns a live snapshot for `key`, or `None` on a miss. An expired
    /// entry is evicted as part of the lookup rather than returned.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut inner = self.inner.lock().await;

        let is_expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(inner.ttl),
            None => {
                inner.stats.misses += 1;
                return None;
            }
        };

        if is_expired {
            inner.remove_key(key);
            inner.stats.misses += 1;
            return None;
        }

        inner.touch(key);
        inner.stats.hits += 1;
        inner.entries.get(key).cloned()
    }

    /// True if a live (non-expired) entry exists for `key` and its age
    /// exceeds the staleness threshold. Callers may still serve the
    /// cached value while triggering a background refresh.
    pub async fn is_stale(&self, key: &CacheKey) -> bool {
        let inner = self.inner.lock().await;
        match inner.entries.get(key) {
            Some(entry) => entry.is_stale(inner.staleness),
            None => false,
        }
    }

    /// Inserts or replaces the entry for `key`, moving it to MRU and
    /// evicting from the LRU end until the cache is back within capacity.
    pub async fn put(&self, key: CacheKey, page: &ListingPage) {
        let entry = CacheEntry::new(
            key.clone(),
            page.objects.clone(),
            page.common_prefixes.clone(),
            page.continuation_token.clone(),
        );

        let mut inner = self.inner.lock().await;
        let replacing = inner.entries.contains_key(&key);
        inner.entries.insert(key.clone(), entry);
        inner.touch(&key);

        if !replacing {
            while inner.entries.len() > inner.capacity {
                inner.evict_one();
            }
        }
    }

    /// Removes every cached entry for `bucket`, regardless of prefix.
    pub async fn invalidate_bucket(&self, bucket: &BucketName) {
        let mut inner = self.inner.lock().await;
        let doomed: Vec<CacheKey> = inner
            .entries
            .keys()
            .filter(|k| &k.bucket == bucket)
            .cloned()
            .collect();
        for key in doomed {
            inner.remove_key(&key);
        }
    }

    /// Removes the exact `(bucket, prefix)` entry, the listing that
    /// contained it (the parent prefix), and every subtree entry whose
    /// prefix starts with `prefix`.
    pub async fn invalidate_prefix(&self, bucket: &BucketName, prefix: &str) {
        let mut inner = self.inner.lock().await;

        let target = CacheKey::new(None, bucket.clone(), prefix.to_string());
        let parent_prefix = parent_prefix_of(prefix);
        let parent = CacheKey::new(None, bucket.clone(), parent_prefix);

        // Build the remove-set before mutating to avoid walking the
        // recency list while it's being shrunk out from under us.
        let doomed: Vec<CacheKey> = inner
            .entries
            .keys()
            .filter(|k| &k.bucket == bucket && (k.prefix.starts_with(prefix) || **k == target || **k == parent))
            .cloned()
            .collect();

        for key in doomed {
            inner.remove_key(&key);
        }
    }

    /// Drops every cached entry and resets the recency list; counters are
    /// left untouched since they describe lifetime behavior, not state.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.recency.clear();
    }

    pub async fn statistics(&self) -> CacheStatistics {
        self.inner.lock().await.stats
    }
}

/// The prefix of the listing that would have *contained* `prefix` as a
/// common-prefix entry, e.g. `"photos/2024/"` → `"photos/"`, and
/// `"photos/"` → `""` (bucket root).
fn parent_prefix_of(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => trimmed[..=idx].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2box_core::domain::object_store::Object;

    fn bucket() -> BucketName {
        BucketName::new("my-bucket".to_string()).unwrap()
    }

    fn empty_page(bucket: BucketName, prefix: &str) -> ListingPage {
        ListingPage::new(bucket, prefix.to_string(), vec![], vec![], false, None).unwrap()
    }

    fn page_with_object(bucket: BucketName, prefix: &str, key: &str) -> ListingPage {
        let object = Object {
            key: r2box_core::domain::newtypes::ObjectKey::new(key.to_string()).unwrap(),
            size: 10,
            last_modified: chrono::Utc::now(),
            etag: r2box_core::domain::newtypes::ETag::new("\"abc\"".to_string()).unwrap(),
        };
        ListingPage::new(bucket, prefix.to_string(), vec![object], vec![], false, None).unwrap()
    }

    #[tokio::test]
    async fn miss_then_hit_after_put() {
        let cache = FolderCache::new(DEFAULT_CAPACITY);
        let key = CacheKey::new(None, bucket(), String::new());

        assert!(cache.get(&key).await.is_none());

        let page = empty_page(bucket(), "");
        cache.put(key.clone(), &page).await;

        assert!(cache.get(&key).await.is_some());
        let stats = cache.statistics().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_evicted_on_access() {
        let cache = FolderCache::with_ttl(DEFAULT_CAPACITY, Duration::seconds(-1), Duration::seconds(0));
        let key = CacheKey::new(None, bucket(), String::new());
        let page = empty_page(bucket(), "");
        cache.put(key.clone(), &page).await;

        assert!(cache.get(&key).await.is_none());
        let stats = cache.statistics().await;
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = FolderCache::new(2);
        let key_a = CacheKey::new(None, bucket(), "a/".to_string());
        let key_b = CacheKey::new(None, bucket(), "b/".to_string());
        let key_c = CacheKey::new(None, bucket(), "c/".to_string());

        cache.put(key_a.clone(), &empty_page(bucket(), "a/")).await;
        cache.put(key_b.clone(), &empty_page(bucket(), "b/")).await;
        // Touch `a` so `b` becomes the LRU entry.
        cache.get(&key_a).await;
        cache.put(key_c.clone(), &empty_page(bucket(), "c/")).await;

        assert!(cache.get(&key_a).await.is_some());
        assert!(cache.get(&key_b).await.is_none());
        assert!(cache.get(&key_c).await.is_some());

        let stats = cache.statistics().await;
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn invalidate_bucket_removes_every_prefix() {
        let cache = FolderCache::new(DEFAULT_CAPACITY);
        let root = CacheKey::new(None, bucket(), String::new());
        let sub = CacheKey::new(None, bucket(), "photos/".to_string());

        cache.put(root.clone(), &empty_page(bucket(), "")).await;
        cache.put(sub.clone(), &empty_page(bucket(), "photos/")).await;

        cache.invalidate_bucket(&bucket()).await;

        assert!(cache.get(&root).await.is_none());
        assert!(cache.get(&sub).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_prefix_removes_self_parent_and_subtree() {
        let cache = FolderCache::new(DEFAULT_CAPACITY);
        let root = CacheKey::new(None, bucket(), String::new());
        let photos = CacheKey::new(None, bucket(), "photos/".to_string());
        let photos_2024 = CacheKey::new(None, bucket(), "photos/2024/".to_string());
        let other = CacheKey::new(None, bucket(), "docs/".to_string());

        cache.put(root.clone(), &empty_page(bucket(), "")).await;
        cache
            .put(photos.clone(), &page_with_object(bucket(), "photos/", "photos/a.jpg"))
            .await;
        cache
            .put(photos_2024.clone(), &page_with_object(bucket(), "photos/2024/", "photos/2024/b.jpg"))
            .await;
        cache.put(other.clone(), &empty_page(bucket(), "docs/")).await;

        cache.invalidate_prefix(&bucket(), "photos/").await;

        assert!(cache.get(&root).await.is_none(), "parent listing must be invalidated");
        assert!(cache.get(&photos).await.is_none());
        assert!(cache.get(&photos_2024).await.is_none(), "subtree entries must be invalidated");
        assert!(cache.get(&other).await.is_some(), "unrelated prefixes survive");
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = FolderCache::new(DEFAULT_CAPACITY);
        let key = CacheKey::new(None, bucket(), String::new());
        cache.put(key.clone(), &empty_page(bucket(), "")).await;

        cache.clear().await;

        assert!(cache.get(&key).await.is_none());
    }

    #[test]
    fn parent_prefix_of_nested_folder_is_its_ancestor() {
        assert_eq!(parent_prefix_of("photos/2024/"), "photos/");
        assert_eq!(parent_prefix_of("photos/"), "");
        assert_eq!(parent_prefix_of(""), "");
    }
}
