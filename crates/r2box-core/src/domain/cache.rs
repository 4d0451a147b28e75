//! Folder Cache domain types (CacheKey, CacheEntry)
//!
//! These are pure value types; the LRU map, eviction, and invalidation
//! logic that operate on them live in `r2box-cache`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{BucketName, ContinuationToken};
use super::object_store::Object;

/// Default TTL for a cached listing page (5 minutes).
pub const DEFAULT_TTL_SECS: i64 = 5 * 60;

/// Default staleness threshold for a cached listing page (2 minutes).
pub const DEFAULT_STALENESS_SECS: i64 = 2 * 60;

/// Identifies a cached listing: account, bucket, and prefix (`""` for the
/// bucket root). Hashable so it can key a `HashMap`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub account_id: Option<String>,
    pub bucket: BucketName,
    pub prefix: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(account_id: Option<String>, bucket: BucketName, prefix: String) -> Self {
        Self {
            account_id,
            bucket,
            prefix,
        }
    }

    /// Whether `other` names a listing that is a subtree of (or equal to)
    /// `self` — i.e. `other.prefix` extends `self.prefix` within the same
    /// bucket. Used by `invalidatePrefix`'s subtree sweep.
    #[must_use]
    pub fn is_subtree_of(&self, other: &Self) -> bool {
        self.bucket == other.bucket && self.prefix.starts_with(&other.prefix)
    }
}

/// One cached listing page, with the bookkeeping needed to evaluate
/// staleness and expiry without re-deriving anything from the objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub objects: Vec<Object>,
    pub common_prefixes: Vec<String>,
    pub continuation_token: Option<ContinuationToken>,
    pub inserted_at: DateTime<Utc>,
}

impl CacheEntry {
    #[must_use]
    pub fn new(
        key: CacheKey,
        objects: Vec<Object>,
        common_prefixes: Vec<String>,
        continuation_token: Option<ContinuationToken>,
    ) -> Self {
        Self {
            key,
            objects,
            common_prefixes,
            continuation_token,
            inserted_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.inserted_at)
    }

    /// True once `age() > ttl`. Expired entries must never be returned —
    /// they are evicted on the next access that observes them.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    /// True once `age() > staleness_threshold` (but not necessarily
    /// expired). Callers may still serve a stale entry while triggering a
    /// background refresh.
    #[must_use]
    pub fn is_stale(&self, staleness_threshold: Duration) -> bool {
        self.age() > staleness_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> BucketName {
        BucketName::new("my-bucket".to_string()).unwrap()
    }

    #[test]
    fn subtree_prefix_matches() {
        let parent = CacheKey::new(None, bucket(), "photos/".to_string());
        let child = CacheKey::new(None, bucket(), "photos/2024/".to_string());
        assert!(child.is_subtree_of(&parent));
        assert!(parent.is_subtree_of(&parent));
    }

    #[test]
    fn subtree_requires_same_bucket() {
        let other_bucket = BucketName::new("other-bucket".to_string()).unwrap();
        let a = CacheKey::new(None, bucket(), "photos/".to_string());
        let b = CacheKey::new(None, other_bucket, "photos/".to_string());
        assert!(!b.is_subtree_of(&a));
    }

    #[test]
    fn fresh_entry_is_not_expired_or_stale() {
        let key = CacheKey::new(None, bucket(), String::new());
        let entry = CacheEntry::new(key, vec![], vec![], None);
        assert!(!entry.is_expired(Duration::seconds(DEFAULT_TTL_SECS)));
        assert!(!entry.is_stale(Duration::seconds(DEFAULT_STALENESS_SECS)));
    }

    #[test]
    fn backdated_entry_is_expired() {
        let key = CacheKey::new(None, bucket(), String::new());
        let mut entry = CacheEntry::new(key, vec![], vec![], None);
        entry.inserted_at = Utc::now() - Duration::seconds(DEFAULT_TTL_SECS + 1);
        assert!(entry.is_expired(Duration::seconds(DEFAULT_TTL_SECS)));
    }
}
