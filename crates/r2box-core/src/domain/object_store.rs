//! Bucket/object listing domain types
//!
//! These mirror the shapes returned by the Provider Client and served
//! verbatim (modulo envelope wrapping) by the Broker's `/buckets` and
//! `/buckets/{bucket}/objects` routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{BucketName, ContinuationToken, ETag, ObjectKey};

/// A single R2 bucket as returned by `ListBuckets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: BucketName,
    pub creation_date: DateTime<Utc>,
}

/// A single object entry within a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub key: ObjectKey,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub etag: ETag,
}

/// One page of a (possibly continued) bucket listing under a given prefix.
///
/// # Invariants
/// - `key_count == objects.len() + common_prefixes.len()`
/// - `is_truncated` is true if and only if `continuation_token` is `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingPage {
    pub bucket: BucketName,
    pub prefix: String,
    pub objects: Vec<Object>,
    pub common_prefixes: Vec<String>,
    pub key_count: u64,
    pub is_truncated: bool,
    pub continuation_token: Option<ContinuationToken>,
}

impl ListingPage {
    /// Builds a `ListingPage`, deriving `key_count` and validating the
    /// truncation/continuation-token invariant.
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if `is_truncated` and
    /// `continuation_token.is_some()` disagree.
    pub fn new(
        bucket: BucketName,
        prefix: String,
        objects: Vec<Object>,
        common_prefixes: Vec<String>,
        is_truncated: bool,
        continuation_token: Option<ContinuationToken>,
    ) -> Result<Self, DomainError> {
        if is_truncated != continuation_token.is_some() {
            return Err(DomainError::ValidationFailed(format!(
                "is_truncated ({is_truncated}) must agree with continuation_token presence ({})",
                continuation_token.is_some()
            )));
        }

        let key_count = (objects.len() + common_prefixes.len()) as u64;

        Ok(Self {
            bucket,
            prefix,
            objects,
            common_prefixes,
            key_count,
            is_truncated,
            continuation_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> BucketName {
        BucketName::new("my-bucket".to_string()).unwrap()
    }

    fn object(key: &str) -> Object {
        Object {
            key: ObjectKey::new(key.to_string()).unwrap(),
            size: 128,
            last_modified: Utc::now(),
            etag: ETag::new("\"abc123\"".to_string()).unwrap(),
        }
    }

    #[test]
    fn key_count_sums_objects_and_prefixes() {
        let page = ListingPage::new(
            bucket(),
            String::new(),
            vec![object("a.txt"), object("b.txt")],
            vec!["folder/".to_string()],
            false,
            None,
        )
        .unwrap();
        assert_eq!(page.key_count, 3);
    }

    #[test]
    fn truncated_requires_continuation_token() {
        let err = ListingPage::new(bucket(), String::new(), vec![], vec![], true, None)
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[test]
    fn continuation_token_requires_truncated() {
        let token = ContinuationToken::new("token".to_string()).unwrap();
        let err =
            ListingPage::new(bucket(), String::new(), vec![], vec![], false, Some(token))
                .unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[test]
    fn truncated_page_with_token_is_valid() {
        let token = ContinuationToken::new("token".to_string()).unwrap();
        let page =
            ListingPage::new(bucket(), "prefix/".to_string(), vec![], vec![], true, Some(token))
                .unwrap();
        assert!(page.is_truncated);
        assert!(page.continuation_token.is_some());
    }
}
