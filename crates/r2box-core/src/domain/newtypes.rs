//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based ID types
// ============================================================================

/// A generic unique identifier wrapper around UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(Uuid);

impl UniqueId {
    /// Create a new random UniqueId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a UniqueId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Create a nil (all zeros) UniqueId
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for UniqueId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for UniqueId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UniqueId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid UUID: {e}")))
    }
}

impl From<Uuid> for UniqueId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier for a queued or running transfer task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new random TaskId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a TaskId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid TaskId: {e}")))
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier stamped onto every broker request/response envelope for correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new random RequestId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid RequestId: {e}")))
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// R2/S3 identifiers
// ============================================================================

/// A Cloudflare account ID (opaque 32-character hex identifier)
///
/// The account ID forms part of the R2 S3-compatible endpoint
/// (`https://<account-id>.r2.cloudflarestorage.com`). We don't assume a fixed
/// length beyond "non-empty and URL-safe" since Cloudflare hasn't documented
/// the format as a stable contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Create a new AccountId
    ///
    /// # Errors
    /// Returns error if the account id is empty or contains characters that
    /// would be invalid in a hostname label.
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidAccountId(
                "account id cannot be empty".to_string(),
            ));
        }

        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::InvalidAccountId(format!(
                "account id contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for AccountId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

/// A validated S3/R2 bucket name
///
/// Enforces the subset of the S3 bucket naming rules that R2 also applies:
/// 3-63 characters, lowercase ASCII letters, digits and hyphens, must start
/// and end with a letter or digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketName(String);

impl BucketName {
    const MIN_LEN: usize = 3;
    const MAX_LEN: usize = 63;

    /// Create a new BucketName
    ///
    /// # Errors
    /// Returns error if the name violates R2/S3 bucket naming rules
    pub fn new(name: String) -> Result<Self, DomainError> {
        if name.len() < Self::MIN_LEN || name.len() > Self::MAX_LEN {
            return Err(DomainError::InvalidBucketName(format!(
                "bucket name must be {}-{} characters: {name}",
                Self::MIN_LEN,
                Self::MAX_LEN
            )));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(DomainError::InvalidBucketName(format!(
                "bucket name must contain only lowercase letters, digits and hyphens: {name}"
            )));
        }

        let first = name.chars().next().unwrap();
        let last = name.chars().last().unwrap();
        if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
            return Err(DomainError::InvalidBucketName(format!(
                "bucket name must start and end with a letter or digit: {name}"
            )));
        }

        if name.contains("--") {
            return Err(DomainError::InvalidBucketName(format!(
                "bucket name cannot contain consecutive hyphens: {name}"
            )));
        }

        Ok(Self(name))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BucketName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BucketName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for BucketName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BucketName> for String {
    fn from(name: BucketName) -> Self {
        name.0
    }
}

/// A validated S3/R2 object key
///
/// Keys are opaque byte strings in the S3 model; we only reject the cases
/// that are never meaningful for this browser: an empty key or a key that
/// starts with `/` (which would otherwise silently produce a confusing
/// "folder" with an empty name component when split on `/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Maximum key length per the S3 API contract
    const MAX_LEN: usize = 1024;

    /// Create a new ObjectKey
    ///
    /// # Errors
    /// Returns error if the key is empty, too long, or starts with `/`
    pub fn new(key: String) -> Result<Self, DomainError> {
        if key.is_empty() {
            return Err(DomainError::InvalidObjectKey(
                "object key cannot be empty".to_string(),
            ));
        }

        if key.len() > Self::MAX_LEN {
            return Err(DomainError::InvalidObjectKey(format!(
                "object key exceeds {} bytes",
                Self::MAX_LEN
            )));
        }

        if key.starts_with('/') {
            return Err(DomainError::InvalidObjectKey(format!(
                "object key cannot start with '/': {key}"
            )));
        }

        Ok(Self(key))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key denotes a folder placeholder (ends with `/`)
    #[must_use]
    pub fn is_folder_marker(&self) -> bool {
        self.0.ends_with('/')
    }

    /// The key's final path component, after the last `/`
    #[must_use]
    pub fn file_name(&self) -> &str {
        let trimmed = self.0.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Join a child component onto this key, treating it as a folder prefix
    ///
    /// # Errors
    /// Returns error if the combined key is invalid
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        if component.is_empty() || component.contains('/') {
            return Err(DomainError::InvalidObjectKey(format!(
                "invalid path component: {component}"
            )));
        }

        let prefix = if self.0.ends_with('/') || self.0.is_empty() {
            self.0.clone()
        } else {
            format!("{}/", self.0)
        };

        Self::new(format!("{prefix}{component}"))
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}

/// An S3 ETag, as returned verbatim (including surrounding quotes) by R2
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ETag(String);

impl ETag {
    /// Create a new ETag
    ///
    /// # Errors
    /// Returns error if the value is empty
    pub fn new(value: String) -> Result<Self, DomainError> {
        if value.is_empty() {
            return Err(DomainError::InvalidEtag("ETag cannot be empty".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ETag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ETag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ETag {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ETag> for String {
    fn from(etag: ETag) -> Self {
        etag.0
    }
}

/// An opaque pagination continuation token as returned by `ListObjectsV2`
///
/// We don't validate its contents, only that it's non-empty, since the
/// format is an implementation detail of the remote provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContinuationToken(String);

impl ContinuationToken {
    /// Create a new ContinuationToken
    ///
    /// # Errors
    /// Returns error if the token is empty
    pub fn new(token: String) -> Result<Self, DomainError> {
        if token.is_empty() {
            return Err(DomainError::InvalidContinuationToken(
                "continuation token cannot be empty".to_string(),
            ));
        }
        Ok(Self(token))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContinuationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContinuationToken {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ContinuationToken {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContinuationToken> for String {
    fn from(token: ContinuationToken) -> Self {
        token.0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod unique_id_tests {
        use super::*;

        #[test]
        fn test_new_creates_unique_ids() {
            let id1 = UniqueId::new();
            let id2 = UniqueId::new();
            assert_ne!(id1, id2);
        }

        #[test]
        fn test_from_str() {
            let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
            let id: UniqueId = uuid_str.parse().unwrap();
            assert_eq!(id.to_string(), uuid_str);
        }

        #[test]
        fn test_from_str_invalid() {
            let result: Result<UniqueId, _> = "not-a-uuid".parse();
            assert!(result.is_err());
        }

        #[test]
        fn test_nil() {
            let id = UniqueId::nil();
            assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
        }

        #[test]
        fn test_serde_roundtrip() {
            let id = UniqueId::new();
            let json = serde_json::to_string(&id).unwrap();
            let parsed: UniqueId = serde_json::from_str(&json).unwrap();
            assert_eq!(id, parsed);
        }
    }

    mod task_id_tests {
        use super::*;

        #[test]
        fn test_new_creates_unique_ids() {
            let id1 = TaskId::new();
            let id2 = TaskId::new();
            assert_ne!(id1, id2);
        }

        #[test]
        fn test_display_roundtrip() {
            let id = TaskId::new();
            let parsed: TaskId = id.to_string().parse().unwrap();
            assert_eq!(id, parsed);
        }
    }

    mod account_id_tests {
        use super::*;

        #[test]
        fn test_valid() {
            let id = AccountId::new("a1b2c3d4e5f6".to_string()).unwrap();
            assert_eq!(id.as_str(), "a1b2c3d4e5f6");
        }

        #[test]
        fn test_empty_fails() {
            assert!(AccountId::new(String::new()).is_err());
        }

        #[test]
        fn test_invalid_chars_fails() {
            assert!(AccountId::new("has space".to_string()).is_err());
            assert!(AccountId::new("has-hyphen".to_string()).is_err());
        }

        #[test]
        fn test_serde_roundtrip() {
            let id = AccountId::new("abc123".to_string()).unwrap();
            let json = serde_json::to_string(&id).unwrap();
            let parsed: AccountId = serde_json::from_str(&json).unwrap();
            assert_eq!(id, parsed);
        }
    }

    mod bucket_name_tests {
        use super::*;

        #[test]
        fn test_valid() {
            let bucket = BucketName::new("my-bucket-01".to_string()).unwrap();
            assert_eq!(bucket.as_str(), "my-bucket-01");
        }

        #[test]
        fn test_too_short_fails() {
            assert!(BucketName::new("ab".to_string()).is_err());
        }

        #[test]
        fn test_too_long_fails() {
            assert!(BucketName::new("a".repeat(64)).is_err());
        }

        #[test]
        fn test_uppercase_fails() {
            assert!(BucketName::new("MyBucket".to_string()).is_err());
        }

        #[test]
        fn test_leading_hyphen_fails() {
            assert!(BucketName::new("-bucket".to_string()).is_err());
        }

        #[test]
        fn test_trailing_hyphen_fails() {
            assert!(BucketName::new("bucket-".to_string()).is_err());
        }

        #[test]
        fn test_consecutive_hyphens_fails() {
            assert!(BucketName::new("my--bucket".to_string()).is_err());
        }
    }

    mod object_key_tests {
        use super::*;

        #[test]
        fn test_valid() {
            let key = ObjectKey::new("docs/report.pdf".to_string()).unwrap();
            assert_eq!(key.as_str(), "docs/report.pdf");
        }

        #[test]
        fn test_empty_fails() {
            assert!(ObjectKey::new(String::new()).is_err());
        }

        #[test]
        fn test_leading_slash_fails() {
            assert!(ObjectKey::new("/docs/report.pdf".to_string()).is_err());
        }

        #[test]
        fn test_too_long_fails() {
            assert!(ObjectKey::new("a".repeat(1025)).is_err());
        }

        #[test]
        fn test_folder_marker() {
            let key = ObjectKey::new("docs/".to_string()).unwrap();
            assert!(key.is_folder_marker());
            let key = ObjectKey::new("docs/report.pdf".to_string()).unwrap();
            assert!(!key.is_folder_marker());
        }

        #[test]
        fn test_file_name() {
            let key = ObjectKey::new("docs/sub/report.pdf".to_string()).unwrap();
            assert_eq!(key.file_name(), "report.pdf");

            let folder = ObjectKey::new("docs/sub/".to_string()).unwrap();
            assert_eq!(folder.file_name(), "sub");
        }

        #[test]
        fn test_join() {
            let root = ObjectKey::new("docs/".to_string()).unwrap();
            let joined = root.join("report.pdf").unwrap();
            assert_eq!(joined.as_str(), "docs/report.pdf");
        }

        #[test]
        fn test_join_rejects_slash_component() {
            let root = ObjectKey::new("docs/".to_string()).unwrap();
            assert!(root.join("nested/path").is_err());
        }
    }

    mod etag_tests {
        use super::*;

        #[test]
        fn test_valid() {
            let etag = ETag::new("\"9bb58f26192e4ba00f01e2e7b136bbd8\"".to_string()).unwrap();
            assert!(!etag.as_str().is_empty());
        }

        #[test]
        fn test_empty_fails() {
            assert!(ETag::new(String::new()).is_err());
        }
    }

    mod continuation_token_tests {
        use super::*;

        #[test]
        fn test_valid() {
            let token = ContinuationToken::new("opaque-token-123".to_string()).unwrap();
            assert_eq!(token.as_str(), "opaque-token-123");
        }

        #[test]
        fn test_empty_fails() {
            assert!(ContinuationToken::new(String::new()).is_err());
        }

        #[test]
        fn test_serde_roundtrip() {
            let token = ContinuationToken::new("tok".to_string()).unwrap();
            let json = serde_json::to_string(&token).unwrap();
            let parsed: ContinuationToken = serde_json::from_str(&json).unwrap();
            assert_eq!(token, parsed);
        }
    }
}
