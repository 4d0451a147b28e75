//! Credentials domain entity
//!
//! Represents a saved set of R2 API credentials. Owned exclusively by the
//! Credential Store (`r2box-credentials`); the Provider Client only ever
//! reads a snapshot at request time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::AccountId;

/// A saved set of R2 API credentials, plus the endpoint derived from the
/// account id and the time they were last written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    account_id: AccountId,
    access_key_id: String,
    secret_access_key: String,
    endpoint: String,
    last_updated: DateTime<Utc>,
}

impl Credentials {
    /// Creates a new `Credentials` record, deriving the R2 endpoint from
    /// `account_id` and stamping `last_updated` to now.
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if `access_key_id` or
    /// `secret_access_key` is empty.
    pub fn new(
        account_id: AccountId,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let access_key_id = access_key_id.into();
        let secret_access_key = secret_access_key.into();

        if access_key_id.is_empty() {
            return Err(DomainError::ValidationFailed(
                "access_key_id cannot be empty".to_string(),
            ));
        }
        if secret_access_key.is_empty() {
            return Err(DomainError::ValidationFailed(
                "secret_access_key cannot be empty".to_string(),
            ));
        }

        let endpoint = Self::derive_endpoint(&account_id);

        Ok(Self {
            account_id,
            access_key_id,
            secret_access_key,
            endpoint,
            last_updated: Utc::now(),
        })
    }

    /// Reconstructs a `Credentials` record from its persisted fields
    /// (used by the Credential Store when loading from disk or keyring,
    /// where `endpoint` and `last_updated` were already stamped).
    #[must_use]
    pub fn from_parts(
        account_id: AccountId,
        access_key_id: String,
        secret_access_key: String,
        last_updated: DateTime<Utc>,
    ) -> Self {
        let endpoint = Self::derive_endpoint(&account_id);
        Self {
            account_id,
            access_key_id,
            secret_access_key,
            endpoint,
            last_updated,
        }
    }

    #[must_use]
    pub fn derive_endpoint(account_id: &AccountId) -> String {
        format!("https://{account_id}.r2.cloudflarestorage.com")
    }

    #[must_use]
    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    #[must_use]
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

/// A redacted view of [`Credentials`] safe to print or log: the secret
/// access key is replaced with asterisks, matching the hard-redaction rule
/// the Broker's middleware applies to headers and query parameters.
#[derive(Debug, Clone, Serialize)]
pub struct RedactedCredentials {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: &'static str,
    pub endpoint: String,
    pub last_updated: DateTime<Utc>,
}

impl From<&Credentials> for RedactedCredentials {
    fn from(creds: &Credentials) -> Self {
        Self {
            account_id: creds.account_id.to_string(),
            access_key_id: creds.access_key_id.clone(),
            secret_access_key: "********",
            endpoint: creds.endpoint.clone(),
            last_updated: creds.last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountId {
        AccountId::new("abcdef0123456789".to_string()).unwrap()
    }

    #[test]
    fn new_derives_endpoint_from_account_id() {
        let creds = Credentials::new(account(), "AKIA", "secret").unwrap();
        assert_eq!(
            creds.endpoint(),
            "https://abcdef0123456789.r2.cloudflarestorage.com"
        );
    }

    #[test]
    fn new_rejects_empty_access_key() {
        let err = Credentials::new(account(), "", "secret").unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[test]
    fn new_rejects_empty_secret() {
        let err = Credentials::new(account(), "AKIA", "").unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[test]
    fn redacted_view_hides_secret() {
        let creds = Credentials::new(account(), "AKIA", "top-secret").unwrap();
        let redacted = RedactedCredentials::from(&creds);
        assert_eq!(redacted.secret_access_key, "********");
        assert_eq!(redacted.access_key_id, "AKIA");
    }
}
