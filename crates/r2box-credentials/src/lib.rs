//! Credential Store (`r2box-credentials`)
//!
//! Persists R2 API credentials behind a small [`CredentialBackend`]
//! trait with two implementations:
//!
//! - [`FileCredentialBackend`] — the documented file layout
//!   (`~/.cloudflare-r2-object-storage-browser/settings.json`, directory
//!   mode `0700`, file mode `0600`, atomic temp-file-then-rename writes).
//! - [`KeyringCredentialBackend`] — the OS keychain/credential vault, used
//!   when available via `keyring::Entry`.
//!
//! [`CredentialStore::detect`] prefers the keychain and falls back to the
//! file layout, never both at once.

use std::fs::{self, DirBuilder};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

use chrono::{DateTime, Utc};
use r2box_core::domain::credentials::Credentials;
use r2box_core::domain::newtypes::AccountId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while persisting or retrieving credentials.
///
/// Never carries a raw filesystem path in a variant the Broker might
/// surface to an HTTP client — callers that need the path use
/// [`FileCredentialBackend::path`] directly.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential store I/O error: {0}")]
    Io(String),
    #[error("failed to (de)serialize credentials: {0}")]
    Serialization(String),
    #[error("invalid credential field: {field}")]
    Validation { field: String },
    #[error("OS keyring error: {0}")]
    Keyring(String),
}

impl From<std::io::Error> for CredentialError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CredentialError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<r2box_core::domain::errors::DomainError> for CredentialError {
    fn from(err: r2box_core::domain::errors::DomainError) -> Self {
        Self::Validation {
            field: err.to_string(),
        }
    }
}

/// The on-disk / keyring-stored JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredentials {
    account_id: String,
    access_key_id: String,
    secret_access_key: String,
    endpoint: String,
    last_updated: DateTime<Utc>,
}

impl From<&Credentials> for StoredCredentials {
    fn from(creds: &Credentials) -> Self {
        Self {
            account_id: creds.account_id().to_string(),
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            endpoint: creds.endpoint().to_string(),
            last_updated: creds.last_updated(),
        }
    }
}

impl TryFrom<StoredCredentials> for Credentials {
    type Error = CredentialError;

    fn try_from(stored: StoredCredentials) -> Result<Self, Self::Error> {
        let account_id = AccountId::new(stored.account_id)?;
        Ok(Credentials::from_parts(
            account_id,
            stored.access_key_id,
            stored.secret_access_key,
            stored.last_updated,
        ))
    }
}

/// A storage backend for [`Credentials`]. Implementations must guarantee
/// that `load()` never observes a partially written record.
pub trait CredentialBackend: Send + Sync {
    /// # Errors
    /// Returns [`CredentialError`] on I/O or serialization failure.
    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError>;

    /// Missing credentials are not an error; a parse failure is logged and
    /// treated as absent.
    ///
    /// # Errors
    /// Returns [`CredentialError`] only for I/O failures other than "not found".
    fn load(&self) -> Result<Option<Credentials>, CredentialError>;

    /// Idempotent: clearing an already-absent record succeeds.
    ///
    /// # Errors
    /// Returns [`CredentialError`] on I/O failure.
    fn clear(&self) -> Result<(), CredentialError>;
}

// ============================================================================
// FileCredentialBackend
// ============================================================================

/// Atomic, permission-restricted file-backed credential store.
pub struct FileCredentialBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialBackend {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// `~/.cloudflare-r2-object-storage-browser/settings.json`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(".cloudflare-r2-object-storage-browser")
            .join("settings.json")
    }

    /// The path this backend reads/writes. Intentionally not exposed
    /// through [`CredentialError`] variants.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_dir(&self) -> Result<(), CredentialError> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| CredentialError::Io("credential path has no parent".to_string()))?;

        if dir.exists() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(dir)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(dir)?;
        }

        Ok(())
    }
}

impl CredentialBackend for FileCredentialBackend {
    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        self.ensure_dir()?;

        let stored = StoredCredentials::from(credentials);
        let json = serde_json::to_vec_pretty(&stored)?;

        let tmp_file_name = format!(
            "{}.tmp-{}",
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("settings.json"),
            uuid::Uuid::new_v4()
        );
        let tmp_path = self.path.with_file_name(tmp_file_name);

        fs::write(&tmp_path, &json)?;

        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&tmp_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&tmp_path, perms)?;
        }

        fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), "saved credentials");
        Ok(())
    }

    fn load(&self) -> Result<Option<Credentials>, CredentialError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_slice::<StoredCredentials>(&bytes) {
            Ok(stored) => Ok(Some(Credentials::try_from(stored)?)),
            Err(err) => {
                warn!(error = %err, "credential file failed to parse, treating as absent");
                Ok(None)
            }
        }
    }

    fn clear(&self) -> Result<(), CredentialError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

// ============================================================================
// KeyringCredentialBackend
// ============================================================================

/// Keyring service name credentials are stored under.
const KEYRING_SERVICE: &str = "r2box";

/// There is exactly one active credential set per user, so the keyring
/// "username" is a fixed sentinel rather than per-account.
const KEYRING_USER: &str = "r2box-credentials";

/// OS keychain/credential-vault backed credential store.
pub struct KeyringCredentialBackend {
    service: String,
    user: String,
}

impl KeyringCredentialBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            user: KEYRING_USER.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(&self.service, &self.user)
            .map_err(|err| CredentialError::Keyring(err.to_string()))
    }

    /// Probes whether an OS keyring/secret-service backend is reachable at
    /// all, without requiring an existing entry. Used by
    /// [`CredentialStore::detect`] to decide whether to prefer this backend.
    #[must_use]
    pub fn is_available(&self) -> bool {
        match self.entry() {
            Ok(entry) => !matches!(
                entry.get_password(),
                Err(keyring::Error::PlatformFailure(_)) | Err(keyring::Error::NoStorageAccess(_))
            ),
            Err(_) => false,
        }
    }
}

impl Default for KeyringCredentialBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialBackend for KeyringCredentialBackend {
    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        let entry = self.entry()?;
        let stored = StoredCredentials::from(credentials);
        let json = serde_json::to_string(&stored)?;
        entry
            .set_password(&json)
            .map_err(|err| CredentialError::Keyring(err.to_string()))?;
        debug!("saved credentials to OS keyring");
        Ok(())
    }

    fn load(&self) -> Result<Option<Credentials>, CredentialError> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(json) => match serde_json::from_str::<StoredCredentials>(&json) {
                Ok(stored) => Ok(Some(Credentials::try_from(stored)?)),
                Err(err) => {
                    warn!(error = %err, "keyring credential entry failed to parse, treating as absent");
                    Ok(None)
                }
            },
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(CredentialError::Keyring(err.to_string())),
        }
    }

    fn clear(&self) -> Result<(), CredentialError> {
        let entry = self.entry()?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(CredentialError::Keyring(err.to_string())),
        }
    }
}

// ============================================================================
// CredentialStore
// ============================================================================

/// The Credential Store facade the rest of r2box depends on. Wraps exactly
/// one [`CredentialBackend`] at a time.
pub struct CredentialStore {
    backend: Box<dyn CredentialBackend>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(backend: Box<dyn CredentialBackend>) -> Self {
        Self { backend }
    }

    /// Always uses the documented file layout at `path`.
    #[must_use]
    pub fn file(path: PathBuf) -> Self {
        Self::new(Box::new(FileCredentialBackend::new(path)))
    }

    /// Always uses the OS keychain, regardless of availability.
    #[must_use]
    pub fn keychain() -> Self {
        Self::new(Box::new(KeyringCredentialBackend::new()))
    }

    /// Prefers the OS keychain when reachable, otherwise falls back to the
    /// file layout at `file_path`. Never straddles both at once.
    #[must_use]
    pub fn detect(file_path: PathBuf, prefer_keychain: bool) -> Self {
        if prefer_keychain {
            let keychain = KeyringCredentialBackend::new();
            if keychain.is_available() {
                debug!("using OS keychain credential backend");
                return Self::new(Box::new(keychain));
            }
        }
        debug!(path = %file_path.display(), "using file credential backend");
        Self::file(file_path)
    }

    /// Validates inputs, derives the endpoint, stamps `last_updated`, and
    /// persists atomically.
    ///
    /// # Errors
    /// Returns [`CredentialError::Validation`] if any field is empty, or an
    /// I/O/serialization error from the underlying backend.
    pub fn save(
        &self,
        account_id: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Result<Credentials, CredentialError> {
        let account_id = account_id.into();
        let access_key_id = access_key_id.into();
        let secret_access_key = secret_access_key.into();

        if account_id.is_empty() {
            return Err(CredentialError::Validation {
                field: "account_id".to_string(),
            });
        }

        let account_id = AccountId::new(account_id)?;
        let credentials = Credentials::new(account_id, access_key_id, secret_access_key)?;
        self.backend.save(&credentials)?;
        Ok(credentials)
    }

    /// # Errors
    /// Returns [`CredentialError`] on backend I/O failure. A missing record
    /// is `Ok(None)`, not an error.
    pub fn load(&self) -> Result<Option<Credentials>, CredentialError> {
        self.backend.load()
    }

    /// # Errors
    /// Returns [`CredentialError`] on backend I/O failure. Clearing an
    /// already-absent record is a no-op success.
    pub fn clear(&self) -> Result<(), CredentialError> {
        self.backend.clear()
    }
}
