//! KeyStore - per-database age identities in the OS credential store
//!
//! Each database owns exactly one identity, stored under the account
//! `db-key-<database>` of the `indietool-secrets` service. Identities never
//! touch the filesystem; only an explicit import path is ever read.
//!
//! Losing an identity makes every secret encrypted under it irrecoverable,
//! so `initialize_key` refuses to replace an existing one unless told to.

use age::secrecy::ExposeSecret;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use crate::error::{Result, SecretsError};
use crate::secret::validate_database_name;

/// Service name for every indietool entry in the platform keyring
pub const KEYRING_SERVICE: &str = "indietool-secrets";

/// Failures reported by a credential backend
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("credential store unavailable: {0}")]
    Unavailable(String),

    #[error("credential store error: {0}")]
    Backend(String),
}

/// Minimal interface to a secure credential store
pub trait CredentialStore: Send + Sync {
    /// Create or replace the secret stored for `account`
    fn set(&self, account: &str, secret: &str) -> std::result::Result<(), CredentialError>;

    /// The secret stored for `account`, if any
    fn get(&self, account: &str) -> std::result::Result<Option<String>, CredentialError>;

    /// Remove the entry, returning whether there was one
    fn delete(&self, account: &str) -> std::result::Result<bool, CredentialError>;
}

/// Platform keyring backend using the `keyring` crate.
/// Dispatches to:
///   - Linux: D-Bus Secret Service (GNOME Keyring / KDE Wallet)
///   - macOS: Security.framework Keychain
///   - Windows: Windows Credential Manager
#[derive(Debug, Clone)]
pub struct KeyringCredentials {
    service: String,
}

impl KeyringCredentials {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    /// Use a different service name (keeps test runs out of the real vault)
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, account: &str) -> std::result::Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(&self.service, account).map_err(classify)
    }
}

impl Default for KeyringCredentials {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(err: keyring::Error) -> CredentialError {
    match err {
        keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
            CredentialError::Unavailable(err.to_string())
        }
        other => CredentialError::Backend(other.to_string()),
    }
}

impl CredentialStore for KeyringCredentials {
    fn set(&self, account: &str, secret: &str) -> std::result::Result<(), CredentialError> {
        self.entry(account)?.set_password(secret).map_err(classify)
    }

    fn get(&self, account: &str) -> std::result::Result<Option<String>, CredentialError> {
        match self.entry(account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(classify(e)),
        }
    }

    fn delete(&self, account: &str) -> std::result::Result<bool, CredentialError> {
        match self.entry(account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(classify(e)),
        }
    }
}

/// Process-local credential store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(
        &self,
    ) -> std::result::Result<std::sync::MutexGuard<'_, HashMap<String, String>>, CredentialError>
    {
        self.entries
            .lock()
            .map_err(|_| CredentialError::Backend("memory store lock poisoned".to_string()))
    }
}

impl CredentialStore for MemoryCredentials {
    fn set(&self, account: &str, secret: &str) -> std::result::Result<(), CredentialError> {
        self.entries()?
            .insert(account.to_string(), secret.to_string());
        Ok(())
    }

    fn get(&self, account: &str) -> std::result::Result<Option<String>, CredentialError> {
        Ok(self.entries()?.get(account).cloned())
    }

    fn delete(&self, account: &str) -> std::result::Result<bool, CredentialError> {
        Ok(self.entries()?.remove(account).is_some())
    }
}

/// Memory store that can be switched into an unreachable state
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct LockableCredentials {
    inner: MemoryCredentials,
    locked: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
impl LockableCredentials {
    /// Flag shared with the store; `true` makes every call fail as unavailable
    pub(crate) fn lock_handle(&self) -> std::sync::Arc<std::sync::atomic::AtomicBool> {
        std::sync::Arc::clone(&self.locked)
    }

    fn check(&self) -> std::result::Result<(), CredentialError> {
        if self.locked.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(CredentialError::Unavailable("locked".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl CredentialStore for LockableCredentials {
    fn set(&self, account: &str, secret: &str) -> std::result::Result<(), CredentialError> {
        self.check()?;
        self.inner.set(account, secret)
    }

    fn get(&self, account: &str) -> std::result::Result<Option<String>, CredentialError> {
        self.check()?;
        self.inner.get(account)
    }

    fn delete(&self, account: &str) -> std::result::Result<bool, CredentialError> {
        self.check()?;
        self.inner.delete(account)
    }
}

/// One age identity per database, held in a credential store
pub struct KeyStore {
    credentials: Box<dyn CredentialStore>,
}

impl KeyStore {
    pub fn new(credentials: Box<dyn CredentialStore>) -> Self {
        Self { credentials }
    }

    /// KeyStore backed by the platform keyring
    pub fn keyring() -> Self {
        Self::new(Box::new(KeyringCredentials::new()))
    }

    fn account(database: &str) -> String {
        format!("db-key-{}", database)
    }

    fn backend_error(database: &str, err: CredentialError) -> SecretsError {
        match err {
            CredentialError::Unavailable(reason) => SecretsError::KeyringUnavailable {
                database: database.to_string(),
                reason,
            },
            CredentialError::Backend(reason) => SecretsError::Keyring {
                database: database.to_string(),
                reason,
            },
        }
    }

    fn load(&self, database: &str) -> Result<Option<String>> {
        validate_database_name(database)?;
        self.credentials
            .get(&Self::account(database))
            .map_err(|e| Self::backend_error(database, e))
    }

    /// Generate (or import from `import_path`) the identity for `database`
    ///
    /// Returns the public recipient. Fails with `KeyAlreadyExists` when a key
    /// is present and `overwrite` is false.
    pub fn initialize_key(
        &self,
        database: &str,
        import_path: Option<&Path>,
        overwrite: bool,
    ) -> Result<String> {
        if self.load(database)?.is_some() && !overwrite {
            return Err(SecretsError::KeyAlreadyExists {
                database: database.to_string(),
            });
        }

        let identity = match import_path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|e| SecretsError::KeyParse {
                        database: database.to_string(),
                        reason: format!("failed to read key file {}: {}", path.display(), e),
                    })?;
                parse_identity(&content).map_err(|reason| SecretsError::KeyParse {
                    database: database.to_string(),
                    reason,
                })?
            }
            None => age::x25519::Identity::generate(),
        };

        let identity_str = identity.to_string();
        self.credentials
            .set(&Self::account(database), identity_str.expose_secret())
            .map_err(|e| Self::backend_error(database, e))?;

        match import_path {
            Some(path) => tracing::info!(database, path = %path.display(), "imported encryption key"),
            None => tracing::info!(database, "generated encryption key"),
        }

        Ok(identity.to_public().to_string())
    }

    /// Load the identity for `database`
    pub fn get_identity(&self, database: &str) -> Result<age::x25519::Identity> {
        let stored = self
            .load(database)?
            .ok_or_else(|| SecretsError::KeyNotFound {
                database: database.to_string(),
            })?;

        tracing::debug!(database, "loaded encryption key");

        parse_identity(&stored).map_err(|reason| SecretsError::KeyParse {
            database: database.to_string(),
            reason: format!("stored key is corrupt: {}", reason),
        })
    }

    /// Whether a key exists, surfacing backend failures
    pub fn key_exists(&self, database: &str) -> Result<bool> {
        Ok(self.load(database)?.is_some())
    }

    /// Whether a key exists. Backend failures count as "no".
    pub fn has_key(&self, database: &str) -> bool {
        match self.key_exists(database) {
            Ok(exists) => exists,
            Err(e) => {
                tracing::debug!(database, error = %e, "key probe failed");
                false
            }
        }
    }

    /// Permanently remove the key for `database`
    ///
    /// Every secret encrypted under it becomes unreadable.
    pub fn delete_key(&self, database: &str) -> Result<bool> {
        validate_database_name(database)?;
        let existed = self
            .credentials
            .delete(&Self::account(database))
            .map_err(|e| Self::backend_error(database, e))?;

        if existed {
            tracing::warn!(database, "encryption key purged - its secrets are now irrecoverable");
        }
        Ok(existed)
    }

    /// The public recipient (`age1...`) for `database`
    pub fn recipient(&self, database: &str) -> Result<String> {
        Ok(self.get_identity(database)?.to_public().to_string())
    }
}

/// Parse an identity, accepting `age-keygen` output
///
/// Blank lines and `#` comments are skipped; exactly one key line must remain.
pub fn parse_identity(content: &str) -> std::result::Result<age::x25519::Identity, String> {
    let keys: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    match keys.as_slice() {
        [key] => key
            .parse::<age::x25519::Identity>()
            .map_err(|e| e.to_string()),
        [] => Err("no AGE-SECRET-KEY line found".to_string()),
        _ => Err(format!("expected one key, found {} lines", keys.len())),
    }
}
