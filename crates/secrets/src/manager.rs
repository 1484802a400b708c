//! SecretManager - the public face of the vault
//!
//! Ties the pieces together:
//!
//! ```text
//! set:  Secret -> JSON -> Encryptor::encrypt -> RecordStore::set
//! get:  RecordStore::get -> Encryptor::decrypt -> JSON -> Secret
//! ```
//!
//! The whole record is serialized and encrypted before the single store write,
//! so a failure part-way through leaves the previous record as it was.
//!
//! Preserving `created_at` is a read followed by a write. Two processes
//! writing the same secret at once can race; the tool assumes one user and
//! one process at a time.

use chrono::{DateTime, Utc};
use indietool_core::SecretsConfig;
use std::path::Path;

use crate::encryptor::Encryptor;
use crate::error::{Result, SecretsError};
use crate::keystore::{CredentialStore, KeyStore, KeyringCredentials};
use crate::secret::{validate_database_name, validate_secret_name, Secret, SecretListItem};
use crate::storage::RecordStore;

pub struct SecretManager {
    default_database: String,
    auto_init: bool,
    encryptor: Encryptor,
    store: RecordStore,
}

impl SecretManager {
    /// Manager using the platform keyring
    pub fn new(config: &SecretsConfig) -> Result<Self> {
        Self::with_credentials(config, Box::new(KeyringCredentials::new()))
    }

    /// Manager using any credential backend
    pub fn with_credentials(
        config: &SecretsConfig,
        credentials: Box<dyn CredentialStore>,
    ) -> Result<Self> {
        let root = config.storage_dir.as_deref().ok_or_else(|| {
            SecretsError::Configuration("secrets storage directory is not set".to_string())
        })?;

        let default_database = config.default_database().to_string();
        validate_database_name(&default_database)?;

        Ok(Self {
            default_database,
            auto_init: config.auto_init,
            encryptor: Encryptor::new(KeyStore::new(credentials)),
            store: RecordStore::new(root)?,
        })
    }

    pub fn default_database(&self) -> &str {
        &self.default_database
    }

    pub fn storage_root(&self) -> &Path {
        self.store.root()
    }

    fn resolve<'a>(&'a self, database: Option<&'a str>) -> &'a str {
        match database {
            Some(db) if !db.is_empty() => db,
            _ => &self.default_database,
        }
    }

    /// Create the key for `database`, optionally importing it from a file
    ///
    /// Returns the public recipient. Refuses to replace an existing key
    /// unless `overwrite` is set; check `has_key` first to warn the user.
    pub fn init_database(
        &self,
        database: Option<&str>,
        key_path: Option<&Path>,
        overwrite: bool,
    ) -> Result<String> {
        let database = self.resolve(database);
        self.encryptor
            .keys()
            .initialize_key(database, key_path, overwrite)
    }

    /// Key existence probe that reports keyring failures instead of hiding them
    pub fn key_exists(&self, database: Option<&str>) -> Result<bool> {
        self.encryptor.keys().key_exists(self.resolve(database))
    }

    pub fn has_key(&self, database: Option<&str>) -> bool {
        self.encryptor.keys().has_key(self.resolve(database))
    }

    /// Public recipient (`age1...`) of the database key
    pub fn public_key(&self, database: Option<&str>) -> Result<String> {
        self.encryptor.keys().recipient(self.resolve(database))
    }

    /// Remove the database key from the keyring. Its secrets become unreadable.
    pub fn purge_key(&self, database: &str) -> Result<bool> {
        self.encryptor.keys().delete_key(database)
    }

    /// Store (or replace) a secret, keeping its original `created_at`
    pub fn set_secret(
        &self,
        name: &str,
        value: &str,
        database: Option<&str>,
        note: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Secret> {
        let database = self.resolve(database);
        validate_secret_name(name)?;
        validate_database_name(database)?;

        if self.auto_init && !self.encryptor.keys().has_key(database) {
            tracing::info!(database, "no key yet, initializing");
            self.encryptor.keys().initialize_key(database, None, false)?;
        }

        let now = Utc::now();
        let created_at = match self.get_secret(name, Some(database)) {
            Ok(existing) => existing.created_at,
            Err(e) if e.is_missing_record() => now,
            Err(
                e @ (SecretsError::Decryption { .. } | SecretsError::Serialization { .. }),
            ) => {
                tracing::warn!(database, name, error = %e, "replacing unreadable secret");
                now
            }
            Err(e) => return Err(e),
        };

        let secret = Secret::new(name, value, note, created_at, now, expires_at);

        let data = serde_json::to_vec(&secret).map_err(|source| SecretsError::Serialization {
            database: database.to_string(),
            name: name.to_string(),
            source,
        })?;
        let encrypted = self.encryptor.encrypt(&data, database)?;
        self.store.set(database, name, &encrypted)?;

        tracing::debug!(database, name, "secret stored");
        Ok(secret)
    }

    /// Read and decrypt a secret. Expired secrets are returned as-is.
    pub fn get_secret(&self, name: &str, database: Option<&str>) -> Result<Secret> {
        let database = self.resolve(database);
        validate_secret_name(name)?;

        // Resolve the key first so a missing key is reported as such
        let identity = self.encryptor.identity(database)?;
        let encrypted = self.store.get(database, name)?;
        let data = Encryptor::decrypt_with(&identity, &encrypted, database)?;

        serde_json::from_slice(&data).map_err(|source| SecretsError::Serialization {
            database: database.to_string(),
            name: name.to_string(),
            source,
        })
    }

    /// Every readable secret in the database, without values
    ///
    /// Records that fail to decrypt or parse are skipped so one bad entry
    /// can't hide the rest.
    pub fn list_secrets(&self, database: Option<&str>) -> Result<Vec<SecretListItem>> {
        let database = self.resolve(database);
        let identity = self.encryptor.identity(database)?;

        let mut items = vec![];
        for key in self.store.list(database)? {
            let secret = self
                .store
                .get(database, &key)
                .and_then(|encrypted| Encryptor::decrypt_with(&identity, &encrypted, database))
                .and_then(|data| {
                    serde_json::from_slice::<Secret>(&data).map_err(|source| {
                        SecretsError::Serialization {
                            database: database.to_string(),
                            name: key.clone(),
                            source,
                        }
                    })
                });

            match secret {
                Ok(secret) => items.push(secret.to_list_item()),
                Err(e) => tracing::warn!(database, key, error = %e, "skipping unreadable secret"),
            }
        }

        Ok(items)
    }

    /// Remove a secret. Removing one that doesn't exist is not an error.
    pub fn delete_secret(&self, name: &str, database: Option<&str>) -> Result<()> {
        let database = self.resolve(database);
        validate_secret_name(name)?;
        self.store.delete(database, name)
    }

    pub fn list_databases(&self) -> Result<Vec<String>> {
        self.store.list_databases()
    }

    pub fn database_exists(&self, database: &str) -> Result<bool> {
        self.store.database_exists(database)
    }

    /// Remove a database and all its secrets. The key stays in the keyring.
    pub fn delete_database(&self, database: &str) -> Result<()> {
        self.store.delete_database(database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::MemoryCredentials;
    use chrono::Duration;
    use tempfile::TempDir;

    fn temp_manager() -> (SecretManager, TempDir) {
        let tmp = TempDir::new().unwrap();
        let config = SecretsConfig::with_storage_dir(tmp.path().join("secrets"));
        let manager =
            SecretManager::with_credentials(&config, Box::new(MemoryCredentials::new())).unwrap();
        (manager, tmp)
    }

    fn initialized_manager() -> (SecretManager, TempDir) {
        let (manager, tmp) = temp_manager();
        manager.init_database(None, None, false).unwrap();
        (manager, tmp)
    }

    #[test]
    fn test_store_and_read_back_with_note() {
        let (manager, _tmp) = initialized_manager();

        manager
            .set_secret("stripe-key", "sk_live_123", Some("default"), "prod", None)
            .unwrap();

        let secret = manager.get_secret("stripe-key", Some("default")).unwrap();
        assert_eq!(secret.value(), "sk_live_123");
        assert_eq!(secret.note, "prod");

        let items = manager.list_secrets(Some("default")).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "stripe-key");

        manager.delete_secret("stripe-key", Some("default")).unwrap();
        assert!(matches!(
            manager.get_secret("stripe-key", Some("default")),
            Err(SecretsError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn test_round_trip_keeps_metadata() {
        let (manager, _tmp) = initialized_manager();
        let expires_at = Utc::now() + Duration::days(30);

        manager
            .set_secret("token", "  spaced value\n", None, "ci token", Some(expires_at))
            .unwrap();

        let secret = manager.get_secret("token", None).unwrap();
        assert_eq!(secret.value(), "  spaced value\n");
        assert_eq!(secret.note, "ci token");
        assert_eq!(secret.expires_at, Some(expires_at));
        assert!(!secret.is_expired());
    }

    #[test]
    fn test_created_at_is_preserved() {
        let (manager, _tmp) = initialized_manager();

        let first = manager.set_secret("k", "v1", None, "", None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = manager.set_secret("k", "v2", None, "", None).unwrap();

        let stored = manager.get_secret("k", None).unwrap();
        assert_eq!(stored.created_at, first.created_at);
        assert_eq!(stored.updated_at, second.updated_at);
        assert!(stored.updated_at > first.updated_at);
        assert_eq!(stored.value(), "v2");
    }

    #[test]
    fn test_databases_are_isolated() {
        let (manager, _tmp) = temp_manager();
        manager.init_database(Some("x"), None, false).unwrap();
        manager.init_database(Some("y"), None, false).unwrap();

        manager.set_secret("k", "a", Some("x"), "", None).unwrap();
        manager.set_secret("k", "b", Some("y"), "", None).unwrap();

        assert_eq!(manager.get_secret("k", Some("x")).unwrap().value(), "a");
        assert_eq!(manager.get_secret("k", Some("y")).unwrap().value(), "b");
    }

    #[test]
    fn test_missing_key() {
        let (manager, _tmp) = temp_manager();
        assert!(matches!(
            manager.get_secret("k", Some("never")),
            Err(SecretsError::KeyNotFound { .. })
        ));
        assert!(matches!(
            manager.set_secret("k", "v", Some("never"), "", None),
            Err(SecretsError::KeyNotFound { .. })
        ));
        // A failed write must not leave a database behind
        assert!(manager.list_databases().unwrap().is_empty());
    }

    #[test]
    fn test_unavailable_keyring_leaves_prior_record() {
        use crate::keystore::LockableCredentials;
        use std::sync::atomic::Ordering;

        let tmp = TempDir::new().unwrap();
        let config = SecretsConfig::with_storage_dir(tmp.path().join("secrets"));
        let credentials = LockableCredentials::default();
        let locked = credentials.lock_handle();
        let manager = SecretManager::with_credentials(&config, Box::new(credentials)).unwrap();

        manager.init_database(None, None, false).unwrap();
        manager.set_secret("k", "v1", None, "", None).unwrap();
        let before = manager.store.get("default", "k").unwrap();

        locked.store(true, Ordering::SeqCst);
        assert!(matches!(
            manager.set_secret("k", "v2", None, "", None),
            Err(SecretsError::KeyringUnavailable { .. })
        ));
        assert!(!manager.has_key(None));
        assert!(matches!(
            manager.key_exists(None),
            Err(SecretsError::KeyringUnavailable { .. })
        ));
        assert_eq!(manager.store.get("default", "k").unwrap(), before);

        locked.store(false, Ordering::SeqCst);
        assert_eq!(manager.get_secret("k", None).unwrap().value(), "v1");
    }

    #[test]
    fn test_missing_record() {
        let (manager, _tmp) = initialized_manager();
        manager.set_secret("other", "v", None, "", None).unwrap();

        assert!(matches!(
            manager.get_secret("absent", None),
            Err(SecretsError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn test_initialized_database_without_writes() {
        let (manager, _tmp) = initialized_manager();

        // The key exists but nothing has been stored yet, so there is no directory
        assert!(matches!(
            manager.get_secret("absent", None),
            Err(SecretsError::DatabaseNotFound { .. })
        ));
        manager.delete_secret("absent", None).unwrap();
    }

    #[test]
    fn test_expired_secret_is_still_readable() {
        let (manager, _tmp) = initialized_manager();
        let past = Utc::now() - Duration::days(1);

        manager.set_secret("old", "v", None, "", Some(past)).unwrap();

        let secret = manager.get_secret("old", None).unwrap();
        assert_eq!(secret.value(), "v");
        assert!(secret.is_expired());

        let items = manager.list_secrets(None).unwrap();
        assert!(items[0].expired);
    }

    #[test]
    fn test_listing_skips_corrupt_records() {
        let (manager, _tmp) = initialized_manager();
        for i in 0..3 {
            manager
                .set_secret(&format!("secret-{}", i), "v", None, "", None)
                .unwrap();
        }
        manager.store.set("default", "broken", b"garbage").unwrap();

        let items = manager.list_secrets(None).unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|item| item.name != "broken"));
    }

    #[test]
    fn test_listing_skips_undecodable_plaintext() {
        let (manager, _tmp) = initialized_manager();
        manager.set_secret("good", "v", None, "", None).unwrap();

        let bogus = manager.encryptor.encrypt(b"not json", "default").unwrap();
        manager.store.set("default", "bogus", &bogus).unwrap();

        assert!(matches!(
            manager.get_secret("bogus", None),
            Err(SecretsError::Serialization { .. })
        ));
        assert_eq!(manager.list_secrets(None).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_record_can_be_overwritten() {
        let (manager, _tmp) = initialized_manager();
        manager.store.set("default", "k", b"garbage").unwrap();

        manager.set_secret("k", "fresh", None, "", None).unwrap();
        assert_eq!(manager.get_secret("k", None).unwrap().value(), "fresh");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (manager, _tmp) = initialized_manager();
        manager.set_secret("k", "v", None, "", None).unwrap();

        manager.delete_secret("k", None).unwrap();
        manager.delete_secret("k", None).unwrap();
        manager.delete_secret("never-existed", None).unwrap();

        assert!(matches!(
            manager.get_secret("k", None),
            Err(SecretsError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_database() {
        let (manager, _tmp) = temp_manager();
        manager.init_database(Some("work"), None, false).unwrap();
        manager.set_secret("k", "v", Some("work"), "", None).unwrap();
        assert_eq!(manager.list_databases().unwrap(), vec!["work"]);

        manager.delete_database("work").unwrap();

        assert!(manager.list_databases().unwrap().is_empty());
        assert!(matches!(
            manager.get_secret("k", Some("work")),
            Err(SecretsError::DatabaseNotFound { .. })
        ));
        // The key outlives the data
        assert!(manager.has_key(Some("work")));
    }

    #[test]
    fn test_reinit_is_refused() {
        let (manager, _tmp) = initialized_manager();
        let recipient = manager.public_key(None).unwrap();
        manager.set_secret("k", "v", None, "", None).unwrap();

        assert!(matches!(
            manager.init_database(None, None, false),
            Err(SecretsError::KeyAlreadyExists { .. })
        ));

        assert_eq!(manager.public_key(None).unwrap(), recipient);
        assert_eq!(manager.get_secret("k", None).unwrap().value(), "v");
    }

    #[test]
    fn test_forced_reinit_orphans_secrets() {
        let (manager, _tmp) = initialized_manager();
        manager.set_secret("k", "v", None, "", None).unwrap();

        manager.init_database(None, None, true).unwrap();

        assert!(matches!(
            manager.get_secret("k", None),
            Err(SecretsError::Decryption { .. })
        ));
        assert!(manager.list_secrets(None).unwrap().is_empty());
    }

    #[test]
    fn test_purge_key() {
        let (manager, _tmp) = initialized_manager();
        manager.set_secret("k", "v", None, "", None).unwrap();

        assert!(manager.purge_key("default").unwrap());
        assert!(!manager.has_key(None));
        assert!(matches!(
            manager.get_secret("k", None),
            Err(SecretsError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_auto_init() {
        let tmp = TempDir::new().unwrap();
        let config = SecretsConfig {
            auto_init: true,
            ..SecretsConfig::with_storage_dir(tmp.path().join("secrets"))
        };
        let manager =
            SecretManager::with_credentials(&config, Box::new(MemoryCredentials::new())).unwrap();

        assert!(!manager.has_key(None));
        manager.set_secret("k", "v", None, "", None).unwrap();
        assert!(manager.has_key(None));
        assert_eq!(manager.get_secret("k", None).unwrap().value(), "v");
    }

    #[test]
    fn test_default_database_from_config() {
        let tmp = TempDir::new().unwrap();
        let config = SecretsConfig {
            default_database: "work".to_string(),
            ..SecretsConfig::with_storage_dir(tmp.path().join("secrets"))
        };
        let manager =
            SecretManager::with_credentials(&config, Box::new(MemoryCredentials::new())).unwrap();

        manager.init_database(None, None, false).unwrap();
        manager.set_secret("k", "v", None, "", None).unwrap();

        assert_eq!(manager.default_database(), "work");
        assert_eq!(manager.list_databases().unwrap(), vec!["work"]);
        assert_eq!(manager.get_secret("k", Some("work")).unwrap().value(), "v");
    }

    #[test]
    fn test_missing_storage_dir_is_configuration_error() {
        let config = SecretsConfig::default();
        let result = SecretManager::with_credentials(&config, Box::new(MemoryCredentials::new()));
        assert!(matches!(result, Err(SecretsError::Configuration(_))));
    }

    #[test]
    fn test_ciphertext_on_disk_hides_value() {
        let (manager, _tmp) = initialized_manager();
        manager
            .set_secret("stripe-key", "sk_live_123", None, "prod", None)
            .unwrap();

        let raw = manager.store.get("default", "stripe-key").unwrap();
        assert!(!raw.windows(11).any(|w| w == b"sk_live_123"));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let (manager, _tmp) = initialized_manager();
        assert!(matches!(
            manager.set_secret("", "v", None, "", None),
            Err(SecretsError::InvalidName { .. })
        ));
    }
}
