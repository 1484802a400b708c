//! RecordStore - one redb file per database
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   <database>/secrets.redb    table `secrets`: name -> ciphertext
//! ```
//!
//! A database exists exactly when its directory does. Every call opens its
//! own handle and drops it before returning, so nothing stays locked between
//! commands. Values are opaque bytes here; nothing in this module decrypts.

use redb::{
    Database, ReadOnlyDatabase, ReadableDatabase, ReadableTable, TableDefinition, TableError,
};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SecretsError};
use crate::secret::validate_database_name;

/// name -> encrypted secret
const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// File inside each database directory
const STORE_FILE: &str = "secrets.redb";

pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    /// Store rooted at `root`. The root itself is created lazily.
    pub fn new(root: &Path) -> Result<Self> {
        if root.as_os_str().is_empty() {
            return Err(SecretsError::Configuration(
                "secrets storage directory is empty".to_string(),
            ));
        }
        if root.exists() && !root.is_dir() {
            return Err(SecretsError::Configuration(format!(
                "secrets storage path {} is not a directory",
                root.display()
            )));
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn database_dir(&self, database: &str) -> Result<PathBuf> {
        validate_database_name(database)?;
        Ok(self.root.join(database))
    }

    /// Whether the database directory exists
    pub fn database_exists(&self, database: &str) -> Result<bool> {
        Ok(self.database_dir(database)?.is_dir())
    }

    /// Open for writing, creating the directory and table on first use
    fn open_write(&self, database: &str) -> Result<Database> {
        let dir = self.database_dir(database)?;
        create_private_dir(&self.root)?;
        create_private_dir(&dir)?;

        let db = Database::create(dir.join(STORE_FILE)).map_err(SecretsError::storage(database))?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write().map_err(SecretsError::storage(database))?;
        {
            let _ = write_txn
                .open_table(SECRETS)
                .map_err(SecretsError::storage(database))?;
        }
        write_txn.commit().map_err(SecretsError::storage(database))?;

        Ok(db)
    }

    /// Open for reading. `None` means the directory exists but holds no store yet.
    fn open_read(&self, database: &str) -> Result<Option<ReadOnlyDatabase>> {
        let dir = self.database_dir(database)?;
        if !dir.is_dir() {
            return Err(SecretsError::DatabaseNotFound {
                database: database.to_string(),
            });
        }

        let path = dir.join(STORE_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let db = ReadOnlyDatabase::open(&path).map_err(SecretsError::storage(database))?;
        Ok(Some(db))
    }

    /// Insert or replace `key` in one committed transaction
    pub fn set(&self, database: &str, key: &str, value: &[u8]) -> Result<()> {
        let db = self.open_write(database)?;

        let write_txn = db.begin_write().map_err(SecretsError::storage(database))?;
        {
            let mut table = write_txn
                .open_table(SECRETS)
                .map_err(SecretsError::storage(database))?;
            table
                .insert(key, value)
                .map_err(SecretsError::storage(database))?;
        }
        write_txn.commit().map_err(SecretsError::storage(database))?;

        tracing::debug!(database, key, bytes = value.len(), "stored record");
        Ok(())
    }

    /// Fetch the raw bytes stored under `key`
    pub fn get(&self, database: &str, key: &str) -> Result<Vec<u8>> {
        let not_found = || SecretsError::RecordNotFound {
            database: database.to_string(),
            name: key.to_string(),
        };

        let db = self.open_read(database)?.ok_or_else(not_found)?;
        let read_txn = db.begin_read().map_err(SecretsError::storage(database))?;
        let table = match read_txn.open_table(SECRETS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Err(not_found()),
            Err(e) => return Err(SecretsError::storage(database)(e)),
        };

        let value = table
            .get(key)
            .map_err(SecretsError::storage(database))?
            .ok_or_else(not_found)?;

        Ok(value.value().to_vec())
    }

    /// All keys in the database, in byte order
    pub fn list(&self, database: &str) -> Result<Vec<String>> {
        let db = match self.open_read(database)? {
            Some(db) => db,
            None => return Ok(vec![]),
        };

        let read_txn = db.begin_read().map_err(SecretsError::storage(database))?;
        let table = match read_txn.open_table(SECRETS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(vec![]),
            Err(e) => return Err(SecretsError::storage(database)(e)),
        };

        let mut keys = vec![];
        for entry in table.iter().map_err(SecretsError::storage(database))? {
            let (key, _) = entry.map_err(SecretsError::storage(database))?;
            keys.push(key.value().to_string());
        }

        Ok(keys)
    }

    /// Remove `key`. Missing keys and missing databases are not errors.
    pub fn delete(&self, database: &str, key: &str) -> Result<()> {
        if !self.database_exists(database)? {
            tracing::debug!(database, key, "delete on missing database");
            return Ok(());
        }

        let db = self.open_write(database)?;
        let write_txn = db.begin_write().map_err(SecretsError::storage(database))?;
        let removed = {
            let mut table = write_txn
                .open_table(SECRETS)
                .map_err(SecretsError::storage(database))?;
            let removed = table
                .remove(key)
                .map_err(SecretsError::storage(database))?;
            removed.is_some()
        };
        write_txn.commit().map_err(SecretsError::storage(database))?;

        tracing::debug!(database, key, removed, "deleted record");
        Ok(())
    }

    /// Names of all databases (non-hidden subdirectories of the root)
    pub fn list_databases(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(SecretsError::io(&self.root)(e)),
        };

        let mut databases = vec![];
        for entry in entries {
            let entry = entry.map_err(SecretsError::io(&self.root))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.path().is_dir() && !name.starts_with('.') {
                databases.push(name);
            }
        }

        databases.sort();
        Ok(databases)
    }

    /// Remove the database directory and everything in it
    ///
    /// The database's key is left in the keyring.
    pub fn delete_database(&self, database: &str) -> Result<()> {
        let dir = self.database_dir(database)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(database, "deleted database directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SecretsError::io(dir)(e)),
        }
    }
}

/// Create a directory readable only by the owner
fn create_private_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(SecretsError::io(dir))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(SecretsError::io(dir))?;
    }

    Ok(())
}
