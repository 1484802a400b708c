//! Error taxonomy for the secrets engine
//!
//! Every variant names the database (and secret, where there is one) so the
//! CLI can print an actionable message without extra context.

use std::path::PathBuf;
use thiserror::Error;

/// Secrets engine errors
#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("Invalid secrets configuration: {0}")]
    Configuration(String),

    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("Encryption key not found for database '{database}' - run 'indietool-secrets init' first")]
    KeyNotFound { database: String },

    #[error("An encryption key already exists for database '{database}' - replacing it would make every stored secret unreadable")]
    KeyAlreadyExists { database: String },

    #[error("Invalid key material for database '{database}': {reason}")]
    KeyParse { database: String, reason: String },

    #[error("OS keyring unavailable for database '{database}': {reason}")]
    KeyringUnavailable { database: String, reason: String },

    #[error("Keyring error for database '{database}': {reason}")]
    Keyring { database: String, reason: String },

    #[error("Secrets database '{database}' not found")]
    DatabaseNotFound { database: String },

    #[error("Secret '{name}' not found in database '{database}'")]
    RecordNotFound { database: String, name: String },

    #[error("Failed to encrypt for database '{database}': {reason}")]
    Encryption { database: String, reason: String },

    #[error("Failed to decrypt data in database '{database}': {reason}")]
    Decryption { database: String, reason: String },

    #[error("Corrupt secret '{name}' in database '{database}': {source}")]
    Serialization {
        database: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage error in database '{database}': {source}")]
    Storage {
        database: String,
        #[source]
        source: redb::Error,
    },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SecretsError {
    /// Wrap any redb error with the database it happened in
    pub(crate) fn storage<E: Into<redb::Error>>(database: &str) -> impl FnOnce(E) -> Self + '_ {
        move |err| SecretsError::Storage {
            database: database.to_string(),
            source: err.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| SecretsError::Io { path, source }
    }

    /// True for the "nothing stored under this name yet" family of errors
    pub fn is_missing_record(&self) -> bool {
        matches!(
            self,
            SecretsError::RecordNotFound { .. } | SecretsError::DatabaseNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SecretsError>;
