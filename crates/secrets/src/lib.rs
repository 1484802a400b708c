//! indietool-secrets - Encrypted local secrets vault for indietool
//!
//! "One key per database, never on disk."
//!
//! Secrets are grouped into databases. Each database gets its own age
//! identity (X25519 + ChaCha20-Poly1305) kept in the OS keyring, and its
//! own redb file under the storage root. Only ciphertext ever touches disk.

pub mod encryptor;
pub mod error;
pub mod keystore;
pub mod manager;
pub mod secret;
pub mod storage;

pub use encryptor::Encryptor;
pub use error::{Result, SecretsError};
pub use keystore::{CredentialStore, KeyStore, KeyringCredentials, MemoryCredentials};
pub use manager::SecretManager;
pub use secret::{Identifier, Secret, SecretListItem};
pub use storage::RecordStore;
