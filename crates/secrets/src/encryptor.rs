//! Encryptor - age encryption keyed per database
//!
//! Ciphertext is plain binary age (X25519 + ChaCha20-Poly1305). It carries its
//! own header, file key stanza and nonce, so decrypting needs nothing but the
//! database's identity.

use std::io::{Read, Write};

use crate::error::{Result, SecretsError};
use crate::keystore::KeyStore;

pub struct Encryptor {
    keys: KeyStore,
}

impl Encryptor {
    pub fn new(keys: KeyStore) -> Self {
        Self { keys }
    }

    /// The key store identities are resolved from
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Resolve the identity for `database` (fails with `KeyNotFound`)
    pub fn identity(&self, database: &str) -> Result<age::x25519::Identity> {
        self.keys.get_identity(database)
    }

    /// Encrypt `plaintext` to the recipient of `database`
    pub fn encrypt(&self, plaintext: &[u8], database: &str) -> Result<Vec<u8>> {
        let identity = self.identity(database)?;
        let recipient = identity.to_public();

        let encryption_error = |reason: String| SecretsError::Encryption {
            database: database.to_string(),
            reason,
        };

        let encryptor = age::Encryptor::with_recipients(vec![Box::new(recipient)])
            .ok_or_else(|| encryption_error("no recipients".to_string()))?;

        let mut encrypted = vec![];
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| encryption_error(e.to_string()))?;

        writer
            .write_all(plaintext)
            .map_err(|e| encryption_error(e.to_string()))?;

        writer
            .finish()
            .map_err(|e| encryption_error(e.to_string()))?;

        Ok(encrypted)
    }

    /// Decrypt ciphertext produced by `encrypt` for the same database
    pub fn decrypt(&self, ciphertext: &[u8], database: &str) -> Result<Vec<u8>> {
        let identity = self.identity(database)?;
        Self::decrypt_with(&identity, ciphertext, database)
    }

    /// Decrypt with an identity the caller already resolved
    pub fn decrypt_with(
        identity: &age::x25519::Identity,
        ciphertext: &[u8],
        database: &str,
    ) -> Result<Vec<u8>> {
        let decryption_error = |reason: String| SecretsError::Decryption {
            database: database.to_string(),
            reason,
        };

        let decryptor = match age::Decryptor::new(ciphertext)
            .map_err(|e| decryption_error(e.to_string()))?
        {
            age::Decryptor::Recipients(d) => d,
            _ => return Err(decryption_error("unexpected passphrase encryption".to_string())),
        };

        let mut reader = decryptor
            .decrypt(std::iter::once(identity as &dyn age::Identity))
            .map_err(|e| decryption_error(e.to_string()))?;

        let mut decrypted = vec![];
        reader
            .read_to_end(&mut decrypted)
            .map_err(|e| decryption_error(e.to_string()))?;

        Ok(decrypted)
    }
}
