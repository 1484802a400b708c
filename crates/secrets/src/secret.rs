//! Secret records and identifiers
//!
//! SECURITY: `Secret::value` is private and never shows up in Debug output.
//! Listings use `SecretListItem`, which has no value at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SecretsError};

/// A stored secret with its metadata
///
/// This is the exact structure that gets serialized and encrypted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Secret {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        note: impl Into<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            note: note.into(),
            created_at,
            updated_at,
            expires_at,
        }
    }

    /// The plaintext value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Consume the record, keeping only the plaintext value
    pub fn into_value(self) -> String {
        self.value
    }

    /// Expiry is advisory: an expired secret is still returned by reads
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if now > expires_at)
    }

    /// Listing view without the value
    pub fn to_list_item(&self) -> SecretListItem {
        SecretListItem {
            name: self.name.clone(),
            note: self.note.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
            expired: self.is_expired(),
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("note", &self.note)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A secret as shown in listings. Never carries the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretListItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
}

/// `name[@database]` as typed on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub name: String,
    /// None when the identifier had no (or an empty) `@database` part
    pub database: Option<String>,
}

impl Identifier {
    /// Split on the first `@`
    pub fn parse(identifier: &str) -> Self {
        match identifier.split_once('@') {
            Some((name, database)) => Self {
                name: name.to_string(),
                database: Some(database.to_string()).filter(|db| !db.is_empty()),
            },
            None => Self {
                name: identifier.to_string(),
                database: None,
            },
        }
    }

    /// The explicit database, or the given default
    pub fn database_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.database.as_deref().unwrap_or(default)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(database) => write!(f, "{}@{}", self.name, database),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Database names double as directory names and keyring accounts
pub(crate) fn validate_database_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| SecretsError::InvalidName {
        kind: "database",
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.starts_with('.') {
        return Err(invalid("name cannot start with '.'"));
    }
    if name.contains("..") {
        return Err(invalid("name cannot contain '..'"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_' && *c != '.')
    {
        return Err(invalid(&format!("invalid character '{}'", c)));
    }

    Ok(())
}

pub(crate) fn validate_secret_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SecretsError::InvalidName {
            kind: "secret",
            name: name.to_string(),
            reason: "name cannot be empty".to_string(),
        });
    }
    Ok(())
}
