//! Configuration management for indietool
//!
//! Configuration file:
//! - ~/.config/indietool/indietool.yaml (or `$INDIETOOL_CONFIG`)
//!
//! Only the `secrets` section is interpreted here. Other sections written by
//! the domain and DNS commands are preserved verbatim on save.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::paths::Paths;

/// Database used when an identifier carries no `@database` part
pub const DEFAULT_SECRET_DATABASE: &str = "default";

/// Seconds a copied secret stays on the clipboard
pub const DEFAULT_CLIPBOARD_TTL: u64 = 30;

/// Global indietool configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Secrets vault settings
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Sections owned by other commands (domains, providers, ...)
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,

    /// Where this config was loaded from
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

/// Settings for the encrypted secrets vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Database used when none is given
    #[serde(default = "default_database")]
    pub default_database: String,

    /// Root directory holding one subdirectory per database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,

    /// Clipboard lifetime for copied values. Nothing copies to the clipboard
    /// yet; the setting is kept so existing files load and save unchanged.
    #[serde(default = "default_clipboard_ttl", rename = "clipboard_ttl_seconds")]
    pub clipboard_ttl: u64,

    /// Mask values in `get` output unless explicitly shown
    #[serde(default = "default_true", rename = "output_masked")]
    pub mask_output: bool,

    /// Generate a key on first write to a database that has none
    #[serde(default)]
    pub auto_init: bool,
}

fn default_database() -> String {
    DEFAULT_SECRET_DATABASE.to_string()
}

fn default_clipboard_ttl() -> u64 {
    DEFAULT_CLIPBOARD_TTL
}

fn default_true() -> bool {
    true
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            default_database: default_database(),
            storage_dir: None,
            clipboard_ttl: default_clipboard_ttl(),
            mask_output: true,
            auto_init: false,
        }
    }
}

impl SecretsConfig {
    /// Defaults with an explicit storage root
    pub fn with_storage_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// The default database name, falling back when the configured one is blank
    pub fn default_database(&self) -> &str {
        let name = self.default_database.trim();
        if name.is_empty() {
            DEFAULT_SECRET_DATABASE
        } else {
            name
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let paths = Paths::new();
        Self::load_from(&paths.config_file())
    }

    /// Load configuration from a specific path
    ///
    /// A missing file yields defaults; the path is still remembered so that
    /// relative settings resolve next to it.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            if content.trim().is_empty() {
                Self::default()
            } else {
                serde_yaml::from_str::<Self>(&content)
                    .with_context(|| format!("Failed to parse config from {:?}", path))?
            }
        } else {
            Self::default()
        };

        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save configuration to the path it was loaded from
    pub fn save(&self) -> Result<()> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => Paths::new().config_file(),
        };
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;
        Ok(())
    }

    /// Directory the config file lives in
    pub fn config_dir(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Paths::new().config)
    }

    /// Secrets settings with every default filled in
    ///
    /// `storage_dir` defaults to `<config dir>/secrets`; `~` is expanded and
    /// relative paths are taken relative to the config directory.
    pub fn secrets(&self) -> SecretsConfig {
        let config_dir = self.config_dir();
        let mut secrets = self.secrets.clone();

        secrets.default_database = secrets.default_database().to_string();
        if secrets.clipboard_ttl == 0 {
            secrets.clipboard_ttl = DEFAULT_CLIPBOARD_TTL;
        }

        let storage_dir = match secrets.storage_dir.take() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                let expanded = PathBuf::from(shellexpand::tilde(&dir.to_string_lossy()).as_ref());
                if expanded.is_absolute() {
                    expanded
                } else {
                    config_dir.join(expanded)
                }
            }
            _ => Paths::with_config_dir(&config_dir).secrets(),
        };
        secrets.storage_dir = Some(storage_dir);

        secrets
    }
}
