//! Standard paths used by indietool

use std::path::PathBuf;

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "INDIETOOL_CONFIG";

/// Standard indietool paths
pub struct Paths {
    /// Config directory (~/.config/indietool)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        // indietool keeps everything under ~/.config on every platform
        let config = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(".config")
            .join("indietool");

        Self { config }
    }

    /// Paths rooted somewhere other than the home directory
    pub fn with_config_dir(config: impl Into<PathBuf>) -> Self {
        Self {
            config: config.into(),
        }
    }

    /// Path of the main config file, honoring `INDIETOOL_CONFIG`
    pub fn config_file(&self) -> PathBuf {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => self.config.join("indietool.yaml"),
        }
    }

    /// Default root for secrets databases
    pub fn secrets(&self) -> PathBuf {
        self.config.join("secrets")
    }
}
