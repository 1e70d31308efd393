//! Runtime configuration
//!
//! Every field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! [reload]
//! preserve_state = true        # snapshot and restore entities across reloads
//! reclaim_timeout_ms = 50      # how long to wait for the old module to be released
//! debug_symbol_extensions = ["pdb", "debug"]
//!
//! [watch]
//! enabled = false
//! debounce_ms = 500
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Reload behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Snapshot live entities before unloading and restore them afterwards
    pub preserve_state: bool,
    /// Upper bound on the best-effort wait for the old module to be freed
    pub reclaim_timeout_ms: u64,
    /// Companion debug-symbol extensions probed next to a module
    pub debug_symbol_extensions: Vec<String>,
}

impl ReloadConfig {
    pub fn reclaim_timeout(&self) -> Duration {
        Duration::from_millis(self.reclaim_timeout_ms)
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            preserve_state: true,
            reclaim_timeout_ms: 50,
            debug_symbol_extensions: vec!["pdb".to_string(), "debug".to_string()],
        }
    }
}

/// Module file watching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Reload automatically when the module file changes
    pub enabled: bool,
    /// Wait for changes to settle before reloading
    pub debounce_ms: u64,
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: 500,
        }
    }
}

/// Complete runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub reload: ReloadConfig,
    pub watch: WatchConfig,
}

impl RuntimeConfig {
    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded runtime config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScriptError;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.reload.preserve_state);
        assert_eq!(config.reload.reclaim_timeout(), Duration::from_millis(50));
        assert_eq!(config.reload.debug_symbol_extensions, ["pdb", "debug"]);
        assert!(!config.watch.enabled);
        assert_eq!(config.watch.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(RuntimeConfig::from_toml_str("").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [reload]
            preserve_state = false

            [watch]
            enabled = true
            "#,
        )
        .unwrap();

        assert!(!config.reload.preserve_state);
        assert_eq!(config.reload.reclaim_timeout_ms, 50);
        assert!(config.watch.enabled);
        assert_eq!(config.watch.debounce_ms, 500);
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let err = RuntimeConfig::from_toml_str("[watch]\ndebounce_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ScriptError::Config(_)));
    }
}
