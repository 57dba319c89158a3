//! Runtime configuration
//!
//! Sources, lowest priority first: built-in defaults, a TOML file, then
//! `PLUME_*` environment variables.

use crate::error::{Result, ScriptError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hot-reload watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotReloadConfig {
    /// Watch the loaded module and reload it on change
    pub enabled: bool,
    /// Wait this long for file changes to settle
    pub debounce_ms: u64,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: 500,
        }
    }
}

impl HotReloadConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Script runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Host base directory, searched last for module dependencies
    pub base_dir: PathBuf,
    /// Dependency names always bound to the host's own copy
    pub shared_core_modules: Vec<String>,
    /// Liveness checks after an unload before giving up
    pub reclaim_passes: u32,
    /// Delay between liveness checks
    pub reclaim_interval_ms: u64,
    /// Suffix of the dependency manifest next to a module
    pub manifest_suffix: String,
    pub hot_reload: HotReloadConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            shared_core_modules: vec![plume_core::SHARED_CORE_MODULE.to_string()],
            reclaim_passes: 3,
            reclaim_interval_ms: 10,
            manifest_suffix: ".deps.json".to_string(),
            hot_reload: HotReloadConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| ScriptError::ConfigError(e.to_string()))
    }

    /// Read a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ScriptError::ConfigError(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&source)?;
        log::info!("Loaded runtime config from {}", path.display());
        Ok(config)
    }

    /// Defaults, then the optional file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply `PLUME_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("PLUME_BASE_DIR") {
            self.base_dir = PathBuf::from(dir);
        }

        if let Some(passes) = lookup("PLUME_RECLAIM_PASSES") {
            match passes.trim().parse() {
                Ok(passes) => self.reclaim_passes = passes,
                Err(_) => log::warn!("Ignoring invalid PLUME_RECLAIM_PASSES '{}'", passes),
            }
        }

        if let Some(flag) = lookup("PLUME_HOT_RELOAD") {
            self.hot_reload.enabled = matches!(flag.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_millis(self.reclaim_interval_ms)
    }

    /// Whether a dependency name refers to the shared core
    pub fn is_shared_core(&self, name: &str) -> bool {
        self.shared_core_modules
            .iter()
            .any(|core| core.eq_ignore_ascii_case(name))
    }
}
