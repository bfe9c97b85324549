//! Preference-backed configuration for the source.
//!
//! Preferences live in a TOML file under the platform config directory
//! and are shared between the source, its HTTP client and its cookie
//! store through [`SourceConfig`].

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

/// Application name used for config directory.
const APP_NAME: &str = "SussyToons";

/// Default preferences filename.
const PREFERENCES_FILENAME: &str = "preferences.toml";

/// Site origin used when no override is set.
pub const DEFAULT_BASE_URL: &str = "https://www.sussytoons.wtf";

/// API origin used when no override is set.
pub const DEFAULT_API_URL: &str = "https://api.sussytoons.wtf";

/// Everything the source persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// User override for the site origin.
    pub override_base_url: Option<String>,

    /// User override for the API origin.
    pub override_api_url: Option<String>,

    /// Clear the URL overrides the next time the source starts.
    pub restore_defaults: bool,

    /// HTTP behaviour.
    pub scraping: ScrapingConfig,

    /// Serialized cookie jars keyed by source instance.
    pub cookies: BTreeMap<String, String>,
}

/// HTTP client and retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Request timeout in seconds.
    pub timeout_sec: u64,

    /// Delay before the single blind retry, in seconds.
    pub retry_delay_sec: f64,

    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            timeout_sec: 30,
            retry_delay_sec: 2.0,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}

/// Thread-safe preference store, optionally backed by a file.
#[derive(Debug)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
    state: RwLock<Preferences>,
}

impl PreferenceStore {
    /// Returns the platform-specific preferences directory.
    pub fn preferences_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the preferences file.
    pub fn preferences_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::preferences_dir()?.join(PREFERENCES_FILENAME))
    }

    /// Loads preferences from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::preferences_path()?;
        Self::load_from(&path)
    }

    /// Loads preferences from a specific path.
    ///
    /// If the file doesn't exist, a default one is written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let prefs = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            let prefs = Preferences::default();
            write_preferences(path, &prefs)?;
            prefs
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            state: RwLock::new(prefs),
        })
    }

    /// Creates a store that never touches the filesystem.
    pub fn in_memory(prefs: Preferences) -> Self {
        Self {
            path: None,
            state: RwLock::new(prefs),
        }
    }

    /// Returns a copy of the current preferences.
    pub fn snapshot(&self) -> Preferences {
        self.read(Preferences::clone)
    }

    /// Runs `f` against the current preferences.
    pub fn read<R>(&self, f: impl FnOnce(&Preferences) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Mutates the preferences and persists the result.
    pub fn update<R>(&self, f: impl FnOnce(&mut Preferences) -> R) -> Result<R, ConfigError> {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut guard);
        if let Some(path) = &self.path {
            write_preferences(path, &guard)?;
        }
        Ok(result)
    }
}

fn write_preferences(path: &Path, prefs: &Preferences) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content =
        toml::to_string_pretty(prefs).map_err(|e| ConfigError::WriteError(e.to_string()))?;

    std::fs::write(path, content)?;
    Ok(())
}

/// Configuration context handed to the source and its collaborators.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    store: Arc<PreferenceStore>,
    ci: bool,
}

impl SourceConfig {
    /// Wraps a preference store. Reads `CI` from the environment.
    pub fn new(store: Arc<PreferenceStore>) -> Self {
        let ci = std::env::var("CI").is_ok_and(|v| v == "true");
        Self { store, ci }
    }

    /// Overrides the CI detection.
    pub fn with_ci(mut self, ci: bool) -> Self {
        self.ci = ci;
        self
    }

    /// The underlying preference store.
    pub fn store(&self) -> &Arc<PreferenceStore> {
        &self.store
    }

    /// Effective site origin. Overrides are ignored under CI.
    pub fn base_url(&self) -> String {
        if self.ci {
            return DEFAULT_BASE_URL.to_string();
        }
        self.store
            .read(|p| p.override_base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// Effective API origin.
    pub fn api_url(&self) -> String {
        self.store
            .read(|p| p.override_api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Sets the site origin override. An empty value removes it.
    pub fn set_base_url(&self, value: &str) -> Result<(), ConfigError> {
        let value = normalize_override("override_base_url", value)?;
        self.store.update(|p| p.override_base_url = value)
    }

    /// Sets the API origin override. An empty value removes it.
    pub fn set_api_url(&self, value: &str) -> Result<(), ConfigError> {
        let value = normalize_override("override_api_url", value)?;
        self.store.update(|p| p.override_api_url = value)
    }

    pub fn restore_defaults_enabled(&self) -> bool {
        self.store.read(|p| p.restore_defaults)
    }

    pub fn set_restore_defaults(&self, enabled: bool) -> Result<(), ConfigError> {
        self.store.update(|p| p.restore_defaults = enabled)
    }

    /// Clears the URL overrides if a reset was requested. Returns whether it ran.
    pub fn apply_restore_defaults(&self) -> Result<bool, ConfigError> {
        self.store.update(|p| {
            if !p.restore_defaults {
                return false;
            }
            p.restore_defaults = false;
            p.override_base_url = None;
            p.override_api_url = None;
            true
        })
    }

    /// HTTP behaviour settings.
    pub fn scraping(&self) -> ScrapingConfig {
        self.store.read(|p| p.scraping.clone())
    }
}

/// Validates a URL override and strips trailing slashes.
fn normalize_override(key: &str, value: &str) -> Result<Option<String>, ConfigError> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }

    let parsed = Url::parse(trimmed).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    Ok(Some(trimmed.to_string()))
}
