//! Tool configuration.
//!
//! Handles loading, validating, and merging `linkbio.toml`. User values are
//! laid over stock defaults key by key, so a config file only needs the keys
//! it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [storage]
//! data_dir = "data"             # Root of drafts, themes, and published pages
//!
//! [pages]
//! default_locale = "en"         # Locale of pages created with `linkbio new`
//! default_mode = "light"        # Color mode of new pages
//!
//! [themes]
//! default_preset = "theme_a"    # Preset key assigned to new pages
//! custom_policy = "one_per_user" # or "content_hash"
//!
//! [publish]
//! workers = 4                   # Parallel publish workers (omit for auto)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::theme::CustomThemePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "linkbio.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Tool configuration loaded from `linkbio.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub pages: PagesConfig,
    pub themes: ThemesConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Data directory, relative to the working directory.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Defaults for newly created pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PagesConfig {
    pub default_locale: String,
    pub default_mode: String,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            default_locale: "en".to_string(),
            default_mode: "light".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThemesConfig {
    pub default_preset: String,
    /// How saving a custom theme dedupes existing rows.
    pub custom_policy: CustomThemePolicy,
}

impl Default for ThemesConfig {
    fn default() -> Self {
        Self {
            default_preset: "theme_a".to_string(),
            custom_policy: CustomThemePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    /// Maximum parallel publish workers. When absent, defaults to the number
    /// of CPU cores. Larger values are clamped down.
    pub workers: Option<usize>,
}

/// Resolve the effective worker count.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)`
pub fn effective_workers(config: &PublishConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.workers.map(|n| n.min(cores)).unwrap_or(cores)
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "storage.data_dir must not be empty".into(),
            ));
        }
        if self.pages.default_locale.trim().is_empty() {
            return Err(ConfigError::Validation(
                "pages.default_locale must not be empty".into(),
            ));
        }
        if !matches!(self.pages.default_mode.as_str(), "light" | "dark") {
            return Err(ConfigError::Validation(format!(
                "pages.default_mode must be \"light\" or \"dark\", got \"{}\"",
                self.pages.default_mode
            )));
        }
        if self.themes.default_preset.is_empty() {
            return Err(ConfigError::Validation(
                "themes.default_preset must not be empty".into(),
            ));
        }
        if self.publish.workers == Some(0) {
            return Err(ConfigError::Validation(
                "publish.workers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// The stock defaults as a TOML table, the base layer for user overrides.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(AppConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` if it doesn't exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&content)?))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults when the file
/// doesn't exist.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    resolve_config(stock_defaults_value()?, load_raw_config(path)?)
}

/// A fully commented stock `linkbio.toml`. Used by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# linkbio configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# Root of the data directory:
#   drafts/<page_id>.json, themes/presets/<key>.json,
#   themes/custom/<id>.json, published/<page_id>.json
data_dir = "data"

# ---------------------------------------------------------------------------
# New pages
# ---------------------------------------------------------------------------
[pages]
# Locale assigned to pages created with `linkbio new`.
default_locale = "en"

# Color mode of new pages: "light" or "dark".
default_mode = "light"

# ---------------------------------------------------------------------------
# Themes
# ---------------------------------------------------------------------------
[themes]
# Preset key assigned to new pages.
default_preset = "theme_a"

# How saving a custom theme treats the owner's existing themes:
#   "one_per_user"  - one custom theme per owner, updated in place
#   "content_hash"  - identical (preset, patch) saves reuse the existing theme
custom_policy = "one_per_user"

# ---------------------------------------------------------------------------
# Publishing
# ---------------------------------------------------------------------------
[publish]
# Maximum parallel workers for `publish --all`.
# Omit or comment out to auto-detect (= number of CPU cores).
# workers = 4
"##
}
