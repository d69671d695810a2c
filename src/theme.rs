//! Theme presets, custom themes, and the deep merge that combines them.
//!
//! A page is styled by either a system preset or a user's custom theme. A
//! custom theme never copies the preset: it stores a sparse JSON patch, and
//! the effective configuration is the patch deep-merged onto the preset.
//!
//! ```text
//! preset.config                 patch                      effective
//! { "page": {                   { "page": {                { "page": {
//!     "layout": {...},              "defaults": {              "layout": {...},
//!     "defaults": {                   "linkGroup": {           "defaults": {
//!       "linkGroup": {                  "radius": 24             "linkGroup": {
//!         "radius": 16,               } } } }                      "radius": 24,
//!         "fontSize": "M"                                          "fontSize": "M"
//! } } } }                                                      } } } }
//! ```
//!
//! ## Merge Rules
//!
//! - Keys only in the base are kept; keys only in the patch are added.
//! - Two objects under the same key merge recursively.
//! - Anything else (arrays, scalars, type mismatches) is replaced by the
//!   patch value. Arrays are never merged element-wise.
//!
//! ## Content Hash
//!
//! Custom themes carry a SHA-256 of `(preset_id, patch)`. The patch is
//! serialized with object keys sorted, so two patches that differ only in
//! key order hash the same. Storage uses the hash to find identical saves.

use crate::types::JsonMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThemeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} must be a JSON object")]
    NotAnObject(String),
}

/// Pricing tier of a preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Pro,
}

/// Whether a preset is listed to every user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// A curated, immutable theme configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemePreset {
    pub id: i64,
    /// Stable lookup key referenced by pages (e.g. `theme_a`).
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub visibility: Visibility,
    pub config: JsonMap,
}

/// A user-owned derivation of one preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeCustom {
    pub id: i64,
    pub owner_id: i64,
    pub based_on_preset_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub patch: JsonMap,
    pub hash: String,
    /// Cached `merge(preset.config, patch)`. May be absent on rows written
    /// by older tooling; readers fall back to merging on the fly.
    #[serde(default)]
    pub compiled_config: Option<JsonMap>,
}

impl ThemeCustom {
    /// Derive a new custom theme from `preset`. The id is assigned by storage.
    pub fn derive(owner_id: i64, preset: &ThemePreset, patch: JsonMap) -> Self {
        let mut custom = ThemeCustom {
            id: 0,
            owner_id,
            based_on_preset_id: preset.id,
            name: None,
            patch: JsonMap::new(),
            hash: String::new(),
            compiled_config: None,
        };
        custom.update_patch(preset, patch);
        custom
    }

    /// Replace the patch (and possibly the base preset), recomputing the hash
    /// and the cached compiled configuration.
    pub fn update_patch(&mut self, preset: &ThemePreset, patch: JsonMap) {
        self.based_on_preset_id = preset.id;
        self.hash = content_hash(preset.id, &patch);
        self.compiled_config = Some(merge(&preset.config, &patch));
        self.patch = patch;
    }
}

/// How saving a custom theme treats existing rows for the same owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomThemePolicy {
    /// Identical `(preset, patch)` saves return the existing row; different
    /// content creates a new row.
    ContentHash,
    /// Each owner has at most one custom theme, updated in place.
    #[default]
    OnePerUser,
}

/// The theme a page is rendered with.
#[derive(Debug, Clone, Copy)]
pub enum ThemeSource<'a> {
    Preset(&'a ThemePreset),
    /// A custom theme and the preset it was derived from.
    Custom {
        custom: &'a ThemeCustom,
        preset: &'a ThemePreset,
    },
}

impl<'a> ThemeSource<'a> {
    /// The fully merged configuration to render with.
    ///
    /// Custom themes use their cached compiled config when present.
    pub fn effective_config(&self) -> Cow<'a, JsonMap> {
        match *self {
            ThemeSource::Preset(preset) => Cow::Borrowed(&preset.config),
            ThemeSource::Custom { custom, preset } => match &custom.compiled_config {
                Some(compiled) => Cow::Borrowed(compiled),
                None => Cow::Owned(merge(&preset.config, &custom.patch)),
            },
        }
    }

    /// Key of the underlying preset.
    pub fn preset_key(&self) -> &'a str {
        match *self {
            ThemeSource::Preset(preset) => &preset.key,
            ThemeSource::Custom { preset, .. } => &preset.key,
        }
    }
}

/// Deep-merge `patch` onto `base`, returning a new object.
pub fn merge(base: &JsonMap, patch: &JsonMap) -> JsonMap {
    let mut out = base.clone();
    for (key, patch_val) in patch {
        match out.get_mut(key) {
            // Merged in place so the base key keeps its position.
            Some(base_val) => *base_val = merge_value(std::mem::take(base_val), patch_val),
            None => {
                out.insert(key.clone(), patch_val.clone());
            }
        }
    }
    out
}

fn merge_value(base: Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            Value::Object(merge(&base_map, patch_map))
        }
        (_, patch) => patch.clone(),
    }
}

/// Parse a theme config or patch document, which must be a JSON object.
pub fn parse_object(json: &str, what: &str) -> Result<JsonMap, ThemeError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => Ok(map),
        _ => Err(ThemeError::NotAnObject(what.to_string())),
    }
}

/// Stable identity of a custom theme's content.
pub fn content_hash(preset_id: i64, patch: &JsonMap) -> String {
    let canonical = canonical_json(&Value::Object(patch.clone()));
    let digest = Sha256::digest(format!("{preset_id}:{canonical}").as_bytes());
    format!("{:x}", digest)
}

/// Compact JSON with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&sorted(value)).unwrap_or_default()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, sorted(v))).collect();
            Value::Object(
                ordered
                    .into_iter()
                    .map(|(k, v)| (k.clone(), v))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
