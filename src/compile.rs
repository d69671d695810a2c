//! Draft-to-published compilation.
//!
//! [`compile`] turns the editable [`Draft`] plus the page's theme into a
//! [`CompiledPage`]: a self-contained document a renderer can display without
//! further lookups. It is a pure function; loading the draft and theme and
//! storing the result belong to [`crate::publish`].
//!
//! ## Pipeline
//!
//! 1. Resolve the effective theme config and extract its `page` and
//!    `background` sections, falling back to built-in defaults when absent
//!    or not an object.
//! 2. Order blocks by sort key (stable, so equal keys keep list order) and
//!    drop invisible ones.
//! 3. Text blocks pass their content through. Link-group blocks resolve
//!    their group; a missing or dangling reference drops the block. Links are
//!    ordered, inactive ones dropped, and the group's style override is laid
//!    over the theme's link-group defaults.
//!
//! ## Style Resolution
//!
//! `final_style` is a *shallow* merge: each top-level key of
//! `style_override` replaces the theme default wholesale. This differs from
//! theme patches, which merge deeply (see [`crate::theme::merge`]).

use crate::draft::sorted;
use crate::theme::ThemeSource;
use crate::types::{BlockBody, Draft, DraftIndex, GroupId, JsonMap, LinkGroup, PageId, PageSettings};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Format version written into every compiled document.
pub const COMPILED_VERSION: u32 = 1;

/// The servable artifact of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPage {
    pub version: u32,
    pub page: CompiledPageInfo,
    pub theme: CompiledTheme,
    pub blocks: Vec<CompiledBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPageInfo {
    pub id: PageId,
    pub locale: String,
    pub settings: PageSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTheme {
    pub preset_key: String,
    pub mode: String,
    pub compiled: CompiledThemeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledThemeConfig {
    pub page: JsonMap,
    pub background: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompiledBlock {
    Text { content: JsonMap },
    LinkGroup { group: CompiledLinkGroup },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledLinkGroup {
    pub id: GroupId,
    pub title: Option<String>,
    pub layout_type: String,
    pub layout_config: JsonMap,
    pub final_style: JsonMap,
    pub links: Vec<CompiledLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledLink {
    pub title: String,
    pub url: String,
    pub is_active: bool,
}

/// Page section used when the theme defines none.
pub fn fallback_page() -> JsonMap {
    into_object(json!({
        "layout": {
            "textAlign": "center",
            "baseFontSize": "M",
            "pagePadding": 16,
            "blockGap": 12
        },
        "defaults": {
            "linkGroup": {
                "textAlign": "center",
                "fontSize": "M",
                "radius": 16
            }
        }
    }))
}

/// Background section used when the theme defines none.
pub fn fallback_background() -> JsonMap {
    into_object(json!({
        "kind": "color",
        "color": "#0B0F19"
    }))
}

fn into_object(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

/// Look up an optional object under `key`. Absent and `null` read as `None`;
/// any other non-object also reads as `None`, with a warning naming `path`.
fn object_at<'a>(map: &'a JsonMap, key: &str, path: &str) -> Option<&'a JsonMap> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Object(obj)) => Some(obj),
        Some(other) => {
            warn!("theme: ignoring {} (expected an object, got {})", path, json_kind(other));
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Extract the compiled theme sections from an effective theme config.
pub fn theme_sections(config: &JsonMap) -> CompiledThemeConfig {
    let page = object_at(config, "page", "page")
        .cloned()
        .unwrap_or_else(fallback_page);
    let background = object_at(config, "background", "background")
        .cloned()
        .unwrap_or_else(fallback_background);
    CompiledThemeConfig { page, background }
}

/// The theme's `page.defaults.linkGroup` object, or empty when unusable.
fn link_group_defaults(page: &JsonMap) -> JsonMap {
    object_at(page, "defaults", "page.defaults")
        .and_then(|defaults| object_at(defaults, "linkGroup", "page.defaults.linkGroup"))
        .cloned()
        .unwrap_or_default()
}

/// Lay `style_override` over `defaults`, replacing whole top-level keys.
pub fn final_style(defaults: &JsonMap, style_override: &JsonMap) -> JsonMap {
    let mut style = defaults.clone();
    for (key, value) in style_override {
        style.insert(key.clone(), value.clone());
    }
    style
}

fn compile_group(group: &LinkGroup, defaults: &JsonMap) -> CompiledLinkGroup {
    let links = sorted(&group.links)
        .into_iter()
        .filter(|link| link.is_active)
        .map(|link| CompiledLink {
            title: link.title.clone(),
            url: link.url.clone(),
            is_active: link.is_active,
        })
        .collect();

    CompiledLinkGroup {
        id: group.id,
        title: group.title.clone(),
        layout_type: group.layout_type.clone(),
        layout_config: group.layout_config.clone(),
        final_style: final_style(defaults, &group.style_override),
        links,
    }
}

/// Compile a draft against its resolved theme.
pub fn compile(draft: &Draft, theme: &ThemeSource) -> CompiledPage {
    let config = theme.effective_config();
    let sections = theme_sections(&config);
    let defaults = link_group_defaults(&sections.page);
    let index = DraftIndex::new(draft);
    let page_id = draft.page.id;

    let mut blocks = Vec::with_capacity(draft.blocks.len());
    for block in sorted(&draft.blocks) {
        if !block.is_visible {
            continue;
        }
        match &block.body {
            BlockBody::Text { content } => blocks.push(CompiledBlock::Text {
                content: content.clone(),
            }),
            BlockBody::LinkGroup { ref_id, .. } => {
                let Some(group) = ref_id.and_then(|id| index.group(id)) else {
                    debug!(
                        "page {}: dropping link_group block {} (ref_id {:?} not found)",
                        page_id, block.id, ref_id
                    );
                    continue;
                };
                blocks.push(CompiledBlock::LinkGroup {
                    group: compile_group(group, &defaults),
                });
            }
        }
    }

    debug!("page {}: compiled {} of {} blocks", page_id, blocks.len(), draft.blocks.len());

    CompiledPage {
        version: COMPILED_VERSION,
        page: CompiledPageInfo {
            id: page_id,
            locale: draft.page.locale.clone(),
            settings: draft.page.settings.clone(),
        },
        theme: CompiledTheme {
            preset_key: theme.preset_key().to_string(),
            mode: draft.page.theme.mode.clone(),
            compiled: sections,
        },
        blocks,
    }
}
