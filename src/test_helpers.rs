//! Shared test utilities for the linkbio test suite.
//!
//! Builders for drafts, blocks, links, and presets keep individual tests
//! focused on the behavior under test instead of struct literals.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let mut draft = empty_draft(1);
//! draft.link_groups.push(link_group(10));
//! draft.blocks.push(group_block(1, "U", Some(10)));
//!
//! let preset = default_preset();
//! let compiled = compile(&draft, &ThemeSource::Preset(&preset));
//! ```

use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;

use crate::sort_key::SortKey;
use crate::theme::{ThemePreset, Tier, Visibility};
use crate::types::{
    Block, BlockBody, Draft, GroupId, Header, JsonMap, Link, LinkGroup, Page, PageSettings,
    PageStatus, PageTheme,
};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/data/` to a temp directory and return it.
///
/// Tests get an isolated data directory they can mutate without affecting
/// other tests or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/data");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

// =========================================================================
// JSON and key shorthands
// =========================================================================

/// Unwrap a `json!` object literal into a map. Panics on non-objects.
pub fn obj(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected JSON object, got {other}"),
    }
}

/// Parse a sort key literal. Panics on invalid keys.
pub fn key(s: &str) -> SortKey {
    s.parse()
        .unwrap_or_else(|e| panic!("invalid sort key '{s}': {e}"))
}

// =========================================================================
// Draft builders
// =========================================================================

pub fn page(id: i64) -> Page {
    Page {
        id,
        owner_id: 100,
        title: Some(format!("Page {id}")),
        locale: "en".into(),
        status: PageStatus::Draft,
        theme: PageTheme {
            preset_key: "theme_a".into(),
            custom_id: None,
            mode: "light".into(),
        },
        settings: PageSettings::default(),
    }
}

pub fn empty_draft(page_id: i64) -> Draft {
    Draft::new(page(page_id))
}

pub fn text_body(text: &str) -> BlockBody {
    BlockBody::Text {
        content: obj(json!({ "text": text })),
    }
}

pub fn text_block(id: i64, sort_key: &str, text: &str) -> Block {
    Block {
        id,
        sort_key: key(sort_key),
        is_visible: true,
        body: text_body(text),
    }
}

pub fn group_block(id: i64, sort_key: &str, ref_id: Option<GroupId>) -> Block {
    Block {
        id,
        sort_key: key(sort_key),
        is_visible: true,
        body: BlockBody::LinkGroup {
            ref_id,
            content: JsonMap::new(),
        },
    }
}

pub fn link_group(id: GroupId) -> LinkGroup {
    LinkGroup {
        id,
        title: None,
        layout_type: "list".into(),
        layout_config: JsonMap::new(),
        style_override: JsonMap::new(),
        links: Vec::new(),
    }
}

/// An active link whose URL is derived from its id.
pub fn link(id: i64, title: &str, sort_key: &str) -> Link {
    Link {
        id,
        title: title.into(),
        url: format!("https://example.com/{id}"),
        icon_asset_id: None,
        sort_key: key(sort_key),
        is_active: true,
    }
}

/// A small but complete draft: header, a text block, and one link group.
pub fn sample_draft() -> Draft {
    let mut draft = empty_draft(1);
    draft.page.settings.header = Some(Header {
        name: "Ana".into(),
        bio: "Making things".into(),
        ..Header::default()
    });

    let mut group = link_group(10);
    group.title = Some("Links".into());
    group.links.push(link(1, "Blog", "U"));
    group.links.push(link(2, "Shop", "k"));
    draft.link_groups.push(group);

    draft.blocks.push(text_block(1, "U", "hello"));
    draft.blocks.push(group_block(2, "k", Some(10)));
    draft
}

// =========================================================================
// Theme builders
// =========================================================================

pub fn preset_with(config: Value) -> ThemePreset {
    ThemePreset {
        id: 1,
        key: "theme_a".into(),
        name: "Theme A".into(),
        tier: Tier::Free,
        visibility: Visibility::Public,
        config: obj(config),
    }
}

/// Preset `theme_a` with a full page section and a dark background.
pub fn default_preset() -> ThemePreset {
    preset_with(json!({
        "page": {
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
        },
        "background": {
            "kind": "gradient",
            "from": "#111827",
            "to": "#1F2937"
        }
    }))
}
