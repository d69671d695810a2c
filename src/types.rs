//! Draft-side data model shared by storage, editing, and the compiler.
//!
//! A [`Draft`] is everything needed to compile one page: the page record,
//! its blocks, and the link groups those blocks point at. Lists are kept in
//! explicit order; lookups by id go through [`DraftIndex`], never through map
//! iteration order.
//!
//! Open-ended content (block `content`, group `layout_config` and
//! `style_override`) stays a generic JSON object so theme authors can add
//! keys without a schema change.

use crate::sort_key::SortKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An ordered JSON object.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

pub type PageId = i64;
pub type GroupId = i64;

fn default_true() -> bool {
    true
}

fn default_mode() -> String {
    "light".to_string()
}

fn default_layout_type() -> String {
    "list".to_string()
}

/// Lifecycle of a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    #[default]
    Draft,
    Published,
}

/// A single bio page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub owner_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub locale: String,
    #[serde(default)]
    pub status: PageStatus,
    pub theme: PageTheme,
    #[serde(default)]
    pub settings: PageSettings,
}

/// Theme reference of a page. A custom theme, when set, wins over the preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTheme {
    pub preset_key: String,
    #[serde(default)]
    pub custom_id: Option<i64>,
    /// Color mode, e.g. `light` or `dark`.
    #[serde(default = "default_mode")]
    pub mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<Cover>,
}

/// Profile header shown above the blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub avatar_asset_id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub social: Vec<SocialLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialLink {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// Cover area behind the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cover {
    pub kind: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub asset_id: Option<i64>,
}

/// An ordered content unit on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: i64,
    pub sort_key: SortKey,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(flatten)]
    pub body: BlockBody,
}

/// Type-specific part of a block, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockBody {
    Text {
        #[serde(default)]
        content: JsonMap,
    },
    LinkGroup {
        /// Referenced group. A missing or dangling reference drops the block
        /// at compile time.
        #[serde(default)]
        ref_id: Option<GroupId>,
        #[serde(default)]
        content: JsonMap,
    },
}

impl Block {
    /// The `type` tag as written in JSON.
    pub fn type_name(&self) -> &'static str {
        match self.body {
            BlockBody::Text { .. } => "text",
            BlockBody::LinkGroup { .. } => "link_group",
        }
    }
}

/// A named, styled collection of links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkGroup {
    pub id: GroupId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_layout_type")]
    pub layout_type: String,
    #[serde(default)]
    pub layout_config: JsonMap,
    /// Partial style merged over the theme's link-group defaults.
    #[serde(default)]
    pub style_override: JsonMap,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub icon_asset_id: Option<i64>,
    pub sort_key: SortKey,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// The editable state of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub page: Page,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub link_groups: Vec<LinkGroup>,
    /// Incremented by storage on every successful save.
    #[serde(default)]
    pub revision: u64,
}

impl Draft {
    /// An empty draft for a freshly created page.
    pub fn new(page: Page) -> Self {
        Self {
            page,
            blocks: Vec::new(),
            link_groups: Vec::new(),
            revision: 0,
        }
    }

    pub fn index(&self) -> DraftIndex<'_> {
        DraftIndex::new(self)
    }

    pub fn group(&self, id: GroupId) -> Option<&LinkGroup> {
        self.link_groups.iter().find(|g| g.id == id)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut LinkGroup> {
        self.link_groups.iter_mut().find(|g| g.id == id)
    }
}

/// Side table from group id to group, built once per compile.
///
/// When two groups share an id the first one in list order wins.
#[derive(Debug)]
pub struct DraftIndex<'a> {
    groups: HashMap<GroupId, &'a LinkGroup>,
}

impl<'a> DraftIndex<'a> {
    pub fn new(draft: &'a Draft) -> Self {
        let mut groups = HashMap::with_capacity(draft.link_groups.len());
        for group in &draft.link_groups {
            groups.entry(group.id).or_insert(group);
        }
        Self { groups }
    }

    pub fn group(&self, id: GroupId) -> Option<&'a LinkGroup> {
        self.groups.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_json_uses_type_tag() {
        let block: Block = serde_json::from_value(json!({
            "id": 1,
            "type": "link_group",
            "sort_key": "U",
            "ref_id": 10
        }))
        .unwrap();
        assert!(block.is_visible);
        assert_eq!(block.type_name(), "link_group");
        assert!(matches!(
            block.body,
            BlockBody::LinkGroup {
                ref_id: Some(10),
                ..
            }
        ));

        let back = serde_json::to_value(&block).unwrap();
        assert_eq!(back["type"], json!("link_group"));
        assert_eq!(back["ref_id"], json!(10));
    }

    #[test]
    fn text_block_keeps_content() {
        let block: Block = serde_json::from_value(json!({
            "id": 2,
            "type": "text",
            "sort_key": "A",
            "is_visible": false,
            "content": {"text": "hello", "align": "left"}
        }))
        .unwrap();
        assert!(!block.is_visible);
        match block.body {
            BlockBody::Text { content } => assert_eq!(content["text"], json!("hello")),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn unknown_block_type_is_rejected() {
        let result = serde_json::from_value::<Block>(json!({
            "id": 3,
            "type": "carousel",
            "sort_key": "A"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn invalid_sort_key_is_rejected() {
        let result = serde_json::from_value::<Link>(json!({
            "id": 1, "title": "x", "url": "https://x", "sort_key": "not valid"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn page_defaults() {
        let page: Page = serde_json::from_value(json!({
            "id": 1,
            "owner_id": 5,
            "locale": "vi",
            "theme": {"preset_key": "theme_a"}
        }))
        .unwrap();
        assert_eq!(page.status, PageStatus::Draft);
        assert_eq!(page.theme.mode, "light");
        assert_eq!(page.theme.custom_id, None);
        assert_eq!(page.settings, PageSettings::default());
    }

    #[test]
    fn settings_omit_absent_sections() {
        let settings = PageSettings {
            header: Some(Header {
                name: "Ana".into(),
                ..Header::default()
            }),
            cover: None,
        };
        let value = serde_json::to_value(&settings).unwrap();
        assert!(value.get("cover").is_none());
        assert_eq!(value["header"]["name"], json!("Ana"));
        assert_eq!(value["header"]["social"], json!([]));
    }

    #[test]
    fn index_prefers_first_group_with_duplicate_id() {
        let page: Page = serde_json::from_value(json!({
            "id": 1, "owner_id": 1, "locale": "en", "theme": {"preset_key": "t"}
        }))
        .unwrap();
        let mut draft = Draft::new(page);
        for title in ["first", "second"] {
            draft.link_groups.push(LinkGroup {
                id: 4,
                title: Some(title.into()),
                layout_type: "list".into(),
                layout_config: JsonMap::new(),
                style_override: JsonMap::new(),
                links: Vec::new(),
            });
        }
        let index = draft.index();
        assert_eq!(index.group(4).unwrap().title.as_deref(), Some("first"));
        assert!(index.group(5).is_none());
    }
}
