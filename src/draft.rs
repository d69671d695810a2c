//! Draft editing: adding, moving, and reordering blocks and links.
//!
//! Every edit assigns sort keys through [`crate::sort_key`] so that only the
//! touched item changes:
//!
//! - **append / insert / move** compute one key between the item's new
//!   neighbors (in current sort order, ignoring the item being moved);
//! - **reorder** replaces the whole list at once, so it hands out a fresh
//!   [`sort_key::sequence`] by position instead.
//!
//! Blocks and links share the same logic through the [`Ordered`] trait.

use crate::sort_key::{self, SortKey, SortKeyError};
use crate::types::{Block, BlockBody, Draft, GroupId, JsonMap, Link, LinkGroup};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DraftError {
    #[error("block {0} not found")]
    BlockNotFound(i64),
    #[error("link {0} not found")]
    LinkNotFound(i64),
    #[error("link group {0} not found")]
    GroupNotFound(GroupId),
    #[error("sort key error: {0}")]
    SortKey(#[from] SortKeyError),
    #[error("reorder must list every item exactly once (expected {expected}, got {got})")]
    ReorderMismatch { expected: usize, got: usize },
}

/// Items that live in a sibling list ordered by sort key.
pub trait Ordered {
    fn id(&self) -> i64;
    fn sort_key(&self) -> &SortKey;
    fn set_sort_key(&mut self, key: SortKey);
}

impl Ordered for Block {
    fn id(&self) -> i64 {
        self.id
    }
    fn sort_key(&self) -> &SortKey {
        &self.sort_key
    }
    fn set_sort_key(&mut self, key: SortKey) {
        self.sort_key = key;
    }
}

impl Ordered for Link {
    fn id(&self) -> i64 {
        self.id
    }
    fn sort_key(&self) -> &SortKey {
        &self.sort_key
    }
    fn set_sort_key(&mut self, key: SortKey) {
        self.sort_key = key;
    }
}

/// Items sorted by key, ties kept in list order.
pub fn sorted<T: Ordered>(items: &[T]) -> Vec<&T> {
    let mut refs: Vec<&T> = items.iter().collect();
    refs.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
    refs
}

/// Key for a slot directly after `after` (or first when `None`), ignoring
/// `skip` when looking for neighbors.
fn slot_key<T: Ordered>(
    items: &[T],
    after: Option<i64>,
    skip: Option<i64>,
    not_found: fn(i64) -> DraftError,
) -> Result<SortKey, DraftError> {
    let order: Vec<&T> = sorted(items)
        .into_iter()
        .filter(|item| Some(item.id()) != skip)
        .collect();

    let (prev, next) = match after {
        None => (None, order.first().copied()),
        Some(id) => {
            let pos = order
                .iter()
                .position(|item| item.id() == id)
                .ok_or_else(|| not_found(id))?;
            (Some(order[pos]), order.get(pos + 1).copied())
        }
    };
    Ok(sort_key::generate(
        prev.map(|p| p.sort_key()),
        next.map(|n| n.sort_key()),
    )?)
}

fn last_key<T: Ordered>(items: &[T]) -> Option<&SortKey> {
    items.iter().map(|item| item.sort_key()).max()
}

fn move_item<T: Ordered>(
    items: &mut [T],
    id: i64,
    after: Option<i64>,
    not_found: fn(i64) -> DraftError,
) -> Result<(), DraftError> {
    if !items.iter().any(|item| item.id() == id) {
        return Err(not_found(id));
    }
    if after == Some(id) {
        return Ok(());
    }
    let key = slot_key(items, after, Some(id), not_found)?;
    if let Some(item) = items.iter_mut().find(|item| item.id() == id) {
        item.set_sort_key(key);
    }
    Ok(())
}

fn reorder_items<T: Ordered>(
    items: &mut [T],
    ids: &[i64],
    not_found: fn(i64) -> DraftError,
) -> Result<(), DraftError> {
    let unique: HashSet<i64> = ids.iter().copied().collect();
    if unique.len() != ids.len() || ids.len() != items.len() {
        return Err(DraftError::ReorderMismatch {
            expected: items.len(),
            got: ids.len(),
        });
    }
    if let Some(missing) = ids.iter().find(|id| !items.iter().any(|i| i.id() == **id)) {
        return Err(not_found(*missing));
    }

    for (id, key) in ids.iter().zip(sort_key::sequence(ids.len())) {
        if let Some(item) = items.iter_mut().find(|item| item.id() == *id) {
            item.set_sort_key(key);
        }
    }
    Ok(())
}

fn next_id<'a>(ids: impl Iterator<Item = &'a i64>) -> i64 {
    ids.max().map_or(1, |max| max + 1)
}

impl Draft {
    /// Blocks in display order (visibility not applied).
    pub fn ordered_blocks(&self) -> Vec<&Block> {
        sorted(&self.blocks)
    }

    /// Add a block at the end of the page and return its id.
    pub fn append_block(&mut self, body: BlockBody) -> Result<i64, DraftError> {
        let key = sort_key::generate(last_key(&self.blocks), None)?;
        Ok(self.push_block(body, key))
    }

    /// Add a block directly after `after` (or first when `None`).
    pub fn insert_block(&mut self, body: BlockBody, after: Option<i64>) -> Result<i64, DraftError> {
        let key = slot_key(&self.blocks, after, None, DraftError::BlockNotFound)?;
        Ok(self.push_block(body, key))
    }

    fn push_block(&mut self, body: BlockBody, sort_key: SortKey) -> i64 {
        let id = next_id(self.blocks.iter().map(|b| &b.id));
        self.blocks.push(Block {
            id,
            sort_key,
            is_visible: true,
            body,
        });
        id
    }

    /// Move a block so it sits directly after `after` (or first when `None`).
    pub fn move_block(&mut self, id: i64, after: Option<i64>) -> Result<(), DraftError> {
        move_item(&mut self.blocks, id, after, DraftError::BlockNotFound)
    }

    /// Replace the block order wholesale. `ids` must list every block once.
    pub fn reorder_blocks(&mut self, ids: &[i64]) -> Result<(), DraftError> {
        reorder_items(&mut self.blocks, ids, DraftError::BlockNotFound)
    }

    pub fn set_block_visible(&mut self, id: i64, visible: bool) -> Result<(), DraftError> {
        let block = self
            .blocks
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(DraftError::BlockNotFound(id))?;
        block.is_visible = visible;
        Ok(())
    }

    /// Remove a block. A link-group block takes its group (and links) with it.
    pub fn remove_block(&mut self, id: i64) -> Result<Block, DraftError> {
        let pos = self
            .blocks
            .iter()
            .position(|b| b.id == id)
            .ok_or(DraftError::BlockNotFound(id))?;
        let block = self.blocks.remove(pos);
        if let BlockBody::LinkGroup {
            ref_id: Some(group_id),
            ..
        } = block.body
        {
            let still_used = self.blocks.iter().any(|b| {
                matches!(b.body, BlockBody::LinkGroup { ref_id: Some(g), .. } if g == group_id)
            });
            if !still_used {
                self.link_groups.retain(|g| g.id != group_id);
            }
        }
        Ok(block)
    }

    /// Create an empty link group and a block pointing at it, appended to
    /// the page. Returns `(block_id, group_id)`.
    pub fn append_link_group(
        &mut self,
        title: Option<String>,
        layout_type: &str,
    ) -> Result<(i64, GroupId), DraftError> {
        let group_id = next_id(self.link_groups.iter().map(|g| &g.id));
        self.link_groups.push(LinkGroup {
            id: group_id,
            title,
            layout_type: layout_type.to_string(),
            layout_config: JsonMap::new(),
            style_override: JsonMap::new(),
            links: Vec::new(),
        });
        let block_id = self.append_block(BlockBody::LinkGroup {
            ref_id: Some(group_id),
            content: JsonMap::new(),
        })?;
        Ok((block_id, group_id))
    }

    /// Append a link to a group, returning the link id.
    ///
    /// Link ids are unique across the whole draft.
    pub fn append_link(
        &mut self,
        group_id: GroupId,
        title: &str,
        url: &str,
    ) -> Result<i64, DraftError> {
        let id = next_id(
            self.link_groups
                .iter()
                .flat_map(|g| g.links.iter().map(|l| &l.id)),
        );
        let group = self
            .group_mut(group_id)
            .ok_or(DraftError::GroupNotFound(group_id))?;
        let sort_key = sort_key::generate(last_key(&group.links), None)?;
        group.links.push(Link {
            id,
            title: title.to_string(),
            url: url.to_string(),
            icon_asset_id: None,
            sort_key,
            is_active: true,
        });
        Ok(id)
    }
}

impl LinkGroup {
    /// Links in display order (active flag not applied).
    pub fn ordered_links(&self) -> Vec<&Link> {
        sorted(&self.links)
    }

    /// Move a link so it sits directly after `after` (or first when `None`).
    pub fn move_link(&mut self, id: i64, after: Option<i64>) -> Result<(), DraftError> {
        move_item(&mut self.links, id, after, DraftError::LinkNotFound)
    }

    /// Replace the link order wholesale. `ids` must list every link once.
    pub fn reorder_links(&mut self, ids: &[i64]) -> Result<(), DraftError> {
        reorder_items(&mut self.links, ids, DraftError::LinkNotFound)
    }

    pub fn set_link_active(&mut self, id: i64, active: bool) -> Result<(), DraftError> {
        let link = self
            .links
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(DraftError::LinkNotFound(id))?;
        link.is_active = active;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    fn block_ids(draft: &Draft) -> Vec<i64> {
        draft.ordered_blocks().iter().map(|b| b.id).collect()
    }

    fn link_ids(group: &LinkGroup) -> Vec<i64> {
        group.ordered_links().iter().map(|l| l.id).collect()
    }

    #[test]
    fn append_blocks_in_order() {
        let mut draft = empty_draft(1);
        let a = draft.append_block(text_body("a")).unwrap();
        let b = draft.append_block(text_body("b")).unwrap();
        let c = draft.append_block(text_body("c")).unwrap();
        assert_eq!(block_ids(&draft), vec![a, b, c]);
        assert_eq!(draft.blocks[0].sort_key.as_str(), "U");
    }

    #[test]
    fn insert_block_between_and_first() {
        let mut draft = empty_draft(1);
        let a = draft.append_block(text_body("a")).unwrap();
        let b = draft.append_block(text_body("b")).unwrap();
        let mid = draft.insert_block(text_body("mid"), Some(a)).unwrap();
        let first = draft.insert_block(text_body("first"), None).unwrap();
        assert_eq!(block_ids(&draft), vec![first, a, mid, b]);
    }

    #[test]
    fn insert_after_missing_block_fails() {
        let mut draft = empty_draft(1);
        assert_eq!(
            draft.insert_block(text_body("x"), Some(99)),
            Err(DraftError::BlockNotFound(99))
        );
    }

    #[test]
    fn move_block_only_touches_moved_key() {
        let mut draft = empty_draft(1);
        let a = draft.append_block(text_body("a")).unwrap();
        let b = draft.append_block(text_body("b")).unwrap();
        let c = draft.append_block(text_body("c")).unwrap();
        let keys_before: Vec<SortKey> = draft.blocks.iter().map(|b| b.sort_key.clone()).collect();

        draft.move_block(c, None).unwrap();
        assert_eq!(block_ids(&draft), vec![c, a, b]);
        assert_eq!(draft.blocks[0].sort_key, keys_before[0]);
        assert_eq!(draft.blocks[1].sort_key, keys_before[1]);

        draft.move_block(c, Some(b)).unwrap();
        assert_eq!(block_ids(&draft), vec![a, b, c]);

        draft.move_block(a, Some(b)).unwrap();
        assert_eq!(block_ids(&draft), vec![b, a, c]);
    }

    #[test]
    fn move_block_after_itself_is_noop() {
        let mut draft = empty_draft(1);
        let a = draft.append_block(text_body("a")).unwrap();
        let before = draft.clone();
        draft.move_block(a, Some(a)).unwrap();
        assert_eq!(draft, before);
    }

    #[test]
    fn reorder_blocks_assigns_fresh_sequence() {
        let mut draft = empty_draft(1);
        let a = draft.append_block(text_body("a")).unwrap();
        let b = draft.append_block(text_body("b")).unwrap();
        let c = draft.append_block(text_body("c")).unwrap();
        draft.reorder_blocks(&[c, a, b]).unwrap();
        assert_eq!(block_ids(&draft), vec![c, a, b]);
    }

    #[test]
    fn reorder_blocks_requires_full_set() {
        let mut draft = empty_draft(1);
        let a = draft.append_block(text_body("a")).unwrap();
        draft.append_block(text_body("b")).unwrap();
        assert_eq!(
            draft.reorder_blocks(&[a]),
            Err(DraftError::ReorderMismatch {
                expected: 2,
                got: 1
            })
        );
        assert_eq!(
            draft.reorder_blocks(&[a, a]),
            Err(DraftError::ReorderMismatch {
                expected: 2,
                got: 2
            })
        );
        assert_eq!(
            draft.reorder_blocks(&[a, 42]),
            Err(DraftError::BlockNotFound(42))
        );
    }

    #[test]
    fn link_group_append_and_reorder_links() {
        let mut draft = empty_draft(1);
        let (_, gid) = draft.append_link_group(Some("Social".into()), "list").unwrap();
        let x = draft.append_link(gid, "X", "https://x.example").unwrap();
        let y = draft.append_link(gid, "Y", "https://y.example").unwrap();
        let z = draft.append_link(gid, "Z", "https://z.example").unwrap();

        let group = draft.group_mut(gid).unwrap();
        assert_eq!(link_ids(group), vec![x, y, z]);

        group.move_link(z, Some(x)).unwrap();
        assert_eq!(link_ids(group), vec![x, z, y]);

        group.reorder_links(&[y, x, z]).unwrap();
        assert_eq!(link_ids(group), vec![y, x, z]);

        assert_eq!(group.move_link(77, None), Err(DraftError::LinkNotFound(77)));
    }

    #[test]
    fn append_link_to_missing_group_fails() {
        let mut draft = empty_draft(1);
        assert_eq!(
            draft.append_link(9, "a", "https://a"),
            Err(DraftError::GroupNotFound(9))
        );
    }

    #[test]
    fn link_ids_unique_across_groups() {
        let mut draft = empty_draft(1);
        let (_, g1) = draft.append_link_group(None, "list").unwrap();
        let (_, g2) = draft.append_link_group(None, "grid").unwrap();
        let a = draft.append_link(g1, "a", "https://a").unwrap();
        let b = draft.append_link(g2, "b", "https://b").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn remove_link_group_block_drops_group() {
        let mut draft = empty_draft(1);
        let (block_id, gid) = draft.append_link_group(None, "list").unwrap();
        draft.append_link(gid, "a", "https://a").unwrap();
        draft.remove_block(block_id).unwrap();
        assert!(draft.group(gid).is_none());
        assert!(draft.blocks.is_empty());
    }

    #[test]
    fn toggles_visibility_and_active() {
        let mut draft = empty_draft(1);
        let (block_id, gid) = draft.append_link_group(None, "list").unwrap();
        let link = draft.append_link(gid, "a", "https://a").unwrap();
        draft.set_block_visible(block_id, false).unwrap();
        draft.group_mut(gid).unwrap().set_link_active(link, false).unwrap();
        assert!(!draft.blocks[0].is_visible);
        assert!(!draft.group(gid).unwrap().links[0].is_active);
    }
}
