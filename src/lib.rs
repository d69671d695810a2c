//! # linkbio
//!
//! Draft-to-published compiler for link-in-bio pages. A page is an ordered
//! list of content blocks (text, link groups) styled by a theme. Users edit
//! a mutable draft; publishing compiles it into an immutable JSON document
//! that readers fetch verbatim, identified by a content-derived ETag.
//!
//! # Architecture: Draft → Compile → Publish
//!
//! ```text
//! 1. Edit      draft + sort keys   →  store     (drafts/<id>.json)
//! 2. Compile   draft + theme       →  CompiledPage   (pure, no I/O)
//! 3. Publish   CompiledPage        →  bytes + ETag   (published/<id>.json)
//! ```
//!
//! Compilation is a pure function of the draft and its resolved theme, so it
//! is tested without storage. Publishing is the only step that writes, and
//! it runs under a per-page lock together with draft saves.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`sort_key`] | Fractional sort keys over a 62-symbol alphabet |
//! | [`theme`] | Presets, custom themes, deep merge, content hash |
//! | [`types`] | Draft model: page, blocks, link groups, links |
//! | [`draft`] | Draft editing: append, insert, move, reorder |
//! | [`compile`] | Draft + theme → `CompiledPage` |
//! | [`cache`] | Published bytes, ETags, and the publish manifest |
//! | [`store`] | `DraftStore` trait with in-memory and JSON-file stores |
//! | [`publish`] | Per-page locking publish coordinator |
//! | [`config`] | `linkbio.toml` loading, validation, and merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Sort Keys Instead of Positions
//!
//! Blocks and links carry a string [`sort_key::SortKey`]. Inserting or moving
//! one item generates a key between its new neighbors and leaves every other
//! row untouched. Only an explicit bulk reorder rewrites all keys.
//!
//! ## Sparse Theme Patches
//!
//! A custom theme stores only the keys it changes. The effective config is
//! the patch deep-merged onto its preset ([`theme::merge`]), cached on the
//! custom theme and recomputed whenever the patch changes.
//!
//! ## Deterministic Output
//!
//! Open JSON objects are insertion-ordered maps and struct fields serialize
//! in declaration order, so compiling the same draft twice yields identical
//! bytes and therefore the same ETag.

pub mod cache;
pub mod compile;
pub mod config;
pub mod draft;
pub mod output;
pub mod publish;
pub mod sort_key;
pub mod store;
pub mod theme;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
