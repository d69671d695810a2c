//! Storage collaborator for drafts, themes, and published pages.
//!
//! Everything outside the pure compiler goes through [`DraftStore`]. Two
//! implementations ship with the crate:
//!
//! - [`MemoryStore`]: in-process maps behind a mutex, used by tests and by
//!   callers that bring their own persistence;
//! - [`FileStore`]: JSON files under a data directory, used by the CLI.
//!
//! ## Data Directory Layout
//!
//! ```text
//! data/
//! ├── drafts/<page_id>.json          # Draft (pretty JSON)
//! ├── themes/presets/<key>.json      # ThemePreset
//! ├── themes/custom/<id>.json        # ThemeCustom
//! ├── published/<page_id>.json       # exact compiled bytes
//! └── .publish-manifest.json         # etag / published_at / revision index
//! ```
//!
//! ## Revisions
//!
//! Every draft carries a `revision`. [`DraftStore::save_draft`] takes the
//! revision the caller last read and fails with [`StoreError::Conflict`] if
//! the stored draft has moved on, so concurrent editors cannot silently
//! overwrite each other. A page that has never been saved is at revision 0.

use crate::cache::{CacheError, PublishCacheEntry, PublishManifest, atomic_write};
use crate::theme::{CustomThemePolicy, ThemeCustom, ThemePreset, ThemeSource, content_hash};
use crate::types::{Draft, JsonMap, PageId, PageStatus, PageTheme};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("page {page_id}: draft is at revision {actual}, save expected {expected}")]
    Conflict {
        page_id: PageId,
        expected: u64,
        actual: u64,
    },
    #[error("publish cache error: {0}")]
    Cache(#[from] CacheError),
}

impl StoreError {
    fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// A page's theme with its records owned, ready to hand to the compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedTheme {
    pub preset: ThemePreset,
    pub custom: Option<ThemeCustom>,
}

impl OwnedTheme {
    pub fn source(&self) -> ThemeSource<'_> {
        match &self.custom {
            Some(custom) => ThemeSource::Custom {
                custom,
                preset: &self.preset,
            },
            None => ThemeSource::Preset(&self.preset),
        }
    }
}

pub trait DraftStore: Send + Sync {
    fn load_draft(&self, page_id: PageId) -> Result<Draft, StoreError>;

    /// Store `draft` if the stored revision equals `expected_revision`.
    /// Returns the new revision.
    ///
    /// `page.status` is owned by publishing: an existing page keeps its
    /// stored status whatever the caller's copy says.
    fn save_draft(&self, draft: &Draft, expected_revision: u64) -> Result<u64, StoreError>;

    fn load_preset(&self, key: &str) -> Result<ThemePreset, StoreError>;

    fn load_preset_by_id(&self, id: i64) -> Result<ThemePreset, StoreError>;

    fn load_custom_theme(&self, id: i64) -> Result<ThemeCustom, StoreError>;

    fn find_custom_theme_by_hash(
        &self,
        owner_id: i64,
        hash: &str,
    ) -> Result<Option<ThemeCustom>, StoreError>;

    /// The owner's custom theme with the lowest id, if any.
    fn find_custom_theme_by_owner(&self, owner_id: i64) -> Result<Option<ThemeCustom>, StoreError>;

    /// Insert or replace a custom theme. An id of 0 gets a fresh id.
    fn put_custom_theme(&self, custom: ThemeCustom) -> Result<ThemeCustom, StoreError>;

    /// Replace the published entry of a page.
    fn upsert_publish_cache(&self, entry: &PublishCacheEntry) -> Result<(), StoreError>;

    fn get_publish_cache(&self, page_id: PageId) -> Result<Option<PublishCacheEntry>, StoreError>;

    /// Update the page status without touching the draft revision.
    fn set_page_status(&self, page_id: PageId, status: PageStatus) -> Result<(), StoreError>;

    /// Ids of every stored page, ascending.
    fn list_pages(&self) -> Result<Vec<PageId>, StoreError>;

    /// Resolve a page's theme reference. A custom theme wins over the preset
    /// key and brings its own base preset.
    fn load_theme(&self, theme: &PageTheme) -> Result<OwnedTheme, StoreError> {
        match theme.custom_id {
            Some(custom_id) => {
                let custom = self.load_custom_theme(custom_id)?;
                let preset = self.load_preset_by_id(custom.based_on_preset_id)?;
                Ok(OwnedTheme {
                    preset,
                    custom: Some(custom),
                })
            }
            None => Ok(OwnedTheme {
                preset: self.load_preset(&theme.preset_key)?,
                custom: None,
            }),
        }
    }

    /// Save a patch on top of `preset` for `owner_id` according to `policy`.
    fn save_custom_theme(
        &self,
        owner_id: i64,
        preset: &ThemePreset,
        patch: JsonMap,
        policy: CustomThemePolicy,
    ) -> Result<ThemeCustom, StoreError> {
        match policy {
            CustomThemePolicy::ContentHash => {
                let hash = content_hash(preset.id, &patch);
                if let Some(existing) = self.find_custom_theme_by_hash(owner_id, &hash)? {
                    debug!("custom theme {} reused for owner {}", existing.id, owner_id);
                    return Ok(existing);
                }
                self.put_custom_theme(ThemeCustom::derive(owner_id, preset, patch))
            }
            CustomThemePolicy::OnePerUser => match self.find_custom_theme_by_owner(owner_id)? {
                Some(mut existing) => {
                    existing.update_patch(preset, patch);
                    self.put_custom_theme(existing)
                }
                None => self.put_custom_theme(ThemeCustom::derive(owner_id, preset, patch)),
            },
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn check_revision(page_id: PageId, expected: u64, actual: u64) -> Result<(), StoreError> {
    if expected != actual {
        return Err(StoreError::Conflict {
            page_id,
            expected,
            actual,
        });
    }
    Ok(())
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    drafts: BTreeMap<PageId, Draft>,
    presets: BTreeMap<String, ThemePreset>,
    customs: BTreeMap<i64, ThemeCustom>,
    published: BTreeMap<PageId, PublishCacheEntry>,
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a preset.
    pub fn insert_preset(&self, preset: ThemePreset) {
        lock(&self.state).presets.insert(preset.key.clone(), preset);
    }

    /// Seed a draft as-is, keeping its revision.
    pub fn insert_draft(&self, draft: Draft) {
        lock(&self.state).drafts.insert(draft.page.id, draft);
    }
}

impl DraftStore for MemoryStore {
    fn load_draft(&self, page_id: PageId) -> Result<Draft, StoreError> {
        lock(&self.state)
            .drafts
            .get(&page_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("draft", page_id))
    }

    fn save_draft(&self, draft: &Draft, expected_revision: u64) -> Result<u64, StoreError> {
        let mut state = lock(&self.state);
        let page_id = draft.page.id;
        let previous = state.drafts.get(&page_id);
        let actual = previous.map_or(0, |d| d.revision);
        check_revision(page_id, expected_revision, actual)?;

        let mut stored = draft.clone();
        if let Some(previous) = previous {
            stored.page.status = previous.page.status;
        }
        stored.revision = actual + 1;
        state.drafts.insert(page_id, stored);
        Ok(actual + 1)
    }

    fn load_preset(&self, key: &str) -> Result<ThemePreset, StoreError> {
        lock(&self.state)
            .presets
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found("preset", key))
    }

    fn load_preset_by_id(&self, id: i64) -> Result<ThemePreset, StoreError> {
        lock(&self.state)
            .presets
            .values()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("preset", id))
    }

    fn load_custom_theme(&self, id: i64) -> Result<ThemeCustom, StoreError> {
        lock(&self.state)
            .customs
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("custom theme", id))
    }

    fn find_custom_theme_by_hash(
        &self,
        owner_id: i64,
        hash: &str,
    ) -> Result<Option<ThemeCustom>, StoreError> {
        Ok(lock(&self.state)
            .customs
            .values()
            .find(|c| c.owner_id == owner_id && c.hash == hash)
            .cloned())
    }

    fn find_custom_theme_by_owner(&self, owner_id: i64) -> Result<Option<ThemeCustom>, StoreError> {
        Ok(lock(&self.state)
            .customs
            .values()
            .find(|c| c.owner_id == owner_id)
            .cloned())
    }

    fn put_custom_theme(&self, mut custom: ThemeCustom) -> Result<ThemeCustom, StoreError> {
        let mut state = lock(&self.state);
        if custom.id == 0 {
            custom.id = state.customs.keys().next_back().map_or(1, |max| max + 1);
        }
        state.customs.insert(custom.id, custom.clone());
        Ok(custom)
    }

    fn upsert_publish_cache(&self, entry: &PublishCacheEntry) -> Result<(), StoreError> {
        lock(&self.state)
            .published
            .insert(entry.page_id, entry.clone());
        Ok(())
    }

    fn get_publish_cache(&self, page_id: PageId) -> Result<Option<PublishCacheEntry>, StoreError> {
        Ok(lock(&self.state).published.get(&page_id).cloned())
    }

    fn set_page_status(&self, page_id: PageId, status: PageStatus) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        let draft = state
            .drafts
            .get_mut(&page_id)
            .ok_or_else(|| StoreError::not_found("draft", page_id))?;
        draft.page.status = status;
        Ok(())
    }

    fn list_pages(&self) -> Result<Vec<PageId>, StoreError> {
        Ok(lock(&self.state).drafts.keys().copied().collect())
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// JSON-file store rooted at a data directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes read-modify-write sequences (revision checks, id
    /// assignment, manifest updates) within this process.
    writes: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writes: Mutex::new(()),
        }
    }

    /// Create the directory layout if it doesn't exist yet.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(root);
        for dir in ["drafts", "themes/presets", "themes/custom", "published"] {
            fs::create_dir_all(store.root.join(dir))?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn draft_path(&self, page_id: PageId) -> PathBuf {
        self.root.join("drafts").join(format!("{page_id}.json"))
    }

    pub fn published_path(&self, page_id: PageId) -> PathBuf {
        self.root.join("published").join(format!("{page_id}.json"))
    }

    fn preset_dir(&self) -> PathBuf {
        self.root.join("themes").join("presets")
    }

    fn custom_dir(&self) -> PathBuf {
        self.root.join("themes").join("custom")
    }

    fn custom_path(&self, id: i64) -> PathBuf {
        self.custom_dir().join(format!("{id}.json"))
    }

    /// Read and parse one JSON file, mapping a missing file to `NotFound`.
    fn read_json<T: DeserializeOwned>(
        &self,
        path: &Path,
        kind: &'static str,
        id: impl ToString,
    ) -> Result<T, StoreError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::not_found(kind, id));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_write(path, json)?;
        Ok(())
    }

    /// `.json` files directly inside `dir`, sorted by path. A missing
    /// directory reads as empty.
    fn json_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        files
    }

    /// Every custom theme on disk, ordered by id.
    fn custom_themes(&self) -> Result<Vec<ThemeCustom>, StoreError> {
        let mut customs = Self::json_files(&self.custom_dir())
            .iter()
            .map(|path| self.read_json::<ThemeCustom>(path, "custom theme", path.display()))
            .collect::<Result<Vec<_>, _>>()?;
        customs.sort_by_key(|c| c.id);
        Ok(customs)
    }
}

/// Page id encoded in a file name like `12.json`.
fn page_id_of(path: &Path) -> Option<PageId> {
    path.file_stem()?.to_str()?.parse().ok()
}

/// Preset keys map to file names; anything that could escape the preset
/// directory is rejected.
fn valid_preset_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl DraftStore for FileStore {
    fn load_draft(&self, page_id: PageId) -> Result<Draft, StoreError> {
        self.read_json(&self.draft_path(page_id), "draft", page_id)
    }

    fn save_draft(&self, draft: &Draft, expected_revision: u64) -> Result<u64, StoreError> {
        let _guard = lock(&self.writes);
        let page_id = draft.page.id;
        let previous = match self.load_draft(page_id) {
            Ok(stored) => Some(stored),
            Err(StoreError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };
        let actual = previous.as_ref().map_or(0, |d| d.revision);
        check_revision(page_id, expected_revision, actual)?;

        let mut stored = draft.clone();
        if let Some(previous) = previous {
            stored.page.status = previous.page.status;
        }
        stored.revision = actual + 1;
        self.write_json(&self.draft_path(page_id), &stored)?;
        debug!("page {}: saved draft revision {}", page_id, stored.revision);
        Ok(stored.revision)
    }

    fn load_preset(&self, key: &str) -> Result<ThemePreset, StoreError> {
        if !valid_preset_key(key) {
            return Err(StoreError::not_found("preset", key));
        }
        self.read_json(&self.preset_dir().join(format!("{key}.json")), "preset", key)
    }

    fn load_preset_by_id(&self, id: i64) -> Result<ThemePreset, StoreError> {
        for path in Self::json_files(&self.preset_dir()) {
            let preset: ThemePreset = self.read_json(&path, "preset", path.display())?;
            if preset.id == id {
                return Ok(preset);
            }
        }
        Err(StoreError::not_found("preset", id))
    }

    fn load_custom_theme(&self, id: i64) -> Result<ThemeCustom, StoreError> {
        self.read_json(&self.custom_path(id), "custom theme", id)
    }

    fn find_custom_theme_by_hash(
        &self,
        owner_id: i64,
        hash: &str,
    ) -> Result<Option<ThemeCustom>, StoreError> {
        Ok(self
            .custom_themes()?
            .into_iter()
            .find(|c| c.owner_id == owner_id && c.hash == hash))
    }

    fn find_custom_theme_by_owner(&self, owner_id: i64) -> Result<Option<ThemeCustom>, StoreError> {
        Ok(self
            .custom_themes()?
            .into_iter()
            .find(|c| c.owner_id == owner_id))
    }

    fn put_custom_theme(&self, mut custom: ThemeCustom) -> Result<ThemeCustom, StoreError> {
        let _guard = lock(&self.writes);
        if custom.id == 0 {
            custom.id = self
                .custom_themes()?
                .last()
                .map_or(1, |max| max.id + 1);
        }
        self.write_json(&self.custom_path(custom.id), &custom)?;
        Ok(custom)
    }

    fn upsert_publish_cache(&self, entry: &PublishCacheEntry) -> Result<(), StoreError> {
        let _guard = lock(&self.writes);
        let path = self.published_path(entry.page_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Bytes first: a failed manifest write leaves the new bytes with the
        // previous record, and the ETag is always derived from the bytes.
        atomic_write(&path, &entry.compiled)?;

        let mut manifest = PublishManifest::load(&self.root);
        manifest.insert(entry);
        manifest.save(&self.root)?;
        info!("page {}: published {} ({} bytes)", entry.page_id, entry.etag, entry.compiled.len());
        Ok(())
    }

    fn get_publish_cache(&self, page_id: PageId) -> Result<Option<PublishCacheEntry>, StoreError> {
        let path = self.published_path(page_id);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let manifest = PublishManifest::load(&self.root);
        let (revision, published_at) = match manifest.get(page_id) {
            Some(record) => (record.revision, record.published_at),
            // Bytes without a manifest record: fall back to the file time.
            None => {
                let modified = fs::metadata(&path)?.modified()?;
                (0, DateTime::<Utc>::from(modified))
            }
        };
        Ok(Some(PublishCacheEntry::from_bytes(
            page_id,
            revision,
            bytes,
            published_at,
        )))
    }

    fn set_page_status(&self, page_id: PageId, status: PageStatus) -> Result<(), StoreError> {
        let _guard = lock(&self.writes);
        let mut draft = self.load_draft(page_id)?;
        draft.page.status = status;
        self.write_json(&self.draft_path(page_id), &draft)
    }

    fn list_pages(&self) -> Result<Vec<PageId>, StoreError> {
        let mut ids: Vec<PageId> = Self::json_files(&self.root.join("drafts"))
            .iter()
            .filter_map(|path| page_id_of(path))
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
