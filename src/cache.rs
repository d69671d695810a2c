//! Publish cache: compiled bytes and their ETags.
//!
//! Publishing serializes a [`CompiledPage`] once and keeps those exact bytes.
//! Readers serve the stored bytes verbatim, so an ETag computed at publish
//! time stays valid for every response until the next publish.
//!
//! # Design
//!
//! ## ETag
//!
//! The ETag is the first 16 bytes of the SHA-256 of the serialized document,
//! written as 32 lowercase hex characters. Serialization is deterministic
//! (struct fields in declaration order, open JSON objects in insertion
//! order), so republishing unchanged content yields the same ETag while
//! `published_at` moves forward.
//!
//! ## Manifest
//!
//! File-backed stores keep a small index at `<data_dir>/.publish-manifest.json`
//! mapping page id to ETag, publish time, and the draft revision compiled.
//! It lets `show` and `publish` report on pages without re-hashing their
//! bytes. A missing, unreadable, or version-mismatched manifest loads as
//! empty; the next publish rewrites it.
//!
//! Published bytes and the manifest are both replaced with [`atomic_write`],
//! so a concurrent reader sees either the old file or the new one.

use crate::compile::CompiledPage;
use crate::types::PageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the publish manifest file within the data directory.
const MANIFEST_FILENAME: &str = ".publish-manifest.json";

/// Version of the manifest format. Bump to discard existing manifests when
/// the format changes.
const MANIFEST_VERSION: u32 = 1;

/// Number of digest bytes kept in an ETag.
const ETAG_BYTES: usize = 16;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// ETag for a serialized document.
pub fn etag(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest[..ETAG_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// The published form of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCacheEntry {
    pub page_id: PageId,
    /// Exact bytes served to readers.
    pub compiled: Vec<u8>,
    pub etag: String,
    pub published_at: DateTime<Utc>,
    /// Draft revision the bytes were compiled from.
    pub revision: u64,
}

impl PublishCacheEntry {
    /// Serialize `compiled` and stamp it with its ETag and the current time.
    pub fn build(
        page_id: PageId,
        revision: u64,
        compiled: &CompiledPage,
    ) -> Result<Self, CacheError> {
        let bytes = serde_json::to_vec(compiled)?;
        Ok(Self::from_bytes(page_id, revision, bytes, Utc::now()))
    }

    pub fn from_bytes(
        page_id: PageId,
        revision: u64,
        compiled: Vec<u8>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            page_id,
            etag: etag(&compiled),
            compiled,
            published_at,
            revision,
        }
    }

    pub fn record(&self) -> PublishRecord {
        PublishRecord {
            etag: self.etag.clone(),
            published_at: self.published_at,
            revision: self.revision,
            size: self.compiled.len() as u64,
        }
    }
}

/// Manifest metadata for one published page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRecord {
    pub etag: String,
    pub published_at: DateTime<Utc>,
    pub revision: u64,
    pub size: u64,
}

/// On-disk index of published pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishManifest {
    pub version: u32,
    pub pages: BTreeMap<PageId, PublishRecord>,
}

impl PublishManifest {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            pages: BTreeMap::new(),
        }
    }

    /// Load from the data directory. Returns an empty manifest if the file
    /// doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(data_dir: &Path) -> Self {
        let content = match std::fs::read_to_string(manifest_path(data_dir)) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("ignoring unreadable publish manifest: {}", e);
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            return Self::empty();
        }
        manifest
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(self)?;
        atomic_write(&manifest_path(data_dir), json)?;
        Ok(())
    }

    pub fn get(&self, page_id: PageId) -> Option<&PublishRecord> {
        self.pages.get(&page_id)
    }

    /// Record an entry, replacing any previous record for the page.
    pub fn insert(&mut self, entry: &PublishCacheEntry) {
        self.pages.insert(entry.page_id, entry.record());
    }
}

/// Replace `path` by writing a sibling temp file and renaming it over the
/// target.
pub fn atomic_write(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, contents)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

/// Resolve the manifest path for a data directory.
pub fn manifest_path(data_dir: &Path) -> PathBuf {
    data_dir.join(MANIFEST_FILENAME)
}

/// Summary of a publish run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishStats {
    /// Pages whose ETag changed (or that were never published).
    pub changed: u32,
    /// Pages republished with identical content.
    pub unchanged: u32,
    pub failed: u32,
}

impl PublishStats {
    pub fn changed(&mut self) {
        self.changed += 1;
    }

    pub fn unchanged(&mut self) {
        self.unchanged += 1;
    }

    pub fn failed(&mut self) {
        self.failed += 1;
    }

    pub fn total(&self) -> u32 {
        self.changed + self.unchanged + self.failed
    }
}

impl fmt::Display for PublishStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} changed, {} unchanged ({} total)",
            self.changed,
            self.unchanged,
            self.total()
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::test_helpers::*;
    use crate::theme::ThemeSource;
    use std::fs;
    use tempfile::TempDir;

    fn compiled_sample() -> CompiledPage {
        compile(&sample_draft(), &ThemeSource::Preset(&default_preset()))
    }

    // =========================================================================
    // ETag
    // =========================================================================

    #[test]
    fn etag_is_32_lowercase_hex() {
        let tag = etag(b"{}");
        assert_eq!(tag.len(), 32);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn etag_is_prefix_of_full_digest() {
        let full = format!("{:x}", Sha256::digest(b"hello"));
        assert_eq!(etag(b"hello"), full[..32]);
    }

    #[test]
    fn etag_changes_with_content() {
        assert_ne!(etag(b"a"), etag(b"b"));
    }

    // =========================================================================
    // PublishCacheEntry
    // =========================================================================

    #[test]
    fn build_serializes_compact_json() {
        let compiled = compiled_sample();
        let entry = PublishCacheEntry::build(1, 4, &compiled).unwrap();
        assert_eq!(entry.compiled, serde_json::to_vec(&compiled).unwrap());
        assert_eq!(entry.etag, etag(&entry.compiled));
        assert_eq!(entry.revision, 4);

        let back: CompiledPage = serde_json::from_slice(&entry.compiled).unwrap();
        assert_eq!(back, compiled);
    }

    #[test]
    fn identical_content_same_etag() {
        let a = PublishCacheEntry::build(1, 1, &compiled_sample()).unwrap();
        let b = PublishCacheEntry::build(1, 2, &compiled_sample()).unwrap();
        assert_eq!(a.etag, b.etag);
        assert_eq!(a.compiled, b.compiled);
        assert!(b.published_at >= a.published_at);
    }

    #[test]
    fn changed_content_new_etag() {
        let a = PublishCacheEntry::build(1, 1, &compiled_sample()).unwrap();
        let mut changed = compiled_sample();
        changed.page.locale = "vi".into();
        let b = PublishCacheEntry::build(1, 2, &changed).unwrap();
        assert_ne!(a.etag, b.etag);
    }

    // =========================================================================
    // PublishManifest
    // =========================================================================

    #[test]
    fn atomic_write_replaces_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("page.json");
        atomic_write(&path, "old").unwrap();
        atomic_write(&path, "new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert!(!tmp.path().join("page.tmp").exists());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let entry = PublishCacheEntry::build(7, 3, &compiled_sample()).unwrap();
        let mut m = PublishManifest::empty();
        m.insert(&entry);
        m.save(tmp.path()).unwrap();

        let loaded = PublishManifest::load(tmp.path());
        assert_eq!(loaded, m);
        assert_eq!(loaded.get(7).unwrap().etag, entry.etag);
        assert_eq!(loaded.get(7).unwrap().size, entry.compiled.len() as u64);
    }

    #[test]
    fn insert_replaces_previous_record() {
        let mut m = PublishManifest::empty();
        m.insert(&PublishCacheEntry::from_bytes(1, 1, b"a".to_vec(), Utc::now()));
        m.insert(&PublishCacheEntry::from_bytes(1, 2, b"b".to_vec(), Utc::now()));
        assert_eq!(m.pages.len(), 1);
        assert_eq!(m.get(1).unwrap().revision, 2);
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(PublishManifest::load(tmp.path()), PublishManifest::empty());
    }

    #[test]
    fn load_corrupt_json_returns_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(manifest_path(tmp.path()), "{ not json").unwrap();
        assert!(PublishManifest::load(tmp.path()).pages.is_empty());
    }

    #[test]
    fn load_wrong_version_returns_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            manifest_path(tmp.path()),
            r#"{"version": 999, "pages": {}}"#,
        )
        .unwrap();
        assert_eq!(PublishManifest::load(tmp.path()).version, MANIFEST_VERSION);
    }

    // =========================================================================
    // PublishStats
    // =========================================================================

    #[test]
    fn stats_display() {
        let mut stats = PublishStats::default();
        stats.changed();
        stats.changed();
        stats.unchanged();
        assert_eq!(stats.to_string(), "2 changed, 1 unchanged (3 total)");
        stats.failed();
        assert_eq!(stats.to_string(), "2 changed, 1 unchanged (4 total), 1 failed");
    }
}
