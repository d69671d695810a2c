//! Publish coordination: read draft, compile, write cache, mark published.
//!
//! [`Publisher`] wraps a [`DraftStore`] and serializes everything that
//! touches one page. Draft saves and publishes of the same page take the
//! same per-page lock, so a publish always compiles a draft that was fully
//! written, and the cache entry records exactly which revision it holds.
//! Different pages never wait on each other; [`Publisher::publish_all`]
//! runs them on the rayon pool.

use crate::cache::{CacheError, PublishCacheEntry, PublishStats};
use crate::compile::{CompiledPage, compile};
use crate::store::{DraftStore, StoreError};
use crate::types::{Draft, PageId, PageStatus};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result of publishing one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub entry: PublishCacheEntry,
    /// The ETag differs from the previously published one (or there was none).
    pub changed: bool,
}

pub struct Publisher<S> {
    store: S,
    locks: Mutex<HashMap<PageId, Arc<Mutex<()>>>>,
}

impl<S: DraftStore> Publisher<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The lock for one page, created on first use.
    fn page_lock(&self, page_id: PageId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(page_id).or_default())
    }

    /// Save a draft under the page lock. See [`DraftStore::save_draft`].
    pub fn save_draft(&self, draft: &Draft, expected_revision: u64) -> Result<u64, PublishError> {
        let lock = self.page_lock(draft.page.id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.store.save_draft(draft, expected_revision)?)
    }

    /// Compile a page's current draft without publishing it.
    pub fn compile_page(&self, page_id: PageId) -> Result<(Draft, CompiledPage), PublishError> {
        let draft = self.store.load_draft(page_id)?;
        let theme = self.store.load_theme(&draft.page.theme)?;
        let compiled = compile(&draft, &theme.source());
        Ok((draft, compiled))
    }

    /// Compile the current draft and replace the page's published entry.
    pub fn publish(&self, page_id: PageId) -> Result<PublishOutcome, PublishError> {
        let lock = self.page_lock(page_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (draft, compiled) = self.compile_page(page_id)?;
        let entry = PublishCacheEntry::build(page_id, draft.revision, &compiled)?;
        let previous = self.store.get_publish_cache(page_id)?;
        let changed = previous.is_none_or(|p| p.etag != entry.etag);

        self.store.upsert_publish_cache(&entry)?;
        if draft.page.status != PageStatus::Published {
            self.store.set_page_status(page_id, PageStatus::Published)?;
        }

        if changed {
            info!("page {}: published revision {} as {}", page_id, entry.revision, entry.etag);
        } else {
            debug!("page {}: republished unchanged ({})", page_id, entry.etag);
        }
        Ok(PublishOutcome { entry, changed })
    }

    /// Publish several pages in parallel. Results come back in input order.
    pub fn publish_all(&self, page_ids: &[PageId]) -> Vec<(PageId, Result<PublishOutcome, PublishError>)> {
        page_ids
            .par_iter()
            .map(|&id| {
                let result = self.publish(id);
                if let Err(e) = &result {
                    warn!("page {}: publish failed: {}", id, e);
                }
                (id, result)
            })
            .collect()
    }

    /// Published bytes and ETag of a page, if it has been published.
    pub fn read_published(&self, page_id: PageId) -> Result<Option<PublishCacheEntry>, PublishError> {
        Ok(self.store.get_publish_cache(page_id)?)
    }
}

/// Tally a batch of publish results.
pub fn summarize(results: &[(PageId, Result<PublishOutcome, PublishError>)]) -> PublishStats {
    let mut stats = PublishStats::default();
    for (_, result) in results {
        match result {
            Ok(outcome) if outcome.changed => stats.changed(),
            Ok(_) => stats.unchanged(),
            Err(_) => stats.failed(),
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_helpers::*;
    use crate::theme::{CustomThemePolicy, ThemeSource};
    use serde_json::json;
    use std::thread;

    fn publisher_with_sample() -> Publisher<MemoryStore> {
        let store = MemoryStore::new();
        store.insert_preset(default_preset());
        let publisher = Publisher::new(store);
        publisher.save_draft(&sample_draft(), 0).unwrap();
        publisher
    }

    #[test]
    fn publish_stores_compiled_bytes() {
        let publisher = publisher_with_sample();
        let outcome = publisher.publish(1).unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.entry.revision, 1);

        let expected = compile(&sample_draft(), &ThemeSource::Preset(&default_preset()));
        assert_eq!(outcome.entry.compiled, serde_json::to_vec(&expected).unwrap());

        let read = publisher.read_published(1).unwrap().unwrap();
        assert_eq!(read.compiled, outcome.entry.compiled);
        assert_eq!(read.etag, outcome.entry.etag);
    }

    #[test]
    fn publish_marks_page_published() {
        let publisher = publisher_with_sample();
        publisher.publish(1).unwrap();
        let draft = publisher.store().load_draft(1).unwrap();
        assert_eq!(draft.page.status, PageStatus::Published);
        assert_eq!(draft.revision, 1);
    }

    #[test]
    fn republish_unchanged_keeps_etag() {
        let publisher = publisher_with_sample();
        let first = publisher.publish(1).unwrap();
        let second = publisher.publish(1).unwrap();
        assert!(!second.changed);
        assert_eq!(first.entry.etag, second.entry.etag);
        assert_eq!(first.entry.compiled, second.entry.compiled);
    }

    #[test]
    fn edit_then_publish_changes_etag_and_revision() {
        let publisher = publisher_with_sample();
        let first = publisher.publish(1).unwrap();

        let mut draft = publisher.store().load_draft(1).unwrap();
        let revision = draft.revision;
        draft.append_block(text_body("new")).unwrap();
        publisher.save_draft(&draft, revision).unwrap();

        let second = publisher.publish(1).unwrap();
        assert!(second.changed);
        assert_ne!(first.entry.etag, second.entry.etag);
        assert_eq!(second.entry.revision, revision + 1);
    }

    #[test]
    fn save_after_publish_keeps_published_status() {
        let publisher = publisher_with_sample();
        let loaded = publisher.store().load_draft(1).unwrap();
        publisher.publish(1).unwrap();

        // Loaded before the publish, saved after it at the same revision.
        let mut edited = loaded;
        edited.page.locale = "vi".into();
        publisher.save_draft(&edited, 1).unwrap();

        let stored = publisher.store().load_draft(1).unwrap();
        assert_eq!(stored.page.status, PageStatus::Published);
        assert_eq!(stored.page.locale, "vi");
        assert!(publisher.read_published(1).unwrap().is_some());
    }

    #[test]
    fn custom_theme_override_reaches_final_style() {
        let publisher = publisher_with_sample();
        let store = publisher.store();
        let preset = store.load_preset("theme_a").unwrap();
        let custom = store
            .save_custom_theme(
                100,
                &preset,
                obj(json!({"page": {"defaults": {"linkGroup": {"radius": 24}}}})),
                CustomThemePolicy::OnePerUser,
            )
            .unwrap();

        let mut draft = store.load_draft(1).unwrap();
        draft.page.theme.custom_id = Some(custom.id);
        publisher.save_draft(&draft, draft.revision).unwrap();

        let outcome = publisher.publish(1).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&outcome.entry.compiled).unwrap();
        let style = &doc["blocks"][1]["group"]["final_style"];
        assert_eq!(style["radius"], json!(24));
        assert_eq!(style["fontSize"], json!("M"));
    }

    #[test]
    fn missing_page_fails() {
        let publisher = publisher_with_sample();
        assert!(matches!(
            publisher.publish(99),
            Err(PublishError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[test]
    fn mistyped_theme_section_still_publishes() {
        let store = MemoryStore::new();
        store.insert_preset(preset_with(json!({"page": "broken"})));
        let publisher = Publisher::new(store);
        publisher.save_draft(&sample_draft(), 0).unwrap();

        let outcome = publisher.publish(1).unwrap();
        let doc: CompiledPage = serde_json::from_slice(&outcome.entry.compiled).unwrap();
        assert_eq!(doc.theme.compiled.page, crate::compile::fallback_page());
    }

    #[test]
    fn publish_all_reports_each_page() {
        let publisher = publisher_with_sample();
        for id in 2..=5 {
            publisher.save_draft(&empty_draft(id), 0).unwrap();
        }
        let ids = [1, 2, 3, 4, 5, 404];
        let results = publisher.publish_all(&ids);
        let returned: Vec<PageId> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(returned, ids);

        let stats = summarize(&results);
        assert_eq!(stats.changed, 5);
        assert_eq!(stats.failed, 1);

        let again = summarize(&publisher.publish_all(&ids[..5]));
        assert_eq!(again.unchanged, 5);
    }

    #[test]
    fn concurrent_saves_and_publishes_stay_consistent() {
        let publisher = publisher_with_sample();
        thread::scope(|s| {
            s.spawn(|| {
                for i in 0..20 {
                    let mut draft = publisher.store().load_draft(1).unwrap();
                    let revision = draft.revision;
                    draft.append_block(text_body(&format!("edit {i}"))).unwrap();
                    publisher.save_draft(&draft, revision).unwrap();
                }
            });
            s.spawn(|| {
                for _ in 0..20 {
                    publisher.publish(1).unwrap();
                }
            });
        });

        // Whatever revision the last publish saw, its bytes match that revision.
        let last = publisher.publish(1).unwrap();
        let draft = publisher.store().load_draft(1).unwrap();
        assert_eq!(last.entry.revision, draft.revision);
        let expected = compile(&draft, &ThemeSource::Preset(&default_preset()));
        assert_eq!(last.entry.compiled, serde_json::to_vec(&expected).unwrap());
    }
}
