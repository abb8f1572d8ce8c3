//! Page comment snapshot recompute
//!
//! Rebuilds `extra.comment` from the authoritative comment rows on every run
//! and pushes the whole page to the search index.

use crate::error::EffectError;
use cmt_core::{
    Comment, CommentProvider, PageId, PageSnapshot, PageStore, SearchIndex, COMMENT_SNAPSHOT_KEY,
};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Result of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Page has no comments; nothing written
    Skipped,
    /// Snapshot rewritten and pushed
    Indexed {
        /// Number of comments in the snapshot
        comments: usize,
    },
}

/// Recomputes and indexes a page's comment snapshot
pub struct IndexSync {
    provider: Arc<dyn CommentProvider>,
    pages: Arc<dyn PageStore>,
    search: Arc<dyn SearchIndex>,
}

impl std::fmt::Debug for IndexSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSync").finish_non_exhaustive()
    }
}

impl IndexSync {
    /// Create new index sync
    #[must_use]
    pub fn new(
        provider: Arc<dyn CommentProvider>,
        pages: Arc<dyn PageStore>,
        search: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            provider,
            pages,
            search,
        }
    }

    /// Recompute the snapshot for `page_id`
    ///
    /// An empty comment set leaves any previously indexed snapshot in place.
    ///
    /// # Errors
    /// Provider, page store or search index failures; `PageMissing` if the
    /// page disappears before it can be re-read
    #[tracing::instrument(name = "effect.index_sync", skip(self))]
    pub async fn run(&self, page_id: PageId) -> Result<SyncOutcome, EffectError> {
        let mut comments = self.provider.list_for_page(page_id).await?;
        if comments.is_empty() {
            tracing::info!("page has no comments, snapshot left unchanged");
            return Ok(SyncOutcome::Skipped);
        }
        comments.sort_by(Comment::newest_first);

        let snapshot: Vec<Value> = comments
            .into_iter()
            .map(|c| Value::String(c.content))
            .collect();
        let count = snapshot.len();

        let mut patch = Map::new();
        patch.insert(COMMENT_SNAPSHOT_KEY.to_owned(), Value::Array(snapshot));
        self.pages.patch_metadata(page_id, patch).await?;

        let page = self
            .pages
            .get_by_id(page_id)
            .await?
            .ok_or(EffectError::PageMissing(page_id))?;
        let safe_content = self.pages.sanitize_rendered_body(&page.render);
        self.search
            .upsert(PageSnapshot::from_page(page, safe_content))
            .await?;

        tracing::debug!(comments = count, "page snapshot indexed");
        Ok(SyncOutcome::Indexed { comments: count })
    }
}
