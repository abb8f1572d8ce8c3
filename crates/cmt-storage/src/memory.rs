//! In-memory table-backed comment provider
//!
//! Rows live in a single table guarded by one lock, so every mutation is
//! atomic with respect to other calls. Ids are assigned from a monotonic
//! sequence, matching an auto-increment column.

use cmt_core::render::render_comment;
use cmt_core::{
    Actor, Clock, Comment, CommentId, CommentProvider, NewComment, Page, PageId, ProviderError,
    SystemClock,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<CommentId, Comment>,
    next_id: i64,
}

impl Table {
    fn allocate_id(&mut self) -> CommentId {
        self.next_id += 1;
        CommentId(self.next_id)
    }
}

/// Default comment provider backed by an in-process table
#[derive(Debug)]
pub struct MemoryCommentStore {
    table: RwLock<Table>,
    clock: Arc<dyn Clock>,
}

impl MemoryCommentStore {
    /// Provider key under which this backend registers
    pub const KEY: &'static str = "default";

    /// Create empty store using the wall clock
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create empty store with a custom clock
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            clock,
        }
    }

    /// Number of stored comments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    /// Whether the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().rows.is_empty()
    }

    /// Whether a comment exists
    #[inline]
    #[must_use]
    pub fn contains(&self, id: CommentId) -> bool {
        self.table.read().rows.contains_key(&id)
    }
}

impl Default for MemoryCommentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CommentProvider for MemoryCommentStore {
    async fn create(&self, page: &Page, comment: NewComment) -> Result<Comment, ProviderError> {
        let render = render_comment(&comment.content);
        let now = self.clock.now();

        let mut table = self.table.write();
        if let Some(reply_to) = comment.reply_to {
            let on_page = table
                .rows
                .get(&reply_to)
                .is_some_and(|parent| parent.page_id == page.id);
            if !on_page {
                return Err(ProviderError::InvalidReply {
                    reply_to,
                    page_id: page.id,
                });
            }
        }

        let id = table.allocate_id();
        let row = Comment {
            id,
            page_id: page.id,
            reply_to: comment.reply_to,
            content: comment.content,
            render,
            author: comment.author,
            ip: comment.origin,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(id, row.clone());
        drop(table);

        tracing::debug!(comment_id = %id, page_id = %page.id, "comment row inserted");
        Ok(row)
    }

    async fn update(
        &self,
        id: CommentId,
        content: &str,
        page: &Page,
        actor: &Actor,
    ) -> Result<Comment, ProviderError> {
        let render = render_comment(content);
        let now = self.clock.now();

        let mut table = self.table.write();
        let row = table
            .rows
            .get_mut(&id)
            .filter(|row| row.page_id == page.id)
            .ok_or(ProviderError::NotFound(id))?;
        row.content = content.to_owned();
        row.render = render;
        row.updated_at = now;
        let updated = row.clone();
        drop(table);

        tracing::debug!(comment_id = %id, subject = %actor.subject, "comment row updated");
        Ok(updated)
    }

    async fn remove(&self, id: CommentId, page: &Page, actor: &Actor) -> Result<(), ProviderError> {
        let mut table = self.table.write();
        match table.rows.get(&id) {
            Some(row) if row.page_id == page.id => {
                table.rows.remove(&id);
            }
            _ => return Err(ProviderError::NotFound(id)),
        }
        drop(table);

        tracing::debug!(comment_id = %id, subject = %actor.subject, "comment row deleted");
        Ok(())
    }

    async fn page_id_for_comment(&self, id: CommentId) -> Result<Option<PageId>, ProviderError> {
        Ok(self.table.read().rows.get(&id).map(|row| row.page_id))
    }

    async fn get(&self, id: CommentId) -> Result<Option<Comment>, ProviderError> {
        Ok(self.table.read().rows.get(&id).cloned())
    }

    async fn list_for_page(&self, page_id: PageId) -> Result<Vec<Comment>, ProviderError> {
        let mut comments: Vec<Comment> = self
            .table
            .read()
            .rows
            .values()
            .filter(|row| row.page_id == page_id)
            .cloned()
            .collect();
        comments.sort_by(Comment::newest_first);
        Ok(comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmt_core::{AuthorIdentity, RegisteredUser, Subject, UserId};
    use cmt_testkit::ManualClock;
    use std::net::{IpAddr, Ipv4Addr};

    const ORIGIN: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn author() -> AuthorIdentity {
        RegisteredUser::new(1, "Jo", "jo@example.com").into()
    }

    fn new_comment(content: &str) -> NewComment {
        NewComment {
            reply_to: None,
            content: content.to_owned(),
            author: author(),
            origin: ORIGIN,
        }
    }

    fn actor() -> Actor {
        Actor::new(Subject::User(UserId(1)), ORIGIN)
    }

    fn store() -> (MemoryCommentStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (MemoryCommentStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn create_assigns_ids_and_timestamps() {
        let (store, _) = store();
        let page = Page::new(42, "a", "en", "A");

        let first = store.create(&page, new_comment("Hello world")).await.unwrap();
        let second = store.create(&page, new_comment("Again")).await.unwrap();

        assert_eq!(first.id, CommentId(1));
        assert_eq!(second.id, CommentId(2));
        assert_eq!(first.created_at, first.updated_at);
        assert_eq!(first.render.trim(), "<p>Hello world</p>");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn update_rerenders_and_bumps_updated_at() {
        let (store, clock) = store();
        let page = Page::new(42, "a", "en", "A");
        let created = store.create(&page, new_comment("Hello world")).await.unwrap();

        clock.advance_secs(5);
        let updated = store
            .update(created.id, "*Hi*", &page, &actor())
            .await
            .unwrap();

        assert_eq!(updated.content, "*Hi*");
        assert_eq!(updated.render.trim(), "<p><em>Hi</em></p>");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.created_at);
    }

    #[tokio::test]
    async fn mutations_are_scoped_to_the_page() {
        let (store, _) = store();
        let page = Page::new(42, "a", "en", "A");
        let other = Page::new(43, "b", "en", "B");
        let created = store.create(&page, new_comment("Hello world")).await.unwrap();

        let err = store.remove(created.id, &other, &actor()).await.unwrap_err();
        assert_eq!(err, ProviderError::NotFound(created.id));
        assert!(store.contains(created.id));

        store.remove(created.id, &page, &actor()).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.page_id_for_comment(created.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn reply_must_target_same_page() {
        let (store, _) = store();
        let page = Page::new(42, "a", "en", "A");
        let other = Page::new(43, "b", "en", "B");
        let parent = store.create(&page, new_comment("Parent")).await.unwrap();

        let mut reply = new_comment("Child");
        reply.reply_to = Some(parent.id);
        let err = store.create(&other, reply.clone()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidReply { .. }));

        let child = store.create(&page, reply).await.unwrap();
        assert_eq!(child.reply_to, Some(parent.id));
    }

    #[tokio::test]
    async fn list_orders_newest_first_with_id_tiebreak() {
        let (store, clock) = store();
        let page = Page::new(42, "a", "en", "A");

        store.create(&page, new_comment("one")).await.unwrap();
        store.create(&page, new_comment("two")).await.unwrap();
        clock.advance_secs(1);
        store.create(&page, new_comment("three")).await.unwrap();

        let contents: Vec<String> = store
            .list_for_page(PageId(42))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.content)
            .collect();
        assert_eq!(contents, vec!["three", "two", "one"]);
    }

    proptest::proptest! {
        #[test]
        fn listing_is_always_newest_first(steps in proptest::collection::vec(0i64..3, 1..24)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let listed = rt.block_on(async {
                let (store, clock) = store();
                let page = Page::new(42, "a", "en", "A");
                for (i, step) in steps.iter().enumerate() {
                    clock.advance_secs(*step);
                    store.create(&page, new_comment(&format!("c{i}"))).await.unwrap();
                }
                store.list_for_page(PageId(42)).await.unwrap()
            });

            proptest::prop_assert_eq!(listed.len(), steps.len());
            for pair in listed.windows(2) {
                proptest::prop_assert!(
                    (pair[0].created_at, pair[0].id) > (pair[1].created_at, pair[1].id)
                );
            }
        }
    }
}
