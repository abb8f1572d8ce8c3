//! Collaborator contracts consumed by the orchestrator
//!
//! Every external system the lifecycle touches is reached through one of
//! these traits: comment storage, the page store, the authorization gate,
//! the search index, the mailer, the post-commit effect queue and the clock.

use crate::error::{CollaboratorError, ProviderError};
use crate::types::{
    Actor, CapabilitySet, Comment, CommentId, MailMessage, NewComment, Page, PageId, PageSnapshot,
    PostCommitEffect, ResourceContext, Subject,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Pluggable comment persistence
///
/// `create`, `update` and `remove` are atomic per call. Lookups have no side
/// effects.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CommentProvider: Send + Sync {
    /// Persist a new comment on `page`
    async fn create(&self, page: &Page, comment: NewComment) -> Result<Comment, ProviderError>;

    /// Replace the content of an existing comment
    async fn update(
        &self,
        id: CommentId,
        content: &str,
        page: &Page,
        actor: &Actor,
    ) -> Result<Comment, ProviderError>;

    /// Delete a comment
    async fn remove(&self, id: CommentId, page: &Page, actor: &Actor) -> Result<(), ProviderError>;

    /// Owning page of a comment, `None` if the comment does not exist
    async fn page_id_for_comment(&self, id: CommentId) -> Result<Option<PageId>, ProviderError>;

    /// Fetch a single comment
    async fn get(&self, id: CommentId) -> Result<Option<Comment>, ProviderError>;

    /// All comments of a page, newest first, ties broken by highest id
    async fn list_for_page(&self, page_id: PageId) -> Result<Vec<Comment>, ProviderError>;
}

/// Page content store
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PageStore: Send + Sync {
    /// Load a page by id
    async fn get_by_id(&self, id: PageId) -> Result<Option<Page>, CollaboratorError>;

    /// Load a page by locale and path
    async fn get_by_path(&self, locale: &str, path: &str) -> Result<Option<Page>, CollaboratorError>;

    /// Merge `patch` into the page's metadata bag, touching only the given keys
    async fn patch_metadata(
        &self,
        id: PageId,
        patch: Map<String, Value>,
    ) -> Result<(), CollaboratorError>;

    /// Strip a rendered HTML body down to indexable text
    fn sanitize_rendered_body(&self, html: &str) -> String;
}

/// Capability check against the policy engine
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AuthorizationGate: Send + Sync {
    /// Whether `subject` holds every capability in `capabilities` for `context`
    async fn check(
        &self,
        subject: &Subject,
        capabilities: &CapabilitySet,
        context: &ResourceContext,
    ) -> bool;
}

/// Search index sink
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SearchIndex: Send + Sync {
    /// Insert or replace a page document
    async fn upsert(&self, snapshot: PageSnapshot) -> Result<(), CollaboratorError>;
}

/// Email transport
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    /// Send a message
    async fn send(&self, message: MailMessage) -> Result<(), CollaboratorError>;
}

/// Post-commit effect queue
///
/// `schedule` must not block and must not fail the caller; delivery problems
/// are the queue's to log.
#[cfg_attr(test, mockall::automock)]
pub trait EffectScheduler: Send + Sync {
    /// Enqueue an effect
    fn schedule(&self, effect: PostCommitEffect);
}

/// Time source for storage timestamps
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
