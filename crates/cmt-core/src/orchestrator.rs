//! Comment Lifecycle Orchestrator
//!
//! The root component that:
//! - Validates comment bodies and guest identities
//! - Loads the owning page and checks capabilities against it
//! - Delegates persistence to the active comment provider
//! - Schedules post-commit effects (reindex, notification) once a write commits
//!
//! Effects are handed to an [`EffectScheduler`] and never awaited; a failing
//! effect cannot fail or revert the write that scheduled it.

use crate::error::CommentError;
use crate::ports::{AuthorizationGate, CommentProvider, EffectScheduler, PageStore};
use crate::types::{
    Actor, AuthorContext, Capability, CapabilitySet, Comment, CommentId, NewComment, Page, PageId,
    PostCommitEffect, Subject,
};
use crate::validation::{resolve_author, validate_content};
use std::net::IpAddr;
use std::sync::Arc;

/// Request to post a new comment
#[derive(Debug, Clone)]
pub struct CreateComment {
    /// Page to comment on
    pub page_id: PageId,
    /// Comment being replied to
    pub reply_to: Option<CommentId>,
    /// Markdown body
    pub content: String,
    /// Who is posting
    pub author: AuthorContext,
    /// Network address of the request
    pub origin: IpAddr,
}

impl CreateComment {
    /// Create new request
    #[must_use]
    pub fn new(
        page_id: impl Into<PageId>,
        content: impl Into<String>,
        author: AuthorContext,
        origin: IpAddr,
    ) -> Self {
        Self {
            page_id: page_id.into(),
            reply_to: None,
            content: content.into(),
            author,
            origin,
        }
    }

    /// As a reply to another comment
    #[must_use]
    pub fn replying_to(mut self, comment_id: impl Into<CommentId>) -> Self {
        self.reply_to = Some(comment_id.into());
        self
    }
}

/// The comment lifecycle orchestrator
///
/// Backend-agnostic: it only ever talks to the provider it was built with.
pub struct CommentOrchestrator {
    provider: Arc<dyn CommentProvider>,
    pages: Arc<dyn PageStore>,
    gate: Arc<dyn AuthorizationGate>,
    effects: Arc<dyn EffectScheduler>,
}

impl std::fmt::Debug for CommentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentOrchestrator").finish_non_exhaustive()
    }
}

impl CommentOrchestrator {
    /// Create new orchestrator
    #[must_use]
    pub fn new(
        provider: Arc<dyn CommentProvider>,
        pages: Arc<dyn PageStore>,
        gate: Arc<dyn AuthorizationGate>,
        effects: Arc<dyn EffectScheduler>,
    ) -> Self {
        Self {
            provider,
            pages,
            gate,
            effects,
        }
    }

    /// Post a new comment
    ///
    /// # Workflow
    /// 1. Validate content, then guest identity (email before name)
    /// 2. Load the page
    /// 3. Check `write:comments` on the page
    /// 4. Persist through the provider
    /// 5. Schedule reindex and notification
    ///
    /// # Errors
    /// `ContentMissing`, `InputInvalid`, `PageNotFound`, `PostForbidden`, or a
    /// passthrough `ProviderFailure`
    #[tracing::instrument(
        name = "comment.create",
        skip(self, request),
        fields(page_id = %request.page_id, subject = %request.author.subject())
    )]
    pub async fn create(&self, request: CreateComment) -> Result<Comment, CommentError> {
        validate_content(&request.content)?;
        let author = resolve_author(&request.author)?;

        let page = self.load_page(request.page_id).await?;
        self.authorize(
            &author.subject(),
            Capability::WriteComments,
            &page,
            CommentError::PostForbidden,
        )
        .await?;

        let comment = self
            .provider
            .create(
                &page,
                NewComment {
                    reply_to: request.reply_to,
                    content: request.content,
                    author,
                    origin: request.origin,
                },
            )
            .await?;

        tracing::info!(comment_id = %comment.id, "comment created");

        self.effects.schedule(PostCommitEffect::ReindexPage { page_id: page.id });
        self.effects.schedule(PostCommitEffect::NotifyNewComment {
            page_id: page.id,
            comment_id: comment.id,
            content: comment.content.clone(),
            author_email: comment.author_email().to_owned(),
        });

        Ok(comment)
    }

    /// Replace the content of a comment
    ///
    /// # Errors
    /// `ContentMissing`, `CommentNotFound`, `PageNotFound`, `ManageForbidden`,
    /// or a passthrough `ProviderFailure`
    #[tracing::instrument(
        name = "comment.update",
        skip(self, content, author),
        fields(subject = %author.subject())
    )]
    pub async fn update(
        &self,
        comment_id: CommentId,
        content: &str,
        author: &AuthorContext,
        origin: IpAddr,
    ) -> Result<Comment, CommentError> {
        validate_content(content)?;

        let actor = Actor::new(author.subject(), origin);
        let page = self.managed_page(comment_id, &actor.subject).await?;

        let comment = self
            .provider
            .update(comment_id, content, &page, &actor)
            .await?;

        tracing::info!(page_id = %page.id, "comment updated");
        self.effects.schedule(PostCommitEffect::ReindexPage { page_id: page.id });

        Ok(comment)
    }

    /// Delete a comment
    ///
    /// # Errors
    /// `CommentNotFound`, `PageNotFound`, `ManageForbidden`, or a passthrough
    /// `ProviderFailure`
    #[tracing::instrument(
        name = "comment.delete",
        skip(self, author),
        fields(subject = %author.subject())
    )]
    pub async fn delete(
        &self,
        comment_id: CommentId,
        author: &AuthorContext,
        origin: IpAddr,
    ) -> Result<(), CommentError> {
        let actor = Actor::new(author.subject(), origin);
        let page = self.managed_page(comment_id, &actor.subject).await?;

        self.provider.remove(comment_id, &page, &actor).await?;

        tracing::info!(page_id = %page.id, "comment deleted");
        self.effects.schedule(PostCommitEffect::ReindexPage { page_id: page.id });

        Ok(())
    }

    /// List the comments of a page, newest first
    ///
    /// # Errors
    /// `PageNotFound`, `ViewForbidden`, or a passthrough `ProviderFailure`
    #[tracing::instrument(name = "comment.list", skip(self))]
    pub async fn list(
        &self,
        locale: &str,
        path: &str,
        subject: &Subject,
    ) -> Result<Vec<Comment>, CommentError> {
        let page = self
            .pages
            .get_by_path(locale, path)
            .await?
            .ok_or(CommentError::PageNotFound)?;
        self.authorize(subject, Capability::ReadComments, &page, CommentError::ViewForbidden)
            .await?;

        let mut comments = self.provider.list_for_page(page.id).await?;
        comments.sort_by(Comment::newest_first);
        Ok(comments)
    }

    /// Fetch a single comment
    ///
    /// # Errors
    /// `CommentNotFound`, `PageNotFound`, `ViewForbidden`, or a passthrough
    /// `ProviderFailure`
    #[tracing::instrument(name = "comment.get", skip(self))]
    pub async fn get(&self, comment_id: CommentId, subject: &Subject) -> Result<Comment, CommentError> {
        let page_id = self
            .provider
            .page_id_for_comment(comment_id)
            .await?
            .ok_or(CommentError::CommentNotFound)?;
        let page = self.load_page(page_id).await?;
        self.authorize(subject, Capability::ReadComments, &page, CommentError::ViewForbidden)
            .await?;

        self.provider
            .get(comment_id)
            .await?
            .ok_or(CommentError::CommentNotFound)
    }

    /// Resolve and authorize the page owning a comment for `manage:comments`
    async fn managed_page(&self, comment_id: CommentId, subject: &Subject) -> Result<Page, CommentError> {
        let page_id = self
            .provider
            .page_id_for_comment(comment_id)
            .await?
            .ok_or(CommentError::CommentNotFound)?;
        let page = self.load_page(page_id).await?;
        self.authorize(subject, Capability::ManageComments, &page, CommentError::ManageForbidden)
            .await?;
        Ok(page)
    }

    async fn load_page(&self, page_id: PageId) -> Result<Page, CommentError> {
        self.pages
            .get_by_id(page_id)
            .await?
            .ok_or(CommentError::PageNotFound)
    }

    async fn authorize(
        &self,
        subject: &Subject,
        capability: Capability,
        page: &Page,
        denied: CommentError,
    ) -> Result<(), CommentError> {
        let granted = self
            .gate
            .check(subject, &CapabilitySet::of(capability), &page.resource())
            .await;
        if granted {
            return Ok(());
        }

        tracing::warn!(
            page_id = %page.id,
            %subject,
            capability = capability.as_str(),
            "authorization denied"
        );
        Err(denied)
    }
}
