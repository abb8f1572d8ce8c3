//! Error types for the comment lifecycle
//!
//! Provides error handling for:
//! - Input validation failures (content, guest identity)
//! - Missing pages and comments
//! - Authorization denials
//! - Storage provider and collaborator failures

use crate::types::{CommentId, PageId};

/// Main lifecycle error, surfaced synchronously to the caller
#[derive(Debug, thiserror::Error)]
pub enum CommentError {
    /// Guest identity failed validation
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// Comment body shorter than two characters after trimming
    #[error("comment content is missing or too short")]
    ContentMissing,

    /// Owning page does not exist
    #[error("page not found")]
    PageNotFound,

    /// Comment does not exist
    #[error("comment not found")]
    CommentNotFound,

    /// Caller may not post comments on this page
    #[error("you are not authorized to post a comment on this page")]
    PostForbidden,

    /// Caller may not manage comments on this page
    #[error("you are not authorized to manage comments on this page")]
    ManageForbidden,

    /// Caller may not read comments on this page
    #[error("you are not authorized to view comments for this page")]
    ViewForbidden,

    /// Storage backend failure
    #[error("comment provider failed: {0}")]
    ProviderFailure(#[from] ProviderError),

    /// Page store or authorization gate failure
    #[error("collaborator failed: {0}")]
    Collaborator(#[from] CollaboratorError),
}

impl CommentError {
    /// Stable numeric code for transports
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::InputInvalid(_) => 1012,
            Self::PageNotFound => 6003,
            Self::ProviderFailure(_) | Self::Collaborator(_) => 8001,
            Self::PostForbidden => 8002,
            Self::ContentMissing => 8003,
            Self::ManageForbidden => 8004,
            Self::CommentNotFound => 8005,
            Self::ViewForbidden => 8006,
        }
    }

    /// Whether the caller caused the error (as opposed to a backend fault)
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::ProviderFailure(_) | Self::Collaborator(_))
    }

    /// Whether the error is an authorization denial
    #[inline]
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::PostForbidden | Self::ManageForbidden | Self::ViewForbidden
        )
    }
}

/// Storage provider errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Comment row does not exist
    #[error("comment {0} does not exist")]
    NotFound(CommentId),

    /// Reply target missing or on another page
    #[error("reply target {reply_to} is not a comment on page {page_id}")]
    InvalidReply {
        /// Requested reply target
        reply_to: CommentId,
        /// Page being commented on
        page_id: PageId,
    },

    /// Provider is unknown or disabled
    #[error("comment provider unavailable: {0}")]
    Unavailable(String),

    /// Backend-specific failure
    #[error("backend error: {0}")]
    Backend(String),
}

/// Failures of external collaborators (page store, gate, search, mail)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Service could not be reached
    #[error("{service} unavailable: {message}")]
    Unavailable {
        /// Collaborator name
        service: &'static str,
        /// Failure detail
        message: String,
    },

    /// Service rejected the request
    #[error("{service} rejected request: {message}")]
    Rejected {
        /// Collaborator name
        service: &'static str,
        /// Failure detail
        message: String,
    },
}

impl CollaboratorError {
    /// Create unavailable error
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            message: message.into(),
        }
    }

    /// Create rejected error
    pub fn rejected(service: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            service,
            message: message.into(),
        }
    }
}
