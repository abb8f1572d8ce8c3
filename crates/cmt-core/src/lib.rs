//! CMT Core - Comment lifecycle orchestrator
//!
//! The central component that:
//! - Validates comment bodies and guest identities
//! - Gates create/update/delete behind capability checks on the owning page
//! - Delegates persistence to a pluggable comment provider
//! - Schedules post-commit effects (search reindex, notification)
//!
//! # Example
//!
//! ```rust,ignore
//! use cmt_core::{AuthorContext, CommentOrchestrator, CreateComment, RegisteredUser};
//!
//! # async fn example(orchestrator: CommentOrchestrator) -> Result<(), cmt_core::CommentError> {
//! let author = AuthorContext::registered(RegisteredUser::new(5, "Jo", "jo@example.com"));
//! let request = CreateComment::new(42, "Hello world", author, "127.0.0.1".parse().unwrap());
//! let comment = orchestrator.create(request).await?;
//!
//! println!("Created comment {}", comment.id);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod error;
pub mod orchestrator;
pub mod ports;
pub mod render;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use error::{CollaboratorError, CommentError, ProviderError};
pub use orchestrator::{CommentOrchestrator, CreateComment};
pub use ports::{
    AuthorizationGate, Clock, CommentProvider, EffectScheduler, Mailer, PageStore, SearchIndex,
    SystemClock,
};
pub use types::{
    Actor, AuthorContext, AuthorIdentity, Capability, CapabilitySet, Comment, CommentId,
    MailMessage, NewComment, Page, PageId, PageSnapshot, PostCommitEffect, RegisteredUser,
    ResourceContext, Subject, UserId, COMMENT_SNAPSHOT_KEY,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with CMT Core
    pub use crate::{
        AuthorContext, Capability, Comment, CommentError, CommentId, CommentOrchestrator,
        CommentProvider, CreateComment, Page, PageId, PostCommitEffect, Subject,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
