//! Error types for post-commit effects
//!
//! These never reach the caller of a lifecycle operation; the worker logs them.

use cmt_core::{CollaboratorError, PageId, ProviderError};

/// Effect execution errors
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    /// Page vanished between scheduling and execution
    #[error("page {0} not found")]
    PageMissing(PageId),

    /// Comment provider failed while reading comments
    #[error("comment provider failed: {0}")]
    Provider(#[from] ProviderError),

    /// Page store, search index or mailer failed
    #[error("collaborator failed: {0}")]
    Collaborator(#[from] CollaboratorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_error_display() {
        let err = EffectError::PageMissing(PageId(9));
        assert_eq!(err.to_string(), "page 9 not found");

        let err: EffectError = CollaboratorError::unavailable("search", "down").into();
        assert!(err.to_string().contains("search unavailable"));
    }
}
