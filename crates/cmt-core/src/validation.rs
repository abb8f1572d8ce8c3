//! Input validation for comment bodies and guest identities

use crate::error::CommentError;
use crate::types::{AuthorContext, AuthorIdentity};
use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum comment length after trimming
pub const MIN_CONTENT_CHARS: usize = 2;
/// Maximum guest email length
pub const MAX_EMAIL_CHARS: usize = 255;
/// Guest name length bounds (inclusive)
pub const GUEST_NAME_CHARS: (usize, usize) = (2, 255);

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern is valid")
});

/// Check that a comment body has at least two non-whitespace-bounded characters
///
/// # Errors
/// `CommentError::ContentMissing` when the trimmed body is too short
pub fn validate_content(content: &str) -> Result<(), CommentError> {
    if content.trim().chars().count() < MIN_CONTENT_CHARS {
        return Err(CommentError::ContentMissing);
    }
    Ok(())
}

/// Whether an address is syntactically valid and within length limits
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    email.chars().count() <= MAX_EMAIL_CHARS && EMAIL_RE.is_match(email)
}

/// Validate a guest identity
///
/// The email rule is evaluated before the name rule; the first failing
/// message is returned.
///
/// # Errors
/// `CommentError::InputInvalid` with the first failing message
pub fn validate_guest(name: Option<&str>, email: Option<&str>) -> Result<AuthorIdentity, CommentError> {
    let email = email.map(str::trim).unwrap_or_default();
    if email.is_empty() {
        return Err(CommentError::InputInvalid("Email is required".into()));
    }
    if !is_valid_email(email) {
        return Err(CommentError::InputInvalid("Email is invalid".into()));
    }

    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(CommentError::InputInvalid("Name is required".into()));
    }
    let len = name.chars().count();
    let (min, max) = GUEST_NAME_CHARS;
    if len < min || len > max {
        return Err(CommentError::InputInvalid(format!(
            "Name must be between {min} and {max} characters"
        )));
    }

    Ok(AuthorIdentity::Guest {
        name: name.to_owned(),
        email: email.to_owned(),
    })
}

/// Resolve caller-supplied author information into an identity
///
/// Registered users pass through; guests are validated.
///
/// # Errors
/// `CommentError::InputInvalid` for an invalid guest identity
pub fn resolve_author(context: &AuthorContext) -> Result<AuthorIdentity, CommentError> {
    match &context.user {
        Some(user) => Ok(AuthorIdentity::from(user.clone())),
        None => validate_guest(context.guest_name.as_deref(), context.guest_email.as_deref()),
    }
}
