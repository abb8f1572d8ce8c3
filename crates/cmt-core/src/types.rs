//! Core types for the comment lifecycle
//!
//! Defines the fundamental types shared by every crate in the workspace:
//! - Identifiers for comments, pages and users
//! - The stored comment record and its author identity
//! - The borrowed page entity and the snapshot pushed to search
//! - Capabilities, subjects and resource contexts for authorization
//! - Post-commit effect work items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::str::FromStr;

/// Key of the denormalized comment array inside a page's metadata bag
pub const COMMENT_SNAPSHOT_KEY: &str = "comment";

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Raw integer value
            #[inline]
            #[must_use]
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

integer_id!(
    /// Comment identifier (assigned by the storage provider)
    CommentId
);
integer_id!(
    /// Page identifier (owned by the page store)
    PageId
);
integer_id!(
    /// Registered user identifier
    UserId
);

/// A registered account acting as comment author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUser {
    /// User ID
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Account email
    pub email: String,
}

impl RegisteredUser {
    /// Create new registered user reference
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<UserId>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Resolved author of a comment
///
/// Either a registered account or a guest identified by the name and email
/// they submitted. Resolved once at the orchestrator boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthorIdentity {
    /// Registered account
    Registered {
        /// Account ID
        user_id: UserId,
        /// Display name at time of writing
        name: String,
        /// Account email at time of writing
        email: String,
    },
    /// Guest author
    Guest {
        /// Submitted display name
        name: String,
        /// Submitted email
        email: String,
    },
}

impl AuthorIdentity {
    /// Display name of the author
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Registered { name, .. } | Self::Guest { name, .. } => name,
        }
    }

    /// Email of the author
    #[must_use]
    pub fn email(&self) -> &str {
        match self {
            Self::Registered { email, .. } | Self::Guest { email, .. } => email,
        }
    }

    /// Registered user ID, if any
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Registered { user_id, .. } => Some(*user_id),
            Self::Guest { .. } => None,
        }
    }

    /// Whether the author is a guest
    #[inline]
    #[must_use]
    pub fn is_guest(&self) -> bool {
        matches!(self, Self::Guest { .. })
    }

    /// Authorization subject for this author
    #[must_use]
    pub fn subject(&self) -> Subject {
        match self {
            Self::Registered { user_id, .. } => Subject::User(*user_id),
            Self::Guest { .. } => Subject::Guest,
        }
    }
}

impl From<RegisteredUser> for AuthorIdentity {
    fn from(user: RegisteredUser) -> Self {
        Self::Registered {
            user_id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// Caller-supplied author information, prior to validation
///
/// A context without a registered user is a guest; its name and email are
/// validated before any page lookup happens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorContext {
    /// Authenticated account, absent for guests
    pub user: Option<RegisteredUser>,
    /// Guest display name
    pub guest_name: Option<String>,
    /// Guest email
    pub guest_email: Option<String>,
}

impl AuthorContext {
    /// Context for an authenticated account
    #[must_use]
    pub fn registered(user: RegisteredUser) -> Self {
        Self {
            user: Some(user),
            guest_name: None,
            guest_email: None,
        }
    }

    /// Context for a guest submission
    #[must_use]
    pub fn guest(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user: None,
            guest_name: Some(name.into()),
            guest_email: Some(email.into()),
        }
    }

    /// Anonymous guest with no submitted identity
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Whether this context is a guest
    #[inline]
    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.user.is_none()
    }

    /// Authorization subject
    #[must_use]
    pub fn subject(&self) -> Subject {
        self.user
            .as_ref()
            .map_or(Subject::Guest, |u| Subject::User(u.id))
    }
}

/// Subject of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    /// Registered account
    User(UserId),
    /// Unauthenticated visitor
    Guest,
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Guest => write!(f, "guest"),
        }
    }
}

/// The acting party of an update or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// Who is acting
    pub subject: Subject,
    /// Network address the request came from
    pub origin: IpAddr,
}

impl Actor {
    /// Create new actor
    #[inline]
    #[must_use]
    pub fn new(subject: Subject, origin: IpAddr) -> Self {
        Self { subject, origin }
    }
}

/// A stored comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Comment ID
    pub id: CommentId,
    /// Owning page
    pub page_id: PageId,
    /// Comment being replied to
    pub reply_to: Option<CommentId>,
    /// Markdown source
    pub content: String,
    /// Rendered HTML, derived from `content`
    pub render: String,
    /// Author
    pub author: AuthorIdentity,
    /// Origin network address
    pub ip: IpAddr,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    /// Author display name
    #[inline]
    #[must_use]
    pub fn author_name(&self) -> &str {
        self.author.name()
    }

    /// Author email
    #[inline]
    #[must_use]
    pub fn author_email(&self) -> &str {
        self.author.email()
    }

    /// Guest name (only for guest authors)
    #[must_use]
    pub fn guest_name(&self) -> Option<&str> {
        match &self.author {
            AuthorIdentity::Guest { name, .. } => Some(name),
            AuthorIdentity::Registered { .. } => None,
        }
    }

    /// Guest email (only for guest authors)
    #[must_use]
    pub fn guest_email(&self) -> Option<&str> {
        match &self.author {
            AuthorIdentity::Guest { email, .. } => Some(email),
            AuthorIdentity::Registered { .. } => None,
        }
    }

    /// Ordering used by snapshots and listings: newest first, then highest id
    #[must_use]
    pub fn newest_first(a: &Comment, b: &Comment) -> std::cmp::Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    }
}

/// Input for a provider `create`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    /// Comment being replied to
    pub reply_to: Option<CommentId>,
    /// Markdown source (already validated)
    pub content: String,
    /// Resolved author
    pub author: AuthorIdentity,
    /// Origin network address
    pub origin: IpAddr,
}

/// A content page, borrowed from the page store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Page ID
    pub id: PageId,
    /// Path without locale prefix (e.g. `docs/intro`)
    pub path: String,
    /// Locale code (e.g. `en`)
    pub locale: String,
    /// Title
    pub title: String,
    /// Short description
    #[serde(default)]
    pub description: String,
    /// Opaque metadata bag
    #[serde(default)]
    pub extra: Map<String, Value>,
    /// Rendered HTML body
    #[serde(default)]
    pub render: String,
}

impl Page {
    /// Create new page
    #[must_use]
    pub fn new(
        id: impl Into<PageId>,
        path: impl Into<String>,
        locale: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            locale: locale.into(),
            title: title.into(),
            description: String::new(),
            extra: Map::new(),
            render: String::new(),
        }
    }

    /// With rendered body
    #[must_use]
    pub fn with_render(mut self, render: impl Into<String>) -> Self {
        self.render = render.into();
        self
    }

    /// With description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Denormalized comment contents currently stored in the metadata bag
    #[must_use]
    pub fn comment_snapshot(&self) -> Vec<String> {
        snapshot_entries(&self.extra)
    }

    /// Authorization context for this page
    #[must_use]
    pub fn resource(&self) -> ResourceContext {
        ResourceContext::new(self.path.clone(), self.locale.clone())
    }
}

fn snapshot_entries(extra: &Map<String, Value>) -> Vec<String> {
    extra
        .get(COMMENT_SNAPSHOT_KEY)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

/// Page document pushed to the search index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Page ID
    pub id: PageId,
    /// Path
    pub path: String,
    /// Locale code
    pub locale: String,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Sanitized plain text of the rendered body
    pub safe_content: String,
    /// Metadata bag, including the comment snapshot
    pub extra: Map<String, Value>,
}

impl PageSnapshot {
    /// Build snapshot from a page and its sanitized body text
    #[must_use]
    pub fn from_page(page: Page, safe_content: String) -> Self {
        Self {
            id: page.id,
            path: page.path,
            locale: page.locale,
            title: page.title,
            description: page.description,
            safe_content,
            extra: page.extra,
        }
    }

    /// Comment contents carried by this snapshot
    #[must_use]
    pub fn comments(&self) -> Vec<String> {
        snapshot_entries(&self.extra)
    }
}

/// Capability tags understood by the authorization gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// `read:comments`
    #[serde(rename = "read:comments")]
    ReadComments,
    /// `write:comments`
    #[serde(rename = "write:comments")]
    WriteComments,
    /// `manage:comments`
    #[serde(rename = "manage:comments")]
    ManageComments,
}

impl Capability {
    /// All capabilities
    pub const ALL: [Capability; 3] = [
        Capability::ReadComments,
        Capability::WriteComments,
        Capability::ManageComments,
    ];

    /// Wire tag
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadComments => "read:comments",
            Self::WriteComments => "write:comments",
            Self::ManageComments => "manage:comments",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown capability: {s}"))
    }
}

/// Set of capabilities requested in a single check
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Set containing a single capability
    #[must_use]
    pub fn of(capability: Capability) -> Self {
        Self(BTreeSet::from([capability]))
    }

    /// Whether the set contains a capability
    #[inline]
    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Iterate capabilities in tag order
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Number of capabilities
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Resource an authorization check is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceContext {
    /// Page path
    pub path: String,
    /// Page locale
    pub locale: String,
}

impl ResourceContext {
    /// Create new context
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            locale: locale.into(),
        }
    }
}

/// Work scheduled after a successful storage mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostCommitEffect {
    /// Recompute the page's comment snapshot and push it to search
    ReindexPage {
        /// Page to reindex
        page_id: PageId,
    },
    /// Send the operational notification for a new comment
    NotifyNewComment {
        /// Page the comment was posted on
        page_id: PageId,
        /// New comment
        comment_id: CommentId,
        /// Comment body
        content: String,
        /// Author email
        author_email: String,
    },
}

impl PostCommitEffect {
    /// Short label for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReindexPage { .. } => "reindex_page",
            Self::NotifyNewComment { .. } => "notify_new_comment",
        }
    }

    /// Page this effect concerns
    #[must_use]
    pub fn page_id(&self) -> PageId {
        match self {
            Self::ReindexPage { page_id } | Self::NotifyNewComment { page_id, .. } => *page_id,
        }
    }
}

/// Outgoing mail message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Recipients
    pub to: Vec<String>,
    /// Subject line
    pub subject: String,
    /// Template identifier
    pub template: String,
    /// Template data
    pub data: Value,
    /// Plain-text fallback body
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn comment(id: i64, secs: i64) -> Comment {
        let at = DateTime::from_timestamp(secs, 0).unwrap();
        Comment {
            id: CommentId(id),
            page_id: PageId(1),
            reply_to: None,
            content: format!("comment {id}"),
            render: String::new(),
            author: AuthorIdentity::Guest {
                name: "Ann".into(),
                email: "ann@example.com".into(),
            },
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn capability_tags_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
        }
        assert!("write:comment".parse::<Capability>().is_err());
    }

    #[test]
    fn capability_serializes_as_tag() {
        let json = serde_json::to_string(&CapabilitySet::of(Capability::ManageComments)).unwrap();
        assert_eq!(json, r#"["manage:comments"]"#);
    }

    #[test]
    fn author_context_subject() {
        let user = RegisteredUser::new(7, "Jo", "jo@example.com");
        assert_eq!(AuthorContext::registered(user).subject(), Subject::User(UserId(7)));
        assert_eq!(AuthorContext::guest("Ann", "a@b.co").subject(), Subject::Guest);
        assert!(AuthorContext::anonymous().is_guest());
    }

    #[test]
    fn guest_fields_only_for_guests() {
        let mut c = comment(1, 10);
        assert_eq!(c.guest_email(), Some("ann@example.com"));

        c.author = RegisteredUser::new(3, "Jo", "jo@example.com").into();
        assert_eq!(c.guest_name(), None);
        assert_eq!(c.author_email(), "jo@example.com");
    }

    #[test]
    fn newest_first_breaks_ties_by_id() {
        let mut items = vec![comment(1, 10), comment(3, 10), comment(2, 20)];
        items.sort_by(Comment::newest_first);
        let ids: Vec<i64> = items.iter().map(|c| c.id.get()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn page_snapshot_reads_comment_array() {
        let mut page = Page::new(4, "a", "en", "A");
        page.extra.insert(
            COMMENT_SNAPSHOT_KEY.into(),
            serde_json::json!(["b", "a", 5]),
        );
        assert_eq!(page.comment_snapshot(), vec!["b", "a"]);
        assert_eq!(
            PageSnapshot::from_page(page, String::new()).comments(),
            vec!["b", "a"]
        );
    }

    #[test]
    fn snapshot_entries_tolerates_missing_or_malformed_key() {
        let mut extra = Map::new();
        assert!(snapshot_entries(&extra).is_empty());

        extra.insert(COMMENT_SNAPSHOT_KEY.into(), Value::from("not an array"));
        assert!(snapshot_entries(&extra).is_empty());

        extra.insert(COMMENT_SNAPSHOT_KEY.into(), serde_json::json!(["x", null, "y"]));
        assert_eq!(snapshot_entries(&extra), vec!["x", "y"]);
    }
}
