//! Testing utilities for CMT workspace
//!
//! In-memory collaborators, recording sinks and fixtures.

#![allow(missing_docs)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use cmt_core::{
    AuthorContext, AuthorizationGate, Capability, CapabilitySet, Clock, CollaboratorError,
    EffectScheduler, MailMessage, Mailer, Page, PageId, PageSnapshot, PageStore,
    PostCommitEffect, RegisteredUser, ResourceContext, SearchIndex, Subject,
};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const ORIGIN: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("space pattern"));

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn page(id: i64, path: &str, locale: &str) -> Page {
    Page::new(id, path, locale, format!("Title of {path}"))
        .with_render(format!("<h1>Title of {path}</h1><p>Body of <em>{path}</em></p>"))
}

pub fn user(id: i64) -> RegisteredUser {
    RegisteredUser::new(id, format!("User {id}"), format!("user{id}@example.com"))
}

pub fn registered(id: i64) -> AuthorContext {
    AuthorContext::registered(user(id))
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ---------------------------------------------------------------------------
// Page store
// ---------------------------------------------------------------------------

/// Page store backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryPageStore {
    pages: DashMap<PageId, Page>,
    patches: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: impl IntoIterator<Item = Page>) -> Self {
        let store = Self::new();
        for page in pages {
            store.insert(page);
        }
        store
    }

    pub fn insert(&self, page: Page) {
        self.pages.insert(page.id, page);
    }

    pub fn page(&self, id: impl Into<PageId>) -> Option<Page> {
        self.pages.get(&id.into()).map(|p| p.clone())
    }

    /// Number of metadata patches applied
    pub fn patch_count(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }

    /// Make every call fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::unavailable("pages", "store offline"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PageStore for MemoryPageStore {
    async fn get_by_id(&self, id: PageId) -> Result<Option<Page>, CollaboratorError> {
        self.check_available()?;
        Ok(self.page(id))
    }

    async fn get_by_path(&self, locale: &str, path: &str) -> Result<Option<Page>, CollaboratorError> {
        self.check_available()?;
        Ok(self
            .pages
            .iter()
            .find(|p| p.locale == locale && p.path == path)
            .map(|p| p.clone()))
    }

    async fn patch_metadata(
        &self,
        id: PageId,
        patch: Map<String, Value>,
    ) -> Result<(), CollaboratorError> {
        self.check_available()?;
        let mut page = self
            .pages
            .get_mut(&id)
            .ok_or_else(|| CollaboratorError::rejected("pages", format!("page {id} missing")))?;
        for (key, value) in patch {
            page.extra.insert(key, value);
        }
        self.patches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn sanitize_rendered_body(&self, html: &str) -> String {
        let text = TAG_RE.replace_all(html, " ");
        SPACE_RE.replace_all(text.trim(), " ").into_owned()
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// Grant table keyed by subject, optionally scoped to a path prefix
#[derive(Debug, Default)]
pub struct StaticAuthorizationGate {
    grants: Mutex<Vec<(Subject, Capability, Option<String>)>>,
    checks: AtomicUsize,
}

impl StaticAuthorizationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant everywhere
    pub fn grant(self, subject: Subject, capability: Capability) -> Self {
        self.grants.lock().push((subject, capability, None));
        self
    }

    /// Grant on paths starting with `prefix`
    pub fn grant_on(self, subject: Subject, capability: Capability, prefix: &str) -> Self {
        self.grants
            .lock()
            .push((subject, capability, Some(prefix.to_owned())));
        self
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AuthorizationGate for StaticAuthorizationGate {
    async fn check(
        &self,
        subject: &Subject,
        capabilities: &CapabilitySet,
        context: &ResourceContext,
    ) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let grants = self.grants.lock();
        let held: HashSet<Capability> = grants
            .iter()
            .filter(|(s, _, prefix)| {
                s == subject
                    && prefix
                        .as_deref()
                        .map_or(true, |prefix| context.path.starts_with(prefix))
            })
            .map(|(_, cap, _)| *cap)
            .collect();
        !capabilities.is_empty() && capabilities.iter().all(|cap| held.contains(&cap))
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Search index that keeps every upserted snapshot
#[derive(Debug, Default)]
pub struct RecordingSearchIndex {
    upserts: Mutex<Vec<PageSnapshot>>,
    failing: AtomicBool,
}

impl RecordingSearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let index = Self::default();
        index.failing.store(true, Ordering::SeqCst);
        index
    }

    pub fn upserts(&self) -> Vec<PageSnapshot> {
        self.upserts.lock().clone()
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.lock().len()
    }

    /// Most recent snapshot pushed for a page
    pub fn latest(&self, id: impl Into<PageId>) -> Option<PageSnapshot> {
        let id = id.into();
        self.upserts.lock().iter().rev().find(|s| s.id == id).cloned()
    }
}

#[async_trait::async_trait]
impl SearchIndex for RecordingSearchIndex {
    async fn upsert(&self, snapshot: PageSnapshot) -> Result<(), CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::unavailable("search", "index offline"));
        }
        self.upserts.lock().push(snapshot);
        Ok(())
    }
}

/// Mailer that keeps every sent message
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let mailer = Self::default();
        mailer.failing.store(true, Ordering::SeqCst);
        mailer
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::unavailable("mail", "smtp refused connection"));
        }
        self.sent.lock().push(message);
        Ok(())
    }
}

/// Effect queue that records without executing
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<PostCommitEffect>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<PostCommitEffect> {
        self.scheduled.lock().clone()
    }

    /// Number of scheduled effects with the given `PostCommitEffect::kind`
    pub fn count_of(&self, kind: &str) -> usize {
        self.scheduled.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.scheduled.lock().clear();
    }
}

impl EffectScheduler for RecordingScheduler {
    fn schedule(&self, effect: PostCommitEffect) {
        self.scheduled.lock().push(effect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn page_store_patches_only_given_keys() {
        let store = MemoryPageStore::with_pages([page(1, "a", "en")]);
        let mut first = Map::new();
        first.insert("tags".into(), Value::from("x"));
        store.patch_metadata(PageId(1), first).await.unwrap();

        let mut second = Map::new();
        second.insert("comment".into(), serde_json::json!(["hi"]));
        store.patch_metadata(PageId(1), second).await.unwrap();

        let page = store.page(1).unwrap();
        assert_eq!(page.extra.get("tags"), Some(&Value::from("x")));
        assert_eq!(page.comment_snapshot(), vec!["hi"]);
        assert_eq!(store.patch_count(), 2);
    }

    #[test]
    fn sanitize_strips_markup() {
        let store = MemoryPageStore::new();
        assert_eq!(
            store.sanitize_rendered_body("<h1>A</h1>\n<p>b <em>c</em></p>"),
            "A b c"
        );
    }

    #[tokio::test]
    async fn gate_scopes_grants_by_prefix() {
        let gate = StaticAuthorizationGate::new().grant_on(
            Subject::User(1.into()),
            Capability::WriteComments,
            "docs/",
        );
        let write = CapabilitySet::of(Capability::WriteComments);

        assert!(gate.check(&Subject::User(1.into()), &write, &ResourceContext::new("docs/intro", "en")).await);
        assert!(!gate.check(&Subject::User(1.into()), &write, &ResourceContext::new("blog/x", "en")).await);
        assert!(!gate.check(&Subject::Guest, &write, &ResourceContext::new("docs/intro", "en")).await);
        assert_eq!(gate.check_count(), 3);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::default();
        let before = clock.now();
        clock.advance_secs(3);
        assert_eq!((clock.now() - before).num_seconds(), 3);
    }
}
