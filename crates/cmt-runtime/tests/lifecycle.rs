//! End-to-end lifecycle through a fully wired service

use cmt_core::{
    AuthorContext, Capability, CollaboratorError, CommentError, CommentOrchestrator,
    CreateComment, PageId, PostCommitEffect, Subject, UserId,
};
use cmt_runtime::{Collaborators, CommentService, CommentsConfig};
use cmt_storage::MemoryCommentStore;
use cmt_testkit::{
    page, registered, ManualClock, MemoryPageStore, RecordingMailer, RecordingScheduler,
    RecordingSearchIndex, StaticAuthorizationGate, ORIGIN,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const WRITER: i64 = 5;
const VIEWER: i64 = 7;
const MANAGER: i64 = 9;

struct Harness {
    service: CommentService,
    pages: Arc<MemoryPageStore>,
    search: Arc<RecordingSearchIndex>,
    mailer: Arc<RecordingMailer>,
    clock: Arc<ManualClock>,
}

fn gate() -> StaticAuthorizationGate {
    let user = |id: i64| Subject::User(UserId(id));
    StaticAuthorizationGate::new()
        .grant(user(WRITER), Capability::ReadComments)
        .grant(user(WRITER), Capability::WriteComments)
        .grant(user(VIEWER), Capability::ReadComments)
        .grant(user(MANAGER), Capability::ReadComments)
        .grant(user(MANAGER), Capability::ManageComments)
        .grant_on(Subject::Guest, Capability::WriteComments, "a")
}

fn harness_with(config: CommentsConfig, search: RecordingSearchIndex) -> Harness {
    let pages = Arc::new(MemoryPageStore::with_pages([
        page(42, "a", "en"),
        page(43, "docs/intro", "en"),
    ]));
    let search = Arc::new(search);
    let mailer = Arc::new(RecordingMailer::new());
    let clock = Arc::new(ManualClock::default());

    let service = CommentService::from_config(
        &config,
        Collaborators {
            pages: pages.clone(),
            gate: Arc::new(gate()),
            search: search.clone(),
            mailer: mailer.clone(),
            clock: clock.clone(),
        },
    )
    .unwrap();

    Harness {
        service,
        pages,
        search,
        mailer,
        clock,
    }
}

fn config() -> CommentsConfig {
    CommentsConfig::default()
        .with_host("https://wiki.example.com")
        .with_recipient("ops@example.com")
}

fn harness() -> Harness {
    harness_with(config(), RecordingSearchIndex::new())
}

fn hello(page_id: i64) -> CreateComment {
    CreateComment::new(page_id, "Hello world", registered(WRITER), ORIGIN)
}

#[tokio::test]
async fn create_indexes_and_notifies_once() {
    let h = harness();

    let comment = h.service.orchestrator().create(hello(42)).await.unwrap();
    assert!(comment.id.get() > 0);
    assert_eq!(comment.created_at, comment.updated_at);
    assert_eq!(comment.content, "Hello world");
    assert_eq!(comment.author_name(), "User 5");
    assert_eq!(comment.guest_name(), None);

    h.service.wait_idle().await;

    let indexed = h.search.latest(42).unwrap();
    assert_eq!(indexed.comments()[0], "Hello world");
    assert_eq!(h.pages.page(42).unwrap().comment_snapshot(), vec!["Hello world"]);

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["ops@example.com"]);
    assert!(sent[0].text.contains("https://wiki.example.com/en/a"));
}

#[tokio::test]
async fn manager_update_reindexes_once_without_notification() {
    let h = harness();
    let orchestrator = h.service.orchestrator();

    let created = orchestrator.create(hello(42)).await.unwrap();
    h.service.wait_idle().await;
    let upserts_before = h.search.upsert_count();

    h.clock.advance_secs(60);
    let updated = orchestrator
        .update(created.id, "Hi", &registered(MANAGER), ORIGIN)
        .await
        .unwrap();
    h.service.wait_idle().await;

    assert_eq!(updated.content, "Hi");
    assert!(updated.updated_at > updated.created_at);
    assert_eq!(h.search.upsert_count(), upserts_before + 1);
    assert_eq!(h.search.latest(42).unwrap().comments(), vec!["Hi"]);
    assert_eq!(h.mailer.sent_count(), 1);
}

#[tokio::test]
async fn unauthorized_delete_leaves_comment_and_index() {
    let h = harness();
    let orchestrator = h.service.orchestrator();

    let created = orchestrator.create(hello(42)).await.unwrap();
    h.service.wait_idle().await;
    let upserts_before = h.search.upsert_count();
    let scheduled_before = h.service.effect_stats().scheduled;

    let err = orchestrator
        .delete(created.id, &registered(VIEWER), ORIGIN)
        .await
        .unwrap_err();
    assert!(matches!(err, CommentError::ManageForbidden));
    assert_eq!(err.code(), 8004);

    h.service.wait_idle().await;
    assert!(h.service.provider().get(created.id).await.unwrap().is_some());
    assert_eq!(h.search.upsert_count(), upserts_before);
    assert_eq!(h.service.effect_stats().scheduled, scheduled_before);
}

#[tokio::test]
async fn manager_delete_keeps_last_snapshot() {
    let h = harness();
    let orchestrator = h.service.orchestrator();

    let created = orchestrator.create(hello(42)).await.unwrap();
    h.service.wait_idle().await;

    orchestrator
        .delete(created.id, &registered(MANAGER), ORIGIN)
        .await
        .unwrap();
    h.service.wait_idle().await;

    assert!(h.service.provider().get(created.id).await.unwrap().is_none());
    // Empty comment set is skipped, so the previous snapshot stays
    assert_eq!(h.pages.page(42).unwrap().comment_snapshot(), vec!["Hello world"]);
}

#[tokio::test]
async fn rejected_creates_persist_nothing() {
    let h = harness();
    let orchestrator = h.service.orchestrator();

    let err = orchestrator
        .create(CreateComment::new(42, " x ", registered(WRITER), ORIGIN))
        .await
        .unwrap_err();
    assert!(matches!(err, CommentError::ContentMissing));

    let guest = AuthorContext::guest("Ann", "not-an-email");
    let err = orchestrator
        .create(CreateComment::new(42, "Hello world", guest, ORIGIN))
        .await
        .unwrap_err();
    assert!(matches!(err, CommentError::InputInvalid(_)));

    let guest = AuthorContext::guest("Ann", "ann@example.com");
    let err = orchestrator
        .create(CreateComment::new(43, "Hello world", guest, ORIGIN))
        .await
        .unwrap_err();
    assert!(matches!(err, CommentError::PostForbidden));

    let err = orchestrator.create(hello(404)).await.unwrap_err();
    assert!(matches!(err, CommentError::PageNotFound));

    h.service.wait_idle().await;
    assert!(h.service.provider().list_for_page(PageId(42)).await.unwrap().is_empty());
    assert_eq!(h.service.effect_stats().scheduled, 0);
    assert_eq!(h.mailer.sent_count(), 0);
}

#[tokio::test]
async fn guest_comment_carries_guest_identity() {
    let h = harness();

    let guest = AuthorContext::guest("  Ann  ", "ann@example.com");
    let comment = h
        .service
        .orchestrator()
        .create(CreateComment::new(42, "Nice page", guest, ORIGIN))
        .await
        .unwrap();

    assert_eq!(comment.guest_name(), Some("Ann"));
    assert_eq!(comment.guest_email(), Some("ann@example.com"));
    assert!(comment.author.is_guest());
}

#[tokio::test]
async fn list_orders_newest_first_and_checks_read() {
    let h = harness();
    let orchestrator = h.service.orchestrator();

    orchestrator.create(hello(42)).await.unwrap();
    h.clock.advance_secs(5);
    orchestrator
        .create(CreateComment::new(42, "Second one", registered(WRITER), ORIGIN))
        .await
        .unwrap();

    let listed = orchestrator
        .list("en", "a", &Subject::User(UserId(VIEWER)))
        .await
        .unwrap();
    let contents: Vec<_> = listed.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["Second one", "Hello world"]);

    let err = orchestrator.list("en", "a", &Subject::Guest).await.unwrap_err();
    assert!(matches!(err, CommentError::ViewForbidden));

    let err = orchestrator
        .list("en", "missing", &Subject::User(UserId(VIEWER)))
        .await
        .unwrap_err();
    assert!(matches!(err, CommentError::PageNotFound));
}

#[tokio::test]
async fn disabled_notifications_send_nothing() {
    let h = harness_with(config().with_notifications(false), RecordingSearchIndex::new());

    h.service.orchestrator().create(hello(42)).await.unwrap();
    let stats = h.service.shutdown().await;

    assert_eq!(stats.failed, 0);
    assert_eq!(h.mailer.sent_count(), 0);
    assert_eq!(h.search.upsert_count(), 1);
}

#[tokio::test]
async fn search_outage_does_not_fail_the_write() {
    let h = harness_with(config(), RecordingSearchIndex::failing());

    let comment = h.service.orchestrator().create(hello(42)).await.unwrap();
    let stats = h.service.shutdown().await;

    assert_eq!(comment.content, "Hello world");
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(h.mailer.sent_count(), 1);
}

#[tokio::test]
async fn page_store_outage_surfaces_as_collaborator_failure() {
    let h = harness();
    h.pages.set_unavailable(true);

    let err = h.service.orchestrator().create(hello(42)).await.unwrap_err();
    assert!(matches!(
        err,
        CommentError::Collaborator(CollaboratorError::Unavailable { service: "pages", .. })
    ));
    assert_eq!(err.code(), 8001);

    h.pages.set_unavailable(false);
    h.service.wait_idle().await;
    assert!(h.service.provider().list_for_page(PageId(42)).await.unwrap().is_empty());
    assert_eq!(h.service.effect_stats().scheduled, 0);
}

#[tokio::test]
async fn recorded_effects_follow_each_operation() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryCommentStore::with_clock(clock.clone()));
    let scheduler = Arc::new(RecordingScheduler::new());
    let orchestrator = CommentOrchestrator::new(
        store.clone(),
        Arc::new(MemoryPageStore::with_pages([page(42, "a", "en")])),
        Arc::new(gate()),
        scheduler.clone(),
    );

    let created = orchestrator.create(hello(42)).await.unwrap();
    assert_eq!(scheduler.count_of("reindex_page"), 1);
    assert_eq!(scheduler.count_of("notify_new_comment"), 1);
    assert!(matches!(
        scheduler.scheduled()[1],
        PostCommitEffect::NotifyNewComment { ref author_email, .. } if author_email == "user5@example.com"
    ));

    scheduler.clear();
    clock.advance_secs(30);
    orchestrator
        .update(created.id, "Hi", &registered(MANAGER), ORIGIN)
        .await
        .unwrap();
    assert_eq!(scheduler.count_of("reindex_page"), 1);
    assert_eq!(scheduler.count_of("notify_new_comment"), 0);

    scheduler.clear();
    let err = orchestrator
        .delete(created.id, &registered(WRITER), ORIGIN)
        .await
        .unwrap_err();
    assert!(matches!(err, CommentError::ManageForbidden));
    assert!(scheduler.scheduled().is_empty());
    assert!(store.contains(created.id));

    orchestrator
        .delete(created.id, &registered(MANAGER), ORIGIN)
        .await
        .unwrap();
    assert_eq!(
        scheduler.scheduled(),
        vec![PostCommitEffect::ReindexPage { page_id: PageId(42) }]
    );
    assert!(store.is_empty());
}
