//! Seeded lifecycle simulator
//!
//! Drives a random mix of create/update/delete calls through a full
//! [`CommentService`] backed by in-memory collaborators, then checks that
//! every page's indexed snapshot matches its stored comments.
//!
//! Invariants checked after the effect queue drains:
//! - Each page with comments has a snapshot equal to its comments, newest
//!   first (only with `concurrency = 1`; concurrent reindexes of one page may
//!   leave a stale snapshot, which is counted instead)
//! - One notification was sent per successful create
//! - No effect failed

use crate::config::CommentsConfig;
use crate::service::{Collaborators, CommentService, ServiceError};
use cmt_core::{
    AuthorContext, Capability, Comment, CommentError, CommentId, CreateComment, PageId, Subject,
};
use cmt_effects::EffectStats;
use cmt_testkit::{
    page, user, ManualClock, MemoryPageStore, RecordingMailer, RecordingSearchIndex,
    StaticAuthorizationGate, ORIGIN,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

const WORDS: &[&str] = &[
    "looks", "good", "typo", "here", "thanks", "outdated", "see", "also", "link", "broken",
    "great", "write-up", "needs", "example", "fixed",
];

/// Simulator configuration
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Lifecycle calls to issue
    pub operations: u64,
    /// Pages under `sim/`
    pub pages: usize,
    /// Registered users; every third one may manage comments
    pub users: usize,
    /// Effect worker concurrency
    pub concurrency: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            operations: 500,
            pages: 8,
            users: 12,
            concurrency: 1,
        }
    }
}

/// Call counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulatorStats {
    /// Comments created
    pub created: u64,
    /// Comments updated
    pub updated: u64,
    /// Comments deleted
    pub deleted: u64,
    /// Rejected calls keyed by error label
    pub rejected: BTreeMap<&'static str, u64>,
}

impl SimulatorStats {
    fn reject(&mut self, err: &CommentError) {
        *self.rejected.entry(label(err)).or_default() += 1;
    }

    /// Total rejected calls
    #[must_use]
    pub fn rejected_total(&self) -> u64 {
        self.rejected.values().sum()
    }
}

/// Final report
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    /// Configuration used
    pub config: SimulatorConfig,
    /// Call counters
    pub stats: SimulatorStats,
    /// Effect worker counters
    pub effects: EffectStats,
    /// Notifications delivered
    pub notifications: usize,
    /// Search index upserts
    pub index_upserts: usize,
    /// Snapshot size per page id
    pub snapshots: BTreeMap<i64, usize>,
    /// Pages whose snapshot lost a reindex race
    pub stale_snapshots: usize,
    /// Invariant violations
    pub violations: Vec<String>,
}

impl SimulatorReport {
    /// Whether every invariant held
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Human-readable report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "=== CMT Simulator Report ===\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Operations: {}", self.config.operations);
        let _ = writeln!(report, "Created: {}", self.stats.created);
        let _ = writeln!(report, "Updated: {}", self.stats.updated);
        let _ = writeln!(report, "Deleted: {}", self.stats.deleted);
        let _ = writeln!(report, "Rejected: {}", self.stats.rejected_total());
        for (kind, count) in &self.stats.rejected {
            let _ = writeln!(report, "  {kind}: {count}");
        }
        let _ = writeln!(
            report,
            "Effects: {} scheduled, {} succeeded, {} failed, {} dropped",
            self.effects.scheduled, self.effects.succeeded, self.effects.failed, self.effects.dropped
        );
        let _ = writeln!(report, "Notifications: {}", self.notifications);
        let _ = writeln!(report, "Index upserts: {}", self.index_upserts);
        let _ = writeln!(report, "Stale snapshots: {}", self.stale_snapshots);
        let _ = writeln!(report, "Snapshots:");
        for (page_id, size) in &self.snapshots {
            let _ = writeln!(report, "  page {page_id}: {size} comments");
        }
        let _ = writeln!(report);
        if self.passed() {
            let _ = writeln!(report, "Status: PASSED");
        } else {
            let _ = writeln!(report, "Status: FAILED ({} violations)", self.violations.len());
            for violation in &self.violations {
                let _ = writeln!(report, "  - {violation}");
            }
        }
        report
    }
}

fn label(err: &CommentError) -> &'static str {
    match err {
        CommentError::InputInvalid(_) => "input_invalid",
        CommentError::ContentMissing => "content_missing",
        CommentError::PageNotFound => "page_not_found",
        CommentError::CommentNotFound => "comment_not_found",
        CommentError::PostForbidden => "post_forbidden",
        CommentError::ManageForbidden => "manage_forbidden",
        CommentError::ViewForbidden => "view_forbidden",
        CommentError::ProviderFailure(_) => "provider_failure",
        CommentError::Collaborator(_) => "collaborator_failure",
    }
}

struct World {
    pages: Arc<MemoryPageStore>,
    search: Arc<RecordingSearchIndex>,
    mailer: Arc<RecordingMailer>,
    clock: Arc<ManualClock>,
    page_ids: Vec<PageId>,
}

fn build_world(config: &SimulatorConfig) -> (World, StaticAuthorizationGate) {
    let pages = Arc::new(MemoryPageStore::new());
    let mut page_ids = Vec::with_capacity(config.pages + 1);
    for i in 0..config.pages {
        let id = i64::try_from(i).unwrap_or(i64::MAX - 1) + 1;
        pages.insert(page(id, &format!("sim/page-{id}"), "en"));
        page_ids.push(PageId(id));
    }
    // Locked page: only managers may comment there
    let locked = PageId(1000);
    pages.insert(page(locked.get(), "locked/notes", "en"));
    page_ids.push(locked);

    let mut gate = StaticAuthorizationGate::new()
        .grant(Subject::Guest, Capability::ReadComments)
        .grant_on(Subject::Guest, Capability::WriteComments, "sim/");
    for id in 1..=config.users {
        let subject = Subject::User(i64::try_from(id).unwrap_or(i64::MAX).into());
        gate = gate
            .grant(subject, Capability::ReadComments)
            .grant_on(subject, Capability::WriteComments, "sim/");
        if id % 3 == 0 {
            gate = gate
                .grant(subject, Capability::WriteComments)
                .grant(subject, Capability::ManageComments);
        }
    }

    let world = World {
        pages,
        search: Arc::new(RecordingSearchIndex::new()),
        mailer: Arc::new(RecordingMailer::new()),
        clock: Arc::new(ManualClock::default()),
        page_ids,
    };
    (world, gate)
}

fn random_content(rng: &mut StdRng) -> String {
    if rng.random_bool(0.08) {
        return " x ".to_owned();
    }
    let len = rng.random_range(2..8);
    (0..len)
        .map(|_| WORDS[rng.random_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

fn random_author(rng: &mut StdRng, users: usize) -> AuthorContext {
    if users == 0 || rng.random_bool(0.25) {
        let n = rng.random_range(0..100);
        let email = if rng.random_bool(0.1) {
            "not-an-email".to_owned()
        } else {
            format!("guest{n}@example.com")
        };
        AuthorContext::guest(format!("Guest {n}"), email)
    } else {
        let id = rng.random_range(1..=users);
        AuthorContext::registered(user(i64::try_from(id).unwrap_or(1)))
    }
}

/// Run the simulator
///
/// # Errors
/// Only if the service itself cannot be assembled
pub async fn run_simulator(config: SimulatorConfig) -> Result<SimulatorReport, ServiceError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let (world, gate) = build_world(&config);

    let service_config = CommentsConfig::default()
        .with_host("https://sim.example.com")
        .with_recipient("ops@example.com")
        .with_concurrency(config.concurrency);
    let service = CommentService::from_config(
        &service_config,
        Collaborators {
            pages: world.pages.clone(),
            gate: Arc::new(gate),
            search: world.search.clone(),
            mailer: world.mailer.clone(),
            clock: world.clock.clone(),
        },
    )?;
    let orchestrator = service.orchestrator();

    let mut stats = SimulatorStats::default();
    let mut live: Vec<CommentId> = Vec::new();

    for _ in 0..config.operations {
        world.clock.advance_secs(rng.random_range(1..30));
        let author = random_author(&mut rng, config.users);

        match rng.random_range(0..10) {
            0..=5 => {
                let page_id = world.page_ids[rng.random_range(0..world.page_ids.len())];
                let mut request = CreateComment::new(page_id, random_content(&mut rng), author, ORIGIN);
                if !live.is_empty() && rng.random_bool(0.2) {
                    request = request.replying_to(live[rng.random_range(0..live.len())]);
                }
                match orchestrator.create(request).await {
                    Ok(comment) => {
                        stats.created += 1;
                        live.push(comment.id);
                    }
                    Err(e) => stats.reject(&e),
                }
            }
            6..=7 if !live.is_empty() => {
                let id = live[rng.random_range(0..live.len())];
                let content = random_content(&mut rng);
                match orchestrator.update(id, &content, &author, ORIGIN).await {
                    Ok(_) => stats.updated += 1,
                    Err(e) => stats.reject(&e),
                }
            }
            8..=9 if !live.is_empty() => {
                let index = rng.random_range(0..live.len());
                match orchestrator.delete(live[index], &author, ORIGIN).await {
                    Ok(()) => {
                        stats.deleted += 1;
                        live.swap_remove(index);
                    }
                    Err(e) => stats.reject(&e),
                }
            }
            _ => {
                // Nothing to edit yet; target a comment that never existed
                if let Err(e) = orchestrator.delete(CommentId(-1), &author, ORIGIN).await {
                    stats.reject(&e);
                }
            }
        }
    }

    service.wait_idle().await;

    let mut violations = Vec::new();
    let mut snapshots = BTreeMap::new();
    let mut stale_snapshots = 0;
    for &page_id in &world.page_ids {
        let mut stored: Vec<Comment> = service.provider().list_for_page(page_id).await.unwrap_or_default();
        stored.sort_by(Comment::newest_first);
        let expected: Vec<String> = stored.into_iter().map(|c| c.content).collect();
        let snapshot = world
            .pages
            .page(page_id)
            .map(|p| p.comment_snapshot())
            .unwrap_or_default();

        if !expected.is_empty() && snapshot != expected {
            stale_snapshots += 1;
        }
        if !expected.is_empty() && snapshot != expected && config.concurrency <= 1 {
            violations.push(format!(
                "page {page_id}: snapshot has {} entries, store has {}",
                snapshot.len(),
                expected.len()
            ));
        }
        snapshots.insert(page_id.get(), snapshot.len());
    }

    let notifications = world.mailer.sent_count();
    if u64::try_from(notifications).unwrap_or(u64::MAX) != stats.created {
        violations.push(format!(
            "{notifications} notifications for {} created comments",
            stats.created
        ));
    }

    let effects = service.shutdown().await;
    if effects.failed > 0 {
        violations.push(format!("{} post-commit effects failed", effects.failed));
    }

    Ok(SimulatorReport {
        config,
        stats,
        effects,
        notifications,
        index_upserts: world.search.upsert_count(),
        snapshots,
        stale_snapshots,
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_run_passes() {
        let report = run_simulator(SimulatorConfig {
            operations: 200,
            ..SimulatorConfig::default()
        })
        .await
        .unwrap();

        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.stale_snapshots, 0);
        assert!(report.stats.created > 0);
        assert!(report.stats.rejected_total() > 0);
        assert_eq!(report.effects.pending(), 0);
    }

    #[tokio::test]
    async fn concurrent_worker_still_drains() {
        let report = run_simulator(SimulatorConfig {
            operations: 150,
            concurrency: 4,
            ..SimulatorConfig::default()
        })
        .await
        .unwrap();

        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.effects.pending(), 0);
        assert_eq!(
            u64::try_from(report.notifications).unwrap(),
            report.stats.created
        );
    }

    #[tokio::test]
    async fn same_seed_same_outcome() {
        let config = SimulatorConfig {
            operations: 120,
            seed: 7,
            ..SimulatorConfig::default()
        };
        let first = run_simulator(config.clone()).await.unwrap();
        let second = run_simulator(config).await.unwrap();

        assert_eq!(first.stats.created, second.stats.created);
        assert_eq!(first.stats.rejected, second.stats.rejected);
        assert_eq!(first.snapshots, second.snapshots);
    }
}
