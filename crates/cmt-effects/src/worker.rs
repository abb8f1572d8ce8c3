//! Post-commit effect queue and worker
//!
//! The orchestrator enqueues effects through [`EffectQueue`]; a single
//! background task owned by [`EffectWorker`] consumes them and runs each one
//! on its own tokio task, bounded by a semaphore:
//! - Enqueue never blocks and never fails the caller
//! - Failures are logged with page and effect identifiers, never retried
//! - `shutdown` closes intake and drains everything already queued

use crate::error::EffectError;
use crate::index_sync::{IndexSync, SyncOutcome};
use crate::notify::NotificationDispatcher;
use cmt_core::{EffectScheduler, PostCommitEffect};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

/// Executes a single post-commit effect
///
/// Implement this trait to change what effects do; the worker only handles
/// scheduling, concurrency and logging.
#[async_trait::async_trait]
pub trait EffectHandler: Send + Sync {
    /// Run one effect to completion
    async fn handle(&self, effect: PostCommitEffect) -> Result<(), EffectError>;
}

/// Default handler: reindex via [`IndexSync`], notify via [`NotificationDispatcher`]
#[derive(Debug)]
pub struct PostCommitHandler {
    index_sync: IndexSync,
    notifier: Option<NotificationDispatcher>,
}

impl PostCommitHandler {
    /// Create new handler; `notifier = None` disables notifications
    #[must_use]
    pub fn new(index_sync: IndexSync, notifier: Option<NotificationDispatcher>) -> Self {
        Self {
            index_sync,
            notifier,
        }
    }
}

#[async_trait::async_trait]
impl EffectHandler for PostCommitHandler {
    async fn handle(&self, effect: PostCommitEffect) -> Result<(), EffectError> {
        match effect {
            PostCommitEffect::ReindexPage { page_id } => {
                if let SyncOutcome::Indexed { comments } = self.index_sync.run(page_id).await? {
                    tracing::debug!(%page_id, comments, "reindex complete");
                }
                Ok(())
            }
            PostCommitEffect::NotifyNewComment {
                page_id,
                comment_id,
                content,
                author_email,
            } => match &self.notifier {
                Some(notifier) => notifier.notify(page_id, &content, &author_email).await,
                None => {
                    tracing::debug!(%page_id, %comment_id, "notifications disabled, skipping");
                    Ok(())
                }
            },
        }
    }
}

/// Effect counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EffectStats {
    /// Effects handed to the queue
    pub scheduled: u64,
    /// Effects that completed successfully
    pub succeeded: u64,
    /// Effects that returned an error or panicked
    pub failed: u64,
    /// Effects rejected because the queue was closed
    pub dropped: u64,
}

impl EffectStats {
    /// Effects accepted but not yet finished
    #[inline]
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.scheduled
            .saturating_sub(self.succeeded + self.failed + self.dropped)
    }
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    settled: Notify,
}

impl Counters {
    fn snapshot(&self) -> EffectStats {
        EffectStats {
            scheduled: self.scheduled.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
        }
    }

    fn settle(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
        self.settled.notify_waiters();
    }
}

/// Producer side of the effect queue
#[derive(Debug, Clone)]
pub struct EffectQueue {
    tx: mpsc::UnboundedSender<PostCommitEffect>,
    counters: Arc<Counters>,
}

impl EffectScheduler for EffectQueue {
    fn schedule(&self, effect: PostCommitEffect) {
        self.counters.scheduled.fetch_add(1, Ordering::SeqCst);
        let page_id = effect.page_id();
        let kind = effect.kind();
        if self.tx.send(effect).is_err() {
            tracing::error!(%page_id, effect = kind, "effect queue closed, effect dropped");
            self.counters.settle(&self.counters.dropped);
        }
    }
}

/// Background consumer of the effect queue
#[derive(Debug)]
pub struct EffectWorker {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
    counters: Arc<Counters>,
}

impl EffectWorker {
    /// Start the worker on the current tokio runtime
    ///
    /// At most `concurrency` effects run at once (minimum 1).
    #[must_use]
    pub fn spawn(handler: Arc<dyn EffectHandler>, concurrency: usize) -> (EffectQueue, EffectWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let shutdown = Arc::new(Notify::new());

        let handle = tokio::spawn(worker_loop(
            rx,
            handler,
            Arc::new(Semaphore::new(concurrency.max(1))),
            Arc::clone(&counters),
            Arc::clone(&shutdown),
        ));

        let queue = EffectQueue {
            tx,
            counters: Arc::clone(&counters),
        };
        (
            queue,
            EffectWorker {
                handle,
                shutdown,
                counters,
            },
        )
    }

    /// Current counters
    #[inline]
    #[must_use]
    pub fn stats(&self) -> EffectStats {
        self.counters.snapshot()
    }

    /// Wait until every effect scheduled so far has finished
    pub async fn wait_idle(&self) {
        loop {
            let settled = self.counters.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();
            if self.counters.snapshot().pending() == 0 {
                return;
            }
            settled.await;
        }
    }

    /// Stop accepting effects, run everything already queued, then stop
    pub async fn shutdown(self) -> EffectStats {
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "effect worker terminated abnormally");
        }
        self.counters.snapshot()
    }
}

async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<PostCommitEffect>,
    handler: Arc<dyn EffectHandler>,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
    shutdown: Arc<Notify>,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = shutdown.notified() => break,
            next = rx.recv() => match next {
                Some(effect) => {
                    dispatch(&mut tasks, effect, &handler, &permits, &counters).await;
                }
                None => break,
            },
        }
        while let Some(joined) = tasks.try_join_next() {
            record_panic(joined, &counters);
        }
    }

    rx.close();
    while let Some(effect) = rx.recv().await {
        dispatch(&mut tasks, effect, &handler, &permits, &counters).await;
    }
    while let Some(joined) = tasks.join_next().await {
        record_panic(joined, &counters);
    }
    tracing::info!(stats = ?counters.snapshot(), "effect worker stopped");
}

async fn dispatch(
    tasks: &mut JoinSet<()>,
    effect: PostCommitEffect,
    handler: &Arc<dyn EffectHandler>,
    permits: &Arc<Semaphore>,
    counters: &Arc<Counters>,
) {
    let Ok(permit) = Arc::clone(permits).acquire_owned().await else {
        return;
    };
    let handler = Arc::clone(handler);
    let counters = Arc::clone(counters);

    tasks.spawn(async move {
        let _permit = permit;
        let page_id = effect.page_id();
        let kind = effect.kind();
        match handler.handle(effect).await {
            Ok(()) => counters.settle(&counters.succeeded),
            Err(e) => {
                tracing::error!(%page_id, effect = kind, error = %e, "post-commit effect failed");
                counters.settle(&counters.failed);
            }
        }
    });
}

fn record_panic(joined: Result<(), tokio::task::JoinError>, counters: &Counters) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "post-commit effect panicked");
        counters.settle(&counters.failed);
    }
}
