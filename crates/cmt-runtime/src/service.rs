//! Service assembly
//!
//! Wires the provider registry, orchestrator and effect worker from a
//! [`CommentsConfig`] and the host's collaborators.

use crate::config::{CommentsConfig, ConfigError};
use cmt_core::{
    AuthorizationGate, Clock, CommentOrchestrator, CommentProvider, Mailer, PageStore,
    ProviderError, SearchIndex,
};
use cmt_effects::{
    EffectStats, EffectWorker, IndexSync, NotificationDispatcher, PostCommitHandler,
};
use cmt_storage::ProviderRegistry;
use std::sync::Arc;

/// Service assembly errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configured provider cannot be activated
    #[error("provider selection failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Collaborators supplied by the host application
#[derive(Clone)]
pub struct Collaborators {
    /// Page persistence
    pub pages: Arc<dyn PageStore>,
    /// Permission checks
    pub gate: Arc<dyn AuthorizationGate>,
    /// Search engine
    pub search: Arc<dyn SearchIndex>,
    /// Outgoing mail
    pub mailer: Arc<dyn Mailer>,
    /// Timestamp source for the built-in provider
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// A running comment service
pub struct CommentService {
    orchestrator: CommentOrchestrator,
    provider: Arc<dyn CommentProvider>,
    provider_key: String,
    worker: EffectWorker,
}

impl std::fmt::Debug for CommentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentService")
            .field("provider_key", &self.provider_key)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

impl CommentService {
    /// Build with the built-in provider registry
    ///
    /// Must be called inside a tokio runtime; the effect worker is spawned here.
    ///
    /// # Errors
    /// Invalid configuration or an unknown/disabled provider key
    pub fn from_config(
        config: &CommentsConfig,
        collaborators: Collaborators,
    ) -> Result<Self, ServiceError> {
        let registry = ProviderRegistry::with_defaults(Arc::clone(&collaborators.clock));
        Self::with_registry(config, collaborators, registry)
    }

    /// Build with a caller-populated provider registry
    ///
    /// # Errors
    /// Invalid configuration or an unknown/disabled provider key
    pub fn with_registry(
        config: &CommentsConfig,
        collaborators: Collaborators,
        mut registry: ProviderRegistry,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        registry.activate(&config.provider.active)?;
        let provider = registry.active()?;

        let index_sync = IndexSync::new(
            Arc::clone(&provider),
            Arc::clone(&collaborators.pages),
            Arc::clone(&collaborators.search),
        );
        let notifier = config.notification_settings().map(|settings| {
            NotificationDispatcher::new(
                Arc::clone(&collaborators.pages),
                Arc::clone(&collaborators.mailer),
                settings,
            )
        });
        let handler = PostCommitHandler::new(index_sync, notifier);
        let (queue, worker) = EffectWorker::spawn(Arc::new(handler), config.effects.concurrency);

        let orchestrator = CommentOrchestrator::new(
            Arc::clone(&provider),
            collaborators.pages,
            collaborators.gate,
            Arc::new(queue),
        );

        tracing::info!(
            provider = %config.provider.active,
            concurrency = config.effects.concurrency,
            notifications = config.notifications.enabled,
            "comment service started"
        );

        Ok(Self {
            orchestrator,
            provider,
            provider_key: config.provider.active.clone(),
            worker,
        })
    }

    /// Lifecycle entry points
    #[inline]
    #[must_use]
    pub fn orchestrator(&self) -> &CommentOrchestrator {
        &self.orchestrator
    }

    /// Active storage backend
    #[inline]
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn CommentProvider> {
        &self.provider
    }

    /// Registry key of the active backend
    #[inline]
    #[must_use]
    pub fn provider_key(&self) -> &str {
        &self.provider_key
    }

    /// Effect counters so far
    #[inline]
    #[must_use]
    pub fn effect_stats(&self) -> EffectStats {
        self.worker.stats()
    }

    /// Wait for every scheduled effect to finish
    pub async fn wait_idle(&self) {
        self.worker.wait_idle().await;
    }

    /// Drain pending effects and stop the worker
    pub async fn shutdown(self) -> EffectStats {
        let stats = self.worker.shutdown().await;
        tracing::info!(?stats, "comment service stopped");
        stats
    }
}
