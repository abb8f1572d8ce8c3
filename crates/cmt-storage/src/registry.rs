//! Provider registry
//!
//! Provides [`ProviderRegistry`] for managing named comment backends and
//! selecting the active one.

use crate::memory::MemoryCommentStore;
use cmt_core::{Clock, CommentProvider, ProviderError};
use std::collections::BTreeMap;
use std::sync::Arc;

struct ProviderEntry {
    provider: Arc<dyn CommentProvider>,
    enabled: bool,
}

/// Registry of comment providers keyed by name
///
/// Exactly one provider is active at a time; only enabled providers can be
/// activated.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderEntry>,
    active: Option<String>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.keys())
            .field("active", &self.active)
            .finish()
    }
}

impl ProviderRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with the built-in table backend registered and active
    #[must_use]
    pub fn with_defaults(clock: Arc<dyn Clock>) -> Self {
        let mut registry = Self::new();
        registry.register(
            MemoryCommentStore::KEY,
            Arc::new(MemoryCommentStore::with_clock(clock)),
        );
        registry.active = Some(MemoryCommentStore::KEY.to_owned());
        registry
    }

    /// Register (or replace) an enabled provider
    pub fn register(&mut self, key: &str, provider: Arc<dyn CommentProvider>) {
        self.providers.insert(
            key.to_owned(),
            ProviderEntry {
                provider,
                enabled: true,
            },
        );
    }

    /// Enable or disable a provider
    ///
    /// Disabling the active provider clears the active selection.
    ///
    /// # Errors
    /// `ProviderError::Unavailable` for an unknown key
    pub fn set_enabled(&mut self, key: &str, enabled: bool) -> Result<(), ProviderError> {
        let entry = self
            .providers
            .get_mut(key)
            .ok_or_else(|| ProviderError::Unavailable(format!("unknown provider '{key}'")))?;
        entry.enabled = enabled;
        if !enabled && self.active.as_deref() == Some(key) {
            tracing::warn!(provider = key, "active comment provider disabled");
            self.active = None;
        }
        Ok(())
    }

    /// Select the active provider
    ///
    /// # Errors
    /// `ProviderError::Unavailable` for an unknown or disabled key
    pub fn activate(&mut self, key: &str) -> Result<(), ProviderError> {
        match self.providers.get(key) {
            Some(entry) if entry.enabled => {
                tracing::info!(provider = key, "comment provider activated");
                self.active = Some(key.to_owned());
                Ok(())
            }
            Some(_) => Err(ProviderError::Unavailable(format!(
                "provider '{key}' is disabled"
            ))),
            None => Err(ProviderError::Unavailable(format!(
                "unknown provider '{key}'"
            ))),
        }
    }

    /// The active provider
    ///
    /// # Errors
    /// `ProviderError::Unavailable` when no provider is active
    pub fn active(&self) -> Result<Arc<dyn CommentProvider>, ProviderError> {
        self.active
            .as_ref()
            .and_then(|key| self.providers.get(key))
            .map(|entry| Arc::clone(&entry.provider))
            .ok_or_else(|| ProviderError::Unavailable("no active comment provider".into()))
    }

    /// Key of the active provider
    #[inline]
    #[must_use]
    pub fn active_key(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Look up a provider by key regardless of activation
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<dyn CommentProvider>> {
        self.providers.get(key).map(|entry| Arc::clone(&entry.provider))
    }

    /// Registered keys in name order
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Number of registered providers
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no providers are registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
