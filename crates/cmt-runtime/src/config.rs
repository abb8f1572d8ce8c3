//! Service configuration
//!
//! Loaded from TOML; every field has a default so an empty document is valid.

use cmt_core::validation::is_valid_email;
use cmt_effects::NotificationSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that failed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse into the config schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is not acceptable
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentsConfig {
    /// Public host used for deep links
    pub host: String,
    /// Notification settings
    pub notifications: NotificationConfig,
    /// Provider selection
    pub provider: ProviderConfig,
    /// Effect worker settings
    pub effects: EffectsConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:3000".to_owned(),
            notifications: NotificationConfig::default(),
            provider: ProviderConfig::default(),
            effects: EffectsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// `[notifications]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Send new-comment notifications at all
    pub enabled: bool,
    /// Operational recipient
    pub recipient: String,
    /// Mail template identifier
    pub template: String,
    /// Characters of comment body quoted in the message
    pub excerpt_chars: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recipient: "comments@example.com".to_owned(),
            template: "comment-new".to_owned(),
            excerpt_chars: 200,
        }
    }
}

/// `[provider]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Registry key of the active backend
    pub active: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            active: "default".to_owned(),
        }
    }
}

/// `[effects]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Max effects running at once
    pub concurrency: usize,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `CMT_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}

impl CommentsConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// `Parse` on malformed TOML, `Invalid` if validation fails
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// `Io` if the file cannot be read, otherwise as [`Self::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    /// `Invalid` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "host",
                reason: format!("'{}' is not an http(s) URL", self.host),
            });
        }
        if self.notifications.enabled && !is_valid_email(&self.notifications.recipient) {
            return Err(ConfigError::Invalid {
                field: "notifications.recipient",
                reason: format!("'{}' is not a valid email", self.notifications.recipient),
            });
        }
        if self.provider.active.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "provider.active",
                reason: "must not be empty".to_owned(),
            });
        }
        if self.effects.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "effects.concurrency",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    /// With host
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// With notification recipient
    #[inline]
    #[must_use]
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.notifications.recipient = recipient.into();
        self
    }

    /// With notifications switched on or off
    #[inline]
    #[must_use]
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications.enabled = enabled;
        self
    }

    /// With active provider key
    #[inline]
    #[must_use]
    pub fn with_provider(mut self, key: impl Into<String>) -> Self {
        self.provider.active = key.into();
        self
    }

    /// With effect concurrency
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.effects.concurrency = concurrency;
        self
    }

    /// Notification settings, if notifications are enabled
    #[must_use]
    pub fn notification_settings(&self) -> Option<NotificationSettings> {
        self.notifications.enabled.then(|| NotificationSettings {
            host: self.host.clone(),
            recipient: self.notifications.recipient.clone(),
            template: self.notifications.template.clone(),
            excerpt_chars: self.notifications.excerpt_chars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = CommentsConfig::from_toml_str("").unwrap();
        assert_eq!(config, CommentsConfig::default());
        assert_eq!(config.effects.concurrency, 4);
        assert_eq!(config.provider.active, "default");
    }

    #[test]
    fn parses_full_document() {
        let config = CommentsConfig::from_toml_str(
            r#"
            host = "https://wiki.example.com"

            [notifications]
            enabled = true
            recipient = "ops@example.com"
            excerpt_chars = 80

            [effects]
            concurrency = 2

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.host, "https://wiki.example.com");
        assert_eq!(config.notifications.recipient, "ops@example.com");
        assert_eq!(config.notifications.template, "comment-new");
        assert_eq!(config.notifications.excerpt_chars, 80);
        assert_eq!(config.effects.concurrency, 2);
        assert!(config.logging.json);
    }

    #[test]
    fn rejects_bad_values() {
        let err = CommentsConfig::from_toml_str("host = \"wiki.example.com\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "host", .. }));

        let err = CommentsConfig::from_toml_str("[effects]\nconcurrency = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "effects.concurrency", .. }));

        let err = CommentsConfig::from_toml_str("[notifications]\nrecipient = \"nobody\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "notifications.recipient", .. }));

        let err = CommentsConfig::from_toml_str("host = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn disabled_notifications_skip_recipient_check() {
        let config = CommentsConfig::from_toml_str(
            "[notifications]\nenabled = false\nrecipient = \"\"",
        )
        .unwrap();
        assert!(config.notification_settings().is_none());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[provider]\nactive = \"archive\"").unwrap();

        let config = CommentsConfig::load(file.path()).unwrap();
        assert_eq!(config.provider.active, "archive");

        let err = CommentsConfig::load("/nonexistent/cmt.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn builders_feed_notification_settings() {
        let config = CommentsConfig::new()
            .with_host("https://docs.example.org")
            .with_recipient("team@example.org")
            .with_concurrency(8);
        config.validate().unwrap();

        let settings = config.notification_settings().unwrap();
        assert_eq!(settings.host, "https://docs.example.org");
        assert_eq!(settings.recipient, "team@example.org");
        assert_eq!(settings.excerpt_chars, 200);
    }
}
