//! New-comment notification
//!
//! Sends a fixed-template message to a single operational address. Page
//! watchers are not notified.

use crate::error::EffectError;
use cmt_core::{MailMessage, Mailer, Page, PageId, PageStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Public host used for deep links (e.g. `https://wiki.example.com`)
    pub host: String,
    /// Operational recipient
    pub recipient: String,
    /// Mail template identifier
    pub template: String,
    /// Maximum characters of comment body quoted in the message
    pub excerpt_chars: usize,
}

impl NotificationSettings {
    /// Create settings with the default template and excerpt length
    #[must_use]
    pub fn new(host: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            recipient: recipient.into(),
            template: "comment-new".to_owned(),
            excerpt_chars: 200,
        }
    }

    /// Deep link to a page
    #[must_use]
    pub fn page_link(&self, page: &Page) -> String {
        format!(
            "{}/{}/{}",
            self.host.trim_end_matches('/'),
            page.locale,
            page.path.trim_start_matches('/')
        )
    }
}

/// Composes and sends new-comment notifications
pub struct NotificationDispatcher {
    pages: Arc<dyn PageStore>,
    mailer: Arc<dyn Mailer>,
    settings: NotificationSettings,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    /// Create new dispatcher
    #[must_use]
    pub fn new(pages: Arc<dyn PageStore>, mailer: Arc<dyn Mailer>, settings: NotificationSettings) -> Self {
        Self {
            pages,
            mailer,
            settings,
        }
    }

    /// Settings in use
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    /// Notify the operational address about a new comment
    ///
    /// Sent once; no retry.
    ///
    /// # Errors
    /// `PageMissing` if the page is gone, or the page store / mailer failure
    #[tracing::instrument(name = "effect.notify", skip(self, content, author_email))]
    pub async fn notify(
        &self,
        page_id: PageId,
        content: &str,
        author_email: &str,
    ) -> Result<(), EffectError> {
        let page = self
            .pages
            .get_by_id(page_id)
            .await?
            .ok_or(EffectError::PageMissing(page_id))?;

        let message = self.compose(&page, content, author_email);
        self.mailer.send(message).await?;

        tracing::debug!(recipient = %self.settings.recipient, "comment notification sent");
        Ok(())
    }

    /// Build the notification message
    #[must_use]
    pub fn compose(&self, page: &Page, content: &str, author_email: &str) -> MailMessage {
        let link = self.settings.page_link(page);
        let excerpt = excerpt(content, self.settings.excerpt_chars);

        MailMessage {
            to: vec![self.settings.recipient.clone()],
            subject: format!("New comment on \"{}\"", page.title),
            template: self.settings.template.clone(),
            data: json!({
                "title": page.title,
                "authorEmail": author_email,
                "excerpt": excerpt,
                "link": link,
            }),
            text: format!(
                "{author_email} commented on \"{}\":\n\n{excerpt}\n\n{link}",
                page.title
            ),
        }
    }
}

fn excerpt(content: &str, max_chars: usize) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_owned();
    }
    let mut cut: String = trimmed.chars().take(max_chars).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}
