use async_trait::async_trait;

use crate::error::AppResult;
use crate::keys::Key;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    EventInvitation,
    EventUpdated,
    RsvpAdded,
    ThreadInvitation,
    NewMessage,
    IdentityMerged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::EventInvitation => "event_invitation",
            NotificationKind::EventUpdated => "event_updated",
            NotificationKind::RsvpAdded => "rsvp_added",
            NotificationKind::ThreadInvitation => "thread_invitation",
            NotificationKind::NewMessage => "new_message",
            NotificationKind::IdentityMerged => "identity_merged",
        }
    }
}

/// A "notify these users of this change" request handed to the external
/// mailer after a successful mutation.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipients: Vec<Key>,
    pub subject: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, recipients: Vec<Key>, subject: &str) -> Self {
        Self {
            kind,
            recipients,
            subject: subject.to_string(),
        }
    }
}

/// Outbound notification channel. Delivery is asynchronous and best-effort;
/// implementations must not assume the triggering mutation can be rolled
/// back.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> AppResult<()>;
}

/// Notifier for local development and tests: logs instead of mailing.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> AppResult<()> {
        tracing::info!(
            kind = notification.kind.as_str(),
            recipients = notification.recipients.len(),
            subject = %notification.subject,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Fires a notification after a successful mutation. Failures are logged
/// and swallowed: notification delivery never rolls a mutation back.
pub(crate) async fn dispatch(state: &AppState, notification: Notification) {
    if !state.config.notifications_enabled || notification.recipients.is_empty() {
        return;
    }
    if let Err(err) = state.notifier.notify(&notification).await {
        tracing::warn!(
            error = %err,
            kind = notification.kind.as_str(),
            "notification delivery failed"
        );
    }
}
