use chrono::Utc;
use citadel_types::models::{Notification, NotificationKind, NOTIFICATION_CAP};
use tracing::debug;

use crate::{SocialError, SocialGraph};

/// Coarse timestamp plus a random suffix: probabilistically unique within a
/// user's log, time-ordered for presentation.
fn notification_id() -> String {
    format!("{}-{:08x}", Utc::now().timestamp_millis(), rand::random::<u32>())
}

impl SocialGraph {
    /// Append a notification to `target`'s log. An absent target is a silent
    /// no-op rather than an error: the record may have gone away concurrently.
    /// Returns the stored notification when one was written.
    pub async fn push_notification(
        &self,
        target: &str,
        kind: NotificationKind,
        from: &str,
        body: Option<String>,
    ) -> Result<Option<Notification>, SocialError> {
        let notification = Notification {
            id: notification_id(),
            kind,
            from: from.to_lowercase(),
            body,
            created_at: Utc::now(),
            read: false,
        };

        let stored = notification.clone();
        let committed = self
            .mutate_user(target, move |user| {
                user.notifications.insert(0, stored.clone());
                user.notifications.truncate(NOTIFICATION_CAP);
            })
            .await?;

        if committed.is_none() {
            debug!("dropped notification for absent user {target}");
            return Ok(None);
        }
        Ok(Some(notification))
    }

    /// Newest-first, as stored.
    pub async fn notifications(&self, username: &str) -> Result<Vec<Notification>, SocialError> {
        Ok(self.read_user(username).await?.notifications)
    }

    pub async fn unread_count(&self, username: &str) -> Result<usize, SocialError> {
        Ok(self.read_user(username).await?.unread_count())
    }

    /// Flip every entry to read. Irreversible; there is no mark-unread.
    pub async fn mark_all_read(&self, username: &str) -> Result<(), SocialError> {
        self.mutate_user(username, |user| {
            for n in user.notifications.iter_mut() {
                n.read = true;
            }
        })
        .await?
        .ok_or_else(|| SocialError::UnknownUser(username.to_lowercase()))?;
        Ok(())
    }
}
