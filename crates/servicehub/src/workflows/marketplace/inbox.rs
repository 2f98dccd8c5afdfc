use tracing::info;

use super::directory::Directory;
use super::domain::{Actor, Notification, NotificationId};
use super::notifications::Notifier;
use super::repository::{MarketplaceRepository, NotificationRepository, RepositoryError};
use super::service::{MarketplaceError, MarketplaceService};

impl<R, D, N> MarketplaceService<R, D, N>
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    /// The actor's notifications, newest first.
    pub fn list_notifications(
        &self,
        actor: &Actor,
        unread_only: bool,
    ) -> Result<Vec<Notification>, MarketplaceError> {
        let mut notifications = self.repository.notifications_for(&actor.id, unread_only)?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(notifications)
    }

    pub fn mark_notification_read(
        &self,
        actor: &Actor,
        notification_id: &NotificationId,
    ) -> Result<Notification, MarketplaceError> {
        match self.repository.mark_read(notification_id, &actor.id) {
            Ok(notification) => Ok(notification),
            Err(RepositoryError::NotFound) => Err(MarketplaceError::not_found(
                "notification",
                notification_id.as_str(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    pub fn mark_all_notifications_read(&self, actor: &Actor) -> Result<usize, MarketplaceError> {
        let updated = self.repository.mark_all_read(&actor.id)?;
        info!(recipient = %actor.id, updated, "notifications marked as read");
        Ok(updated)
    }
}
