use async_trait::async_trait;
use inbox_core::{
    NewNotification, Notification, NotificationFilter, NotificationId, NotificationPatch, UserId,
};

use crate::error::BackendResult;

/// Port for the backend notification table
///
/// Implementations decide transport and storage; the engine only relies on
/// these four calls.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Most recent `limit` rows of `user_id`, ordered by `created_at` descending
    async fn recent(&self, user_id: UserId, limit: usize) -> BackendResult<Vec<Notification>>;

    /// Insert a record; the backend assigns id and `created_at`
    async fn insert(&self, notification: NewNotification) -> BackendResult<Notification>;

    /// Patch a single row
    async fn update(&self, id: NotificationId, patch: NotificationPatch) -> BackendResult<()>;

    /// Patch every row matching `filter`, returning the number of rows changed
    async fn bulk_update(
        &self,
        filter: NotificationFilter,
        patch: NotificationPatch,
    ) -> BackendResult<u64>;
}
