//! Mutation Gateway - user-initiated writes
//!
//! Read marks are applied to the reconciler first and then sent to the
//! backend. A backend failure is reported to the caller but never rolled
//! back locally. New notifications are only inserted remotely; they enter the
//! inbox when the change stream delivers them.

use inbox_core::{
    Metadata, NewNotification, NotificationFilter, NotificationId, NotificationPatch, Priority,
    UserId,
};
use log::{debug, info, warn};
use std::sync::Arc;

use crate::error::{Result, ValidationError};
use crate::session::SessionCore;

/// Raw create command as received from the UI layer
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub message: String,
    /// Validated against the four known levels before anything is sent
    pub priority: String,
    pub metadata: Metadata,
}

impl CreateRequest {
    pub fn new(
        user_id: UserId,
        kind: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        priority: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind: kind.into(),
            title: title.into(),
            message: message.into(),
            priority: priority.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    fn validate(self) -> std::result::Result<NewNotification, ValidationError> {
        let priority: Priority = self.priority.parse()?;
        Ok(NewNotification {
            user_id: self.user_id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            priority,
            metadata: self.metadata,
        })
    }
}

/// Write commands bound to one session
///
/// Cheap to clone. Once the session ends every command fails with
/// [`ValidationError::NoSession`].
#[derive(Clone)]
pub struct MutationGateway {
    core: Arc<SessionCore>,
}

impl MutationGateway {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    pub fn user_id(&self) -> UserId {
        self.core.user_id()
    }

    /// Mark one notification read locally, then persist it
    pub async fn mark_as_read(&self, id: NotificationId) -> Result<()> {
        self.core
            .update_inbox(|inbox| inbox.reconciler.mark_read(id))?;

        match self
            .core
            .store()
            .update(id, NotificationPatch::mark_read())
            .await
        {
            Ok(()) => {
                debug!("Persisted read mark on {}", id);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to persist read mark on {}: {}", id, e);
                self.core.handle_backend_error(&e);
                Err(e.into())
            }
        }
    }

    /// Mark everything currently known read, then persist it for rows created
    /// up to now. Returns the number of rows the backend changed.
    pub async fn mark_all_as_read(&self) -> Result<u64> {
        let cutoff = self.core.clock().now();
        let marked = self
            .core
            .update_inbox(|inbox| inbox.reconciler.mark_all_read())?;
        info!(
            "Marked {} notifications read for {} (cutoff {})",
            marked.len(),
            self.core.user_id(),
            cutoff
        );

        let filter = NotificationFilter::unread_as_of(self.core.user_id(), cutoff);
        match self
            .core
            .store()
            .bulk_update(filter, NotificationPatch::mark_read())
            .await
        {
            Ok(changed) => {
                debug!("Backend marked {} rows read", changed);
                Ok(changed)
            }
            Err(e) => {
                warn!("Failed to persist mark-all-read: {}", e);
                self.core.handle_backend_error(&e);
                Err(e.into())
            }
        }
    }

    /// Insert a notification on the backend and return its id
    pub async fn create(&self, request: CreateRequest) -> Result<NotificationId> {
        self.core.ensure_open()?;
        let notification = request.validate()?;
        if notification.user_id != self.core.user_id() {
            debug!(
                "Creating notification for {} from session of {}",
                notification.user_id,
                self.core.user_id()
            );
        }

        match self.core.store().insert(notification).await {
            Ok(row) => {
                info!("Created notification {} ({})", row.id, row.priority);
                Ok(row.id)
            }
            Err(e) => {
                warn!("Failed to create notification: {}", e);
                self.core.handle_backend_error(&e);
                Err(e.into())
            }
        }
    }
}
