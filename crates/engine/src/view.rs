//! Read-only state published to observers

use inbox_core::{Notification, NotificationId, UserId};

use crate::reconciler::Reconciler;

/// Immutable picture of the inbox at one point in time
///
/// The unread count is derived from the same reconciler state as the list,
/// never tracked separately.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboxView {
    /// Owner of the session that produced this view, `None` when signed out
    pub user_id: Option<UserId>,
    /// Newest first
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

impl InboxView {
    pub fn from_reconciler(reconciler: &Reconciler) -> Self {
        Self {
            user_id: Some(reconciler.user_id()),
            notifications: reconciler.ordered().to_vec(),
            unread_count: reconciler.unread_count(),
        }
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: NotificationId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

/// Lifecycle of a session as seen by observers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session
    #[default]
    Idle,
    /// Session created, change stream not open yet
    Connecting,
    /// Change stream open
    Live,
    /// Change stream dropped; resubscribing
    Reconnecting,
    /// Credentials rejected; state discarded
    Revoked,
}
