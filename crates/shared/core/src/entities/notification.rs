use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::Priority;
use crate::values::{Metadata, NotificationId, Timestamp, UserId};

/// A persisted inbox entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    /// Owner; never changes after creation
    pub user_id: UserId,
    /// Producer-defined tag ("event", "payment", ...)
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: Timestamp,
}

impl Notification {
    /// Inbox presentation order: newest first, id descending on equal timestamps
    pub fn display_order(a: &Notification, b: &Notification) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    }
}

/// A notification record before the backend assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewNotification {
    /// Materialize the record the way a backend insert would
    pub fn into_notification(self, id: NotificationId, created_at: Timestamp) -> Notification {
        Notification {
            id,
            user_id: self.user_id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            priority: self.priority,
            metadata: self.metadata,
            is_read: false,
            created_at,
        }
    }
}

/// Partial update. Only read state is writable from the client side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
}

impl NotificationPatch {
    pub fn mark_read() -> Self {
        Self {
            is_read: Some(true),
        }
    }

    /// Apply the patch to a record in place
    pub fn apply_to(&self, notification: &mut Notification) {
        if let Some(is_read) = self.is_read {
            notification.is_read = is_read;
        }
    }
}

/// Row filter for bulk updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFilter {
    pub user_id: UserId,
    /// Only rows with `is_read = false`
    pub unread_only: bool,
    /// Only rows with `created_at <= cutoff`
    pub created_at_or_before: Option<Timestamp>,
}

impl NotificationFilter {
    /// Unread rows of `user_id` that already existed at `cutoff`
    pub fn unread_as_of(user_id: UserId, cutoff: Timestamp) -> Self {
        Self {
            user_id,
            unread_only: true,
            created_at_or_before: Some(cutoff),
        }
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        notification.user_id == self.user_id
            && (!self.unread_only || !notification.is_read)
            && self
                .created_at_or_before
                .is_none_or(|cutoff| notification.created_at <= cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn sample(id: u128, secs: i64) -> Notification {
        NewNotification {
            user_id: Uuid::from_u128(7),
            kind: "event".to_string(),
            title: "Title".to_string(),
            message: "Message".to_string(),
            priority: Priority::Low,
            metadata: Metadata::new(),
        }
        .into_notification(
            Uuid::from_u128(id),
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        )
    }

    #[test]
    fn test_display_order_newest_first_then_id_desc() {
        let mut rows = vec![sample(1, 10), sample(3, 20), sample(2, 20)];
        rows.sort_by(Notification::display_order);
        let ids: Vec<u128> = rows.iter().map(|n| n.id.as_u128()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_filter_respects_cutoff_and_read_state() {
        let row = sample(1, 10);
        let filter = NotificationFilter::unread_as_of(row.user_id, row.created_at);
        assert!(filter.matches(&row));

        let later = NotificationFilter::unread_as_of(row.user_id, row.created_at - Duration::seconds(1));
        assert!(!later.matches(&row));

        let mut read = row.clone();
        read.is_read = true;
        assert!(!filter.matches(&read));

        let other_user = NotificationFilter::unread_as_of(Uuid::from_u128(8), row.created_at);
        assert!(!other_user.matches(&row));
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(sample(1, 0)).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["priority"], "low");
        assert_eq!(json["is_read"], false);
    }

    #[test]
    fn test_patch_applies_only_present_fields() {
        let mut row = sample(1, 0);
        NotificationPatch::default().apply_to(&mut row);
        assert!(!row.is_read);
        NotificationPatch::mark_read().apply_to(&mut row);
        assert!(row.is_read);
    }
}
