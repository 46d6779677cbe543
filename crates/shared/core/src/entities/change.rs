use serde::{Deserialize, Serialize};

use super::Notification;
use crate::values::{NotificationId, UserId};

/// Kind of row change pushed by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// A single change-stream delivery
///
/// Deliveries are at-least-once and carry no ordering guarantee, so every
/// consumer must treat them as idempotent facts rather than a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "record", rename_all = "lowercase")]
pub enum ChangeEvent {
    Insert(Notification),
    Update(Notification),
    /// Deletes only carry the id of the removed row
    Delete(NotificationId),
}

impl ChangeEvent {
    pub fn operation(&self) -> ChangeOperation {
        match self {
            ChangeEvent::Insert(_) => ChangeOperation::Insert,
            ChangeEvent::Update(_) => ChangeOperation::Update,
            ChangeEvent::Delete(_) => ChangeOperation::Delete,
        }
    }

    /// Id of the affected notification
    pub fn id(&self) -> NotificationId {
        match self {
            ChangeEvent::Insert(n) | ChangeEvent::Update(n) => n.id,
            ChangeEvent::Delete(id) => *id,
        }
    }

    /// Owner of the record, when the event carries one
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            ChangeEvent::Insert(n) | ChangeEvent::Update(n) => Some(n.user_id),
            ChangeEvent::Delete(_) => None,
        }
    }

    pub fn record(&self) -> Option<&Notification> {
        match self {
            ChangeEvent::Insert(n) | ChangeEvent::Update(n) => Some(n),
            ChangeEvent::Delete(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_delete_wire_shape() {
        let id = Uuid::from_u128(42);
        let json = serde_json::to_value(ChangeEvent::Delete(id)).unwrap();
        assert_eq!(json["operation"], "delete");
        assert_eq!(json["record"], id.to_string());

        let back: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.id(), id);
        assert_eq!(back.operation(), ChangeOperation::Delete);
        assert!(back.user_id().is_none());
    }
}
