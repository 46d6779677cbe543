use serde::{Deserialize, Serialize};

use super::{Notification, Priority};
use crate::values::NotificationId;

/// One-shot, ephemeral surfacing of a qualifying notification.
/// Distinct from the persistent inbox entry it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub notification_id: NotificationId,
    pub title: String,
    pub message: String,
    pub priority: Priority,
}

impl From<&Notification> for Alert {
    fn from(n: &Notification) -> Self {
        Self {
            notification_id: n.id,
            title: n.title.clone(),
            message: n.message.clone(),
            priority: n.priority,
        }
    }
}
