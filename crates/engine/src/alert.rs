//! Alert policy - decides which deliveries surface as one-shot alerts
//!
//! Per id the state only ever moves forward within a session:
//!
//! ```text
//! unseen ──(high/urgent insert or update)──► alerted
//! ```
//!
//! `alerted` is terminal until the session is rebuilt. Snapshot loads never
//! consult the dispatcher.

use inbox_core::{Alert, Notification, NotificationId};
use log::debug;
use std::collections::HashSet;

/// Session-scoped alert deduplication
#[derive(Debug, Default)]
pub struct AlertDispatcher {
    alerted: HashSet<NotificationId>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether the merged state of a streamed notification fires an alert
    pub fn consider(&mut self, notification: &Notification) -> Option<Alert> {
        if !notification.priority.is_alerting() || !self.alerted.insert(notification.id) {
            return None;
        }
        debug!(
            "Alerting {} ({})",
            notification.id, notification.priority
        );
        Some(Alert::from(notification))
    }

    pub fn has_alerted(&self, id: NotificationId) -> bool {
        self.alerted.contains(&id)
    }
}
