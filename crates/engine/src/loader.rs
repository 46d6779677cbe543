//! Snapshot Loader - reads the most recent page of a user's inbox

use inbox_core::{Notification, UserId};
use inbox_ports::NotificationStore;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{InboxError, Result};

/// Fetches ordered snapshot pages, one at a time
///
/// A call made while another is in flight is rejected with
/// [`InboxError::LoadInFlight`] instead of issuing a duplicate query.
pub struct SnapshotLoader {
    store: Arc<dyn NotificationStore>,
    limit: usize,
    in_flight: Mutex<()>,
}

impl SnapshotLoader {
    pub fn new(store: Arc<dyn NotificationStore>, limit: usize) -> Self {
        Self {
            store,
            limit,
            in_flight: Mutex::new(()),
        }
    }

    /// Load the newest `limit` notifications of `user_id`, newest first.
    ///
    /// Errors are retryable and leave every caller-held state untouched.
    pub async fn load(&self, user_id: UserId) -> Result<Vec<Notification>> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| InboxError::LoadInFlight)?;

        debug!("Loading snapshot for {} (limit {})", user_id, self.limit);
        let mut rows = self.store.recent(user_id, self.limit).await?;

        rows.retain(|row| {
            if row.user_id == user_id {
                true
            } else {
                warn!("Snapshot returned row {} of another user", row.id);
                false
            }
        });
        rows.sort_by(Notification::display_order);
        rows.truncate(self.limit);

        debug!("Loaded {} notifications for {}", rows.len(), user_id);
        Ok(rows)
    }

    /// Returns true while a load is running
    pub fn is_loading(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inbox_clock::ManualClock;
    use inbox_core::{Metadata, NewNotification, Priority};
    use inbox_gateway::InMemoryBackend;
    use inbox_ports::BackendError;
    use std::time::Duration;
    use uuid::Uuid;

    fn seed(backend: &InMemoryBackend, clock: &ManualClock, user: UserId, count: usize) {
        for i in 0..count {
            backend.insert_silently(NewNotification {
                user_id: user,
                kind: "event".to_string(),
                title: format!("n{}", i),
                message: "body".to_string(),
                priority: Priority::Low,
                metadata: Metadata::new(),
            });
            clock.advance(chrono::Duration::seconds(1));
        }
    }

    #[tokio::test]
    async fn test_load_returns_newest_page() {
        let clock = ManualClock::new(None);
        let backend = Arc::new(InMemoryBackend::new(clock.clone()));
        let user = Uuid::from_u128(1);
        seed(&backend, &clock, user, 5);

        let loader = SnapshotLoader::new(backend, 3);
        let rows = loader.load(user).await.unwrap();
        let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["n4", "n3", "n2"]);
    }

    #[tokio::test]
    async fn test_concurrent_load_is_rejected() {
        let clock = ManualClock::new(None);
        let backend = Arc::new(InMemoryBackend::new(clock.clone()));
        let user = Uuid::from_u128(1);
        seed(&backend, &clock, user, 1);
        backend.pause_queries(user);

        let loader = Arc::new(SnapshotLoader::new(backend.clone(), 50));
        let first = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load(user).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(loader.is_loading());
        assert_eq!(loader.load(user).await, Err(InboxError::LoadInFlight));

        backend.resume_queries(user);
        let rows = first.await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!loader.is_loading());
        assert_eq!(backend.query_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_reported_as_backend_error() {
        let backend = Arc::new(InMemoryBackend::new(ManualClock::new(None)));
        backend.set_offline(true);

        let loader = SnapshotLoader::new(backend, 50);
        let err = loader.load(Uuid::from_u128(1)).await.unwrap_err();
        assert!(matches!(err, InboxError::Backend(BackendError::Unavailable(_))));
        assert!(!loader.is_loading());
    }
}
