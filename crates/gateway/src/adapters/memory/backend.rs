//! In-memory notification table with per-user realtime channels and fault injection

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use inbox_core::{
    ChangeEvent, NewNotification, Notification, NotificationFilter, NotificationId,
    NotificationPatch, UserId,
};
use inbox_ports::{
    BackendError, BackendResult, ChangeFeed, ChangeStream, Clock, FeedError, NotificationStore,
};
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

use super::gate::Gate;
use super::stream::MemoryChangeStream;
use crate::error::GatewayError;
use crate::messages::realtime::decode_change;
use crate::transport::{Publisher, Topics, channel::ChannelPublisher};

/// Default per-user channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// In-memory notification table plus per-user realtime channels
///
/// Every successful write publishes the matching change event to the owner's
/// channel, like a database trigger feeding a realtime broadcaster.
pub struct InMemoryBackend {
    rows: DashMap<NotificationId, Notification>,
    channels: DashMap<UserId, ChannelPublisher<ChangeEvent>>,
    clock: Arc<dyn Clock>,
    channel_capacity: usize,
    offline: AtomicBool,
    revoked: DashSet<UserId>,
    query_gate: Gate,
    write_gate: Gate,
    queries: AtomicU64,
}

impl InMemoryBackend {
    /// Create an empty backend stamping rows with `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_channel_capacity(clock, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create with a custom realtime channel capacity
    pub fn with_channel_capacity(clock: Arc<dyn Clock>, channel_capacity: usize) -> Self {
        Self {
            rows: DashMap::new(),
            channels: DashMap::new(),
            clock,
            channel_capacity,
            offline: AtomicBool::new(false),
            revoked: DashSet::new(),
            query_gate: Gate::new(),
            write_gate: Gate::new(),
            queries: AtomicU64::new(0),
        }
    }

    // === Fault injection ===

    /// Fail every call (and every feed open) with `Unavailable` while set
    pub fn set_offline(&self, offline: bool) {
        info!("In-memory backend offline={}", offline);
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Reject `user_id`'s credentials and drop their live channel
    pub fn revoke(&self, user_id: UserId) {
        info!("Revoking credentials of {}", user_id);
        self.revoked.insert(user_id);
        self.disconnect(user_id);
    }

    /// Drop the realtime channel of `user_id`; open streams see a disconnect
    pub fn disconnect(&self, user_id: UserId) {
        if self.channels.remove(&user_id).is_some() {
            info!("Dropped realtime channel {}", Topics::notifications(&user_id));
        }
    }

    /// Hold `recent` calls for `user_id` until [`resume_queries`](Self::resume_queries)
    pub fn pause_queries(&self, user_id: UserId) {
        self.query_gate.pause(user_id);
    }

    pub fn resume_queries(&self, user_id: UserId) {
        self.query_gate.resume(user_id);
    }

    /// Hold `update`/`bulk_update` calls for `user_id` until resumed
    pub fn pause_writes(&self, user_id: UserId) {
        self.write_gate.pause(user_id);
    }

    pub fn resume_writes(&self, user_id: UserId) {
        self.write_gate.resume(user_id);
    }

    /// Push an arbitrary event to `user_id`'s channel (duplicates, reorders)
    pub async fn publish(&self, user_id: UserId, event: ChangeEvent) {
        self.emit(user_id, event).await;
    }

    /// Decode a realtime JSON payload and push it to `user_id`'s channel
    pub async fn publish_json(&self, user_id: UserId, json: &str) -> Result<(), GatewayError> {
        let event = decode_change(json)?;
        self.emit(user_id, event).await;
        Ok(())
    }

    // === Backend-side writes (trigger logic outside the engine) ===

    /// Insert a row without publishing, as if the event was emitted while
    /// nobody was listening
    pub fn insert_silently(&self, notification: NewNotification) -> Notification {
        let row = notification.into_notification(Uuid::new_v4(), self.clock.now());
        self.rows.insert(row.id, row.clone());
        row
    }

    /// Delete a row and publish the delete
    pub async fn delete(&self, id: NotificationId) -> Option<Notification> {
        let (_, row) = self.rows.remove(&id)?;
        self.emit(row.user_id, ChangeEvent::Delete(id)).await;
        Some(row)
    }

    // === Inspection ===

    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.rows.get(&id).map(|r| r.value().clone())
    }

    /// Rows of `user_id`, newest first
    pub fn rows_for(&self, user_id: UserId) -> Vec<Notification> {
        let mut rows: Vec<Notification> = self
            .rows
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by(Notification::display_order);
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of `recent` calls served so far
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of open streams on `user_id`'s channel
    pub fn subscriber_count(&self, user_id: UserId) -> usize {
        self.channels
            .get(&user_id)
            .map(|p| p.subscriber_count())
            .unwrap_or(0)
    }

    fn check_online(&self) -> BackendResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("backend offline".to_string()));
        }
        Ok(())
    }

    fn check(&self, user_id: UserId) -> BackendResult<()> {
        self.check_online()?;
        if self.revoked.contains(&user_id) {
            return Err(BackendError::Unauthorized(format!(
                "credentials of {} revoked",
                user_id
            )));
        }
        Ok(())
    }

    async fn emit(&self, user_id: UserId, event: ChangeEvent) {
        // Clone the sender out so no map guard is held across the await
        let Some(publisher) = self.channels.get(&user_id).map(|p| p.value().clone()) else {
            debug!("No channel for {}, dropping {:?}", user_id, event.operation());
            return;
        };
        match publisher.publish(&event).await {
            Ok(receivers) => debug!(
                "Published {:?} {} on {} to {} subscriber(s)",
                event.operation(),
                event.id(),
                Topics::notifications(&user_id),
                receivers
            ),
            Err(e) => debug!("Publish on {} skipped: {}", Topics::notifications(&user_id), e),
        }
    }
}

#[async_trait]
impl NotificationStore for InMemoryBackend {
    async fn recent(&self, user_id: UserId, limit: usize) -> BackendResult<Vec<Notification>> {
        self.query_gate.pass(user_id).await;
        self.check(user_id)?;
        self.queries.fetch_add(1, Ordering::SeqCst);

        let mut rows = self.rows_for(user_id);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn insert(&self, notification: NewNotification) -> BackendResult<Notification> {
        self.check(notification.user_id)?;
        let row = self.insert_silently(notification);
        self.emit(row.user_id, ChangeEvent::Insert(row.clone())).await;
        Ok(row)
    }

    async fn update(&self, id: NotificationId, patch: NotificationPatch) -> BackendResult<()> {
        let Some(user_id) = self.rows.get(&id).map(|r| r.user_id) else {
            // Matches zero rows, like an UPDATE ... WHERE id = ? on a missing key
            return self.check_online();
        };
        self.write_gate.pass(user_id).await;
        self.check(user_id)?;

        let updated = self.rows.get_mut(&id).map(|mut row| {
            patch.apply_to(&mut row);
            row.clone()
        });
        if let Some(row) = updated {
            self.emit(user_id, ChangeEvent::Update(row)).await;
        }
        Ok(())
    }

    async fn bulk_update(
        &self,
        filter: NotificationFilter,
        patch: NotificationPatch,
    ) -> BackendResult<u64> {
        self.write_gate.pass(filter.user_id).await;
        self.check(filter.user_id)?;

        let mut changed = Vec::new();
        for mut row in self.rows.iter_mut() {
            if filter.matches(&row) {
                patch.apply_to(&mut row);
                changed.push(row.clone());
            }
        }

        let count = changed.len() as u64;
        for row in changed {
            self.emit(filter.user_id, ChangeEvent::Update(row)).await;
        }
        Ok(count)
    }
}

#[async_trait]
impl ChangeFeed for InMemoryBackend {
    async fn open(&self, user_id: UserId) -> Result<Box<dyn ChangeStream>, FeedError> {
        self.check(user_id).map_err(|e| match e {
            BackendError::Unauthorized(reason) => FeedError::Unauthorized(reason),
            other => FeedError::Unavailable(other.to_string()),
        })?;

        let subscriber = self
            .channels
            .entry(user_id)
            .or_insert_with(|| ChannelPublisher::new(self.channel_capacity))
            .subscribe();
        debug!(
            "Opened stream on {} ({})",
            Topics::notifications(&user_id),
            Topics::owner_filter(&user_id)
        );

        Ok(Box::new(MemoryChangeStream::new(user_id, subscriber)))
    }
}
