//! Change Stream Subscriber - keeps one live change stream per session
//!
//! Opens the per-user feed, pumps deliveries into a [`ChangeHandler`], and
//! on any disconnect drops the old stream, reopens with capped exponential
//! backoff and reports the reconnect so the owner can re-read what was missed.

use inbox_core::{ChangeEvent, UserId};
use inbox_ports::{ChangeFeed, ChangeStream, FeedError};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::InboxConfig;

/// Receiver of stream activity
///
/// Callbacks run on the pump task and must not block.
pub trait ChangeHandler: Send + Sync + 'static {
    /// A delivery arrived (possibly a duplicate, possibly out of order)
    fn on_change(&self, event: ChangeEvent);

    /// A stream is open. `reconnect` is true for every open after the first
    /// attempt, when events may have been missed.
    fn on_connected(&self, reconnect: bool) {
        let _ = reconnect;
    }

    /// The stream dropped and a reconnect is scheduled
    fn on_disconnected(&self, error: &FeedError) {
        let _ = error;
    }

    /// Credentials were rejected; the subscriber has stopped
    fn on_revoked(&self, reason: &str);
}

/// Opens change streams for sessions
pub struct ChangeStreamSubscriber {
    feed: Arc<dyn ChangeFeed>,
    config: InboxConfig,
}

impl ChangeStreamSubscriber {
    pub fn new(feed: Arc<dyn ChangeFeed>, config: InboxConfig) -> Self {
        Self { feed, config }
    }

    /// Subscribe `handler` to `user_id`'s changes.
    ///
    /// The first open is attempted before returning, so events emitted after
    /// this call resolves are not lost to a snapshot taken right after it.
    pub async fn subscribe(
        &self,
        user_id: UserId,
        handler: Arc<dyn ChangeHandler>,
    ) -> SubscriptionHandle {
        let initial = match self.feed.open(user_id).await {
            Ok(stream) => {
                info!("Change stream open for {}", user_id);
                handler.on_connected(false);
                Some(stream)
            }
            Err(FeedError::Unauthorized(reason)) => {
                warn!("Change stream for {} refused: {}", user_id, reason);
                handler.on_revoked(&reason);
                return SubscriptionHandle::closed(user_id);
            }
            Err(e) => {
                warn!("Change stream for {} failed to open: {}", user_id, e);
                handler.on_disconnected(&e);
                None
            }
        };

        let pump = StreamPump {
            feed: self.feed.clone(),
            user_id,
            handler,
            config: self.config.clone(),
        };
        let task = tokio::spawn(pump.run(initial));

        SubscriptionHandle {
            user_id,
            task: Mutex::new(Some(task)),
        }
    }
}

struct StreamPump {
    feed: Arc<dyn ChangeFeed>,
    user_id: UserId,
    handler: Arc<dyn ChangeHandler>,
    config: InboxConfig,
}

impl StreamPump {
    async fn run(self, mut stream: Option<Box<dyn ChangeStream>>) {
        let mut attempt: u32 = 0;
        loop {
            let mut current = match stream.take() {
                Some(s) => s,
                None => match self.reopen(attempt).await {
                    Ok(s) => {
                        attempt = 0;
                        s
                    }
                    Err(FeedError::Unauthorized(reason)) => {
                        warn!("Resubscribe for {} refused: {}", self.user_id, reason);
                        self.handler.on_revoked(&reason);
                        return;
                    }
                    Err(e) => {
                        warn!(
                            "Resubscribe attempt {} for {} failed: {}",
                            attempt + 1,
                            self.user_id,
                            e
                        );
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                },
            };

            loop {
                match current.next().await {
                    Ok(event) => {
                        debug!("{:?} {} for {}", event.operation(), event.id(), self.user_id);
                        self.handler.on_change(event);
                    }
                    Err(FeedError::Unauthorized(reason)) => {
                        warn!("Change stream for {} revoked: {}", self.user_id, reason);
                        self.handler.on_revoked(&reason);
                        return;
                    }
                    Err(e) => {
                        warn!("Change stream for {} dropped: {}", self.user_id, e);
                        self.handler.on_disconnected(&e);
                        break;
                    }
                }
            }

            // The old stream is closed before a new one is opened, so two
            // subscriptions never deliver at the same time
            drop(current);
        }
    }

    async fn reopen(&self, attempt: u32) -> Result<Box<dyn ChangeStream>, FeedError> {
        tokio::time::sleep(self.config.reconnect_backoff(attempt)).await;
        let stream = self.feed.open(self.user_id).await?;
        info!("Change stream reopened for {}", self.user_id);
        self.handler.on_connected(true);
        Ok(stream)
    }
}

/// Owner's handle on a running subscription
///
/// Dropping the handle stops the subscription as well.
pub struct SubscriptionHandle {
    user_id: UserId,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionHandle {
    fn closed(user_id: UserId) -> Self {
        Self {
            user_id,
            task: Mutex::new(None),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns true while the pump task is running
    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the subscription without waiting for the pump to wind down
    pub fn abort(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// Stop the subscription and wait until no callback can run anymore.
    /// Safe to call any number of times.
    pub async fn unsubscribe(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            // Cancelled or already finished; either way the stream is dropped
            let _ = task.await;
            debug!("Unsubscribed change stream of {}", self.user_id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inbox_clock::ManualClock;
    use inbox_core::{Metadata, NewNotification, Priority};
    use inbox_gateway::InMemoryBackend;
    use inbox_ports::NotificationStore;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Change(ChangeEvent),
        Connected(bool),
        Disconnected,
        Revoked,
    }

    struct Recorder(mpsc::UnboundedSender<Seen>);

    impl ChangeHandler for Recorder {
        fn on_change(&self, event: ChangeEvent) {
            let _ = self.0.send(Seen::Change(event));
        }
        fn on_connected(&self, reconnect: bool) {
            let _ = self.0.send(Seen::Connected(reconnect));
        }
        fn on_disconnected(&self, _error: &FeedError) {
            let _ = self.0.send(Seen::Disconnected);
        }
        fn on_revoked(&self, _reason: &str) {
            let _ = self.0.send(Seen::Revoked);
        }
    }

    fn fast_config() -> InboxConfig {
        InboxConfig {
            reconnect_backoff_initial_ms: 1,
            reconnect_backoff_max_ms: 5,
            ..Default::default()
        }
    }

    fn new_row(user_id: UserId) -> NewNotification {
        NewNotification {
            user_id,
            kind: "event".to_string(),
            title: "t".to_string(),
            message: "m".to_string(),
            priority: Priority::Low,
            metadata: Metadata::new(),
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for handler call")
            .expect("handler channel closed")
    }

    #[tokio::test]
    async fn test_delivers_changes() {
        let backend = Arc::new(InMemoryBackend::new(ManualClock::new(None)));
        let user = Uuid::from_u128(1);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscriber = ChangeStreamSubscriber::new(backend.clone(), fast_config());
        let handle = subscriber.subscribe(user, Arc::new(Recorder(tx))).await;
        assert_eq!(next(&mut rx).await, Seen::Connected(false));

        let row = backend.insert(new_row(user)).await.unwrap();
        assert_eq!(next(&mut rx).await, Seen::Change(ChangeEvent::Insert(row)));
        assert!(handle.is_active());
    }

    #[tokio::test]
    async fn test_resubscribes_after_disconnect() {
        let _ = env_logger::try_init();
        let backend = Arc::new(InMemoryBackend::new(ManualClock::new(None)));
        let user = Uuid::from_u128(1);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscriber = ChangeStreamSubscriber::new(backend.clone(), fast_config());
        let _handle = subscriber.subscribe(user, Arc::new(Recorder(tx))).await;
        assert_eq!(next(&mut rx).await, Seen::Connected(false));

        backend.disconnect(user);
        assert_eq!(next(&mut rx).await, Seen::Disconnected);
        assert_eq!(next(&mut rx).await, Seen::Connected(true));
        assert_eq!(backend.subscriber_count(user), 1);
    }

    #[tokio::test]
    async fn test_retries_until_feed_is_available() {
        let backend = Arc::new(InMemoryBackend::new(ManualClock::new(None)));
        let user = Uuid::from_u128(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        backend.set_offline(true);

        let subscriber = ChangeStreamSubscriber::new(backend.clone(), fast_config());
        let _handle = subscriber.subscribe(user, Arc::new(Recorder(tx))).await;
        assert_eq!(next(&mut rx).await, Seen::Disconnected);

        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.set_offline(false);
        assert_eq!(next(&mut rx).await, Seen::Connected(true));
    }

    #[tokio::test]
    async fn test_revocation_stops_the_pump() {
        let backend = Arc::new(InMemoryBackend::new(ManualClock::new(None)));
        let user = Uuid::from_u128(1);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscriber = ChangeStreamSubscriber::new(backend.clone(), fast_config());
        let handle = subscriber.subscribe(user, Arc::new(Recorder(tx))).await;
        assert_eq!(next(&mut rx).await, Seen::Connected(false));

        backend.revoke(user);
        assert_eq!(next(&mut rx).await, Seen::Disconnected);
        assert_eq!(next(&mut rx).await, Seen::Revoked);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let backend = Arc::new(InMemoryBackend::new(ManualClock::new(None)));
        let user = Uuid::from_u128(1);
        let (tx, _rx) = mpsc::unbounded_channel();

        let subscriber = ChangeStreamSubscriber::new(backend.clone(), fast_config());
        let handle = subscriber.subscribe(user, Arc::new(Recorder(tx))).await;
        assert_eq!(backend.subscriber_count(user), 1);

        handle.unsubscribe().await;
        handle.unsubscribe().await;
        handle.abort();
        assert!(!handle.is_active());
        assert_eq!(backend.subscriber_count(user), 0);
    }
}
