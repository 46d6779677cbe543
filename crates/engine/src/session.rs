//! Session - explicit owner of one user's inbox state
//!
//! `init(user_id)` opens the change stream, then loads the first snapshot.
//! `teardown()` closes the session, stops the stream and discards every piece
//! of state. Observers hold receivers on the [`Session`] itself, so they keep
//! working across sign-out and sign-in.

use inbox_clock::SystemClock;
use inbox_core::{Alert, ChangeEvent, Notification, NotificationId, UserId};
use inbox_ports::{BackendError, ChangeFeed, Clock, FeedError, NotificationStore};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, watch};

use crate::alert::AlertDispatcher;
use crate::config::InboxConfig;
use crate::error::{InboxError, Result, ValidationError};
use crate::loader::SnapshotLoader;
use crate::mutation::{CreateRequest, MutationGateway};
use crate::reconciler::{Applied, Reconciler, SnapshotTicket};
use crate::subscriber::{ChangeHandler, ChangeStreamSubscriber, SubscriptionHandle};
use crate::view::{InboxView, SessionStatus};

/// Observer channels, shared by every session a [`Session`] runs
struct Channels {
    view: watch::Sender<InboxView>,
    status: watch::Sender<SessionStatus>,
    alerts: broadcast::Sender<Alert>,
}

impl Channels {
    fn new(alert_capacity: usize) -> Self {
        let (view, _) = watch::channel(InboxView::default());
        let (status, _) = watch::channel(SessionStatus::Idle);
        let (alerts, _) = broadcast::channel(alert_capacity.max(1));
        Self {
            view,
            status,
            alerts,
        }
    }

    fn publish_view(&self, next: InboxView) {
        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn publish_status(&self, next: SessionStatus) {
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                debug!("Session status {:?} -> {:?}", current, next);
                *current = next;
                true
            }
        });
    }
}

/// State guarded by the session lock
pub(crate) struct Inbox {
    pub(crate) reconciler: Reconciler,
    pub(crate) alerts: AlertDispatcher,
    /// Set once by close or revoke; nothing is published afterwards
    closed: bool,
}

/// Internals of one signed-in session
///
/// Every write to the reconciler and every publish to observers happens
/// under the `inbox` lock after checking `closed`, so a closed session can
/// never leak state into the next one.
pub(crate) struct SessionCore {
    user_id: UserId,
    store: Arc<dyn NotificationStore>,
    clock: Arc<dyn Clock>,
    loader: SnapshotLoader,
    inbox: Mutex<Inbox>,
    /// A load was rejected as in flight; the running load reloads once more
    resync_requested: AtomicBool,
    subscription: Mutex<Option<SubscriptionHandle>>,
    channels: Arc<Channels>,
}

impl SessionCore {
    fn new(
        user_id: UserId,
        store: Arc<dyn NotificationStore>,
        clock: Arc<dyn Clock>,
        config: &InboxConfig,
        channels: Arc<Channels>,
    ) -> Self {
        Self {
            user_id,
            loader: SnapshotLoader::new(store.clone(), config.snapshot_limit),
            store,
            clock,
            inbox: Mutex::new(Inbox {
                reconciler: Reconciler::new(user_id),
                alerts: AlertDispatcher::new(),
                closed: false,
            }),
            resync_requested: AtomicBool::new(false),
            subscription: Mutex::new(None),
            channels,
        }
    }

    pub(crate) fn user_id(&self) -> UserId {
        self.user_id
    }

    pub(crate) fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn is_open(&self) -> bool {
        !self.inbox.lock().closed
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ValidationError::NoSession.into())
        }
    }

    /// Run `f` against the open inbox and publish the resulting view
    pub(crate) fn update_inbox<T>(&self, f: impl FnOnce(&mut Inbox) -> T) -> Result<T> {
        let mut inbox = self.inbox.lock();
        if inbox.closed {
            return Err(ValidationError::NoSession.into());
        }
        let result = f(&mut *inbox);
        self.channels
            .publish_view(InboxView::from_reconciler(&inbox.reconciler));
        Ok(result)
    }

    /// Merge one stream delivery and raise an alert if it qualifies
    fn apply_change(&self, event: ChangeEvent) {
        let mut inbox = self.inbox.lock();
        if inbox.closed {
            debug!("Dropping {:?} {} after close", event.operation(), event.id());
            return;
        }

        let applied = inbox.reconciler.apply(&event);
        if applied == Applied::Ignored {
            return;
        }

        if matches!(event, ChangeEvent::Insert(_) | ChangeEvent::Update(_)) {
            let merged = inbox.reconciler.get(event.id()).cloned();
            if let Some(alert) = merged.and_then(|n| inbox.alerts.consider(&n)) {
                info!("Alert for {} ({})", alert.notification_id, alert.priority);
                // No receivers is not an error; alerts are fire-and-forget
                let _ = self.channels.alerts.send(alert);
            }
        }

        if applied.changed() {
            self.channels
                .publish_view(InboxView::from_reconciler(&inbox.reconciler));
        }
    }

    /// Load a fresh snapshot and replace the working set with it
    ///
    /// A call rejected because another load is running is coalesced: the
    /// running load reloads once more when it finishes.
    pub(crate) async fn refresh(&self) -> Result<usize> {
        loop {
            let ticket = self.update_inbox(|inbox| inbox.reconciler.begin_snapshot())?;
            self.resync_requested.store(false, Ordering::SeqCst);

            match self.loader.load(self.user_id).await {
                Ok(rows) => {
                    let len = self.apply_snapshot(ticket, rows)?;
                    if !self.resync_requested.swap(false, Ordering::SeqCst) {
                        return Ok(len);
                    }
                    debug!("Reloading snapshot for {} on a coalesced request", self.user_id);
                }
                Err(InboxError::LoadInFlight) => {
                    self.resync_requested.store(true, Ordering::SeqCst);
                    if self.loader.is_loading() {
                        debug!("Snapshot load for {} already running", self.user_id);
                        return Err(InboxError::LoadInFlight);
                    }
                    // The running load finished in between; load here instead
                }
                Err(InboxError::Backend(e)) => {
                    warn!(
                        "Snapshot load for {} failed (retryable: {}): {}",
                        self.user_id,
                        e.is_retryable(),
                        e
                    );
                    self.handle_backend_error(&e);
                    return Err(e.into());
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn apply_snapshot(&self, ticket: SnapshotTicket, rows: Vec<Notification>) -> Result<usize> {
        let mut inbox = self.inbox.lock();
        if inbox.closed {
            info!("Discarding snapshot for {}: session closed", self.user_id);
            return Err(InboxError::SessionClosed);
        }

        let len = inbox.reconciler.apply_snapshot(ticket, rows);
        self.channels
            .publish_view(InboxView::from_reconciler(&inbox.reconciler));
        info!("Applied snapshot for {}: {} notifications", self.user_id, len);
        Ok(len)
    }

    fn set_status(&self, status: SessionStatus) {
        let inbox = self.inbox.lock();
        if !inbox.closed {
            self.channels.publish_status(status);
        }
    }

    pub(crate) fn handle_backend_error(&self, error: &BackendError) {
        if error.is_unauthorized() {
            self.revoke(&error.to_string());
        }
    }

    /// Tear the session down after the backend rejected its credentials
    fn revoke(&self, reason: &str) {
        {
            let mut inbox = self.inbox.lock();
            if inbox.closed {
                return;
            }
            inbox.closed = true;
            inbox.reconciler = Reconciler::new(self.user_id);
            inbox.alerts = AlertDispatcher::new();
            self.channels.publish_view(InboxView::default());
            self.channels.publish_status(SessionStatus::Revoked);
        }
        error!("Session of {} revoked: {}", self.user_id, reason);

        if let Some(handle) = self.subscription.lock().take() {
            handle.abort();
        }
    }

    fn attach_subscription(&self, handle: SubscriptionHandle) {
        let mut slot = self.subscription.lock();
        if self.is_open() {
            *slot = Some(handle);
        } else {
            handle.abort();
        }
    }

    /// Stop publishing and hand back the subscription for the caller to end
    fn close(&self) -> Option<SubscriptionHandle> {
        self.inbox.lock().closed = true;
        self.subscription.lock().take()
    }

    fn discard(&self) {
        let mut inbox = self.inbox.lock();
        inbox.reconciler = Reconciler::new(self.user_id);
        inbox.alerts = AlertDispatcher::new();
    }
}

/// Routes stream activity into a session
struct FeedHandler {
    core: Arc<SessionCore>,
}

impl ChangeHandler for FeedHandler {
    fn on_change(&self, event: ChangeEvent) {
        self.core.apply_change(event);
    }

    fn on_connected(&self, reconnect: bool) {
        self.core.set_status(SessionStatus::Live);
        if !reconnect {
            return;
        }
        // Events may have been missed while disconnected
        let core = self.core.clone();
        tokio::spawn(async move {
            match core.refresh().await {
                Ok(len) => debug!("Resynced {} after reconnect ({} rows)", core.user_id, len),
                Err(InboxError::LoadInFlight) => {}
                Err(e) => warn!("Resync after reconnect failed for {}: {}", core.user_id, e),
            }
        });
    }

    fn on_disconnected(&self, error: &FeedError) {
        if error.requires_resync() {
            debug!("{} may have missed events; resync on reconnect", self.core.user_id);
        }
        self.core.set_status(SessionStatus::Reconnecting);
    }

    fn on_revoked(&self, reason: &str) {
        self.core.revoke(reason);
    }
}

/// The inbox of the signed-in user
///
/// ```text
/// init(user) ──► subscribe ──► snapshot ──► live
///                    │                        │
///                    └──── reconnect ─► resync┘
/// teardown() / revoked ──► state discarded, observers see an empty view
/// ```
pub struct Session {
    store: Arc<dyn NotificationStore>,
    subscriber: ChangeStreamSubscriber,
    clock: Arc<dyn Clock>,
    config: InboxConfig,
    channels: Arc<Channels>,
    current: Mutex<Option<Arc<SessionCore>>>,
}

impl Session {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        feed: Arc<dyn ChangeFeed>,
        config: InboxConfig,
    ) -> Self {
        Self::with_clock(store, feed, Arc::new(SystemClock::new()), config)
    }

    pub fn with_clock(
        store: Arc<dyn NotificationStore>,
        feed: Arc<dyn ChangeFeed>,
        clock: Arc<dyn Clock>,
        config: InboxConfig,
    ) -> Self {
        Self {
            store,
            subscriber: ChangeStreamSubscriber::new(feed, config.clone()),
            clock,
            channels: Arc::new(Channels::new(config.alert_capacity)),
            config,
            current: Mutex::new(None),
        }
    }

    /// Sign `user_id` in, replacing any current session.
    ///
    /// The change stream is opened before the first snapshot so nothing
    /// emitted in between is lost. If the snapshot fails the session stays
    /// active and [`refresh`](Self::refresh) can be retried.
    pub async fn init(&self, user_id: UserId) -> Result<usize> {
        self.teardown().await;
        info!("Starting inbox session for {} (clock: {})", user_id, self.clock.name());

        let core = Arc::new(SessionCore::new(
            user_id,
            self.store.clone(),
            self.clock.clone(),
            &self.config,
            self.channels.clone(),
        ));
        *self.current.lock() = Some(core.clone());

        core.set_status(SessionStatus::Connecting);
        core.update_inbox(|_| ())?;

        let handler = Arc::new(FeedHandler { core: core.clone() });
        let handle = self.subscriber.subscribe(user_id, handler).await;
        core.attach_subscription(handle);

        core.refresh().await
    }

    /// Sign out. Waits until the change stream is stopped, then discards
    /// all state. Safe to call without a session.
    pub async fn teardown(&self) {
        let Some(core) = self.current.lock().take() else {
            return;
        };
        info!("Tearing down inbox session of {}", core.user_id);

        if let Some(handle) = core.close() {
            handle.unsubscribe().await;
        }
        core.discard();

        self.channels.publish_view(InboxView::default());
        self.channels.publish_status(SessionStatus::Idle);
    }

    fn active_core(&self) -> Result<Arc<SessionCore>> {
        self.current
            .lock()
            .as_ref()
            .filter(|core| core.is_open())
            .cloned()
            .ok_or_else(|| ValidationError::NoSession.into())
    }

    /// User of the active session
    pub fn user_id(&self) -> Option<UserId> {
        self.active_core().ok().map(|core| core.user_id)
    }

    pub fn is_active(&self) -> bool {
        self.active_core().is_ok()
    }

    /// Ordered list plus unread count, updated on every change
    pub fn view(&self) -> watch::Receiver<InboxView> {
        self.channels.view.subscribe()
    }

    /// Latest published view
    pub fn current_view(&self) -> InboxView {
        self.channels.view.borrow().clone()
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.channels.status.subscribe()
    }

    /// One-shot alerts for high and urgent notifications
    pub fn alerts(&self) -> broadcast::Receiver<Alert> {
        self.channels.alerts.subscribe()
    }

    /// Write commands for the active session
    pub fn gateway(&self) -> Result<MutationGateway> {
        self.active_core().map(MutationGateway::new)
    }

    /// Reload the snapshot, e.g. after [`init`](Self::init) failed to load it
    pub async fn refresh(&self) -> Result<usize> {
        self.active_core()?.refresh().await
    }

    pub async fn mark_as_read(&self, id: NotificationId) -> Result<()> {
        self.gateway()?.mark_as_read(id).await
    }

    pub async fn mark_all_as_read(&self) -> Result<u64> {
        self.gateway()?.mark_all_as_read().await
    }

    pub async fn create(&self, request: CreateRequest) -> Result<NotificationId> {
        self.gateway()?.create(request).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(core) = self.current.get_mut().take() {
            if let Some(handle) = core.close() {
                handle.abort();
            }
        }
    }
}
