//! Inbox Engine
//!
//! Keeps a signed-in user's notification inbox converged with the backend:
//! - **Snapshot Loading**: Newest page of the inbox, one load at a time
//! - **Change Stream**: At-least-once, unordered deliveries with auto-resubscribe
//! - **Reconciliation**: Idempotent, order-independent merge with monotonic read
//! - **Mutations**: Optimistic read marks and remote-only creation
//! - **Alerts**: One-shot surfacing of high and urgent notifications
//!
//! ## Architecture
//!
//! ```text
//!                      ┌─────────────────────────────────────────┐
//! NotificationStore ──►│ SnapshotLoader ──┐                      │
//!                      │                  ▼                      │
//! ChangeFeed ─────────►│ Subscriber ──► Reconciler ──► InboxView │──► watch
//!                      │                  │  ▲                   │
//!                      │                  ▼  │                   │
//!                      │        AlertDispatcher  MutationGateway │──► broadcast<Alert>
//!                      └─────────────────────────────│───────────┘
//!                                                    ▼
//!                                           NotificationStore
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use inbox_engine::{InboxConfig, Session};
//!
//! let session = Session::new(backend.clone(), backend, InboxConfig::default());
//! session.init(user_id).await?;
//!
//! let mut view = session.view();
//! view.changed().await?;
//! println!("{} unread", view.borrow().unread_count);
//!
//! session.mark_all_as_read().await?;
//! session.teardown().await;
//! ```

pub mod alert;
pub mod config;
pub mod error;
pub mod loader;
pub mod mutation;
pub mod reconciler;
pub mod session;
pub mod subscriber;
pub mod view;

pub use alert::AlertDispatcher;
pub use config::InboxConfig;
pub use error::{InboxError, Result, ValidationError};
pub use loader::SnapshotLoader;
pub use mutation::{CreateRequest, MutationGateway};
pub use reconciler::{Applied, Reconciler, SnapshotTicket};
pub use session::Session;
pub use subscriber::{ChangeHandler, ChangeStreamSubscriber, SubscriptionHandle};
pub use view::{InboxView, SessionStatus};
