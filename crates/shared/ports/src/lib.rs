//! Inbox Ports
//!
//! Port definitions (traits) for the inbox sync engine.
//! These define the boundaries between the engine and the backend it talks to:
//! a queryable/mutable notification table, a per-user change feed, and a clock.

mod clock;
mod error;
mod feed;
mod store;

pub use clock::Clock;
pub use error::{BackendError, BackendResult, FeedError};
pub use feed::{ChangeFeed, ChangeStream};
pub use store::NotificationStore;
