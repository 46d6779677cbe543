use async_trait::async_trait;
use inbox_core::{ChangeEvent, UserId};

use crate::error::FeedError;

/// An open, per-user stream of row changes
///
/// Dropping the stream closes the underlying subscription.
#[async_trait]
pub trait ChangeStream: Send {
    /// Wait for the next change. Any error ends the stream.
    async fn next(&mut self) -> Result<ChangeEvent, FeedError>;
}

/// Port for opening change streams
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a live stream scoped to `user_id`.
    /// Delivery is at-least-once with no ordering guarantee and no replay.
    async fn open(&self, user_id: UserId) -> Result<Box<dyn ChangeStream>, FeedError>;
}
