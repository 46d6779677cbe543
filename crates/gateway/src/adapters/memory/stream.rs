use async_trait::async_trait;
use inbox_core::{ChangeEvent, UserId};
use inbox_ports::{ChangeStream, FeedError};

use crate::error::TransportError;
use crate::transport::{Subscriber, channel::ChannelSubscriber};

/// Change stream backed by a broadcast subscription
pub struct MemoryChangeStream {
    user_id: UserId,
    inner: ChannelSubscriber<ChangeEvent>,
}

impl MemoryChangeStream {
    pub(crate) fn new(user_id: UserId, inner: ChannelSubscriber<ChangeEvent>) -> Self {
        Self { user_id, inner }
    }
}

#[async_trait]
impl ChangeStream for MemoryChangeStream {
    async fn next(&mut self) -> Result<ChangeEvent, FeedError> {
        self.inner.next().await.map_err(|e| match e {
            TransportError::Lagged(skipped) => FeedError::Lagged(skipped),
            TransportError::ChannelClosed | TransportError::Send(_) => {
                FeedError::Disconnected(format!("channel for {} closed", self.user_id))
            }
        })
    }
}
