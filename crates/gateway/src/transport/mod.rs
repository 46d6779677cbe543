//! Transport abstraction layer
//!
//! Provides unified traits for message passing using tokio channels.
//! The trait-based design allows swapping in other transports (websocket
//! realtime channels, etc.) later.

pub mod channel;
pub mod config;

pub use config::Topics;

use crate::error::TransportError;
use async_trait::async_trait;

/// Publisher - sends messages to every live subscriber of a topic
#[async_trait]
pub trait Publisher<M>: Send + Sync
where
    M: Clone + Send + Sync,
{
    /// Publish a message, returning how many subscribers received it
    async fn publish(&self, msg: &M) -> Result<usize, TransportError>;
}

/// Subscriber - receives messages from a topic
#[async_trait]
pub trait Subscriber<M>: Send
where
    M: Clone + Send,
{
    /// Wait for the next message.
    ///
    /// Unlike a best-effort ticker feed, dropped messages are reported as
    /// [`TransportError::Lagged`] because consumers have to resync after a gap.
    async fn next(&mut self) -> Result<M, TransportError>;
}
