//! Inbox Gateway
//!
//! Gateway layer for the inbox engine. Provides:
//! - Transport abstraction (tokio broadcast channels)
//! - Wire decoding of realtime change payloads
//! - Backend adapters implementing the `inbox-ports` traits
//!
//! ## Architecture
//!
//! ```text
//! Backend (table + realtime channel)
//!         │
//!    ┌────▼────┐
//!    │ Adapter │  NotificationStore + ChangeFeed
//!    └────┬────┘
//!         │ Topics:
//!         │ notifications:{user_id}
//!    ┌────▼────┐
//!    │ Session │
//!    └─────────┘
//! ```
//!
//! ## Transport
//!
//! Uses tokio broadcast channels for single-process operation (tests, local
//! development). The `Publisher`/`Subscriber` traits allow plugging in a
//! websocket transport without touching the engine.

pub mod adapters;
pub mod error;
pub mod messages;
pub mod transport;

// Re-export commonly used types
pub use adapters::InMemoryBackend;
pub use error::{GatewayError, TransportError};
pub use messages::realtime::{RealtimeEventType, RealtimePayload, decode_change};
pub use transport::{
    Publisher, Subscriber, Topics,
    channel::{ChannelPublisher, ChannelSubscriber},
};
