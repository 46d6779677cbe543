//! Wire message types for gateway communication
//!
//! Normalizes the backend's realtime payloads into [`inbox_core::ChangeEvent`].

pub mod realtime;

pub use realtime::{RealtimeEventType, RealtimePayload, decode_change};
