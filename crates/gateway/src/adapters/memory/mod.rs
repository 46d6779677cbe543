//! In-memory backend adapter
//!
//! A single-process stand-in for the hosted notification table and its
//! realtime channel. Used by tests and local development, with knobs to
//! inject the failure modes the engine has to survive: offline calls,
//! dropped streams, revoked credentials, slow queries and writes, and
//! duplicated or reordered deliveries.

mod backend;
mod gate;
mod stream;

pub use backend::InMemoryBackend;
pub use stream::MemoryChangeStream;
