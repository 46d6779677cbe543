//! Backend adapters
//!
//! Adapters implement the `inbox-ports` traits against a concrete backend.

pub mod memory;

pub use memory::InMemoryBackend;
