//! Inbox Core Domain
//!
//! Pure domain types for the inbox sync engine.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    Alert, ChangeEvent, ChangeOperation, NewNotification, Notification, NotificationFilter,
    NotificationPatch, ParsePriorityError, Priority,
};
pub use values::{Metadata, NotificationId, Timestamp, UserId};
