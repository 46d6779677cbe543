use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Backend-assigned notification identifier, never reused
pub type NotificationId = Uuid;

/// Owner of a notification (the authenticated user of a session)
pub type UserId = Uuid;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Free-form key/value payload attached by producers.
/// The engine stores and forwards it without interpreting it.
pub type Metadata = serde_json::Map<String, serde_json::Value>;
