//! Realtime change payloads
//!
//! The backend publishes row changes as
//! `{"eventType": "INSERT" | "UPDATE" | "DELETE", "new": {...}, "old": {...}}`.
//! Deletes carry an empty `new` and only the primary key in `old`.

use inbox_core::{ChangeEvent, Notification, NotificationId};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Row operation as named on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RealtimeEventType {
    Insert,
    Update,
    Delete,
}

impl RealtimeEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Raw realtime envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimePayload {
    #[serde(rename = "eventType")]
    pub event_type: RealtimeEventType,
    #[serde(default)]
    pub new: serde_json::Value,
    #[serde(default)]
    pub old: serde_json::Value,
}

#[derive(Deserialize)]
struct DeletedRow {
    id: NotificationId,
}

impl TryFrom<RealtimePayload> for ChangeEvent {
    type Error = GatewayError;

    fn try_from(payload: RealtimePayload) -> Result<Self, Self::Error> {
        match payload.event_type {
            RealtimeEventType::Insert => Ok(ChangeEvent::Insert(record(payload.new, "INSERT")?)),
            RealtimeEventType::Update => Ok(ChangeEvent::Update(record(payload.new, "UPDATE")?)),
            RealtimeEventType::Delete => {
                if is_empty(&payload.old) {
                    return Err(GatewayError::MissingRecord("DELETE"));
                }
                let row: DeletedRow = serde_json::from_value(payload.old)?;
                Ok(ChangeEvent::Delete(row.id))
            }
        }
    }
}

impl From<&ChangeEvent> for RealtimePayload {
    fn from(event: &ChangeEvent) -> Self {
        let (event_type, new, old) = match event {
            ChangeEvent::Insert(n) => (RealtimeEventType::Insert, to_value(n), empty()),
            ChangeEvent::Update(n) => (RealtimeEventType::Update, to_value(n), empty()),
            ChangeEvent::Delete(id) => (
                RealtimeEventType::Delete,
                empty(),
                serde_json::json!({ "id": id }),
            ),
        };
        Self {
            event_type,
            new,
            old,
        }
    }
}

/// Decode a realtime JSON message into a change event
pub fn decode_change(json: &str) -> Result<ChangeEvent, GatewayError> {
    let payload: RealtimePayload = serde_json::from_str(json)?;
    ChangeEvent::try_from(payload)
}

fn record(value: serde_json::Value, event: &'static str) -> Result<Notification, GatewayError> {
    if is_empty(&value) {
        return Err(GatewayError::MissingRecord(event));
    }
    Ok(serde_json::from_value(value)?)
}

fn is_empty(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn empty() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn to_value(n: &Notification) -> serde_json::Value {
    serde_json::to_value(n).unwrap_or_else(|_| empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inbox_core::Priority;

    const INSERT: &str = r#"{
        "eventType": "INSERT",
        "new": {
            "id": "00000000-0000-0000-0000-000000000002",
            "user_id": "00000000-0000-0000-0000-000000000007",
            "type": "payment",
            "title": "Payment received",
            "message": "Your dues were recorded",
            "priority": "urgent",
            "metadata": {"amount": 25},
            "is_read": false,
            "created_at": "2024-05-01T10:00:00Z"
        },
        "old": {}
    }"#;

    #[test]
    fn test_decode_insert() {
        let event = decode_change(INSERT).unwrap();
        let ChangeEvent::Insert(n) = event else {
            panic!("Wrong event type");
        };
        assert_eq!(n.id.as_u128(), 2);
        assert_eq!(n.kind, "payment");
        assert_eq!(n.priority, Priority::Urgent);
        assert_eq!(n.metadata["amount"], 25);
    }

    #[test]
    fn test_decode_delete_uses_old_row() {
        let json = r#"{
            "eventType": "DELETE",
            "new": {},
            "old": {"id": "00000000-0000-0000-0000-000000000009"}
        }"#;
        let event = decode_change(json).unwrap();
        assert_eq!(event, ChangeEvent::Delete(uuid::Uuid::from_u128(9)));
    }

    #[test]
    fn test_decode_rejects_missing_record() {
        let json = r#"{"eventType": "UPDATE", "new": {}, "old": {}}"#;
        assert!(matches!(
            decode_change(json),
            Err(GatewayError::MissingRecord("UPDATE"))
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_priority() {
        let json = INSERT.replace("\"urgent\"", "\"critical\"");
        assert!(matches!(decode_change(&json), Err(GatewayError::Decode(_))));
    }

    #[test]
    fn test_encode_matches_decode() {
        let event = decode_change(INSERT).unwrap();
        let payload = RealtimePayload::from(&event);
        assert_eq!(payload.event_type.as_str(), "INSERT");
        let back = ChangeEvent::try_from(payload).unwrap();
        assert_eq!(back, event);
    }
}
