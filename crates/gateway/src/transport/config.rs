//! Transport configuration

use inbox_core::UserId;

/// Topic names for logical message routing
///
/// Even with tokio channels, we use the backend's channel names for:
/// - Clear message categorization
/// - Easy migration to a websocket transport later
/// - Debugging and logging
pub struct Topics;

impl Topics {
    /// Table the inbox lives in
    pub const NOTIFICATIONS_TABLE: &'static str = "notifications";

    /// Per-user realtime channel: `notifications:{user_id}`
    pub fn notifications(user_id: &UserId) -> String {
        format!("{}:{}", Self::NOTIFICATIONS_TABLE, user_id)
    }

    /// Row filter scoping a realtime channel to one owner: `user_id=eq.{user_id}`
    pub fn owner_filter(user_id: &UserId) -> String {
        format!("user_id=eq.{}", user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_topics() {
        let user = Uuid::from_u128(1);
        assert_eq!(
            Topics::notifications(&user),
            "notifications:00000000-0000-0000-0000-000000000001"
        );
        assert_eq!(
            Topics::owner_filter(&user),
            "user_id=eq.00000000-0000-0000-0000-000000000001"
        );
    }
}
