//! Per-user pause switch used to hold calls mid-flight

use inbox_core::UserId;
use std::collections::HashSet;
use tokio::sync::watch;

pub(crate) struct Gate {
    paused: watch::Sender<HashSet<UserId>>,
}

impl Gate {
    pub(crate) fn new() -> Self {
        let (paused, _) = watch::channel(HashSet::new());
        Self { paused }
    }

    pub(crate) fn pause(&self, user_id: UserId) {
        self.paused.send_modify(|set| {
            set.insert(user_id);
        });
    }

    pub(crate) fn resume(&self, user_id: UserId) {
        self.paused.send_modify(|set| {
            set.remove(&user_id);
        });
    }

    /// Wait until calls for `user_id` are allowed through
    pub(crate) async fn pass(&self, user_id: UserId) {
        let mut rx = self.paused.subscribe();
        // The sender lives as long as the gate, so this cannot fail while awaited
        let _ = rx.wait_for(|set| !set.contains(&user_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_gate_holds_until_resumed() {
        let gate = Arc::new(Gate::new());
        let user = Uuid::from_u128(1);
        gate.pause(user);

        let held = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.pass(user).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!held.is_finished());

        // Other users are unaffected
        gate.pass(Uuid::from_u128(2)).await;

        gate.resume(user);
        tokio::time::timeout(Duration::from_secs(1), held)
            .await
            .unwrap()
            .unwrap();
    }
}
