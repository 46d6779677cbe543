use chrono::{Duration, Utc};
use inbox_core::Timestamp;
use inbox_ports::Clock;
use parking_lot::RwLock;
use std::sync::Arc;

/// Clock frozen at a point in time, moved only by [`advance`](Self::advance)
/// or [`set_time`](Self::set_time)
///
/// Share one instance between a backend double and a session so that
/// `created_at` stamps and call-time cutoffs agree.
pub struct ManualClock {
    current_time: RwLock<Timestamp>,
}

impl ManualClock {
    /// Create a new manual clock
    ///
    /// # Arguments
    /// * `initial_time` - Optional starting time. If None, uses current wall time.
    pub fn new(initial_time: Option<Timestamp>) -> Arc<Self> {
        Arc::new(Self {
            current_time: RwLock::new(initial_time.unwrap_or_else(Utc::now)),
        })
    }

    /// Move time forward
    pub fn advance(&self, duration: Duration) {
        *self.current_time.write() += duration;
    }

    /// Explicitly set the time
    ///
    /// Warning: moving backwards breaks `created_at` monotonicity for new rows.
    pub fn set_time(&self, time: Timestamp) {
        *self.current_time.write() = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current_time.read()
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}
