use chrono::Utc;
use inbox_core::Timestamp;
use inbox_ports::Clock;
use parking_lot::Mutex;

/// Wall clock for production use
///
/// Readings never move backwards, even if the host clock is stepped back,
/// so a cutoff taken later is never earlier than one taken before it.
pub struct SystemClock {
    last: Mutex<Option<Timestamp>>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = Utc::now();
        let mut last = self.last.lock();
        let reading = match *last {
            Some(previous) if previous > wall => previous,
            _ => wall,
        };
        *last = Some(reading);
        reading
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}
