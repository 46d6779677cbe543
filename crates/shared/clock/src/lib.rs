//! Inbox Clock Infrastructure
//!
//! Time sources for the engine:
//!
//! - [`SystemClock`]: wall-clock time, for production
//! - [`ManualClock`]: frozen time that only moves when told to, for tests
//!   that need to control the `created_at` ordering and call-time cutoffs
//!
//! ## Usage
//!
//! ```ignore
//! use inbox_clock::{ManualClock, Clock};
//! use chrono::Duration;
//!
//! let clock = ManualClock::new(None);
//! let t0 = clock.now();
//! clock.advance(Duration::seconds(5));
//! assert_eq!(clock.now() - t0, Duration::seconds(5));
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use inbox_ports::Clock;
