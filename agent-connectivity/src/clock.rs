//! Agent to server clock skew tracking.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error};

/// Skew beyond which the difference is reported as an error.
pub const MAX_CLOCK_DIFFERENCE: TimeDelta = TimeDelta::seconds(30);

/// Last observed difference between the agent clock and the server clock.
#[derive(Debug, Default)]
pub struct ServerClock {
    difference_ms: AtomicI64,
}

impl ServerClock {
    /// Creates a clock with no observed skew.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a server timestamp against the local wall clock.
    pub fn observe(&self, server_time: DateTime<Utc>) {
        self.observe_at(server_time, Utc::now());
    }

    /// Returns `true` when the skew exceeds [`MAX_CLOCK_DIFFERENCE`].
    fn observe_at(&self, server_time: DateTime<Utc>, local_time: DateTime<Utc>) -> bool {
        let difference = local_time - server_time;
        let difference_ms = difference.num_milliseconds();
        self.difference_ms.store(difference_ms, Ordering::Release);
        if difference.abs() > MAX_CLOCK_DIFFERENCE {
            error!(
                difference_ms,
                "agent and server clocks differ by more than {}s; timestamps will be inaccurate",
                MAX_CLOCK_DIFFERENCE.num_seconds()
            );
            return true;
        }
        debug!(difference_ms, "server clock difference updated");
        false
    }

    /// Agent clock minus server clock; positive when the agent runs ahead.
    #[must_use]
    pub fn difference(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.difference_ms.load(Ordering::Acquire))
    }
}
