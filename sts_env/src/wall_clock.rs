//! Production implementation of SimClock using the system clock.

use crate::SimClock;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Production clock backed by `std::time::Instant`.
///
/// Bounds waits on things outside the simulation, such as the controller
/// manager waiting for killed controller processes to exit.
/// `delay` blocks the calling thread.
pub struct WallClock {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl WallClock {
    /// Creates a new WallClock.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Rc-wrapped clock for sharing between components.
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock for WallClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
