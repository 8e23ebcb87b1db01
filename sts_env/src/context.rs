//! Clock and delay abstraction shared by every harness component.

use std::time::Duration;

/// The one authoritative source of time for a harness run.
///
/// Components that need to wait never call `std::thread::sleep` directly;
/// they hold a reference to a `SimClock` and call [`SimClock::delay`].
/// Which implementation sits behind the reference decides what waiting
/// means:
///
/// - **Production**: `WallClock` - blocks the thread on the real clock
/// - **Simulation**: `IoMaster` - advances a logical clock by running its
///   own event loop, so waits are observable and replayable
///
/// # Determinism
///
/// A logical clock only moves when the scheduler processes events, so two
/// runs fed the same inputs observe identical `now()` values.
pub trait SimClock {
    /// Returns the time elapsed since the clock was created.
    ///
    /// In simulation, this is the logical clock time.
    fn now(&self) -> Duration;

    /// Waits for the given duration.
    ///
    /// Implementations must not block a cooperative event loop; a logical
    /// clock keeps dispatching pending IO and timers until the duration
    /// has passed.
    fn delay(&self, duration: Duration);
}
