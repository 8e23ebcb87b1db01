//! STS Environment Abstraction Layer
//!
//! This crate provides the seams that let the harness run against real
//! controllers or entirely in memory:
//! - Time (`now()`, `delay()`) through [`SimClock`]
//! - Network (`send()`, `recv()`) through [`Socket`] and [`Connector`]
//! - Identities for controllers and switches
//!
//! # Core Concept: Injected Time
//!
//! Nothing in the harness sleeps on its own. Every component that waits is
//! handed a `SimClock` explicitly. During a simulation run that clock is
//! the IO scheduler itself, so a wait turns into event processing on a
//! logical clock and the run stays reproducible.
//!
//! # Example
//!
//! ```ignore
//! use sts_env::{SimClock, WallClock};
//! use std::time::Duration;
//!
//! fn wait_for_boot(clock: &dyn SimClock) {
//!     clock.delay(Duration::from_millis(500));
//! }
//! ```

mod context;
mod error;
mod mock_socket;
mod socket;
mod types;
mod wall_clock;

pub use context::SimClock;
pub use error::EnvError;
pub use mock_socket::{MockConnector, MockSocket};
pub use socket::{Connector, Socket, TcpConnector, TcpSocket};
pub use types::{ControllerId, SwitchId};
pub use wall_clock::WallClock;
