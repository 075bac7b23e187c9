//! Device drivers bundled with the crate.
//!
//! Only simulated devices live here; network drivers are supplied by the
//! application through a [`DriverFactory`](crate::core::DriverFactory).

pub mod mock;

pub use mock::{SimulatedFocuser, SimulatedTelescope};
