//! Telescope mounts.
//!
//! [`Telescope`] plugs the mount driver and snapshots into the generic
//! [`DeviceManager`](crate::manager::DeviceManager); the command set lives
//! in `commands`.

mod commands;
pub mod driver;
pub mod nudge;
pub mod snapshots;
pub mod types;

use anyhow::Result;

use crate::config::DeviceSettings;
use crate::core::DeviceKind;
use crate::manager::DeviceManager;

pub use driver::TelescopeDriver;
pub use nudge::{default_nudge_rates, nudge_rates_from, slew_directions, SIDEREAL_RATE};
pub use snapshots::{TelescopeCapabilities, TelescopeParameters, TelescopeStatus};
pub use types::{
    AlignmentMode, AxisRate, DriveRate, EquatorialSystem, NudgeDirection, NudgeRate, PierSide,
    SlewDirection, TelescopeAxis, TelescopeFeature,
};

/// Telescope device kind.
#[derive(Debug, Clone, Copy)]
pub struct Telescope;

/// Manager for one telescope.
pub type TelescopeManager = DeviceManager<Telescope>;

impl DeviceKind for Telescope {
    const NAME: &'static str = "telescope";

    type Driver = dyn TelescopeDriver;
    type Capabilities = TelescopeCapabilities;
    type Parameters = TelescopeParameters;
    type Status = TelescopeStatus;

    fn disconnected_parameters(settings: &DeviceSettings) -> TelescopeParameters {
        TelescopeParameters::from(settings)
    }

    fn read_capabilities(driver: &Self::Driver) -> Result<TelescopeCapabilities> {
        TelescopeCapabilities::read(driver)
    }

    fn read_parameters(driver: &Self::Driver) -> Result<TelescopeParameters> {
        TelescopeParameters::read(driver)
    }

    fn read_status(driver: &Self::Driver) -> Result<TelescopeStatus> {
        TelescopeStatus::read(driver)
    }

    fn is_moving(status: &TelescopeStatus) -> bool {
        status.slewing
    }
}
