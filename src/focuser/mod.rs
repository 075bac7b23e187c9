//! Focusers.
//!
//! [`Focuser`] plugs the focuser driver and snapshots into the generic
//! [`DeviceManager`](crate::manager::DeviceManager).

mod commands;
pub mod driver;
pub mod snapshots;

use anyhow::Result;

use crate::config::DeviceSettings;
use crate::core::DeviceKind;
use crate::manager::DeviceManager;

pub use driver::FocuserDriver;
pub use snapshots::{FocuserCapabilities, FocuserParameters, FocuserStatus};

/// Focuser device kind.
#[derive(Debug, Clone, Copy)]
pub struct Focuser;

/// Manager for one focuser.
pub type FocuserManager = DeviceManager<Focuser>;

impl DeviceKind for Focuser {
    const NAME: &'static str = "focuser";

    type Driver = dyn FocuserDriver;
    type Capabilities = FocuserCapabilities;
    type Parameters = FocuserParameters;
    type Status = FocuserStatus;

    fn disconnected_parameters(_settings: &DeviceSettings) -> FocuserParameters {
        FocuserParameters {
            step_size: f64::NAN,
            ..FocuserParameters::default()
        }
    }

    fn read_capabilities(driver: &Self::Driver) -> Result<FocuserCapabilities> {
        FocuserCapabilities::read(driver)
    }

    fn read_parameters(driver: &Self::Driver) -> Result<FocuserParameters> {
        FocuserParameters::read(driver)
    }

    fn read_status(driver: &Self::Driver) -> Result<FocuserStatus> {
        FocuserStatus::read(driver)
    }

    fn is_moving(status: &FocuserStatus) -> bool {
        status.is_moving
    }
}
