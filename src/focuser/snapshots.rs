//! Focuser capability, parameter and status snapshots.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::driver::FocuserDriver;
use crate::core::read_or;

/// Positioning mode and optional features, read once per connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FocuserCapabilities {
    /// Moves take absolute positions
    pub absolute: bool,
    /// Temperature compensation can be switched
    pub temp_comp_available: bool,
}

impl FocuserCapabilities {
    /// Read the capability flags.
    pub fn read(driver: &dyn FocuserDriver) -> Result<Self> {
        Ok(Self {
            absolute: driver.absolute()?,
            temp_comp_available: driver.temp_comp_available()?,
        })
    }
}

/// Descriptive values and move limits, read once per connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FocuserParameters {
    /// Device name
    pub name: String,
    /// Device description
    pub description: String,
    /// Driver description text
    pub driver_info: String,
    /// Driver version string
    pub driver_version: String,
    /// Interface revision; below 3 the focuser cannot move with temperature
    /// compensation on
    pub interface_version: i32,
    /// Largest single move, in steps
    pub max_increment: i32,
    /// Largest position, in steps
    pub max_step: i32,
    /// Step size in microns; NaN when not reported
    pub step_size: f64,
    /// Vendor-specific actions
    pub supported_actions: Vec<String>,
}

impl FocuserParameters {
    /// Read the parameters from a connected driver.
    pub fn read(driver: &dyn FocuserDriver) -> Result<Self> {
        Ok(Self {
            name: driver.name()?,
            description: driver.description()?,
            driver_info: driver.driver_info()?,
            driver_version: driver.driver_version()?,
            interface_version: driver.interface_version()?,
            max_increment: driver.max_increment()?,
            max_step: driver.max_step()?,
            step_size: read_or(driver.step_size(), f64::NAN),
            supported_actions: read_or(driver.supported_actions(), Vec::new()),
        })
    }
}

/// Time-varying focuser state, replaced on every poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocuserStatus {
    /// When the snapshot was read; `None` for the disconnected default
    pub read_at: Option<DateTime<Utc>>,
    /// Device-side connection flag
    pub connected: bool,
    /// A move is in progress
    pub is_moving: bool,
    /// `None` for relative focusers
    pub position: Option<i32>,
    /// Temperature compensation is on
    pub temp_comp: bool,
    /// NaN when the focuser has no sensor
    pub temperature: f64,
}

impl Default for FocuserStatus {
    fn default() -> Self {
        Self {
            read_at: None,
            connected: false,
            is_moving: false,
            position: None,
            temp_comp: false,
            temperature: f64::NAN,
        }
    }
}

impl FocuserStatus {
    /// Read a status snapshot.
    ///
    /// Only the connection and motion reads are fatal; position,
    /// temperature compensation and temperature degrade to their defaults.
    pub fn read(driver: &dyn FocuserDriver) -> Result<Self> {
        Ok(Self {
            read_at: Some(Utc::now()),
            connected: driver.connected()?,
            is_moving: driver.is_moving()?,
            position: driver.position().ok(),
            temp_comp: read_or(driver.temp_comp(), false),
            temperature: read_or(driver.temperature(), f64::NAN),
        })
    }
}
