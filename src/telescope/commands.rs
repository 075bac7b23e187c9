//! Telescope commands.
//!
//! Every command validates against the live driver state or the connect-time
//! capabilities, forwards to the driver, and wakes the poller. Validation
//! failures leave the manager untouched.

use tracing::{debug, info};

use super::nudge::{self, RATE_TOLERANCE};
use super::types::{DriveRate, NudgeDirection, NudgeRate, SlewDirection, TelescopeAxis, TelescopeFeature};
use super::{Telescope, TelescopeDriver};
use crate::core::DeviceKind;
use crate::error::{AppResult, DeviceError};
use crate::manager::{forward, DeviceManager};

fn ensure_not_slewing(driver: &dyn TelescopeDriver, operation: &str) -> AppResult<()> {
    if forward::<Telescope, _>(driver.slewing())? {
        return Err(DeviceError::InvalidOperation(format!(
            "cannot {operation} while the telescope is slewing"
        )));
    }
    Ok(())
}

fn ensure_supported(supported: bool, feature: TelescopeFeature) -> AppResult<()> {
    if supported {
        Ok(())
    } else {
        Err(DeviceError::NotSupported {
            device: Telescope::NAME,
            feature: feature.as_str(),
        })
    }
}

impl DeviceManager<Telescope> {
    // =========================================================================
    // Tracking
    // =========================================================================

    /// Turn tracking on or off. Nothing is sent if the state already matches.
    pub fn set_tracking(&self, tracking: bool) -> AppResult<()> {
        let device = self.require_device()?;
        let driver = device.driver();
        if forward::<Telescope, _>(driver.tracking())? != tracking {
            forward::<Telescope, _>(driver.set_tracking(tracking))?;
            device.refresh();
        }
        Ok(())
    }

    /// Current tracking rate; sidereal when disconnected or unreadable.
    pub fn tracking_rate(&self) -> DriveRate {
        let Some(device) = self.device() else {
            return DriveRate::default();
        };
        let rate = device.driver().tracking_rate();
        rate.unwrap_or_default()
    }

    /// Select a tracking rate.
    pub fn set_tracking_rate(&self, rate: DriveRate) -> AppResult<()> {
        let device = self.require_device()?;
        forward::<Telescope, _>(device.driver().set_tracking_rate(rate))?;
        device.refresh();
        Ok(())
    }

    /// Right ascension offset rate; NaN when disconnected.
    pub fn ra_offset_tracking_rate(&self) -> AppResult<f64> {
        let Some(device) = self.device() else {
            return Ok(f64::NAN);
        };
        let rate = device.driver().right_ascension_rate();
        forward::<Telescope, _>(rate)
    }

    /// Declination offset rate; NaN when disconnected.
    pub fn dec_offset_tracking_rate(&self) -> AppResult<f64> {
        let Some(device) = self.device() else {
            return Ok(f64::NAN);
        };
        let rate = device.driver().declination_rate();
        forward::<Telescope, _>(rate)
    }

    /// Set the RA and declination offset rates.
    ///
    /// Each rate is applied only if the mount can set it. Returns whether
    /// anything was written.
    pub fn set_offset_tracking_rates(&self, ra_rate: f64, dec_rate: f64) -> AppResult<bool> {
        let device = self.require_device()?;
        let capabilities = self.capabilities();
        let driver = device.driver();

        let mut changed = false;
        if capabilities.can_set_right_ascension_rate {
            forward::<Telescope, _>(driver.set_right_ascension_rate(ra_rate))?;
            changed = true;
        }
        if capabilities.can_set_declination_rate {
            forward::<Telescope, _>(driver.set_declination_rate(dec_rate))?;
            changed = true;
        }
        if changed {
            device.refresh();
        }
        Ok(changed)
    }

    // =========================================================================
    // Nudging
    // =========================================================================

    /// Start moving at `rate` degrees per second in `direction`.
    ///
    /// The rate must lie in one of the axis's valid ranges; otherwise an
    /// [`DeviceError::InvalidValue`] lists them and the mount is not moved.
    pub fn start_nudge(&self, direction: NudgeDirection, rate: f64) -> AppResult<()> {
        let device = self.require_device()?;
        let capabilities = self.capabilities();
        let driver = device.driver();

        ensure_not_slewing(&**driver, "nudge")?;
        if !(capabilities.can_move_primary_axis && capabilities.can_move_secondary_axis) {
            return Err(DeviceError::InvalidOperation(
                "the telescope does not support moving the primary and secondary axes"
                    .to_string(),
            ));
        }

        let axis = direction.axis();
        let ranges = capabilities.axis_rates(axis);
        if !ranges.iter().any(|range| range.contains(rate, RATE_TOLERANCE)) {
            let valid = ranges
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(DeviceError::InvalidValue(format!(
                "nudge rate {rate} is outside the valid {} axis ranges: {valid}",
                axis.as_str()
            )));
        }

        let signed = rate * direction.sign();
        debug!("nudging {:?} at {} deg/s", direction, signed);
        forward::<Telescope, _>(driver.move_axis(axis, signed))?;
        device.refresh();
        Ok(())
    }

    /// Stop nudging in `direction`, or on every movable axis for `None`.
    pub fn stop_nudge(&self, direction: Option<NudgeDirection>) -> AppResult<()> {
        let device = self.require_device()?;
        let capabilities = self.capabilities();
        let driver = device.driver();

        match direction {
            Some(direction) => {
                let axis = direction.axis();
                if !capabilities.can_move_axis(axis) {
                    return Err(DeviceError::InvalidOperation(format!(
                        "the telescope cannot move its {} axis",
                        axis.as_str()
                    )));
                }
                forward::<Telescope, _>(driver.move_axis(axis, 0.0))?;
            }
            None => {
                for axis in [TelescopeAxis::Primary, TelescopeAxis::Secondary] {
                    if capabilities.can_move_axis(axis) {
                        forward::<Telescope, _>(driver.move_axis(axis, 0.0))?;
                    }
                }
            }
        }
        device.refresh();
        Ok(())
    }

    /// Nudge rates to offer for `axis`.
    pub fn nudge_rates(&self, axis: TelescopeAxis) -> Vec<NudgeRate> {
        nudge::nudge_rates_from(self.capabilities().axis_rates(axis))
    }

    /// Slew button labels for the connected mount.
    pub fn slew_directions(&self) -> Vec<SlewDirection> {
        let mount = self.is_connected().then(|| {
            let parameters = self.parameters();
            (parameters.alignment_mode, parameters.site_latitude)
        });
        nudge::slew_directions(mount)
    }

    // =========================================================================
    // Slewing
    // =========================================================================

    /// Start a slew to `right_ascension` (hours) and `declination` (degrees).
    pub fn slew_to_coordinates_async(&self, right_ascension: f64, declination: f64) -> AppResult<()> {
        let device = self.require_device()?;
        let driver = device.driver();
        ensure_not_slewing(&**driver, "start a slew")?;
        info!("slewing to RA {right_ascension}h, Dec {declination}°");
        forward::<Telescope, _>(driver.slew_to_coordinates_async(right_ascension, declination))?;
        device.refresh();
        Ok(())
    }

    /// Start a slew to `azimuth` and `altitude` (degrees).
    pub fn slew_to_alt_az_async(&self, azimuth: f64, altitude: f64) -> AppResult<()> {
        let device = self.require_device()?;
        let driver = device.driver();
        ensure_not_slewing(&**driver, "start a slew")?;
        info!("slewing to Az {azimuth}°, Alt {altitude}°");
        forward::<Telescope, _>(driver.slew_to_alt_az_async(azimuth, altitude))?;
        device.refresh();
        Ok(())
    }

    /// Abort a slew in progress. No-op when idle or disconnected.
    pub fn abort_slew(&self) -> AppResult<()> {
        let Some(device) = self.device() else {
            return Ok(());
        };
        let driver = device.driver();
        if forward::<Telescope, _>(driver.slewing())? {
            forward::<Telescope, _>(driver.abort_slew())?;
            device.refresh();
        }
        Ok(())
    }

    /// Flip a German equatorial mount to the other side of the pier.
    ///
    /// Sets the pier side directly when the mount allows it, otherwise
    /// re-slews to the current coordinates and lets the mount flip.
    pub fn start_meridian_flip(&self) -> AppResult<()> {
        let device = self.require_device()?;
        let parameters = self.parameters();
        let capabilities = self.capabilities();
        let driver = device.driver();

        ensure_not_slewing(&**driver, "flip the mount")?;
        if parameters.alignment_mode != super::AlignmentMode::GermanPolar {
            return Err(DeviceError::InvalidOperation(
                "a meridian flip requires a German equatorial mount".to_string(),
            ));
        }

        if capabilities.can_set_pier_side {
            let side = forward::<Telescope, _>(driver.side_of_pier())?;
            match side.opposite() {
                Some(target) => {
                    info!("meridian flip: {} -> {}", side, target);
                    forward::<Telescope, _>(driver.set_side_of_pier(target))?;
                }
                None => debug!("meridian flip skipped, pier side unknown"),
            }
        } else {
            let right_ascension = forward::<Telescope, _>(driver.right_ascension())?;
            let declination = forward::<Telescope, _>(driver.declination())?;
            info!("meridian flip by re-slewing to the current position");
            forward::<Telescope, _>(driver.slew_to_coordinates_async(right_ascension, declination))?;
        }
        device.refresh();
        Ok(())
    }

    // =========================================================================
    // Park and home
    // =========================================================================

    /// Move to the park position.
    pub fn slew_to_park(&self) -> AppResult<()> {
        let device = self.require_device()?;
        let driver = device.driver();
        ensure_not_slewing(&**driver, "park")?;
        ensure_supported(self.capabilities().can_park, TelescopeFeature::Park)?;
        forward::<Telescope, _>(driver.park())?;
        device.refresh();
        Ok(())
    }

    /// Leave the parked state.
    pub fn unpark(&self) -> AppResult<()> {
        let device = self.require_device()?;
        ensure_supported(self.capabilities().can_unpark, TelescopeFeature::Unpark)?;
        forward::<Telescope, _>(device.driver().unpark())?;
        device.refresh();
        Ok(())
    }

    /// Store the current position as the park position.
    pub fn set_park_position(&self) -> AppResult<()> {
        let device = self.require_device()?;
        ensure_supported(self.capabilities().can_set_park, TelescopeFeature::SetPark)?;
        forward::<Telescope, _>(device.driver().set_park())?;
        device.refresh();
        Ok(())
    }

    /// Move to the home position.
    pub fn seek_home(&self) -> AppResult<()> {
        let device = self.require_device()?;
        ensure_supported(self.capabilities().can_find_home, TelescopeFeature::FindHome)?;
        forward::<Telescope, _>(device.driver().find_home())?;
        device.refresh();
        Ok(())
    }
}
