//! Focuser commands.

use tracing::debug;

use super::Focuser;
use crate::core::DeviceKind;
use crate::error::{AppResult, DeviceError};
use crate::events::DeviceEvent;
use crate::manager::{forward, DeviceManager};

/// First interface revision that keeps temperature compensation on while
/// moving.
const TEMP_COMP_DURING_MOVE_VERSION: i32 = 3;

/// Clamp `value` to `[-limit, limit]`; negative limits count as zero.
fn clamp_symmetric(value: i32, limit: i32) -> i32 {
    let limit = limit.max(0);
    value.clamp(-limit, limit)
}

impl DeviceManager<Focuser> {
    /// Move by `amount` steps.
    ///
    /// The amount is clamped to the maximum increment. Absolute focusers get
    /// a target position clamped to the maximum step. On older interfaces
    /// active temperature compensation is switched off for the move and
    /// switched back on once a poll reports the focuser has stopped. The
    /// clamped amount is announced with [`DeviceEvent::MoveAmountUpdate`]
    /// once the device accepts the move.
    pub fn move_by(&self, amount: i32) -> AppResult<()> {
        let device = self.require_device()?;
        let capabilities = self.capabilities();
        let parameters = self.parameters();
        let driver = device.driver();

        let step = clamp_symmetric(amount, parameters.max_increment);

        let target = if capabilities.absolute {
            let position = forward::<Focuser, _>(driver.position())?;
            clamp_symmetric(position.saturating_add(step), parameters.max_step)
        } else {
            step
        };

        if parameters.interface_version < TEMP_COMP_DURING_MOVE_VERSION
            && forward::<Focuser, _>(driver.temp_comp())?
        {
            debug!("suspending temperature compensation for the move");
            forward::<Focuser, _>(driver.set_temp_comp(false))?;
            self.after_motion().push(|driver| {
                debug!("restoring temperature compensation");
                driver.set_temp_comp(true)
            });
        }

        debug!("moving focuser to {} (requested {})", target, amount);
        forward::<Focuser, _>(driver.move_to(target))?;
        self.publish(DeviceEvent::MoveAmountUpdate(step));
        device.refresh();
        Ok(())
    }

    /// Stop a move in progress and publish [`DeviceEvent::MoveCompleted`].
    /// No-op if the focuser is idle.
    pub fn halt(&self) -> AppResult<()> {
        let device = self.require_device()?;
        let driver = device.driver();
        if forward::<Focuser, _>(driver.is_moving())? {
            forward::<Focuser, _>(driver.halt())?;
            device.refresh();
            self.publish(DeviceEvent::MoveCompleted);
        }
        Ok(())
    }

    /// Turn temperature compensation on or off.
    ///
    /// Cancels a re-enable still queued by [`move_by`](Self::move_by), so the
    /// last explicit setting wins.
    pub fn set_temperature_compensation(&self, enabled: bool) -> AppResult<()> {
        let device = self.require_device()?;
        if !self.capabilities().temp_comp_available {
            return Err(DeviceError::NotSupported {
                device: Focuser::NAME,
                feature: "temperature compensation",
            });
        }
        let driver = device.driver();
        self.after_motion().clear();
        forward::<Focuser, _>(driver.set_temp_comp(enabled))?;
        device.refresh();
        Ok(())
    }
}
