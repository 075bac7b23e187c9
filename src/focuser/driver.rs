//! Driver trait for focusers.

use anyhow::Result;

use crate::core::Device;

/// Property access and commands of a focuser.
pub trait FocuserDriver: Device {
    /// True for absolute-position focusers, false for relative ones.
    fn absolute(&self) -> Result<bool>;

    /// True while a move is in progress.
    fn is_moving(&self) -> Result<bool>;

    /// Largest single move, in steps.
    fn max_increment(&self) -> Result<i32>;

    /// Largest position, in steps.
    fn max_step(&self) -> Result<i32>;

    /// Current position in steps. Fails on relative focusers.
    fn position(&self) -> Result<i32>;

    /// Step size in microns.
    fn step_size(&self) -> Result<f64>;

    /// Temperature compensation state.
    fn temp_comp(&self) -> Result<bool>;

    /// Turn temperature compensation on or off.
    fn set_temp_comp(&self, enabled: bool) -> Result<()>;

    /// Whether the focuser has temperature compensation.
    fn temp_comp_available(&self) -> Result<bool>;

    /// Ambient temperature in degrees Celsius.
    fn temperature(&self) -> Result<f64>;

    /// Move to an absolute position, or by a step count on relative focusers.
    fn move_to(&self, position: i32) -> Result<()>;

    /// Stop a move in progress.
    fn halt(&self) -> Result<()>;
}
