//! Driver trait for telescope mounts.

use anyhow::Result;

use super::types::{AlignmentMode, AxisRate, DriveRate, EquatorialSystem, PierSide, TelescopeAxis, TelescopeFeature};
use crate::core::Device;

/// Property access and commands of a telescope mount.
///
/// Angles are in degrees, right ascension and sidereal time in hours. Offset
/// rates follow the usual conventions: RA in seconds of RA per sidereal
/// second, declination in arc-seconds per SI second.
pub trait TelescopeDriver: Device {
    // -- Capabilities ---------------------------------------------------------

    /// Whether an optional feature is supported.
    fn can(&self, feature: TelescopeFeature) -> Result<bool>;

    /// Whether `move_axis` works on `axis`.
    fn can_move_axis(&self, axis: TelescopeAxis) -> Result<bool>;

    /// Valid `move_axis` rate ranges for `axis`.
    fn axis_rates(&self, axis: TelescopeAxis) -> Result<Vec<AxisRate>>;

    // -- Static configuration -------------------------------------------------

    /// Mount geometry.
    fn alignment_mode(&self) -> Result<AlignmentMode>;

    /// Aperture area in square metres.
    fn aperture_area(&self) -> Result<f64>;

    /// Aperture diameter in metres.
    fn aperture_diameter(&self) -> Result<f64>;

    /// Whether the mount applies atmospheric refraction.
    fn does_refraction(&self) -> Result<bool>;

    /// Coordinate system of reported positions.
    fn equatorial_system(&self) -> Result<EquatorialSystem>;

    /// Focal length in metres.
    fn focal_length(&self) -> Result<f64>;

    /// Site elevation in metres.
    fn site_elevation(&self) -> Result<f64>;

    /// Site latitude, north positive.
    fn site_latitude(&self) -> Result<f64>;

    /// Site longitude, east positive.
    fn site_longitude(&self) -> Result<f64>;

    /// Settle time after a slew, in seconds.
    fn slew_settle_time(&self) -> Result<i32>;

    /// Tracking rates the mount offers.
    fn tracking_rates(&self) -> Result<Vec<DriveRate>>;

    // -- Position and state ---------------------------------------------------

    /// Altitude above the horizon.
    fn altitude(&self) -> Result<f64>;

    /// True when at the home position.
    fn at_home(&self) -> Result<bool>;

    /// True when parked.
    fn at_park(&self) -> Result<bool>;

    /// Azimuth, north zero, east positive.
    fn azimuth(&self) -> Result<f64>;

    /// Declination.
    fn declination(&self) -> Result<f64>;

    /// Right ascension in hours.
    fn right_ascension(&self) -> Result<f64>;

    /// Local apparent sidereal time in hours.
    fn sidereal_time(&self) -> Result<f64>;

    /// True while an asynchronous slew or move is running.
    fn slewing(&self) -> Result<bool>;

    /// True while a pulse-guide command is running.
    fn is_pulse_guiding(&self) -> Result<bool>;

    /// Declination guide rate in degrees per second.
    fn guide_rate_declination(&self) -> Result<f64>;

    /// Right ascension guide rate in degrees per second.
    fn guide_rate_right_ascension(&self) -> Result<f64>;

    /// Declination of the last slew target. Fails if no target was set.
    fn target_declination(&self) -> Result<f64>;

    /// Right ascension of the last slew target. Fails if no target was set.
    fn target_right_ascension(&self) -> Result<f64>;

    /// Pointing state.
    fn side_of_pier(&self) -> Result<PierSide>;

    /// Force a pointing state (meridian flip).
    fn set_side_of_pier(&self, side: PierSide) -> Result<()>;

    // -- Tracking -------------------------------------------------------------

    /// Tracking flag.
    fn tracking(&self) -> Result<bool>;

    /// Turn tracking on or off.
    fn set_tracking(&self, tracking: bool) -> Result<()>;

    /// Current tracking rate.
    fn tracking_rate(&self) -> Result<DriveRate>;

    /// Select a tracking rate.
    fn set_tracking_rate(&self, rate: DriveRate) -> Result<()>;

    /// Right ascension offset rate.
    fn right_ascension_rate(&self) -> Result<f64>;

    /// Set the right ascension offset rate.
    fn set_right_ascension_rate(&self, rate: f64) -> Result<()>;

    /// Declination offset rate.
    fn declination_rate(&self) -> Result<f64>;

    /// Set the declination offset rate.
    fn set_declination_rate(&self, rate: f64) -> Result<()>;

    // -- Motion ---------------------------------------------------------------

    /// Move `axis` at `rate` degrees per second; zero stops it.
    fn move_axis(&self, axis: TelescopeAxis, rate: f64) -> Result<()>;

    /// Start a slew to equatorial coordinates and return immediately.
    fn slew_to_coordinates_async(&self, right_ascension: f64, declination: f64) -> Result<()>;

    /// Start a slew to horizon coordinates and return immediately.
    fn slew_to_alt_az_async(&self, azimuth: f64, altitude: f64) -> Result<()>;

    /// Stop any slew in progress.
    fn abort_slew(&self) -> Result<()>;

    /// Move to the park position.
    fn park(&self) -> Result<()>;

    /// Leave the parked state.
    fn unpark(&self) -> Result<()>;

    /// Move to the home position.
    fn find_home(&self) -> Result<()>;

    /// Store the current position as the park position.
    fn set_park(&self) -> Result<()>;
}
