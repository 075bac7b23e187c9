//! Telescope capability, parameter and status snapshots.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::driver::TelescopeDriver;
use super::types::{AlignmentMode, AxisRate, DriveRate, EquatorialSystem, PierSide, TelescopeAxis, TelescopeFeature};
use crate::config::DeviceSettings;
use crate::core::read_or;

/// Feature flags and axis rate ranges, read once per connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelescopeCapabilities {
    /// Mount can seek its home position
    pub can_find_home: bool,
    /// `move_axis` works on the primary axis
    pub can_move_primary_axis: bool,
    /// `move_axis` works on the secondary axis
    pub can_move_secondary_axis: bool,
    /// Mount can park
    pub can_park: bool,
    /// Mount accepts pulse guide commands
    pub can_pulse_guide: bool,
    /// Declination offset rate is writable
    pub can_set_declination_rate: bool,
    /// Guide rates are writable
    pub can_set_guide_rates: bool,
    /// Park position can be set to the current position
    pub can_set_park: bool,
    /// Side of pier is writable, allowing meridian flips
    pub can_set_pier_side: bool,
    /// Right ascension offset rate is writable
    pub can_set_right_ascension_rate: bool,
    /// Tracking can be switched on and off
    pub can_set_tracking: bool,
    /// Synchronous equatorial slews
    pub can_slew: bool,
    /// Synchronous alt/az slews
    pub can_slew_alt_az: bool,
    /// Asynchronous alt/az slews
    pub can_slew_alt_az_async: bool,
    /// Asynchronous equatorial slews
    pub can_slew_async: bool,
    /// Sync to equatorial coordinates
    pub can_sync: bool,
    /// Sync to alt/az coordinates
    pub can_sync_alt_az: bool,
    /// Mount can unpark
    pub can_unpark: bool,
    /// Rate ranges for the primary axis, in degrees per second
    pub primary_axis_rates: Vec<AxisRate>,
    /// Rate ranges for the secondary axis, in degrees per second
    pub secondary_axis_rates: Vec<AxisRate>,
}

impl TelescopeCapabilities {
    /// Read every flag and the primary/secondary axis rates.
    pub fn read(driver: &dyn TelescopeDriver) -> Result<Self> {
        let can_move_primary_axis = driver.can_move_axis(TelescopeAxis::Primary)?;
        let can_move_secondary_axis = driver.can_move_axis(TelescopeAxis::Secondary)?;

        Ok(Self {
            can_find_home: driver.can(TelescopeFeature::FindHome)?,
            can_move_primary_axis,
            can_move_secondary_axis,
            can_park: driver.can(TelescopeFeature::Park)?,
            can_pulse_guide: driver.can(TelescopeFeature::PulseGuide)?,
            can_set_declination_rate: driver.can(TelescopeFeature::SetDeclinationRate)?,
            can_set_guide_rates: driver.can(TelescopeFeature::SetGuideRates)?,
            can_set_park: driver.can(TelescopeFeature::SetPark)?,
            can_set_pier_side: driver.can(TelescopeFeature::SetPierSide)?,
            can_set_right_ascension_rate: driver.can(TelescopeFeature::SetRightAscensionRate)?,
            can_set_tracking: driver.can(TelescopeFeature::SetTracking)?,
            can_slew: driver.can(TelescopeFeature::Slew)?,
            can_slew_alt_az: driver.can(TelescopeFeature::SlewAltAz)?,
            can_slew_alt_az_async: driver.can(TelescopeFeature::SlewAltAzAsync)?,
            can_slew_async: driver.can(TelescopeFeature::SlewAsync)?,
            can_sync: driver.can(TelescopeFeature::Sync)?,
            can_sync_alt_az: driver.can(TelescopeFeature::SyncAltAz)?,
            can_unpark: driver.can(TelescopeFeature::Unpark)?,
            primary_axis_rates: if can_move_primary_axis {
                driver.axis_rates(TelescopeAxis::Primary)?
            } else {
                Vec::new()
            },
            secondary_axis_rates: if can_move_secondary_axis {
                driver.axis_rates(TelescopeAxis::Secondary)?
            } else {
                Vec::new()
            },
        })
    }

    /// Valid rate ranges for `axis`. Empty for the tertiary axis.
    pub fn axis_rates(&self, axis: TelescopeAxis) -> &[AxisRate] {
        match axis {
            TelescopeAxis::Primary => &self.primary_axis_rates,
            TelescopeAxis::Secondary => &self.secondary_axis_rates,
            TelescopeAxis::Tertiary => &[],
        }
    }

    /// Whether `move_axis` works on `axis`.
    pub fn can_move_axis(&self, axis: TelescopeAxis) -> bool {
        match axis {
            TelescopeAxis::Primary => self.can_move_primary_axis,
            TelescopeAxis::Secondary => self.can_move_secondary_axis,
            TelescopeAxis::Tertiary => false,
        }
    }
}

/// Descriptive and site values, read once per connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelescopeParameters {
    /// Mount geometry
    pub alignment_mode: AlignmentMode,
    /// Aperture area in square meters
    pub aperture_area: f64,
    /// Aperture diameter in meters
    pub aperture_diameter: f64,
    /// Device description
    pub description: String,
    /// Mount applies a refraction correction
    pub does_refraction: bool,
    /// Driver description text
    pub driver_info: String,
    /// Driver version string
    pub driver_version: String,
    /// Coordinate epoch used by the mount
    pub equatorial_system: EquatorialSystem,
    /// Focal length in meters
    pub focal_length: f64,
    /// Interface revision implemented by the driver
    pub interface_version: i32,
    /// Device name
    pub name: String,
    /// Site elevation in meters
    pub site_elevation: f64,
    /// Site latitude in degrees, north positive
    pub site_latitude: f64,
    /// Site longitude in degrees, east positive
    pub site_longitude: f64,
    /// Post-slew settle time in seconds
    pub slew_settle_time: i32,
    /// Vendor-specific actions
    pub supported_actions: Vec<String>,
    /// Drive rates the mount accepts
    pub tracking_rates: Vec<DriveRate>,
}

impl TelescopeParameters {
    /// Values shown while disconnected; the name is the configured driver.
    pub fn disconnected(driver_name: &str) -> Self {
        Self {
            alignment_mode: AlignmentMode::GermanPolar,
            aperture_area: f64::NAN,
            aperture_diameter: f64::NAN,
            description: String::new(),
            does_refraction: false,
            driver_info: String::new(),
            driver_version: String::new(),
            equatorial_system: EquatorialSystem::Topocentric,
            focal_length: f64::NAN,
            interface_version: 0,
            name: driver_name.to_string(),
            site_elevation: f64::NAN,
            site_latitude: f64::NAN,
            site_longitude: f64::NAN,
            slew_settle_time: 0,
            supported_actions: Vec::new(),
            tracking_rates: Vec::new(),
        }
    }

    /// Read the parameters from a connected driver.
    pub fn read(driver: &dyn TelescopeDriver) -> Result<Self> {
        Ok(Self {
            alignment_mode: driver.alignment_mode()?,
            aperture_area: driver.aperture_area()?,
            aperture_diameter: driver.aperture_diameter()?,
            description: driver.description()?,
            does_refraction: driver.does_refraction()?,
            driver_info: driver.driver_info()?,
            driver_version: driver.driver_version()?,
            equatorial_system: driver.equatorial_system()?,
            focal_length: driver.focal_length()?,
            interface_version: driver.interface_version()?,
            name: driver.name()?,
            site_elevation: driver.site_elevation()?,
            site_latitude: driver.site_latitude()?,
            site_longitude: driver.site_longitude()?,
            slew_settle_time: driver.slew_settle_time()?,
            supported_actions: driver.supported_actions()?,
            tracking_rates: driver.tracking_rates()?,
        })
    }
}

impl From<&DeviceSettings> for TelescopeParameters {
    fn from(settings: &DeviceSettings) -> Self {
        Self::disconnected(&settings.driver_name)
    }
}

/// Time-varying mount state, replaced on every poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelescopeStatus {
    /// When the snapshot was read; `None` for the disconnected default
    pub read_at: Option<DateTime<Utc>>,
    /// Altitude in degrees
    pub altitude: f64,
    /// Mount is at its home position
    pub at_home: bool,
    /// Mount is parked
    pub at_park: bool,
    /// Azimuth in degrees
    pub azimuth: f64,
    /// Device-side connection flag
    pub connected: bool,
    /// Declination in degrees
    pub declination: f64,
    /// Declination offset rate in arcseconds per second
    pub declination_rate: f64,
    /// Declination guide rate in degrees per second
    pub guide_rate_declination: f64,
    /// Right ascension guide rate in degrees per second
    pub guide_rate_right_ascension: f64,
    /// A pulse guide is running
    pub is_pulse_guiding: bool,
    /// Right ascension in hours
    pub right_ascension: f64,
    /// Right ascension offset rate in seconds per sidereal second
    pub right_ascension_rate: f64,
    /// Pointing state of a German equatorial mount
    pub side_of_pier: PierSide,
    /// Local sidereal time in hours
    pub sidereal_time: f64,
    /// Any axis is moving
    pub slewing: bool,
    /// NaN until a slew target has been set
    pub target_declination: f64,
    /// NaN until a slew target has been set
    pub target_right_ascension: f64,
    /// Tracking is on
    pub tracking: bool,
    /// Current drive rate
    pub tracking_rate: DriveRate,
    /// Sidereal time minus right ascension, in [-12, 12) hours
    pub hour_angle: f64,
    /// Counterweight sits above the mount axis
    pub is_counterweight_up: bool,
}

impl Default for TelescopeStatus {
    fn default() -> Self {
        Self {
            read_at: None,
            altitude: f64::NAN,
            at_home: false,
            at_park: false,
            azimuth: f64::NAN,
            connected: false,
            declination: f64::NAN,
            declination_rate: 0.0,
            guide_rate_declination: 0.0,
            guide_rate_right_ascension: 0.0,
            is_pulse_guiding: false,
            right_ascension: f64::NAN,
            right_ascension_rate: f64::NAN,
            side_of_pier: PierSide::Unknown,
            sidereal_time: f64::NAN,
            slewing: false,
            target_declination: f64::NAN,
            target_right_ascension: f64::NAN,
            tracking: false,
            tracking_rate: DriveRate::Sidereal,
            hour_angle: f64::NAN,
            is_counterweight_up: false,
        }
    }
}

impl TelescopeStatus {
    /// Read a status snapshot.
    ///
    /// Any failure is fatal except the target coordinates, which fail on
    /// most mounts until a slew target has been set.
    pub fn read(driver: &dyn TelescopeDriver) -> Result<Self> {
        let right_ascension = driver.right_ascension()?;
        let sidereal_time = driver.sidereal_time()?;
        let side_of_pier = driver.side_of_pier()?;
        let hour_angle = hour_angle(sidereal_time, right_ascension);

        Ok(Self {
            read_at: Some(Utc::now()),
            altitude: driver.altitude()?,
            at_home: driver.at_home()?,
            at_park: driver.at_park()?,
            azimuth: driver.azimuth()?,
            connected: driver.connected()?,
            declination: driver.declination()?,
            declination_rate: driver.declination_rate()?,
            guide_rate_declination: driver.guide_rate_declination()?,
            guide_rate_right_ascension: driver.guide_rate_right_ascension()?,
            is_pulse_guiding: driver.is_pulse_guiding()?,
            right_ascension,
            right_ascension_rate: driver.right_ascension_rate()?,
            side_of_pier,
            sidereal_time,
            slewing: driver.slewing()?,
            target_declination: read_or(driver.target_declination(), f64::NAN),
            target_right_ascension: read_or(driver.target_right_ascension(), f64::NAN),
            tracking: driver.tracking()?,
            tracking_rate: driver.tracking_rate()?,
            hour_angle,
            is_counterweight_up: is_counterweight_up(side_of_pier, hour_angle),
        })
    }
}

/// Local sidereal time minus right ascension, wrapped into [-12, 12) hours.
///
/// Non-finite inputs yield NaN.
pub fn hour_angle(sidereal_time: f64, right_ascension: f64) -> f64 {
    (sidereal_time - right_ascension + 12.0).rem_euclid(24.0) - 12.0
}

/// Counterweight-up state of a German equatorial mount.
///
/// East of the pier with a negative hour angle, or west with a positive one.
pub fn is_counterweight_up(side: PierSide, hour_angle: f64) -> bool {
    match side {
        PierSide::East => -12.0 < hour_angle && hour_angle < 0.0,
        PierSide::West => 0.0 < hour_angle && hour_angle < 12.0,
        PierSide::Unknown => false,
    }
}
