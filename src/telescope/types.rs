//! Telescope enumerations and small value types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mechanical alignment of the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlignmentMode {
    /// Altitude-azimuth mount
    AltAz,
    /// Polar (fork) equatorial mount
    Polar,
    /// German equatorial mount
    #[default]
    GermanPolar,
}

/// Equatorial coordinate system used by the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EquatorialSystem {
    /// Custom or unknown equinox
    Other,
    /// Topocentric coordinates (local apparent)
    #[default]
    Topocentric,
    /// J2000 equinox
    J2000,
    /// J2050 equinox
    J2050,
    /// B1950 equinox
    B1950,
}

/// Tracking (drive) rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriveRate {
    /// Sidereal rate
    #[default]
    Sidereal,
    /// Lunar rate
    Lunar,
    /// Solar rate
    Solar,
    /// King rate
    King,
}

impl DriveRate {
    /// Display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveRate::Sidereal => "Sidereal",
            DriveRate::Lunar => "Lunar",
            DriveRate::Solar => "Solar",
            DriveRate::King => "King",
        }
    }
}

impl fmt::Display for DriveRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side of the pier the optical tube is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PierSide {
    /// Normal pointing state, tube east of the pier
    East,
    /// Through-the-pole pointing state, tube west of the pier
    West,
    /// Unknown or not reported
    #[default]
    Unknown,
}

impl PierSide {
    /// Display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PierSide::East => "East",
            PierSide::West => "West",
            PierSide::Unknown => "Unknown",
        }
    }

    /// The other side, or `None` when the side is unknown.
    pub fn opposite(&self) -> Option<PierSide> {
        match self {
            PierSide::East => Some(PierSide::West),
            PierSide::West => Some(PierSide::East),
            PierSide::Unknown => None,
        }
    }
}

impl fmt::Display for PierSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mount axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelescopeAxis {
    /// RA or azimuth axis
    Primary,
    /// Declination or altitude axis
    Secondary,
    /// Imager rotator axis
    Tertiary,
}

impl TelescopeAxis {
    /// Lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TelescopeAxis::Primary => "primary",
            TelescopeAxis::Secondary => "secondary",
            TelescopeAxis::Tertiary => "tertiary",
        }
    }
}

/// Direction of a manual nudge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NudgeDirection {
    /// Toward the north celestial pole
    North,
    /// Toward the south celestial pole
    South,
    /// Toward the eastern horizon
    East,
    /// Toward the western horizon
    West,
}

impl NudgeDirection {
    /// Axis that moves for this direction.
    pub fn axis(&self) -> TelescopeAxis {
        match self {
            NudgeDirection::North | NudgeDirection::South => TelescopeAxis::Secondary,
            NudgeDirection::East | NudgeDirection::West => TelescopeAxis::Primary,
        }
    }

    /// Sign applied to the nudge rate.
    pub fn sign(&self) -> f64 {
        match self {
            NudgeDirection::South | NudgeDirection::East => -1.0,
            NudgeDirection::North | NudgeDirection::West => 1.0,
        }
    }
}

/// Optional telescope feature queried with `TelescopeDriver::can`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelescopeFeature {
    /// `find_home`
    FindHome,
    /// `park`
    Park,
    /// Pulse guiding
    PulseGuide,
    /// Writing the declination offset rate
    SetDeclinationRate,
    /// Writing the guide rates
    SetGuideRates,
    /// `set_park`
    SetPark,
    /// Writing the side of pier
    SetPierSide,
    /// Writing the right ascension offset rate
    SetRightAscensionRate,
    /// Writing the tracking flag
    SetTracking,
    /// Synchronous equatorial slews
    Slew,
    /// Synchronous alt-az slews
    SlewAltAz,
    /// Asynchronous alt-az slews
    SlewAltAzAsync,
    /// Asynchronous equatorial slews
    SlewAsync,
    /// Syncing to equatorial coordinates
    Sync,
    /// Syncing to alt-az coordinates
    SyncAltAz,
    /// `unpark`
    Unpark,
}

impl TelescopeFeature {
    /// Operator-facing name of the feature.
    pub fn as_str(&self) -> &'static str {
        match self {
            TelescopeFeature::FindHome => "finding home",
            TelescopeFeature::Park => "parking",
            TelescopeFeature::PulseGuide => "pulse guiding",
            TelescopeFeature::SetDeclinationRate => "setting the declination rate",
            TelescopeFeature::SetGuideRates => "setting guide rates",
            TelescopeFeature::SetPark => "setting the park position",
            TelescopeFeature::SetPierSide => "setting the side of pier",
            TelescopeFeature::SetRightAscensionRate => "setting the right ascension rate",
            TelescopeFeature::SetTracking => "changing the tracking state",
            TelescopeFeature::Slew => "slewing",
            TelescopeFeature::SlewAltAz => "alt-az slewing",
            TelescopeFeature::SlewAltAzAsync => "asynchronous alt-az slewing",
            TelescopeFeature::SlewAsync => "asynchronous slewing",
            TelescopeFeature::Sync => "syncing",
            TelescopeFeature::SyncAltAz => "alt-az syncing",
            TelescopeFeature::Unpark => "unparking",
        }
    }
}

/// Inclusive range of valid `move_axis` rates, in degrees per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRate {
    /// Slowest rate of the range
    pub minimum: f64,
    /// Fastest rate of the range
    pub maximum: f64,
}

impl AxisRate {
    /// Range from `minimum` to `maximum`.
    pub fn new(minimum: f64, maximum: f64) -> Self {
        Self { minimum, maximum }
    }

    /// Single fixed rate.
    pub fn fixed(rate: f64) -> Self {
        Self::new(rate, rate)
    }

    /// True when `rate` lies in the range widened by `tolerance` on each end.
    pub fn contains(&self, rate: f64, tolerance: f64) -> bool {
        rate >= self.minimum - tolerance && rate <= self.maximum + tolerance
    }
}

impl fmt::Display for AxisRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.minimum, self.maximum)
    }
}

/// Label of one slew button, e.g. `N` / `North`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlewDirection {
    /// Short label
    pub name: &'static str,
    /// Full label
    pub description: &'static str,
}

impl SlewDirection {
    pub(crate) const fn new(name: &'static str, description: &'static str) -> Self {
        Self { name, description }
    }
}

/// Named nudge rate offered to the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NudgeRate {
    /// Display name, e.g. `16X Sidereal`
    pub name: String,
    /// Rate in degrees per second
    pub rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nudge_direction_axes_and_signs() {
        assert_eq!(NudgeDirection::North.axis(), TelescopeAxis::Secondary);
        assert_eq!(NudgeDirection::South.axis(), TelescopeAxis::Secondary);
        assert_eq!(NudgeDirection::East.axis(), TelescopeAxis::Primary);
        assert_eq!(NudgeDirection::West.axis(), TelescopeAxis::Primary);

        assert_eq!(NudgeDirection::North.sign(), 1.0);
        assert_eq!(NudgeDirection::West.sign(), 1.0);
        assert_eq!(NudgeDirection::South.sign(), -1.0);
        assert_eq!(NudgeDirection::East.sign(), -1.0);
    }

    #[test]
    fn test_pier_side_opposite() {
        assert_eq!(PierSide::East.opposite(), Some(PierSide::West));
        assert_eq!(PierSide::West.opposite(), Some(PierSide::East));
        assert_eq!(PierSide::Unknown.opposite(), None);
    }

    #[test]
    fn test_axis_rate_tolerance_is_inclusive() {
        let range = AxisRate::new(0.5, 2.0);
        assert!(range.contains(0.5, 0.0));
        assert!(range.contains(2.0, 0.0));
        assert!(range.contains(2.000005, 0.00001));
        assert!(!range.contains(2.0001, 0.00001));
        assert_eq!(range.to_string(), "0.5 - 2");
    }
}
