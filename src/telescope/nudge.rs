//! Nudge rate and slew direction helpers.

use super::types::{AlignmentMode, AxisRate, NudgeRate, SlewDirection};

/// Sidereal rate in degrees per second.
pub const SIDEREAL_RATE: f64 = 0.0042;

/// Tolerance applied to both ends of an axis rate range.
pub const RATE_TOLERANCE: f64 = 0.00001;

/// Ranges narrower than this are treated as a single fixed rate.
const DISCRETE_RATE_WIDTH: f64 = 0.001;

/// Rates below this are labelled as multiples of sidereal.
const SIDEREAL_LABEL_LIMIT: f64 = 0.5;

/// The preferred rates: 16x and 64x sidereal, and 2 degrees per second.
pub fn default_nudge_rates() -> Vec<NudgeRate> {
    vec![
        NudgeRate {
            name: "16X Sidereal".to_string(),
            rate: 0.06648,
        },
        NudgeRate {
            name: "64X Sidereal".to_string(),
            rate: 0.26594,
        },
        NudgeRate {
            name: "2 deg/sec".to_string(),
            rate: 2.0,
        },
    ]
}

/// Rates to offer for an axis that accepts `axis_rates`.
///
/// Fixed rates are offered as they are. A single continuous range uses the
/// default rates when all of them fit inside it. Anything else offers the
/// midpoint of each range. Empty input gives an empty list.
pub fn nudge_rates_from(axis_rates: &[AxisRate]) -> Vec<NudgeRate> {
    if axis_rates.is_empty() {
        return Vec::new();
    }

    let discrete = axis_rates
        .iter()
        .all(|range| range.maximum - range.minimum <= DISCRETE_RATE_WIDTH);
    if discrete {
        return axis_rates.iter().map(|range| nudge_rate(range.minimum)).collect();
    }

    if let [range] = axis_rates {
        let defaults = default_nudge_rates();
        let fits = defaults.first().is_some_and(|r| r.rate > range.minimum)
            && defaults.last().is_some_and(|r| r.rate < range.maximum);
        if fits {
            return defaults;
        }
    }

    axis_rates
        .iter()
        .map(|range| nudge_rate((range.minimum + range.maximum) / 2.0))
        .collect()
}

fn nudge_rate(rate: f64) -> NudgeRate {
    let name = if rate < SIDEREAL_LABEL_LIMIT {
        format!("{}X Sidereal", (rate / SIDEREAL_RATE).round() as i64)
    } else {
        format!("{rate:.2} deg/sec")
    };
    NudgeRate { name, rate }
}

/// Labels for the four slew buttons.
///
/// Alt-az mounts move up/down/left/right; southern sites swap north and
/// south; `None` (no parameters yet) gives the northern equatorial layout.
pub fn slew_directions(mount: Option<(AlignmentMode, f64)>) -> Vec<SlewDirection> {
    const NORTH: SlewDirection = SlewDirection::new("N", "North");
    const SOUTH: SlewDirection = SlewDirection::new("S", "South");
    const WEST: SlewDirection = SlewDirection::new("W", "West");
    const EAST: SlewDirection = SlewDirection::new("E", "East");

    match mount {
        Some((AlignmentMode::AltAz, _)) => vec![
            SlewDirection::new("U", "Up"),
            SlewDirection::new("D", "Down"),
            SlewDirection::new("L", "Left"),
            SlewDirection::new("R", "Right"),
        ],
        Some((_, latitude)) if latitude < 0.0 => vec![SOUTH, NORTH, WEST, EAST],
        _ => vec![NORTH, SOUTH, WEST, EAST],
    }
}
