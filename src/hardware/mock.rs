//! Simulated Hardware Implementations
//!
//! Provides simulated devices for testing without a device server.
//!
//! # Available Simulators
//!
//! - `SimulatedTelescope` - German equatorial mount with countdown slews
//! - `SimulatedFocuser` - Absolute or relative focuser with countdown moves
//!
//! # Behaviour
//!
//! Simulators are cheap to clone and every clone shares one state, so a test
//! keeps a clone while the manager owns the boxed driver built by
//! [`SimulatedFocuser::factory`] / [`SimulatedTelescope::factory`].
//!
//! Motion is counted in status reads rather than wall time: a move lasting
//! `n` reads reports moving for the next `n` reads of `is_moving` (or
//! `slewing`) and completes on the last of them.
//!
//! Faults can be injected at any time (`fail_connect`, `fail_status_reads`,
//! ...) and every command is recorded in a call log.

use anyhow::{bail, Result};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::sync::Arc;

use crate::core::{Device, DeviceEndpoint, DriverFactory};
use crate::focuser::{Focuser, FocuserDriver};
use crate::telescope::{
    AlignmentMode, AxisRate, DriveRate, EquatorialSystem, PierSide, Telescope, TelescopeAxis,
    TelescopeDriver, TelescopeFeature,
};

/// Faults shared by both simulators.
#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    construction: bool,
    connect: bool,
    connect_reports_false: bool,
    disconnect: bool,
    capabilities: bool,
    parameters: bool,
    status: bool,
}

/// Connection flag and descriptive properties shared by both simulators.
#[derive(Debug, Clone)]
struct Common {
    name: String,
    connected: bool,
    interface_version: i32,
    faults: Faults,
    builds: usize,
    connect_requests: Vec<bool>,
    status_reads: usize,
}

impl Common {
    fn new(name: &str, interface_version: i32) -> Self {
        Self {
            name: name.to_string(),
            connected: false,
            interface_version,
            faults: Faults::default(),
            builds: 0,
            connect_requests: Vec::new(),
            status_reads: 0,
        }
    }

    fn set_connected(&mut self, connected: bool) -> Result<()> {
        self.connect_requests.push(connected);
        if connected && self.faults.connect {
            bail!("simulated connection refused");
        }
        if !connected && self.faults.disconnect {
            bail!("simulated disconnect failure");
        }
        if connected && self.faults.connect_reports_false {
            return Ok(());
        }
        self.connected = connected;
        Ok(())
    }

    fn check_capabilities(&self) -> Result<()> {
        if self.faults.capabilities {
            bail!("simulated capability read failure");
        }
        Ok(())
    }

    fn check_parameters(&self) -> Result<()> {
        if self.faults.parameters {
            bail!("simulated parameter read failure");
        }
        Ok(())
    }

    fn check_status(&mut self) -> Result<()> {
        self.status_reads += 1;
        if self.faults.status {
            bail!("simulated status read failure");
        }
        Ok(())
    }
}

/// Count one status read of a running motion. Returns `(moving, finished)`.
fn tick(remaining: &mut u32) -> (bool, bool) {
    if *remaining == 0 {
        return (false, false);
    }
    *remaining -= 1;
    (true, *remaining == 0)
}

macro_rules! fault_setters {
    () => {
        /// Make the driver factory fail.
        pub fn fail_construction(&self, fail: bool) {
            self.state().common.faults.construction = fail;
        }

        /// Make connect requests fail.
        pub fn fail_connect(&self, fail: bool) {
            self.state().common.faults.connect = fail;
        }

        /// Accept connect requests but keep reporting disconnected.
        pub fn connect_reports_false(&self, enabled: bool) {
            self.state().common.faults.connect_reports_false = enabled;
        }

        /// Make disconnect requests fail.
        pub fn fail_disconnect(&self, fail: bool) {
            self.state().common.faults.disconnect = fail;
        }

        /// Make a connect-time capability read fail.
        pub fn fail_capabilities(&self, fail: bool) {
            self.state().common.faults.capabilities = fail;
        }

        /// Make a connect-time parameter read fail.
        pub fn fail_parameters(&self, fail: bool) {
            self.state().common.faults.parameters = fail;
        }

        /// Make the motion read of every status snapshot fail.
        pub fn fail_status_reads(&self, fail: bool) {
            self.state().common.faults.status = fail;
        }

        /// Device-side connection flag.
        pub fn is_connected(&self) -> bool {
            self.state().common.connected
        }

        /// Number of drivers the factory has built.
        pub fn builds(&self) -> usize {
            self.state().common.builds
        }

        /// Every connect/disconnect request, in order.
        pub fn connect_requests(&self) -> Vec<bool> {
            self.state().common.connect_requests.clone()
        }

        /// Number of status snapshot reads so far.
        pub fn status_reads(&self) -> usize {
            self.state().common.status_reads
        }
    };
}

macro_rules! impl_device {
    ($sim:ty, $description:expr) => {
        impl Device for $sim {
            fn connected(&self) -> Result<bool> {
                Ok(self.state().common.connected)
            }

            fn set_connected(&self, connected: bool) -> Result<()> {
                self.state().common.set_connected(connected)
            }

            fn name(&self) -> Result<String> {
                Ok(self.state().common.name.clone())
            }

            fn description(&self) -> Result<String> {
                Ok($description.to_string())
            }

            fn driver_info(&self) -> Result<String> {
                Ok("astro-control simulator".to_string())
            }

            fn driver_version(&self) -> Result<String> {
                Ok(env!("CARGO_PKG_VERSION").to_string())
            }

            fn interface_version(&self) -> Result<i32> {
                Ok(self.state().common.interface_version)
            }

            fn supported_actions(&self) -> Result<Vec<String>> {
                Ok(Vec::new())
            }
        }
    };
}

// =============================================================================
// SimulatedFocuser
// =============================================================================

#[derive(Debug, Clone)]
struct FocuserState {
    common: Common,
    absolute: bool,
    position: i32,
    target: i32,
    moving_reads: u32,
    move_duration: u32,
    max_increment: i32,
    max_step: i32,
    step_size: f64,
    temp_comp: bool,
    temp_comp_available: bool,
    temperature: Option<f64>,
    moves: Vec<i32>,
    reject_moves: bool,
    halts: usize,
    temp_comp_writes: Vec<bool>,
}

/// Simulated focuser.
///
/// Defaults: absolute, position 5000, max increment 1000, max step 10000,
/// interface version 3, temperature compensation available and off,
/// 12.5 °C, moves lasting 2 status reads.
///
/// # Example
///
/// ```rust,ignore
/// let sim = SimulatedFocuser::new().with_position(9900);
/// let manager = FocuserManager::new(sim.factory(), ManagerOptions::default());
/// manager.connect_configured()?;
/// manager.move_by(500)?;
/// assert_eq!(sim.moves(), vec![10000]);
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedFocuser {
    state: Arc<Mutex<FocuserState>>,
}

impl SimulatedFocuser {
    /// Create a focuser with the default configuration.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FocuserState {
                common: Common::new("Focuser Simulator", 3),
                absolute: true,
                position: 5000,
                target: 5000,
                moving_reads: 0,
                move_duration: 2,
                max_increment: 1000,
                max_step: 10_000,
                step_size: 1.0,
                temp_comp: false,
                temp_comp_available: true,
                temperature: Some(12.5),
                moves: Vec::new(),
                reject_moves: false,
                halts: 0,
                temp_comp_writes: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, FocuserState> {
        self.state.lock()
    }

    /// Driver factory handing out clones of this simulator.
    pub fn factory(&self) -> DriverFactory<Focuser> {
        let sim = self.clone();
        Arc::new(move |_endpoint: &DeviceEndpoint| {
            let mut state = sim.state();
            if state.common.faults.construction {
                bail!("simulated driver construction failure");
            }
            state.common.builds += 1;
            drop(state);
            Ok(Box::new(sim.clone()) as Box<dyn FocuserDriver>)
        })
    }

    /// Start at `position`.
    pub fn with_position(self, position: i32) -> Self {
        {
            let mut state = self.state();
            state.position = position;
            state.target = position;
        }
        self
    }

    /// Make this a relative focuser.
    pub fn relative(self) -> Self {
        self.state().absolute = false;
        self
    }

    /// Set the maximum increment and maximum step.
    pub fn with_limits(self, max_increment: i32, max_step: i32) -> Self {
        {
            let mut state = self.state();
            state.max_increment = max_increment;
            state.max_step = max_step;
        }
        self
    }

    /// Report `version` as the interface revision.
    pub fn with_interface_version(self, version: i32) -> Self {
        self.state().common.interface_version = version;
        self
    }

    /// Start with temperature compensation on or off.
    pub fn with_temp_comp(self, enabled: bool) -> Self {
        self.state().temp_comp = enabled;
        self
    }

    /// Remove the temperature sensor and compensation.
    pub fn without_temperature(self) -> Self {
        {
            let mut state = self.state();
            state.temperature = None;
            state.temp_comp_available = false;
            state.temp_comp = false;
        }
        self
    }

    /// Make moves last `reads` status reads.
    pub fn with_move_duration(self, reads: u32) -> Self {
        self.state().move_duration = reads;
        self
    }

    fault_setters!();

    /// Make `move_to` fail without moving.
    pub fn fail_moves(&self, fail: bool) {
        self.state().reject_moves = fail;
    }

    /// Current position, also for relative focusers.
    pub fn position(&self) -> i32 {
        self.state().position
    }

    /// Every value passed to `move_to`, in order.
    pub fn moves(&self) -> Vec<i32> {
        self.state().moves.clone()
    }

    /// Number of forwarded halts.
    pub fn halts(&self) -> usize {
        self.state().halts
    }

    /// Current temperature compensation state.
    pub fn temp_comp(&self) -> bool {
        self.state().temp_comp
    }

    /// Every temperature compensation write, in order.
    pub fn temp_comp_writes(&self) -> Vec<bool> {
        self.state().temp_comp_writes.clone()
    }
}

impl Default for SimulatedFocuser {
    fn default() -> Self {
        Self::new()
    }
}

impl_device!(SimulatedFocuser, "Simulated focuser");

impl FocuserDriver for SimulatedFocuser {
    fn absolute(&self) -> Result<bool> {
        let state = self.state();
        state.common.check_capabilities()?;
        Ok(state.absolute)
    }

    fn is_moving(&self) -> Result<bool> {
        let mut state = self.state();
        state.common.check_status()?;
        let (moving, finished) = tick(&mut state.moving_reads);
        if finished {
            state.position = state.target;
        }
        Ok(moving)
    }

    fn max_increment(&self) -> Result<i32> {
        Ok(self.state().max_increment)
    }

    fn max_step(&self) -> Result<i32> {
        let state = self.state();
        state.common.check_parameters()?;
        Ok(state.max_step)
    }

    fn position(&self) -> Result<i32> {
        let state = self.state();
        if !state.absolute {
            bail!("Position is not implemented for relative focusers");
        }
        Ok(state.position)
    }

    fn step_size(&self) -> Result<f64> {
        Ok(self.state().step_size)
    }

    fn temp_comp(&self) -> Result<bool> {
        Ok(self.state().temp_comp)
    }

    fn set_temp_comp(&self, enabled: bool) -> Result<()> {
        let mut state = self.state();
        if !state.temp_comp_available {
            bail!("Temperature compensation is not available");
        }
        state.temp_comp = enabled;
        state.temp_comp_writes.push(enabled);
        Ok(())
    }

    fn temp_comp_available(&self) -> Result<bool> {
        Ok(self.state().temp_comp_available)
    }

    fn temperature(&self) -> Result<f64> {
        match self.state().temperature {
            Some(temperature) => Ok(temperature),
            None => bail!("Temperature is not implemented"),
        }
    }

    fn move_to(&self, position: i32) -> Result<()> {
        let mut state = self.state();
        if state.reject_moves {
            bail!("simulated move rejected");
        }
        state.moves.push(position);
        state.target = if state.absolute {
            position
        } else {
            state.position.saturating_add(position)
        };
        state.moving_reads = state.move_duration;
        if state.moving_reads == 0 {
            state.position = state.target;
        }
        Ok(())
    }

    fn halt(&self) -> Result<()> {
        let mut state = self.state();
        state.halts += 1;
        state.moving_reads = 0;
        state.target = state.position;
        Ok(())
    }
}

// =============================================================================
// SimulatedTelescope
// =============================================================================

#[derive(Debug, Clone)]
struct TelescopeState {
    common: Common,
    alignment_mode: AlignmentMode,
    site_latitude: f64,
    site_longitude: f64,
    features: HashSet<TelescopeFeature>,
    movable_axes: [bool; 2],
    axis_rates: Vec<AxisRate>,
    right_ascension: f64,
    declination: f64,
    altitude: f64,
    azimuth: f64,
    sidereal_time: f64,
    side_of_pier: PierSide,
    tracking: bool,
    tracking_rate: DriveRate,
    right_ascension_rate: f64,
    declination_rate: f64,
    target: Option<(f64, f64)>,
    slew_reads: u32,
    slew_duration: u32,
    alt_az_destination: Option<(f64, f64)>,
    at_park: bool,
    at_home: bool,
    move_axis_calls: Vec<(TelescopeAxis, f64)>,
    slews: Vec<(f64, f64)>,
    alt_az_slews: Vec<(f64, f64)>,
    pier_side_writes: Vec<PierSide>,
    tracking_writes: Vec<bool>,
    aborts: usize,
    parks: usize,
    unparks: usize,
    homes: usize,
    park_positions: usize,
}

/// Simulated telescope mount.
///
/// Defaults: German equatorial at latitude 51.5, every optional feature,
/// both axes movable at 0 to 4 deg/s, RA 5h Dec 20° with sidereal time 6h on
/// the east side of the pier, tracking at the sidereal rate, slews lasting 2
/// status reads.
#[derive(Debug, Clone)]
pub struct SimulatedTelescope {
    state: Arc<Mutex<TelescopeState>>,
}

const ALL_FEATURES: [TelescopeFeature; 16] = [
    TelescopeFeature::FindHome,
    TelescopeFeature::Park,
    TelescopeFeature::PulseGuide,
    TelescopeFeature::SetDeclinationRate,
    TelescopeFeature::SetGuideRates,
    TelescopeFeature::SetPark,
    TelescopeFeature::SetPierSide,
    TelescopeFeature::SetRightAscensionRate,
    TelescopeFeature::SetTracking,
    TelescopeFeature::Slew,
    TelescopeFeature::SlewAltAz,
    TelescopeFeature::SlewAltAzAsync,
    TelescopeFeature::SlewAsync,
    TelescopeFeature::Sync,
    TelescopeFeature::SyncAltAz,
    TelescopeFeature::Unpark,
];

impl SimulatedTelescope {
    /// Create a mount with the default configuration.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TelescopeState {
                common: Common::new("Telescope Simulator", 3),
                alignment_mode: AlignmentMode::GermanPolar,
                site_latitude: 51.5,
                site_longitude: -0.1,
                features: ALL_FEATURES.into_iter().collect(),
                movable_axes: [true, true],
                axis_rates: vec![AxisRate::new(0.0, 4.0)],
                right_ascension: 5.0,
                declination: 20.0,
                altitude: 45.0,
                azimuth: 120.0,
                sidereal_time: 6.0,
                side_of_pier: PierSide::East,
                tracking: true,
                tracking_rate: DriveRate::Sidereal,
                right_ascension_rate: 0.0,
                declination_rate: 0.0,
                target: None,
                slew_reads: 0,
                slew_duration: 2,
                alt_az_destination: None,
                at_park: false,
                at_home: false,
                move_axis_calls: Vec::new(),
                slews: Vec::new(),
                alt_az_slews: Vec::new(),
                pier_side_writes: Vec::new(),
                tracking_writes: Vec::new(),
                aborts: 0,
                parks: 0,
                unparks: 0,
                homes: 0,
                park_positions: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, TelescopeState> {
        self.state.lock()
    }

    /// Driver factory handing out clones of this simulator.
    pub fn factory(&self) -> DriverFactory<Telescope> {
        let sim = self.clone();
        Arc::new(move |_endpoint: &DeviceEndpoint| {
            let mut state = sim.state();
            if state.common.faults.construction {
                bail!("simulated driver construction failure");
            }
            state.common.builds += 1;
            drop(state);
            Ok(Box::new(sim.clone()) as Box<dyn TelescopeDriver>)
        })
    }

    /// Use a different mount geometry.
    pub fn with_alignment(self, mode: AlignmentMode) -> Self {
        self.state().alignment_mode = mode;
        self
    }

    /// Place the site at `latitude`.
    pub fn with_latitude(self, latitude: f64) -> Self {
        self.state().site_latitude = latitude;
        self
    }

    /// Replace the rate ranges of both axes.
    pub fn with_axis_rates(self, rates: Vec<AxisRate>) -> Self {
        self.state().axis_rates = rates;
        self
    }

    /// Choose which of the primary and secondary axes can move.
    pub fn with_movable_axes(self, primary: bool, secondary: bool) -> Self {
        self.state().movable_axes = [primary, secondary];
        self
    }

    /// Remove an optional feature.
    pub fn without_feature(self, feature: TelescopeFeature) -> Self {
        self.state().features.remove(&feature);
        self
    }

    /// Point at `right_ascension`, `declination`.
    pub fn with_position(self, right_ascension: f64, declination: f64) -> Self {
        {
            let mut state = self.state();
            state.right_ascension = right_ascension;
            state.declination = declination;
        }
        self
    }

    /// Start on `side` of the pier.
    pub fn with_pier_side(self, side: PierSide) -> Self {
        self.state().side_of_pier = side;
        self
    }

    /// Make slews last `reads` status reads.
    pub fn with_slew_duration(self, reads: u32) -> Self {
        self.state().slew_duration = reads;
        self
    }

    fault_setters!();

    /// Every `move_axis` call, in order.
    pub fn move_axis_calls(&self) -> Vec<(TelescopeAxis, f64)> {
        self.state().move_axis_calls.clone()
    }

    /// Every equatorial slew started, in order.
    pub fn slews(&self) -> Vec<(f64, f64)> {
        self.state().slews.clone()
    }

    /// Every alt-az slew started, in order.
    pub fn alt_az_slews(&self) -> Vec<(f64, f64)> {
        self.state().alt_az_slews.clone()
    }

    /// Every pier side write, in order.
    pub fn pier_side_writes(&self) -> Vec<PierSide> {
        self.state().pier_side_writes.clone()
    }

    /// Every tracking write, in order.
    pub fn tracking_writes(&self) -> Vec<bool> {
        self.state().tracking_writes.clone()
    }

    /// Current offset rates (RA, Dec).
    pub fn offset_rates(&self) -> (f64, f64) {
        let state = self.state();
        (state.right_ascension_rate, state.declination_rate)
    }

    /// Number of forwarded aborts.
    pub fn aborts(&self) -> usize {
        self.state().aborts
    }

    /// Number of forwarded park, unpark, find-home and set-park calls.
    pub fn park_calls(&self) -> (usize, usize, usize, usize) {
        let state = self.state();
        (state.parks, state.unparks, state.homes, state.park_positions)
    }

    /// Start a slew directly on the device, bypassing any manager.
    pub fn begin_external_slew(&self, reads: u32) {
        self.state().slew_reads = reads;
    }

    fn axis_index(axis: TelescopeAxis) -> Option<usize> {
        match axis {
            TelescopeAxis::Primary => Some(0),
            TelescopeAxis::Secondary => Some(1),
            TelescopeAxis::Tertiary => None,
        }
    }
}

impl Default for SimulatedTelescope {
    fn default() -> Self {
        Self::new()
    }
}

impl_device!(SimulatedTelescope, "Simulated German equatorial mount");

impl TelescopeDriver for SimulatedTelescope {
    fn can(&self, feature: TelescopeFeature) -> Result<bool> {
        let state = self.state();
        state.common.check_capabilities()?;
        Ok(state.features.contains(&feature))
    }

    fn can_move_axis(&self, axis: TelescopeAxis) -> Result<bool> {
        let state = self.state();
        Ok(Self::axis_index(axis).is_some_and(|i| state.movable_axes[i]))
    }

    fn axis_rates(&self, axis: TelescopeAxis) -> Result<Vec<AxisRate>> {
        let state = self.state();
        match Self::axis_index(axis) {
            Some(i) if state.movable_axes[i] => Ok(state.axis_rates.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn alignment_mode(&self) -> Result<AlignmentMode> {
        let state = self.state();
        state.common.check_parameters()?;
        Ok(state.alignment_mode)
    }

    fn aperture_area(&self) -> Result<f64> {
        Ok(0.0269)
    }

    fn aperture_diameter(&self) -> Result<f64> {
        Ok(0.2)
    }

    fn does_refraction(&self) -> Result<bool> {
        Ok(false)
    }

    fn equatorial_system(&self) -> Result<EquatorialSystem> {
        Ok(EquatorialSystem::Topocentric)
    }

    fn focal_length(&self) -> Result<f64> {
        Ok(1.26)
    }

    fn site_elevation(&self) -> Result<f64> {
        Ok(20.0)
    }

    fn site_latitude(&self) -> Result<f64> {
        Ok(self.state().site_latitude)
    }

    fn site_longitude(&self) -> Result<f64> {
        Ok(self.state().site_longitude)
    }

    fn slew_settle_time(&self) -> Result<i32> {
        Ok(0)
    }

    fn tracking_rates(&self) -> Result<Vec<DriveRate>> {
        Ok(vec![
            DriveRate::Sidereal,
            DriveRate::Lunar,
            DriveRate::Solar,
            DriveRate::King,
        ])
    }

    fn altitude(&self) -> Result<f64> {
        Ok(self.state().altitude)
    }

    fn at_home(&self) -> Result<bool> {
        Ok(self.state().at_home)
    }

    fn at_park(&self) -> Result<bool> {
        Ok(self.state().at_park)
    }

    fn azimuth(&self) -> Result<f64> {
        Ok(self.state().azimuth)
    }

    fn declination(&self) -> Result<f64> {
        Ok(self.state().declination)
    }

    fn right_ascension(&self) -> Result<f64> {
        Ok(self.state().right_ascension)
    }

    fn sidereal_time(&self) -> Result<f64> {
        Ok(self.state().sidereal_time)
    }

    fn slewing(&self) -> Result<bool> {
        let mut state = self.state();
        state.common.check_status()?;
        let (slewing, finished) = tick(&mut state.slew_reads);
        if finished {
            if let Some((ra, dec)) = state.target {
                state.right_ascension = ra;
                state.declination = dec;
            }
            if let Some((az, alt)) = state.alt_az_destination.take() {
                state.azimuth = az;
                state.altitude = alt;
            }
        }
        Ok(slewing)
    }

    fn is_pulse_guiding(&self) -> Result<bool> {
        Ok(false)
    }

    fn guide_rate_declination(&self) -> Result<f64> {
        Ok(0.002)
    }

    fn guide_rate_right_ascension(&self) -> Result<f64> {
        Ok(0.002)
    }

    fn target_declination(&self) -> Result<f64> {
        match self.state().target {
            Some((_, dec)) => Ok(dec),
            None => bail!("Target declination has not been set"),
        }
    }

    fn target_right_ascension(&self) -> Result<f64> {
        match self.state().target {
            Some((ra, _)) => Ok(ra),
            None => bail!("Target right ascension has not been set"),
        }
    }

    fn side_of_pier(&self) -> Result<PierSide> {
        Ok(self.state().side_of_pier)
    }

    fn set_side_of_pier(&self, side: PierSide) -> Result<()> {
        let mut state = self.state();
        if !state.features.contains(&TelescopeFeature::SetPierSide) {
            bail!("SideOfPier is read-only on this mount");
        }
        state.pier_side_writes.push(side);
        state.side_of_pier = side;
        state.slew_reads = state.slew_duration;
        Ok(())
    }

    fn tracking(&self) -> Result<bool> {
        Ok(self.state().tracking)
    }

    fn set_tracking(&self, tracking: bool) -> Result<()> {
        let mut state = self.state();
        state.tracking_writes.push(tracking);
        state.tracking = tracking;
        Ok(())
    }

    fn tracking_rate(&self) -> Result<DriveRate> {
        Ok(self.state().tracking_rate)
    }

    fn set_tracking_rate(&self, rate: DriveRate) -> Result<()> {
        self.state().tracking_rate = rate;
        Ok(())
    }

    fn right_ascension_rate(&self) -> Result<f64> {
        Ok(self.state().right_ascension_rate)
    }

    fn set_right_ascension_rate(&self, rate: f64) -> Result<()> {
        let mut state = self.state();
        if !state.features.contains(&TelescopeFeature::SetRightAscensionRate) {
            bail!("RightAscensionRate is read-only on this mount");
        }
        state.right_ascension_rate = rate;
        Ok(())
    }

    fn declination_rate(&self) -> Result<f64> {
        Ok(self.state().declination_rate)
    }

    fn set_declination_rate(&self, rate: f64) -> Result<()> {
        let mut state = self.state();
        if !state.features.contains(&TelescopeFeature::SetDeclinationRate) {
            bail!("DeclinationRate is read-only on this mount");
        }
        state.declination_rate = rate;
        Ok(())
    }

    fn move_axis(&self, axis: TelescopeAxis, rate: f64) -> Result<()> {
        let mut state = self.state();
        match Self::axis_index(axis) {
            Some(i) if state.movable_axes[i] => {
                state.move_axis_calls.push((axis, rate));
                Ok(())
            }
            _ => bail!("MoveAxis is not supported on the {} axis", axis.as_str()),
        }
    }

    fn slew_to_coordinates_async(&self, right_ascension: f64, declination: f64) -> Result<()> {
        let mut state = self.state();
        if state.at_park {
            bail!("Cannot slew while parked");
        }
        state.slews.push((right_ascension, declination));
        state.target = Some((right_ascension, declination));
        state.slew_reads = state.slew_duration;
        Ok(())
    }

    fn slew_to_alt_az_async(&self, azimuth: f64, altitude: f64) -> Result<()> {
        let mut state = self.state();
        if state.at_park {
            bail!("Cannot slew while parked");
        }
        state.alt_az_slews.push((azimuth, altitude));
        state.alt_az_destination = Some((azimuth, altitude));
        state.slew_reads = state.slew_duration;
        Ok(())
    }

    fn abort_slew(&self) -> Result<()> {
        let mut state = self.state();
        state.aborts += 1;
        state.slew_reads = 0;
        state.alt_az_destination = None;
        Ok(())
    }

    fn park(&self) -> Result<()> {
        let mut state = self.state();
        state.parks += 1;
        state.at_park = true;
        state.tracking = false;
        Ok(())
    }

    fn unpark(&self) -> Result<()> {
        let mut state = self.state();
        state.unparks += 1;
        state.at_park = false;
        Ok(())
    }

    fn find_home(&self) -> Result<()> {
        let mut state = self.state();
        state.homes += 1;
        state.at_home = true;
        Ok(())
    }

    fn set_park(&self) -> Result<()> {
        self.state().park_positions += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focuser_move_completes_after_reads() {
        let sim = SimulatedFocuser::new().with_position(100);
        sim.move_to(400).unwrap();

        assert!(sim.is_moving().unwrap());
        assert_eq!(sim.position(), 100);
        assert!(sim.is_moving().unwrap());
        assert_eq!(sim.position(), 400);
        assert!(!sim.is_moving().unwrap());
    }

    #[test]
    fn test_relative_focuser_has_no_position() {
        let sim = SimulatedFocuser::new().relative();
        assert!(FocuserDriver::position(&sim).is_err());
        sim.move_to(-300).unwrap();
        assert_eq!(sim.moves(), vec![-300]);
    }

    #[test]
    fn test_connect_fault_injection() {
        let sim = SimulatedFocuser::new();
        sim.fail_connect(true);
        assert!(sim.set_connected(true).is_err());
        assert!(!sim.is_connected());

        sim.fail_connect(false);
        sim.connect_reports_false(true);
        sim.set_connected(true).unwrap();
        assert!(!sim.connected().unwrap());
        assert_eq!(sim.connect_requests(), vec![true, true]);
    }

    #[test]
    fn test_telescope_slew_updates_position() {
        let sim = SimulatedTelescope::new();
        assert!(sim.target_right_ascension().is_err());

        sim.slew_to_coordinates_async(10.0, -5.0).unwrap();
        assert!(sim.slewing().unwrap());
        assert!(sim.slewing().unwrap());
        assert!(!sim.slewing().unwrap());
        assert_eq!(sim.right_ascension().unwrap(), 10.0);
        assert_eq!(sim.declination().unwrap(), -5.0);
        assert_eq!(sim.target_declination().unwrap(), -5.0);
    }

    #[test]
    fn test_capability_fault_injection() {
        let sim = SimulatedTelescope::new();
        sim.fail_capabilities(true);
        assert!(sim.can(TelescopeFeature::Park).is_err());

        let focuser = SimulatedFocuser::new();
        focuser.fail_capabilities(true);
        assert!(focuser.absolute().is_err());
        focuser.fail_capabilities(false);
        assert!(focuser.absolute().unwrap());
    }

    #[test]
    fn test_telescope_fixed_axis_rejects_move() {
        let sim = SimulatedTelescope::new().with_movable_axes(true, false);
        assert!(sim.move_axis(TelescopeAxis::Secondary, 1.0).is_err());
        assert!(sim.axis_rates(TelescopeAxis::Secondary).unwrap().is_empty());
        assert!(sim.move_axis_calls().is_empty());
    }
}
