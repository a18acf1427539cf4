//! Chassis controller
//!
//! The chassis owns the four actuator proxies and turns motion requests
//! (state, gear, speed, acceleration, curvature) into actuator goals. It
//! runs the operating state machine, the throttle, brake and steering control
//! laws, and the fault handling which stops the vehicle.
//!
//! The chassis is driven by a single caller which, once per control period,
//! calls `update()` and then any of `set_state()`, `set_gear()` and
//! `set_speed()`. It holds no locks, and the boxed proxies keep it `!Send`.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod control;
mod fault;
mod goals;
mod params;
mod state_table;
mod transition;
mod update;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::speed::{FaultCode, Gear, OperatingState};
use util::time::Clock;

use crate::{
    actuator::{ActuatorProxy, EnableInputs, SteeringProxy, ThrottleProxy, TransmissionProxy},
    filter::LowPassFilter,
};

pub use fault::Fault;
pub use params::{ChassisParams, ParamsError};
pub use state_table::{StateDescriptor, StateTable};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Throttle fraction above which the throttle is saturated
const MAX_VALID_THROTTLE: f32 = 0.95;

/// Below this speed the vehicle is not moving.
///
/// Units: meters/second
const STATIONARY_SPEED_MS: f32 = 0.02;

/// Brake fraction at or above which the brakes are locked
const BRAKES_LOCKED_FRACTION: f32 = 0.5;

/// Throttle fraction below which the throttle is closed
const THROTTLE_ZERO_FRACTION: f32 = 0.05;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The four actuators the chassis drives.
pub struct ChassisActuators {
    pub throttle: Box<dyn ThrottleProxy>,
    pub brake: Box<dyn ActuatorProxy>,
    pub transmission: Box<dyn TransmissionProxy>,
    pub steering: Box<dyn SteeringProxy>,
}

pub struct Chassis {
    params: ChassisParams,
    table: StateTable,

    throttle: Box<dyn ThrottleProxy>,
    brake: Box<dyn ActuatorProxy>,
    transmission: Box<dyn TransmissionProxy>,
    steering: Box<dyn SteeringProxy>,

    clock: Box<dyn Clock>,

    state: OperatingState,

    /// The latched fault, only the first is kept until cleared
    fault: Option<Fault>,

    speed: LowPassFilter,
    accel: LowPassFilter,

    /// Odometer reading at the previous update
    prev_odometer_m: f64,

    /// Throttle integrator
    accum_speed_error: f32,

    /// Time the current state was entered
    state_timestamp_s: f64,

    /// Time of the previous update, `None` before the first
    update_timestamp_s: Option<f64>,

    dump_timestamp_s: f64,

    hill_holder: bool,

    /// `set_speed` was called since the previous update
    speed_commanded: bool,

    /// The last refresh of every actuator succeeded
    controllers_ready: bool,

    verbose: bool,

    throttle_trace_count: u32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Chassis {
    /// Create a new chassis in `Parked`.
    pub fn new(
        params: ChassisParams,
        actuators: ChassisActuators,
        clock: Box<dyn Clock>,
    ) -> Result<Self, ParamsError> {
        params.are_valid()?;

        Ok(Self {
            table: StateTable::new(&params),
            speed: LowPassFilter::new(params.speed_filter_constant),
            accel: LowPassFilter::new(params.accel_filter_constant),
            params,
            throttle: actuators.throttle,
            brake: actuators.brake,
            transmission: actuators.transmission,
            steering: actuators.steering,
            clock,
            state: OperatingState::Parked,
            fault: None,
            prev_odometer_m: 0.0,
            accum_speed_error: 0.0,
            state_timestamp_s: 0.0,
            update_timestamp_s: None,
            dump_timestamp_s: 0.0,
            hill_holder: false,
            speed_commanded: false,
            controllers_ready: false,
            verbose: false,
            throttle_trace_count: 0,
        })
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    // ---- ACCESSORS ----

    pub fn state(&self) -> OperatingState {
        self.state
    }

    pub fn descriptor(&self) -> &StateDescriptor {
        self.table.get(self.state)
    }

    /// Gear as of the last update, `Gear::Unknown` while shifting.
    pub fn gear(&self) -> Gear {
        self.transmission.current_gear()
    }

    /// Filtered speed, signed, positive is forwards.
    ///
    /// Units: meters/second
    pub fn speed(&self) -> f32 {
        self.speed.output()
    }

    /// Filtered acceleration, signed, positive is forwards.
    ///
    /// Units: meters/second^2
    pub fn acceleration(&self) -> f32 {
        self.accel.output()
    }

    /// Units: meters
    pub fn odometer(&self) -> f64 {
        self.throttle.odometer()
    }

    /// Actual curvature derived from the steering position, positive turns
    /// right. Zero if the steering position can't be read.
    ///
    /// Units: 1/meters
    pub fn curvature(&self) -> f32 {
        match self.steering.actual_fraction() {
            Some(f) => self.calc_steering_radius(f),
            None => 0.0,
        }
    }

    /// The latched fault code, if any.
    pub fn fault(&self) -> Option<FaultCode> {
        self.fault.as_ref().map(|f| f.code)
    }

    /// -1 in reverse, 1 otherwise
    fn direction(&self) -> f32 {
        self.gear().direction()
    }

    // ---- PREDICATES ----
    //
    // All of these are false if the last refresh of the actuators failed,
    // since the cached values can't be trusted.

    /// True if safely stopped, not moving with brakes locked and throttle
    /// closed.
    pub fn stopped(&self) -> bool {
        self.not_moving() && self.brakes_locked() && self.throttle_zero()
    }

    fn not_moving(&self) -> bool {
        self.controllers_ready && self.speed().abs() < STATIONARY_SPEED_MS
    }

    fn brakes_locked(&self) -> bool {
        self.controllers_ready
            && self
                .brake
                .actual_fraction()
                .map_or(false, |f| f >= BRAKES_LOCKED_FRACTION)
    }

    fn throttle_zero(&self) -> bool {
        self.controllers_ready
            && self
                .throttle
                .actual_fraction()
                .map_or(false, |f| f < THROTTLE_ZERO_FRACTION)
    }

    /// Engine turning above cranking speed
    fn engine_running(&self) -> bool {
        self.controllers_ready && self.throttle.rpm() > self.params.min_idle_rpm
    }

    fn engine_above_idle(&self) -> bool {
        self.controllers_ready && self.throttle.rpm() > self.params.max_idle_rpm
    }

    fn engine_above_hill_hold_release(&self) -> bool {
        self.controllers_ready && self.throttle.rpm() > self.params.hill_hold_rpm_release
    }

    fn in_desired_gear(&self) -> bool {
        self.controllers_ready && self.gear() == self.transmission.goal_gear()
    }

    /// Read the enable inputs, a failed read counts as nothing enabled.
    fn enable_inputs(&mut self) -> EnableInputs {
        self.steering.enable_inputs().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// TEST SUPPORT
// ---------------------------------------------------------------------------
