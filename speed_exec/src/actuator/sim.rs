//! Simulated actuators
//!
//! A crude vehicle plant shared between four proxies. Actuators reach their
//! goal as soon as it is commanded. The engine starts after the starter has
//! been cranked for a number of refreshes, and a shift completes after a
//! number of transmission refreshes. `SimVehicle::step` integrates a simple
//! longitudinal model so the executable can be run without hardware.
//!
//! Hooks are provided to inject faults and sensor values, and every command
//! the plant receives is logged in order.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{cell::RefCell, rc::Rc, time::Duration};

use comms_if::speed::Gear;
use util::maths::clamp;

use super::{
    ActuatorError, ActuatorProxy, EnableInputs, SteeringProxy, ThrottleProxy, TransmissionProxy,
};
use crate::chassis::ChassisActuators;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Tuning of the simulated plant.
#[derive(Debug, Clone)]
pub struct SimParams {
    pub throttle_scale: f32,
    pub brake_scale: f32,
    pub steering_scale: f32,

    /// Number of throttle refreshes with the starter cranking before the
    /// engine runs.
    pub crank_refreshes: u32,

    /// Number of transmission refreshes a shift takes.
    pub shift_refreshes: u32,

    pub idle_rpm: f32,
    pub max_rpm: f32,

    /// Acceleration at full throttle.
    ///
    /// Units: meters/second^2
    pub drive_accel_mss: f64,

    /// Deceleration at full brake.
    ///
    /// Units: meters/second^2
    pub brake_decel_mss: f64,

    /// Linear drag coefficient.
    ///
    /// Units: 1/second
    pub drag_per_s: f64,
}

/// Handle on the simulated plant. Clones share the same plant.
#[derive(Clone)]
pub struct SimVehicle {
    plant: Rc<RefCell<Plant>>,
}

pub struct SimThrottle {
    plant: Rc<RefCell<Plant>>,
}

pub struct SimBrake {
    plant: Rc<RefCell<Plant>>,
}

pub struct SimTransmission {
    plant: Rc<RefCell<Plant>>,
}

pub struct SimSteering {
    plant: Rc<RefCell<Plant>>,
}

#[derive(Debug, Clone)]
struct Axis {
    name: &'static str,
    actual: f32,
    goal: f32,
    scale: f32,
    ready: bool,
    connected: bool,

    /// Number of upcoming refreshes which shall fail.
    refresh_failures: u32,

    /// Commands to this axis fail while set.
    command_failure: bool,
}

struct Plant {
    params: SimParams,

    throttle: Axis,
    brake: Axis,
    steering: Axis,
    transmission: Axis,

    gear: Gear,
    goal_gear: Gear,
    shift_countdown: u32,

    relays: (bool, bool),
    engine_running: bool,
    crank_count: u32,
    rpm_override: Option<f32>,

    odometer_m: f64,
    speed_ms: f64,

    enable: EnableInputs,
    enable_read_fails: bool,
    steering_local_auto: bool,

    commands: Vec<SimCommand>,
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Selects one of the simulated actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimAxis {
    Throttle,
    Brake,
    Transmission,
    Steering,
}

/// A command received by the plant.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    /// A goal in native units for the named actuator
    Goal(&'static str, f32),
    Gear(Gear),
    Relays { run: bool, crank: bool },
    WatchdogReset,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            throttle_scale: 100.0,
            brake_scale: 100.0,
            steering_scale: 1000.0,
            crank_refreshes: 3,
            shift_refreshes: 5,
            idle_rpm: 800.0,
            max_rpm: 4800.0,
            drive_accel_mss: 3.0,
            brake_decel_mss: 6.0,
            drag_per_s: 0.1,
        }
    }
}

impl SimVehicle {
    pub fn new(params: SimParams) -> Self {
        let axis = |name, scale| Axis {
            name,
            actual: 0.0,
            goal: 0.0,
            scale,
            ready: true,
            connected: false,
            refresh_failures: 0,
            command_failure: false,
        };

        let plant = Plant {
            throttle: axis("throttle", params.throttle_scale),
            brake: axis("brake", params.brake_scale),
            steering: axis("steering", params.steering_scale),
            transmission: axis("transmission", 1.0),
            params,
            gear: Gear::Neutral,
            goal_gear: Gear::Neutral,
            shift_countdown: 0,
            relays: (false, false),
            engine_running: false,
            crank_count: 0,
            rpm_override: None,
            odometer_m: 0.0,
            speed_ms: 0.0,
            enable: EnableInputs::from_bits(0b111),
            enable_read_fails: false,
            steering_local_auto: true,
            commands: Vec::new(),
        };

        Self {
            plant: Rc::new(RefCell::new(plant)),
        }
    }

    /// Hand out the four proxies, all backed by this plant.
    pub fn actuators(&self) -> ChassisActuators {
        ChassisActuators {
            throttle: Box::new(SimThrottle {
                plant: self.plant.clone(),
            }),
            brake: Box::new(SimBrake {
                plant: self.plant.clone(),
            }),
            transmission: Box::new(SimTransmission {
                plant: self.plant.clone(),
            }),
            steering: Box::new(SimSteering {
                plant: self.plant.clone(),
            }),
        }
    }

    /// Advance the longitudinal model by `dt_s` seconds.
    pub fn step(&self, dt_s: f64) {
        let mut p = self.plant.borrow_mut();

        let dir = match p.gear {
            Gear::Reverse => -1.0,
            Gear::Low | Gear::High => 1.0,
            Gear::Neutral | Gear::Unknown => 0.0,
        };
        let throttle = clamp(p.throttle.actual / p.throttle.scale, 0.0, 1.0) as f64;
        let brake = clamp(p.brake.actual / p.brake.scale, 0.0, 1.0) as f64;

        let drive = if p.engine_running {
            dir * throttle * p.params.drive_accel_mss
        } else {
            0.0
        };
        let mut speed = p.speed_ms + (drive - p.params.drag_per_s * p.speed_ms) * dt_s;

        // Brakes only ever slow the vehicle towards zero
        let braking = brake * p.params.brake_decel_mss * dt_s;
        speed = if speed.abs() <= braking {
            0.0
        } else {
            speed - braking * speed.signum()
        };

        p.speed_ms = speed;
        p.odometer_m += speed * dt_s;
    }

    // ---- FAULT INJECTION ----

    /// Make the next `count` refreshes of an actuator fail.
    pub fn fail_refreshes(&self, axis: SimAxis, count: u32) {
        self.plant.borrow_mut().axis_mut(axis).refresh_failures = count;
    }

    /// Make commands to an actuator fail until cleared.
    pub fn fail_commands(&self, axis: SimAxis, fail: bool) {
        self.plant.borrow_mut().axis_mut(axis).command_failure = fail;
    }

    pub fn set_ready(&self, axis: SimAxis, ready: bool) {
        self.plant.borrow_mut().axis_mut(axis).ready = ready;
    }

    pub fn disconnect(&self, axis: SimAxis) {
        self.plant.borrow_mut().axis_mut(axis).connected = false;
    }

    // ---- SENSOR OVERRIDES ----

    /// Force the actual position of an actuator, as a fraction of its scale.
    pub fn set_actual_fraction(&self, axis: SimAxis, fraction: f32) {
        let mut p = self.plant.borrow_mut();
        let a = p.axis_mut(axis);
        a.actual = fraction * a.scale;
    }

    pub fn set_enable_inputs(&self, enable: EnableInputs) {
        self.plant.borrow_mut().enable = enable;
    }

    pub fn fail_enable_read(&self, fail: bool) {
        self.plant.borrow_mut().enable_read_fails = fail;
    }

    pub fn set_local_auto(&self, auto: bool) {
        self.plant.borrow_mut().steering_local_auto = auto;
    }

    /// Override the engine RPM, `None` returns to the engine model.
    pub fn set_rpm(&self, rpm: Option<f32>) {
        self.plant.borrow_mut().rpm_override = rpm;
    }

    pub fn set_odometer(&self, odometer_m: f64) {
        self.plant.borrow_mut().odometer_m = odometer_m;
    }

    /// Put the transmission in a gear, with no shift in progress.
    pub fn set_gear(&self, gear: Gear) {
        let mut p = self.plant.borrow_mut();
        p.gear = gear;
        p.goal_gear = gear;
        p.shift_countdown = 0;
    }

    pub fn set_crank_refreshes(&self, count: u32) {
        self.plant.borrow_mut().params.crank_refreshes = count;
    }

    // ---- OBSERVATION ----

    pub fn engine_running(&self) -> bool {
        self.plant.borrow().engine_running
    }

    pub fn relays(&self) -> (bool, bool) {
        self.plant.borrow().relays
    }

    /// Current goal of an actuator as a fraction of its scale.
    pub fn goal_fraction(&self, axis: SimAxis) -> f32 {
        let mut p = self.plant.borrow_mut();
        let a = p.axis_mut(axis);
        a.goal / a.scale
    }

    pub fn gear(&self) -> Gear {
        self.plant.borrow().gear
    }

    pub fn speed_ms(&self) -> f64 {
        self.plant.borrow().speed_ms
    }

    /// Commands received since the last call to `clear_commands`.
    pub fn commands(&self) -> Vec<SimCommand> {
        self.plant.borrow().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.plant.borrow_mut().commands.clear();
    }
}

impl Plant {
    fn axis_mut(&mut self, axis: SimAxis) -> &mut Axis {
        match axis {
            SimAxis::Throttle => &mut self.throttle,
            SimAxis::Brake => &mut self.brake,
            SimAxis::Transmission => &mut self.transmission,
            SimAxis::Steering => &mut self.steering,
        }
    }

    fn rpm(&self) -> f32 {
        if let Some(rpm) = self.rpm_override {
            return rpm;
        }

        if self.engine_running {
            let throttle = clamp(self.throttle.actual / self.throttle.scale, 0.0, 1.0);
            self.params.idle_rpm + throttle * (self.params.max_rpm - self.params.idle_rpm)
        } else {
            0.0
        }
    }

    fn refresh(&mut self, axis: SimAxis) -> Result<(), ActuatorError> {
        let a = self.axis_mut(axis);

        if !a.connected {
            return Err(ActuatorError::NotConnected(a.name));
        }
        if a.refresh_failures > 0 {
            a.refresh_failures -= 1;
            return Err(ActuatorError::Timeout(a.name));
        }

        match axis {
            SimAxis::Throttle => self.refresh_engine(),
            SimAxis::Transmission => self.refresh_shift(),
            _ => (),
        }

        Ok(())
    }

    fn refresh_engine(&mut self) {
        let (run, crank) = self.relays;

        if !run {
            self.engine_running = false;
            self.crank_count = 0;
        } else if crank && !self.engine_running {
            self.crank_count += 1;
            if self.crank_count >= self.params.crank_refreshes {
                self.engine_running = true;
                self.crank_count = 0;
            }
        }
    }

    fn refresh_shift(&mut self) {
        if self.shift_countdown > 0 {
            self.shift_countdown -= 1;
            if self.shift_countdown == 0 {
                self.gear = self.goal_gear;
            }
        }
    }

    fn set_goal(&mut self, axis: SimAxis, goal: f32) -> Result<(), ActuatorError> {
        let a = self.axis_mut(axis);

        if a.command_failure {
            return Err(ActuatorError::Rejected(a.name, "injected failure".into()));
        }

        a.goal = goal;
        a.actual = goal;
        let name = a.name;
        self.commands.push(SimCommand::Goal(name, goal));

        Ok(())
    }
}

/// Implements the common proxy methods of a simulated actuator over the
/// given plant axis.
macro_rules! impl_sim_proxy {
    ($proxy:ty, $axis:expr) => {
        impl ActuatorProxy for $proxy {
            fn name(&self) -> &'static str {
                self.plant.borrow_mut().axis_mut($axis).name
            }

            fn connect(&mut self, _timeout: Duration) -> Result<(), ActuatorError> {
                self.plant.borrow_mut().axis_mut($axis).connected = true;
                Ok(())
            }

            fn is_connected(&self) -> bool {
                self.plant.borrow_mut().axis_mut($axis).connected
            }

            fn refresh_state(&mut self) -> Result<(), ActuatorError> {
                self.plant.borrow_mut().refresh($axis)
            }

            fn actual(&self) -> f32 {
                self.plant.borrow_mut().axis_mut($axis).actual
            }

            fn goal(&self) -> f32 {
                self.plant.borrow_mut().axis_mut($axis).goal
            }

            fn goal_scale(&self) -> f32 {
                self.plant.borrow_mut().axis_mut($axis).scale
            }

            fn set_goal(&mut self, goal: f32) -> Result<(), ActuatorError> {
                if $axis == SimAxis::Transmission {
                    return Err(ActuatorError::Unsupported("transmission", "numeric goals"));
                }
                self.plant.borrow_mut().set_goal($axis, goal)
            }

            fn reset_watchdog(&mut self) -> Result<(), ActuatorError> {
                // Only the brake controller carries the watchdog
                if $axis != SimAxis::Brake {
                    return Err(ActuatorError::Unsupported(self.name(), "watchdog reset"));
                }

                let mut p = self.plant.borrow_mut();
                if p.brake.command_failure {
                    return Err(ActuatorError::Rejected("brake", "injected failure".into()));
                }
                p.commands.push(SimCommand::WatchdogReset);
                Ok(())
            }

            fn is_ready(&self) -> bool {
                self.plant.borrow_mut().axis_mut($axis).ready
            }
        }
    };
}

impl_sim_proxy!(SimThrottle, SimAxis::Throttle);
impl_sim_proxy!(SimBrake, SimAxis::Brake);
impl_sim_proxy!(SimTransmission, SimAxis::Transmission);
impl_sim_proxy!(SimSteering, SimAxis::Steering);

impl ThrottleProxy for SimThrottle {
    fn odometer(&self) -> f64 {
        self.plant.borrow().odometer_m
    }

    fn rpm(&self) -> f32 {
        self.plant.borrow().rpm()
    }

    fn set_engine_relays(&mut self, run: bool, crank: bool) -> Result<(), ActuatorError> {
        let mut p = self.plant.borrow_mut();

        if p.throttle.command_failure {
            return Err(ActuatorError::Rejected("throttle", "injected failure".into()));
        }

        p.relays = (run, crank);
        p.commands.push(SimCommand::Relays { run, crank });
        Ok(())
    }
}

impl TransmissionProxy for SimTransmission {
    fn current_gear(&self) -> Gear {
        self.plant.borrow().gear
    }

    fn goal_gear(&self) -> Gear {
        self.plant.borrow().goal_gear
    }

    fn set_goal_gear(&mut self, gear: Gear) -> Result<(), ActuatorError> {
        let mut p = self.plant.borrow_mut();

        if p.transmission.command_failure {
            return Err(ActuatorError::Rejected("transmission", "injected failure".into()));
        }

        p.commands.push(SimCommand::Gear(gear));
        p.goal_gear = gear;

        if p.gear != gear {
            p.shift_countdown = p.params.shift_refreshes;
            if p.shift_countdown == 0 {
                p.gear = gear;
            } else {
                p.gear = Gear::Unknown;
            }
        }

        Ok(())
    }
}

impl SteeringProxy for SimSteering {
    fn enable_inputs(&mut self) -> Result<EnableInputs, ActuatorError> {
        let p = self.plant.borrow();
        if p.enable_read_fails {
            return Err(ActuatorError::Timeout("steering"));
        }
        Ok(p.enable)
    }

    fn is_local_auto(&self) -> bool {
        self.plant.borrow().steering_local_auto
    }
}
