//! Actuator proxies
//!
//! The chassis never talks to hardware directly. Each physical actuator
//! (throttle, brake, transmission, steering) is reached through a proxy which
//! caches the last state read from the actuator and forwards commands to it.
//! The wire protocol behind a proxy is not the chassis' concern.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod sim;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::speed::Gear;
use std::time::Duration;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Common interface to all actuators.
pub trait ActuatorProxy {
    /// Short name of the actuator, used in logs.
    fn name(&self) -> &'static str;

    /// (Re)establish the connection to the actuator.
    fn connect(&mut self, timeout: Duration) -> Result<(), ActuatorError>;

    fn is_connected(&self) -> bool;

    /// Pull the actuator's state into the local cache.
    fn refresh_state(&mut self) -> Result<(), ActuatorError>;

    /// Cached actual position in native units.
    fn actual(&self) -> f32;

    /// Cached goal position in native units.
    fn goal(&self) -> f32;

    /// Native value corresponding to a normalised setting of 1.0.
    fn goal_scale(&self) -> f32;

    /// Command a new goal in native units.
    fn set_goal(&mut self, goal: f32) -> Result<(), ActuatorError>;

    /// Reset the hardware watchdog. Only some actuators carry one.
    fn reset_watchdog(&mut self) -> Result<(), ActuatorError> {
        Err(ActuatorError::Unsupported(self.name(), "watchdog reset"))
    }

    /// True if the actuator is in auto mode and accepting goals.
    fn is_ready(&self) -> bool;

    /// Actual position as a fraction of the goal scale, `None` if that
    /// isn't a finite number (for instance before the first refresh).
    fn actual_fraction(&self) -> Option<f32> {
        finite(self.actual() / self.goal_scale())
    }

    /// Goal position as a fraction of the goal scale.
    fn goal_fraction(&self) -> Option<f32> {
        finite(self.goal() / self.goal_scale())
    }
}

/// The throttle actuator, which also reads the engine and driveshaft.
pub trait ThrottleProxy: ActuatorProxy {
    /// Driveshaft odometer in meters, signed.
    fn odometer(&self) -> f64;

    /// Engine speed in RPM.
    fn rpm(&self) -> f32;

    /// Drive the engine run and starter crank relays.
    fn set_engine_relays(&mut self, run: bool, crank: bool) -> Result<(), ActuatorError>;
}

pub trait TransmissionProxy: ActuatorProxy {
    /// Gear the transmission is actually in. `Gear::Unknown` mid-shift.
    fn current_gear(&self) -> Gear;

    /// Gear last commanded.
    fn goal_gear(&self) -> Gear;

    fn set_goal_gear(&mut self, gear: Gear) -> Result<(), ActuatorError>;
}

/// The steering actuator, which also reads the E-stop and auto/manual
/// digital inputs.
pub trait SteeringProxy: ActuatorProxy {
    fn enable_inputs(&mut self) -> Result<EnableInputs, ActuatorError>;

    /// False if the steering actuator has been put into manual mode.
    fn is_local_auto(&self) -> bool;
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// The external enable signal, as read from the steering actuator's digital
/// inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnableInputs {
    /// Digital input 1, E-stop not asserted
    pub not_estop: bool,

    /// Digital input 2, E-stop not paused
    pub not_paused: bool,

    /// Digital input 3, vehicle in auto mode
    pub in_auto: bool,
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ActuatorError {
    #[error("{0} is not connected")]
    NotConnected(&'static str),

    #[error("{0} did not respond in time")]
    Timeout(&'static str),

    #[error("{0} rejected the command: {1}")]
    Rejected(&'static str, String),

    #[error("{0} does not support {1}")]
    Unsupported(&'static str, &'static str),
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl EnableInputs {
    /// Build from the packed digital input word (bit 0 = input 1).
    pub fn from_bits(bits: u8) -> Self {
        Self {
            not_estop: bits & 1 != 0,
            not_paused: bits & 2 != 0,
            in_auto: bits & 4 != 0,
        }
    }

    /// All three inputs allow motion.
    pub fn enabled(&self) -> bool {
        self.not_estop && self.not_paused && self.in_auto
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn finite(value: f32) -> Option<f32> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_enable_inputs() {
        assert!(EnableInputs::from_bits(0b111).enabled());
        assert!(!EnableInputs::from_bits(0b011).enabled());

        let e = EnableInputs::from_bits(0b101);
        assert!(e.not_estop);
        assert!(!e.not_paused);
        assert!(e.in_auto);
    }
}
