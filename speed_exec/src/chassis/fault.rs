//! Fault latching and recovery
//!
//! Only the first fault raised is kept. Raising a fault always drops the
//! vehicle out of `Run`, and the fault can only be cleared once the vehicle
//! is stopped.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::speed::{FaultCode, OperatingState};
use log::{error, info};
use thiserror::Error;

use super::{Chassis, MAX_VALID_THROTTLE};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// With the engine above operating RPM the vehicle should move faster than
/// this.
///
/// Units: meters/second
const STUCK_SPEED_MS: f32 = 0.05;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A fault raised by the chassis, with the detail of what went wrong.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{code} - {detail}")]
pub struct Fault {
    pub code: FaultCode,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Chassis {
    /// Raise a fault and stop the vehicle.
    ///
    /// The fault is latched only if no other fault is pending. In every case
    /// the vehicle is dropped to the highest state it can safely hold:
    /// `Idle` from any running state, otherwise `RunWait` or `Paused` if
    /// already there, otherwise `Parked`.
    ///
    /// Returns the raised fault so callers can propagate it.
    pub fn set_fault(&mut self, code: FaultCode, detail: &str) -> Fault {
        use OperatingState::*;

        let fault = Fault {
            code,
            detail: detail.to_string(),
        };

        if self.fault.is_none() {
            error!("FAULT: {}", fault);
            self.fault = Some(fault.clone());
        }

        let new_state = if self.state >= Idle {
            Idle
        } else if self.state == RunWait && self.stopped() {
            RunWait
        } else if self.state == Paused {
            Paused
        } else {
            Parked
        };

        self.state_change(new_state, detail);

        if self.state == Run {
            util::raise_fatal!("Fault did not stop the vehicle: {}", fault);
        }

        fault
    }

    /// Clear the latched fault.
    ///
    /// Returns true if there is no fault pending afterwards, a fault can't be
    /// cleared while the vehicle isn't stopped.
    pub fn reset_fault(&mut self) -> bool {
        if self.fault.is_none() {
            return true;
        }

        if !self.stopped() {
            return false;
        }

        self.fault = None;
        info!("Chassis fault cleared");
        true
    }

    /// Check the engine and throttle readings against each other.
    ///
    /// Raises `Stuck` if the engine is revving but the vehicle isn't moving,
    /// and `Throttle` if the throttle is wide open but the engine is idling.
    pub(super) fn controller_sanity_check(&mut self) {
        if !self.controllers_ready {
            return;
        }

        let rpm = self.throttle.rpm();

        if rpm > self.params.operating_rpm && self.speed().abs() < STUCK_SPEED_MS {
            self.set_fault(FaultCode::Stuck, "Not moving at operating RPM");
        }

        let throttle_open = self
            .throttle
            .actual_fraction()
            .map_or(false, |f| f > MAX_VALID_THROTTLE);

        if rpm < self.params.max_idle_rpm && throttle_open {
            self.set_fault(FaultCode::Throttle, "Throttle open at idle RPM");
        }
    }
}
