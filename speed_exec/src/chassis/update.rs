//! The per-cycle chassis update

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::speed::{FaultCode, OperatingState};
use log::{info, warn};
use std::time::Duration;

use super::Chassis;
use crate::actuator::{ActuatorError, ActuatorProxy};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Longest plausible time between two updates.
///
/// Units: seconds
const MAX_UPDATE_INTERVAL_S: f64 = 1.0;

/// Largest plausible odometer change between two updates.
///
/// Units: meters
const MAX_ODOMETER_STEP_M: f64 = 100.0;

/// Interval assumed when the measured one is bogus.
///
/// Units: seconds
const NOMINAL_UPDATE_INTERVAL_S: f64 = 0.1;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Chassis {
    /// Update the chassis, must be called once per control period.
    ///
    /// Refreshes all actuators, estimates speed and acceleration from the
    /// odometer, advances the state machine and drives the engine relays.
    /// Outside of `Run` the vehicle is commanded to stop, as it is in `Run`
    /// if `set_speed` wasn't called since the previous update. Any trouble
    /// raises a fault, which stops the vehicle.
    pub fn update(&mut self) {
        let speed_commanded = std::mem::replace(&mut self.speed_commanded, false);

        let retries = if self.state == OperatingState::Run {
            self.params.run_retries
        } else {
            self.params.startup_retries
        };

        if let Err((code, err)) = self.update_controllers(retries) {
            self.controllers_ready = false;
            self.set_fault(code, &err.to_string());
            return;
        }
        self.controllers_ready = true;

        self.update_motion();

        self.update_state();

        let (run, crank) = {
            let desc = self.descriptor();
            (desc.engine_should_run, desc.cranking)
        };
        if let Err(e) = self.throttle.set_engine_relays(run, crank) {
            self.set_fault(FaultCode::Engine, &format!("Engine relays: {}", e));
        }

        self.controller_sanity_check();

        let stop = if self.state != OperatingState::Run {
            true
        } else if !speed_commanded {
            warn!("No speed set since the last update, stopping");
            true
        } else {
            false
        };

        if stop {
            if let Err(e) = self.set_goals_stopped() {
                warn!("Could not apply stop goals: {}", e);
            }
        }

        if self.verbose {
            let now = self.clock.now_s();
            if now - self.dump_timestamp_s >= self.params.dump_interval_s {
                self.dump();
                self.dump_timestamp_s = now;
            }
        }
    }

    /// Refresh the actuators, retrying up to `retries` times.
    fn update_controllers(&mut self, retries: u32) -> Result<(), (FaultCode, ActuatorError)> {
        let mut result = Ok(());

        for _ in 0..retries {
            result = self.update_controllers_try();

            match &result {
                Ok(()) => return Ok(()),
                Err((code, err)) => {
                    warn!("Controller fault: {} {} -- attempting retry", code, err)
                }
            }
        }

        result
    }

    fn update_controllers_try(&mut self) -> Result<(), (FaultCode, ActuatorError)> {
        let timeout = Duration::from_secs_f64(self.params.connect_timeout_s);

        refresh(&mut *self.throttle, timeout).map_err(|e| (FaultCode::Throttle, e))?;
        refresh(&mut *self.brake, timeout).map_err(|e| (FaultCode::Brake, e))?;
        refresh(&mut *self.transmission, timeout).map_err(|e| (FaultCode::Transmission, e))?;

        if let Err(e) = refresh(&mut *self.steering, timeout) {
            // A steering actuator switched to manual stops answering
            let code = if self.steering.is_local_auto() {
                FaultCode::Steering
            } else {
                FaultCode::ManualMode
            };
            return Err((code, e));
        }

        Ok(())
    }

    /// Difference the odometer into the speed and acceleration filters.
    fn update_motion(&mut self) {
        let now = self.clock.now_s();
        let odometer = self.throttle.odometer();

        let mut dt = now - self.update_timestamp_s.unwrap_or(now);
        let mut dp = odometer - self.prev_odometer_m;

        let bogus = self.update_timestamp_s.is_none()
            || dt <= 0.0
            || dt > MAX_UPDATE_INTERVAL_S
            || dp.abs() > MAX_ODOMETER_STEP_M;

        self.update_timestamp_s = Some(now);
        self.prev_odometer_m = odometer;

        if bogus {
            if self.state == OperatingState::Run {
                self.set_fault(
                    FaultCode::SpeedTimeout,
                    "Speed estimation values are out of range",
                );
            }
            dt = NOMINAL_UPDATE_INTERVAL_S;
            dp = 0.0;
        }

        let prev_speed = self.speed();
        self.speed.put_input((dp / dt) as f32);

        let accel = (self.speed() - prev_speed) / dt as f32;
        self.accel.put_input(accel);
    }

    fn dump(&self) {
        let pct = |f: Option<f32>| f.map_or(std::f32::NAN, |f| f * 100.0);

        info!(
            "Chassis: {} {} fault {}, speed {:2.2} m/s accel {:2.2} m/s^2, \
            {:4.0} RPM, odometer {:.2} m, throttle {:3.0}% brake {:3.0}% steer {:4.0}%",
            self.state,
            self.gear(),
            self.fault
                .as_ref()
                .map_or_else(|| String::from("none"), |f| f.to_string()),
            self.speed(),
            self.acceleration(),
            self.throttle.rpm(),
            self.odometer(),
            pct(self.throttle.actual_fraction()),
            pct(self.brake.actual_fraction()),
            pct(self.steering.actual_fraction()),
        );
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Reconnect the actuator if needed, then refresh it.
fn refresh<P>(proxy: &mut P, timeout: Duration) -> Result<(), ActuatorError>
where
    P: ActuatorProxy + ?Sized,
{
    if !proxy.is_connected() {
        proxy.connect(timeout)?;
    }

    proxy.refresh_state()
}
