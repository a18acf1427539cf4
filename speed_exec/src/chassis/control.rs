//! Throttle, brake and steering control laws

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::speed::{FaultCode, OperatingState};
use log::{debug, error, info};
use util::maths::{clamp, poly_val, quadratic_root, rate_limit};

use super::{Chassis, STATIONARY_SPEED_MS};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Interval over which the throttle integrator accumulates.
///
/// Units: seconds
const INTEGRATION_INTERVAL_S: f32 = 0.1;

/// Maximum error of a steering round trip
const STEERING_ROUND_TRIP_TOLERANCE: f32 = 0.02;

/// Log the throttle loop once every this many evaluations
const THROTTLE_TRACE_INTERVAL: u32 = 10;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Chassis {
    /// Set the actuator goals for the desired motion.
    ///
    /// Only moves the vehicle in `Run`, and must then be called every cycle
    /// or the next update stops the vehicle. The strategy is:
    /// - desired speed zero, or far enough below the current speed: brake,
    /// - otherwise throttle, with the brakes held while hill holding.
    ///
    /// Steering follows `desired_curvature` in `Idle` and above, so the
    /// vehicle keeps steering while recovering from a fault.
    pub fn set_speed(&mut self, desired_accel: f32, desired_speed: f32, desired_curvature: f32) {
        let mut brake = 1.0;
        let mut throttle = 0.0;
        let mut steer = 0.0;

        self.speed_commanded = true;

        if self.state == OperatingState::Run {
            let speed_error = desired_speed - self.speed();

            if desired_speed <= STATIONARY_SPEED_MS
                || speed_error < -self.params.max_speed_overshoot_ms
            {
                // Keep the integrator current, but don't use the output
                self.calc_throttle(desired_speed);
                brake = self.calc_brake(desired_accel);
            } else {
                throttle = self.calc_throttle(desired_speed);
                brake = 0.0;

                // Hold the brakes until the engine has revved up
                if self.hill_holder && !self.engine_above_hill_hold_release() {
                    brake = self.params.hill_hold_brake_fraction;
                }
            }
        }

        if self.state >= OperatingState::Idle {
            steer = self.calc_steering(desired_curvature);
        }

        if let Err(e) = self.set_goals(throttle, brake, steer) {
            debug!("Speed goals not applied: {}", e);
        }
    }

    /// Throttle setting in [0, 1] for the desired speed.
    ///
    /// A PID controller on the speed error, with a one-sided derivative
    /// term (insufficient acceleration only), an anti-windup integrator and,
    /// once the engine is above idle, a rate limit on the throttle.
    pub fn calc_throttle(&mut self, desired_speed: f32) -> f32 {
        if self.check_slip_back() {
            return 0.0;
        }

        let dir = self.direction();
        let speed = self.speed() * dir;
        let accel = self.acceleration() * dir;

        if self.hill_holder && speed > self.params.max_slipback_speed_ms {
            self.hill_holder = false;
            info!("End hill holding mode");
        }

        let speed_error = desired_speed - speed;
        let accel_error = (-accel).min(0.0);

        let p = &self.params;
        let mut throttle = p.throttle_gain
            * (speed_error
                + self.accum_speed_error * p.throttle_i_term
                + accel_error * p.throttle_d_term);
        let unlimited = throttle;

        // Anti-windup, only integrate while unsaturated or if integrating
        // reduces the windup
        if (throttle > 0.0 && throttle < 1.0) || self.accum_speed_error * speed_error < 0.0 {
            self.accum_speed_error += speed_error * INTEGRATION_INTERVAL_S;
        }

        // Below idle the engine can't respond anyway, so don't limit the rate
        if self.engine_above_idle() {
            if let Some(actual) = self.throttle.actual_fraction() {
                throttle = rate_limit(
                    actual,
                    throttle,
                    INTEGRATION_INTERVAL_S * p.max_throttle_rate,
                );
            }
        }

        if desired_speed <= 0.0 {
            throttle = 0.0;
        }
        let throttle = clamp(throttle, 0.0, 1.0);

        if self.throttle_trace_count % THROTTLE_TRACE_INTERVAL == 0 {
            debug!(
                "Throttle: err {:2.2} accum err {:2.2} cmd {:2.2} limited to {:2.2}",
                speed_error, self.accum_speed_error, unlimited, throttle
            );
        }
        self.throttle_trace_count = self.throttle_trace_count.wrapping_add(1);

        throttle
    }

    /// Brake setting in [0, 1] for the desired acceleration.
    ///
    /// Locks the brakes when slow enough, otherwise proportional to the
    /// measured acceleration in the direction of travel. The desired
    /// acceleration is not used by this law.
    pub fn calc_brake(&mut self, _desired_accel: f32) -> f32 {
        if self.check_slip_back() {
            return 1.0;
        }

        if self.speed().abs() < self.params.lock_brakes_speed_ms {
            return 1.0;
        }

        let accel = self.acceleration() * self.direction();
        clamp(accel * self.params.brake_p_gain, 0.0, 1.0)
    }

    /// Steering setting in [-1, 1] for a curvature (1/r, positive right).
    pub fn calc_steering(&self, curvature: f32) -> f32 {
        let abs_goal = poly_val(
            curvature.abs(),
            &[self.params.steer_p2, self.params.steer_p1, 0.0],
        )
        .min(1.0);

        if curvature > 0.0 {
            abs_goal
        } else {
            -abs_goal
        }
    }

    /// Curvature for a steering setting, the inverse of `calc_steering`.
    pub fn calc_steering_radius(&self, goal: f32) -> f32 {
        let abs_goal = goal.abs();

        // Solve p2*c^2 + p1*c - goal = 0 for the root nearest zero
        let abs_curvature = quadratic_root(self.params.steer_p2, self.params.steer_p1, -abs_goal);

        let curvature = match abs_curvature {
            Some(c) if goal > 0.0 => c,
            Some(c) => -c,
            None => {
                error!(
                    "Steering setting {:1.4} is outside of the steering model",
                    goal
                );
                return 0.0;
            }
        };

        let check = self.calc_steering(curvature);
        if (check - goal).abs() > STEERING_ROUND_TRIP_TOLERANCE {
            error!(
                "calc_steering_radius result incorrect: goal {:1.4} check {:1.4} curvature {:1.4}",
                goal, check, curvature
            );
        }

        curvature
    }

    /// Raise `SlipBack` and start hill holding if moving the wrong way
    /// faster than a little slip, which can happen on a hill.
    fn check_slip_back(&mut self) -> bool {
        let speed = self.speed();
        let dir = self.direction();

        let wrong_way = (speed > 0.0 && dir < 0.0) || (speed < 0.0 && dir > 0.0);

        if wrong_way && speed.abs() > self.params.max_slipback_speed_ms {
            self.set_fault(FaultCode::SlipBack, "Moving in wrong direction");
            if !self.hill_holder {
                info!("Begin hill holding mode, speed {:1.2} m/s", speed);
            }
            self.hill_holder = true;
            return true;
        }

        false
    }
}

#[cfg(test)]
mod test {
    use super::super::test_support::*;
    use super::super::ChassisParams;
    use crate::actuator::sim::SimAxis;
    use comms_if::speed::{FaultCode, Gear, OperatingState};

    /// Drive the odometer at a constant speed for `cycles` updates.
    fn roll(rig: &mut Rig, speed_ms: f64, cycles: usize) {
        let mut odometer = rig.chassis.odometer();
        for _ in 0..cycles {
            odometer += speed_ms * DT;
            rig.vehicle.set_odometer(odometer);
            rig.cycle();
        }
    }

    #[test]
    fn test_slip_back_on_hill() {
        let mut params = ChassisParams::default();
        params.speed_filter_constant = 1.0;
        let mut rig = Rig::with_params(params);
        rig.vehicle.set_gear(Gear::Low);

        rig.cycle();
        roll(&mut rig, -0.8, 2);
        assert!((rig.chassis.speed() + 0.8).abs() < 1e-3);

        assert_eq!(rig.chassis.calc_brake(0.0), 1.0);
        assert_eq!(rig.chassis.fault(), Some(FaultCode::SlipBack));

        // Throttle is cut too
        assert_eq!(rig.chassis.calc_throttle(2.0), 0.0);
    }

    #[test]
    fn test_slip_back_filtered() {
        let mut rig = Rig::new();
        rig.vehicle.set_gear(Gear::Low);
        rig.cycle();

        // Filter output goes -0.5, -0.75, ...
        roll(&mut rig, -1.0, 1);
        assert_eq!(rig.chassis.calc_brake(0.0), 1.0);
        assert_eq!(rig.chassis.fault(), None);

        roll(&mut rig, -1.0, 1);
        assert!(rig.chassis.speed() < -0.7);
        assert_eq!(rig.chassis.calc_brake(0.0), 1.0);
        assert_eq!(rig.chassis.fault(), Some(FaultCode::SlipBack));
    }

    #[test]
    fn test_reverse_is_not_slip_back() {
        let mut params = ChassisParams::default();
        params.speed_filter_constant = 1.0;
        let mut rig = Rig::with_params(params);
        rig.vehicle.set_gear(Gear::Reverse);

        rig.cycle();
        roll(&mut rig, -0.8, 3);
        rig.chassis.calc_brake(0.0);
        assert_eq!(rig.chassis.fault(), None);
    }

    #[test]
    fn test_anti_windup_zero_error() {
        let mut rig = Rig::new();
        rig.cycle();

        // Stationary vehicle, zero desired speed, zero error
        for _ in 0..20 {
            assert_eq!(rig.chassis.calc_throttle(0.0), 0.0);
        }
        assert_eq!(rig.chassis.accum_speed_error, 0.0);
    }

    #[test]
    fn test_anti_windup_saturated() {
        let mut rig = Rig::new();
        rig.cycle();

        // Unsaturated output integrates
        let t = rig.chassis.calc_throttle(2.0);
        assert!((t - 0.24).abs() < 1e-6);
        assert!((rig.chassis.accum_speed_error - 0.2).abs() < 1e-6);

        // A saturated output in the same direction doesn't wind up further
        rig.chassis.accum_speed_error = 50.0;
        assert_eq!(rig.chassis.calc_throttle(2.0), 1.0);
        assert_eq!(rig.chassis.accum_speed_error, 50.0);

        // But unwinds if the error has the opposite sign
        rig.chassis.accum_speed_error = -50.0;
        rig.chassis.calc_throttle(2.0);
        assert!((rig.chassis.accum_speed_error + 49.8).abs() < 1e-4);
    }

    #[test]
    fn test_throttle_rate_limited_above_idle() {
        let mut rig = Rig::new();
        rig.cycle();
        rig.vehicle.set_actual_fraction(SimAxis::Throttle, 0.3);

        // Below idle RPM the full output is available immediately
        rig.vehicle.set_rpm(Some(1000.0));
        assert!((rig.chassis.calc_throttle(5.0) - 0.6).abs() < 1e-5);

        // Above idle RPM the change is limited to 0.025 per cycle
        rig.chassis.accum_speed_error = 0.0;
        rig.vehicle.set_rpm(Some(2000.0));
        assert!((rig.chassis.calc_throttle(5.0) - 0.325).abs() < 1e-5);
    }

    #[test]
    fn test_brake_locks_when_slow() {
        let mut rig = Rig::new();
        rig.vehicle.set_gear(Gear::Low);
        rig.cycle();

        roll(&mut rig, 1.0, 5);
        assert_eq!(rig.chassis.calc_brake(-1.0), 1.0);
    }

    #[test]
    fn test_brake_ignores_desired_accel() {
        let mut rig = Rig::new();
        rig.vehicle.set_gear(Gear::Low);
        rig.cycle();

        roll(&mut rig, 5.0, 5);
        let brake = rig.chassis.calc_brake(0.0);
        assert_eq!(rig.chassis.calc_brake(-3.0), brake);
        assert_eq!(rig.chassis.calc_brake(3.0), brake);
    }

    #[test]
    fn test_steering_round_trip() {
        let rig = Rig::new();
        let c = &rig.chassis;

        let mut curvature = -0.17;
        while curvature <= 0.17 {
            let steer = c.calc_steering(curvature);
            let round_trip = c.calc_steering(c.calc_steering_radius(steer));
            assert!(
                (round_trip - steer).abs() < 0.02,
                "Round trip failed at curvature {}",
                curvature
            );
            curvature += 0.005;
        }
    }

    #[test]
    fn test_steering_saturates() {
        let rig = Rig::new();

        assert_eq!(rig.chassis.calc_steering(0.2), 1.0);
        assert_eq!(rig.chassis.calc_steering(-0.2), -1.0);
        assert_eq!(rig.chassis.calc_steering(0.0), 0.0);
    }

    #[test]
    fn test_set_speed_outside_run_stops() {
        let mut rig = Rig::new();
        rig.drive_to(OperatingState::Idle, 200);

        rig.chassis.set_speed(1.0, 3.0, 0.05);
        assert_eq!(rig.vehicle.goal_fraction(SimAxis::Throttle), 0.0);
        assert_eq!(rig.vehicle.goal_fraction(SimAxis::Brake), 1.0);

        // Steering follows in Idle
        let steer = rig.vehicle.goal_fraction(SimAxis::Steering);
        assert!((steer - rig.chassis.calc_steering(0.05)).abs() < 1e-6);
    }
}
