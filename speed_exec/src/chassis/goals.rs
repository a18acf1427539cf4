//! Actuator goals and gear changes

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::speed::{FaultCode, Gear, OperatingState};
use log::info;
use util::maths::clamp;

use super::{Chassis, Fault};

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Chassis {
    /// Command the actuators with normalised settings.
    ///
    /// Outside of `Run` the throttle is forced closed and the brake fully
    /// on. Goals go out brake first, then throttle, then steering, followed
    /// by a watchdog reset if the current state enables the watchdog.
    pub fn set_goals(&mut self, throttle: f32, brake: f32, steer: f32) -> Result<(), Fault> {
        let (throttle, brake) = if self.state == OperatingState::Run {
            (throttle, brake)
        } else {
            (0.0, 1.0)
        };

        if !self.brake.is_ready() {
            return Err(self.set_fault(FaultCode::Brake, "Brake controller not ready"));
        }
        if !self.throttle.is_ready() {
            return Err(self.set_fault(FaultCode::Throttle, "Throttle controller not ready"));
        }

        let brake_goal = clamp(brake, 0.0, 1.0) * self.brake.goal_scale();
        let throttle_goal = clamp(throttle, 0.0, 1.0) * self.throttle.goal_scale();
        let steer_goal = clamp(steer, -1.0, 1.0) * self.steering.goal_scale();

        if !(brake_goal.is_finite() && throttle_goal.is_finite() && steer_goal.is_finite()) {
            return Err(self.set_fault(
                FaultCode::InternalError,
                &format!(
                    "Invalid goals: throttle {} brake {} steer {}",
                    throttle_goal, brake_goal, steer_goal
                ),
            ));
        }

        if let Err(e) = self.brake.set_goal(brake_goal) {
            return Err(self.set_fault(FaultCode::Brake, &e.to_string()));
        }
        if let Err(e) = self.throttle.set_goal(throttle_goal) {
            return Err(self.set_fault(FaultCode::Throttle, &e.to_string()));
        }
        if let Err(e) = self.steering.set_goal(steer_goal) {
            return Err(self.set_fault(FaultCode::Steering, &e.to_string()));
        }

        if self.descriptor().enables_watchdog {
            if let Err(e) = self.brake.reset_watchdog() {
                return Err(self.set_fault(FaultCode::Brake, &e.to_string()));
            }
        }

        Ok(())
    }

    /// Goals for any stopped state, keeping the last steering goal.
    pub(super) fn set_goals_stopped(&mut self) -> Result<(), Fault> {
        let steer = self.steering.goal_fraction().unwrap_or(0.0);
        self.set_goals(0.0, 1.0, steer)
    }

    /// Request a gear change.
    ///
    /// Returns `(accepted, busy)` like `set_state`. In `Run` this first
    /// requests `Shifting`, so the vehicle stops before the shift starts.
    /// The shift itself completes over the following updates, `gear()`
    /// reads `Gear::Unknown` until it does.
    pub fn set_gear(&mut self, requested: Gear) -> (bool, bool) {
        use OperatingState::*;

        if requested == Gear::Unknown {
            return (false, false);
        }
        if requested == self.gear() {
            return (true, false);
        }

        info!("Requested shift from {} to {}", self.gear(), requested);

        match self.state {
            Parked | Idle | Shifting => (),
            Paused => {
                if self.params.paused_shift_neutral_only && requested != Gear::Neutral {
                    return (false, false);
                }
            }
            RunWait => return (true, true),
            Run => {
                info!("Shift requested in run mode - stopping");
                let (accepted, busy) = self.set_state(Shifting);
                if !accepted {
                    return (false, false);
                }
                if busy {
                    return (true, true);
                }
            }
            Reset | Starting | StartWait => return (false, false),
        }

        if self.state >= Run {
            return (false, false);
        }

        if !self.stopped() {
            return (true, true);
        }

        if self.transmission.goal_gear() == requested {
            return (true, false);
        }

        if let Err(e) = self.transmission.set_goal_gear(requested) {
            self.set_fault(
                FaultCode::Transmission,
                &format!("Error requesting gear change: {}", e),
            );
            return (false, false);
        }

        (true, false)
    }
}

#[cfg(test)]
mod test {
    use super::super::test_support::*;
    use super::super::ChassisParams;
    use crate::actuator::sim::{SimAxis, SimCommand};
    use comms_if::speed::{FaultCode, Gear, OperatingState};

    /// Get an idling vehicle into `Run` in low gear.
    fn running_rig() -> Rig {
        let mut rig = Rig::new();
        rig.drive_to(OperatingState::Idle, 200);
        rig.vehicle.set_gear(Gear::Low);
        rig.cycle();
        assert_eq!(rig.chassis.set_state(OperatingState::Run), (true, false));
        rig
    }

    /// Get a rig into `state`, which must not be `Run`.
    fn rig_in(state: OperatingState) -> Rig {
        use OperatingState::*;

        let mut params = ChassisParams::default();
        params.shift_timeout_s = 1.0;
        let mut rig = Rig::with_params(params);

        match state {
            Parked => rig.cycle(),
            Starting | StartWait => {
                rig.vehicle.set_crank_refreshes(1000);
                rig.cycle();
                rig.chassis.set_state(Paused);
                if state == StartWait {
                    for _ in 0..101 {
                        rig.cycle();
                    }
                }
            }
            RunWait => {
                rig.drive_to(Paused, 100);
                rig.chassis.set_state(Idle);
            }
            Shifting | Reset => {
                rig.drive_to(Idle, 200);
                rig.chassis.set_state(Shifting);
                if state == Reset {
                    for _ in 0..11 {
                        rig.cycle();
                    }
                }
            }
            Paused | Idle => {
                rig.drive_to(state, 200);
            }
            Run => panic!("Use running_rig"),
        }

        assert_eq!(rig.chassis.state(), state);
        rig
    }

    #[test]
    fn test_fail_safe_outside_run() {
        for state in OperatingState::ALL.iter().filter(|s| **s != OperatingState::Run) {
            let mut rig = rig_in(*state);

            // Ask for motion, the next update must still stop the vehicle
            rig.chassis.set_speed(1.0, 5.0, 0.0);
            rig.vehicle.clear_commands();
            rig.cycle();
            assert_eq!(rig.chassis.state(), *state);
            assert_eq!(
                rig.vehicle.goal_fraction(SimAxis::Throttle),
                0.0,
                "Throttle open in {}",
                state
            );
            assert_eq!(
                rig.vehicle.goal_fraction(SimAxis::Brake),
                1.0,
                "Brake released in {}",
                state
            );

            // The brake watchdog is only kept alive where the state enables it
            let watchdog = rig.vehicle.commands().contains(&SimCommand::WatchdogReset);
            assert_eq!(watchdog, rig.chassis.descriptor().enables_watchdog, "{}", state);
        }
    }

    #[test]
    fn test_command_order() {
        let mut rig = running_rig();
        rig.vehicle.clear_commands();

        rig.chassis.set_speed(0.5, 3.0, 0.0);

        let cmds = rig.vehicle.commands();
        assert_eq!(cmds.len(), 4);
        assert!(matches!(cmds[0], SimCommand::Goal("brake", _)));
        assert!(matches!(cmds[1], SimCommand::Goal("throttle", _)));
        assert!(matches!(cmds[2], SimCommand::Goal("steering", _)));
        assert_eq!(cmds[3], SimCommand::WatchdogReset);

        // Driving, so brake off and throttle open
        assert_eq!(cmds[0], SimCommand::Goal("brake", 0.0));
        assert!(rig.vehicle.goal_fraction(SimAxis::Throttle) > 0.0);
    }

    #[test]
    fn test_no_watchdog_in_idle() {
        let mut rig = Rig::new();
        rig.drive_to(OperatingState::Idle, 200);
        rig.vehicle.clear_commands();

        rig.cycle();
        assert!(!rig.vehicle.commands().contains(&SimCommand::WatchdogReset));
    }

    #[test]
    fn test_not_ready_faults() {
        let mut rig = Rig::new();
        rig.cycle();

        rig.vehicle.set_ready(SimAxis::Brake, false);
        let fault = rig.chassis.set_goals(0.0, 1.0, 0.0).unwrap_err();
        assert_eq!(fault.code, FaultCode::Brake);

        let mut rig = Rig::new();
        rig.cycle();
        rig.vehicle.set_ready(SimAxis::Throttle, false);
        let fault = rig.chassis.set_goals(0.0, 1.0, 0.0).unwrap_err();
        assert_eq!(fault.code, FaultCode::Throttle);
    }

    #[test]
    fn test_command_failure_faults() {
        let mut rig = running_rig();

        rig.vehicle.fail_commands(SimAxis::Steering, true);
        let fault = rig.chassis.set_goals(0.0, 1.0, 0.2).unwrap_err();
        assert_eq!(fault.code, FaultCode::Steering);
        assert_eq!(rig.chassis.state(), OperatingState::Idle);
    }

    #[test]
    fn test_stopped_keeps_steering() {
        let mut rig = Rig::new();
        rig.drive_to(OperatingState::Idle, 200);

        rig.chassis.set_speed(0.0, 0.0, 0.1);
        let steer = rig.vehicle.goal_fraction(SimAxis::Steering);
        assert!(steer > 0.0);

        rig.cycle();
        assert!((rig.vehicle.goal_fraction(SimAxis::Steering) - steer).abs() < 1e-6);
    }

    #[test]
    fn test_gear_policy() {
        let mut rig = Rig::new();
        rig.cycle();

        assert_eq!(rig.chassis.set_gear(Gear::Unknown), (false, false));
        assert_eq!(rig.chassis.set_gear(Gear::Neutral), (true, false));

        // Parked, shifting allowed once stopped
        assert_eq!(rig.chassis.set_gear(Gear::Low), (true, false));
        assert_eq!(rig.chassis.gear(), Gear::Unknown);
        for _ in 0..5 {
            rig.cycle();
        }
        assert_eq!(rig.chassis.gear(), Gear::Low);

        // Paused, only into neutral
        rig.drive_to(OperatingState::Paused, 100);
        assert_eq!(rig.chassis.set_gear(Gear::High), (false, false));
        assert_eq!(rig.chassis.set_gear(Gear::Neutral), (true, false));
    }

    #[test]
    fn test_gear_busy_in_runwait() {
        let mut rig = Rig::new();
        rig.drive_to(OperatingState::Paused, 100);
        rig.chassis.set_state(OperatingState::Idle);
        assert_eq!(rig.chassis.state(), OperatingState::RunWait);
        assert_eq!(rig.chassis.set_gear(Gear::Low), (true, true));
    }

    #[test]
    fn test_gear_from_run_shifts() {
        let mut rig = running_rig();

        assert_eq!(rig.chassis.set_gear(Gear::Reverse), (true, false));
        assert_eq!(rig.chassis.state(), OperatingState::Shifting);

        for _ in 0..5 {
            rig.cycle();
        }
        assert_eq!(rig.chassis.gear(), Gear::Reverse);
        assert_eq!(rig.chassis.set_state(OperatingState::Run), (true, false));
    }

    #[test]
    fn test_gear_from_run_moving_busy() {
        let mut rig = running_rig();

        rig.vehicle.set_actual_fraction(SimAxis::Brake, 0.0);
        assert_eq!(rig.chassis.set_gear(Gear::Reverse), (true, true));
        assert_eq!(rig.chassis.state(), OperatingState::Run);
    }

    #[test]
    fn test_transmission_failure() {
        let mut rig = Rig::new();
        rig.cycle();

        rig.vehicle.fail_commands(SimAxis::Transmission, true);
        assert_eq!(rig.chassis.set_gear(Gear::Low), (false, false));
        assert_eq!(rig.chassis.fault(), Some(FaultCode::Transmission));
    }
}
