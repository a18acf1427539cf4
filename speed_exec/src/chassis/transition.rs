//! Operating state transitions
//!
//! `set_state` handles requests from the caller, `update_state` advances the
//! state on its own once per update (time limits, engine and enable checks).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::speed::{FaultCode, OperatingState};
use log::{debug, info};
use std::time::Duration;

use super::Chassis;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Chassis {
    /// Request a new operating state.
    ///
    /// Returns `(accepted, busy)`. An accepted request may not take effect
    /// immediately, in which case `busy` is set and the caller shall repeat
    /// the request on following cycles. Only `Parked`, `Paused`, `Idle`,
    /// `Shifting` and `Run` can be requested.
    pub fn set_state(&mut self, requested: OperatingState) -> (bool, bool) {
        use OperatingState::*;

        if requested == self.state {
            return (true, false);
        }

        let enabled = self.enable_inputs().enabled();
        let mut target = requested;
        let mut busy = false;

        match requested {
            // Always legal, although drastic
            Parked => (),

            Paused => {
                if self.state < Paused {
                    match self.state {
                        Parked => {
                            if !enabled {
                                return (true, true);
                            }
                            // Crank the engine, paused follows once it runs
                            target = Starting;
                            busy = true;
                        }
                        // Startup in progress
                        _ => return (true, true),
                    }
                }
            }

            Idle => {
                if self.state < Idle {
                    match self.state {
                        // Mandatory wait, Idle follows on its time limit
                        RunWait => return (true, true),
                        Paused => {
                            if !enabled {
                                return (true, true);
                            }
                            target = RunWait;
                            busy = true;
                        }
                        _ => {
                            self.set_state(Paused);
                            return (true, true);
                        }
                    }
                }
            }

            Run => match self.state {
                Idle => {
                    if !self.stopped() || !self.in_desired_gear() {
                        return (true, true);
                    }
                }
                Shifting => {
                    if !self.in_desired_gear() {
                        return (true, true);
                    }
                }
                // Too far from running to be a sensible request
                Parked => return (false, false),
                _ => {
                    self.set_state(Idle);
                    return (true, true);
                }
            },

            Shifting => match self.state {
                Run | Idle => {
                    if !enabled || !self.stopped() {
                        return (true, true);
                    }
                }
                _ => {
                    self.set_state(Idle);
                    return (true, true);
                }
            },

            Reset | Starting | StartWait | RunWait => return (false, false),
        }

        self.state_change(target, "as requested");
        (true, busy)
    }

    /// Advance the state machine, called once per update.
    ///
    /// Applies the current state's time limit, then the checks specific to
    /// the state. May raise faults.
    pub(super) fn update_state(&mut self) {
        use OperatingState::*;

        let elapsed_s = (self.clock.now_s() - self.state_timestamp_s).max(0.0);
        if let Some(target) = self
            .table
            .advance_on_timeout(self.state, Duration::from_secs_f64(elapsed_s))
        {
            self.state_change(target, "Timeout");
            return;
        }

        let inputs = self.enable_inputs();
        let enabled = inputs.enabled();

        match self.state {
            Idle => {
                self.check_engine();
                if !enabled && self.stopped() {
                    self.state_change(Paused, "E-stop not enabled");
                }
            }

            Run | RunWait => {
                self.check_engine();
                if !enabled {
                    self.state_change(Paused, "E-stop not enabled");
                }
            }

            Shifting => {
                self.check_engine();
                if !enabled {
                    self.state_change(Idle, "E-stop not enabled");
                } else if self.in_desired_gear() {
                    // The caller's next request for Run leaves Shifting
                    debug!("Shift to {} completed", self.gear());
                }
            }

            Paused => {
                if !inputs.not_estop || !inputs.in_auto {
                    self.state_change(Parked, "E-stop not enabled");
                } else {
                    self.check_engine();
                }
            }

            Starting => {
                if self.engine_running() {
                    info!("Engine has started");
                    self.state_change(Paused, "Engine has started");
                }
            }

            // Held until their time limit
            Parked | Reset | StartWait => (),
        }
    }

    /// Change state, logging the reason. No-op if already in `new_state`.
    pub(super) fn state_change(&mut self, new_state: OperatingState, reason: &str) {
        if new_state == self.state {
            return;
        }

        info!(
            "CHASSIS STATE CHANGE: {} -> {}: {}",
            self.state, new_state, reason
        );
        self.state_timestamp_s = self.clock.now_s();
        self.state = new_state;
    }

    /// Raise an engine fault if the engine has stalled.
    fn check_engine(&mut self) {
        if !self.engine_running() {
            info!("Engine has stalled");
            self.set_fault(FaultCode::Engine, "Engine has stalled");
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::test_support::*;
    use super::super::ChassisParams;
    use crate::actuator::{sim::SimAxis, EnableInputs};
    use comms_if::speed::{FaultCode, Gear, OperatingState::*};
    use util::time::Clock;

    #[test]
    fn test_same_state_accepted() {
        let mut rig = Rig::new();
        rig.cycle();
        assert_eq!(rig.chassis.set_state(Parked), (true, false));
    }

    #[test]
    fn test_illegal_requests() {
        let mut rig = Rig::new();
        rig.cycle();

        assert_eq!(rig.chassis.set_state(Run), (false, false));
        assert_eq!(rig.chassis.set_state(Starting), (false, false));
        assert_eq!(rig.chassis.set_state(RunWait), (false, false));
        assert_eq!(rig.chassis.state(), Parked);
    }

    #[test]
    fn test_run_during_startup_busy() {
        let mut rig = Rig::new();
        rig.vehicle.set_crank_refreshes(1000);
        rig.cycle();

        rig.chassis.set_state(Paused);
        assert_eq!(rig.chassis.state(), Starting);

        // Cranking carries on towards Idle
        assert_eq!(rig.chassis.set_state(Run), (true, true));
        assert_eq!(rig.chassis.state(), Starting);
        assert_eq!(rig.chassis.fault(), None);

        for _ in 0..101 {
            rig.cycle();
        }
        assert_eq!(rig.chassis.state(), StartWait);
        assert_eq!(rig.chassis.set_state(Run), (true, true));
        assert_eq!(rig.chassis.state(), StartWait);
    }

    #[test]
    fn test_startup_sequence() {
        let mut rig = Rig::new();
        rig.cycle();

        // The first request already cranks the engine
        assert_eq!(rig.chassis.set_state(Idle), (true, true));
        assert_eq!(rig.chassis.state(), Starting);

        let seen = rig.drive_to(Idle, 200);
        assert_eq!(seen, vec![Starting, Paused, RunWait, Idle]);
        assert_eq!(rig.chassis.fault(), None);
    }

    #[test]
    fn test_runwait_mandatory_wait() {
        let mut rig = Rig::new();
        rig.drive_to(Paused, 100);

        assert_eq!(rig.chassis.set_state(Idle), (true, true));
        assert_eq!(rig.chassis.state(), RunWait);
        let entered = rig.clock.now_s();

        // Repeated requests do not cut the wait short
        while rig.chassis.state() == RunWait {
            rig.cycle();
            assert!(rig.chassis.set_state(Idle).0);
        }

        assert_eq!(rig.chassis.state(), Idle);
        assert!(rig.clock.now_s() - entered > 5.0);
    }

    #[test]
    fn test_cranking_timeout() {
        let mut rig = Rig::new();
        rig.vehicle.set_crank_refreshes(1000);
        rig.cycle();

        rig.chassis.set_state(Paused);
        assert_eq!(rig.chassis.state(), Starting);

        // Crank for 10 s, then rest the starter
        for _ in 0..101 {
            rig.cycle();
        }
        assert_eq!(rig.chassis.state(), StartWait);
        assert_eq!(rig.vehicle.relays(), (false, false));

        // Requests are busy while the starter cools
        assert_eq!(rig.chassis.set_state(Paused), (true, true));

        for _ in 0..201 {
            rig.cycle();
        }
        assert_eq!(rig.chassis.state(), Starting);
    }

    #[test]
    fn test_not_enabled_stays_parked() {
        let mut rig = Rig::new();
        rig.vehicle.set_enable_inputs(EnableInputs::from_bits(0b101));
        rig.cycle();

        assert_eq!(rig.chassis.set_state(Paused), (true, true));
        assert_eq!(rig.chassis.state(), Parked);

        // A failed read of the inputs counts as not enabled
        rig.vehicle.set_enable_inputs(EnableInputs::from_bits(0b111));
        rig.vehicle.fail_enable_read(true);
        assert_eq!(rig.chassis.set_state(Idle), (true, true));
        assert_eq!(rig.chassis.state(), Parked);
    }

    #[test]
    fn test_pause_from_run_states() {
        let mut rig = Rig::new();
        rig.drive_to(Idle, 200);

        // Pausing drops Idle to Paused once stopped
        rig.vehicle.set_enable_inputs(EnableInputs::from_bits(0b101));
        rig.cycle();
        assert_eq!(rig.chassis.state(), Paused);

        // Losing auto mode while paused parks the vehicle
        rig.vehicle.set_enable_inputs(EnableInputs::from_bits(0b011));
        rig.cycle();
        assert_eq!(rig.chassis.state(), Parked);
    }

    #[test]
    fn test_run_from_idle_needs_gear() {
        let mut rig = Rig::new();
        rig.drive_to(Idle, 200);

        rig.vehicle.set_gear(Gear::Low);
        rig.cycle();
        assert_eq!(rig.chassis.set_state(Run), (true, false));
        assert_eq!(rig.chassis.state(), Run);

        // Dropping to a lower state is always legal
        assert_eq!(rig.chassis.set_state(Idle), (true, false));
        assert_eq!(rig.chassis.state(), Idle);
    }

    #[test]
    fn test_run_from_idle_busy_while_moving() {
        let mut rig = Rig::new();
        rig.drive_to(Idle, 200);

        rig.vehicle.set_actual_fraction(SimAxis::Brake, 0.0);
        assert_eq!(rig.chassis.set_state(Run), (true, true));
        assert_eq!(rig.chassis.state(), Idle);
    }

    #[test]
    fn test_engine_stall_faults() {
        let mut rig = Rig::new();
        rig.drive_to(Idle, 200);

        rig.vehicle.set_rpm(Some(0.0));
        rig.cycle();
        assert_eq!(rig.chassis.fault(), Some(FaultCode::Engine));
        assert_eq!(rig.chassis.state(), Idle);
    }

    #[test]
    fn test_shift_timeout_resets() {
        let mut params = ChassisParams::default();
        params.shift_timeout_s = 1.0;
        let mut rig = Rig::with_params(params);
        rig.drive_to(Idle, 200);

        assert_eq!(rig.chassis.set_state(Shifting), (true, false));

        for _ in 0..11 {
            rig.cycle();
        }
        assert_eq!(rig.chassis.state(), Reset);

        for _ in 0..51 {
            rig.cycle();
        }
        assert_eq!(rig.chassis.state(), Parked);
    }
}
