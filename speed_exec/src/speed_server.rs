//! # Speed Server
//!
//! The speed server owns the chassis and handles the messages of its single
//! client. Each cycle the chassis is updated, then the message received
//! during the cycle (if any) is handled:
//!
//! - No message: the client has missed its deadline, which stops the vehicle
//!   if it is running.
//! - `SpeedStop`: latch the fault carried by the message.
//! - `SpeedSet`: request the state and gear changes, reply with a snapshot
//!   of the chassis, then apply the desired motion.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::speed::{
    FaultCode, Hint, OperatingState, SpeedServerMsg, SpeedSet, SpeedSetReply, SpeedStop,
};
use log::{info, warn};
use serde::Deserialize;
use util::{module::State, session::Session, time::Clock};

use crate::chassis::{Chassis, ChassisActuators, ChassisParams, ParamsError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Speed server module state.
///
/// Created with the actuators and clock the chassis will use, the chassis
/// itself is built by `init`.
pub struct SpeedServer {
    pending: Option<(ChassisActuators, Box<dyn Clock>)>,

    chassis: Option<Chassis>,

    report: StatusReport,
}

/// Initialisation data for the speed server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeedServerParams {
    pub chassis: ChassisParams,

    /// Dump the chassis state periodically
    pub verbose: bool,
}

/// Status of one cycle of the speed server.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusReport {
    /// No message was received this cycle
    pub timeout: bool,

    /// The client requested an illegal state or gear change
    pub sequence_error: bool,

    /// A requested change is in progress
    pub busy: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SpeedServerError {
    #[error("The speed server has already been initialised")]
    AlreadyInitialised,

    #[error("The speed server has not been initialised")]
    NotInitialised,

    #[error("Invalid chassis parameters: {0}")]
    InvalidParams(ParamsError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SpeedServer {
    pub fn new(actuators: ChassisActuators, clock: Box<dyn Clock>) -> Self {
        Self {
            pending: Some((actuators, clock)),
            chassis: None,
            report: StatusReport::default(),
        }
    }

    /// Snapshot of the chassis, `None` before initialisation.
    pub fn snapshot(&self) -> Option<SpeedSetReply> {
        self.chassis.as_ref().map(snapshot)
    }

    pub fn chassis(&self) -> Option<&Chassis> {
        self.chassis.as_ref()
    }
}

impl State for SpeedServer {
    type InitData = SpeedServerParams;
    type InitError = SpeedServerError;

    type InputData = Option<SpeedServerMsg>;
    type OutputData = Option<SpeedSetReply>;
    type StatusReport = StatusReport;
    type ProcError = SpeedServerError;

    /// Build the chassis from the parameters.
    fn init(
        &mut self,
        init_data: Self::InitData,
        _session: Option<&Session>,
    ) -> Result<(), Self::InitError> {
        let (actuators, clock) = self
            .pending
            .take()
            .ok_or(SpeedServerError::AlreadyInitialised)?;

        let mut chassis = Chassis::new(init_data.chassis, actuators, clock)
            .map_err(SpeedServerError::InvalidParams)?;
        chassis.set_verbose(init_data.verbose);

        self.chassis = Some(chassis);

        Ok(())
    }

    /// Update the chassis and handle this cycle's message.
    ///
    /// Only `SpeedSet` messages produce a reply.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        self.report = StatusReport::default();

        let chassis = self
            .chassis
            .as_mut()
            .ok_or(SpeedServerError::NotInitialised)?;

        chassis.update();

        let output = match input_data {
            None => {
                self.report.timeout = true;
                handle_timeout(chassis);
                None
            }
            Some(SpeedServerMsg::SpeedStop(msg)) => {
                handle_speed_stop(chassis, msg);
                None
            }
            Some(SpeedServerMsg::SpeedSet(msg)) => {
                Some(handle_speed_set(chassis, msg, &mut self.report))
            }
        };

        Ok((output, self.report))
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// A missed message stops a running vehicle.
fn handle_timeout(chassis: &mut Chassis) {
    if chassis.state() == OperatingState::Run {
        chassis.set_fault(FaultCode::MoveTimeout, "No speed request received in time");
    }
}

fn handle_speed_stop(chassis: &mut Chassis, msg: &SpeedStop) {
    info!("Stop requested by client: {}", msg.fault);
    chassis.set_fault(msg.fault, "Stop requested by client");
}

fn handle_speed_set(chassis: &mut Chassis, msg: &SpeedSet, report: &mut StatusReport) -> SpeedSetReply {
    use OperatingState::*;

    let mut good = true;
    let mut busy = false;

    if msg.state != chassis.state() {
        // Asking to run in another gear means stopping to shift first
        let new_state = if msg.state == Run && msg.gear != chassis.gear() {
            Shifting
        } else {
            msg.state
        };

        let (accepted, b) = chassis.set_state(new_state);
        good = accepted;
        busy = b;
    }

    if good && !busy {
        if msg.gear != chassis.gear() {
            let (accepted, b) = chassis.set_gear(msg.gear);
            good = accepted;
            busy = b;
        } else if chassis.state() == Shifting && msg.state == Run {
            let (accepted, b) = chassis.set_state(Run);
            good = accepted;
            busy = b;
        }
    }

    if !good {
        warn!(
            "State or gear change rejected ({} to {}) ({} to {})",
            chassis.state(),
            msg.state,
            chassis.gear(),
            msg.gear
        );
        chassis.set_fault(FaultCode::EventSequenceError, "State or gear change rejected");
        report.sequence_error = true;
    }

    let mut reply = snapshot(chassis);
    if busy {
        reply.hint = Hint::Busy;
        report.busy = true;
    }

    // The fault has now been reported to the client, so clear it if possible
    if reply.last_fault.is_some() {
        chassis.reset_fault();
    }

    if chassis.state() == Run {
        chassis.set_speed(msg.acceleration, msg.speed, msg.curvature);
    }

    reply
}

fn snapshot(chassis: &Chassis) -> SpeedSetReply {
    SpeedSetReply {
        state: chassis.state(),
        gear: chassis.gear(),
        speed: chassis.speed(),
        curvature: chassis.curvature(),
        odometer: chassis.odometer(),
        hint: Hint::None,
        last_fault: chassis.fault(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::actuator::sim::{SimAxis, SimParams, SimVehicle};
    use comms_if::speed::Gear;
    use util::time::ManualClock;

    struct Harness {
        server: SpeedServer,
        vehicle: SimVehicle,
        clock: ManualClock,
    }

    impl Harness {
        fn new() -> Self {
            let vehicle = SimVehicle::new(SimParams::default());
            let clock = ManualClock::new(10.0);
            let mut server = SpeedServer::new(vehicle.actuators(), Box::new(clock.clone()));
            server.init(SpeedServerParams::default(), None).unwrap();

            Self {
                server,
                vehicle,
                clock,
            }
        }

        fn proc(&mut self, msg: Option<SpeedServerMsg>) -> (Option<SpeedSetReply>, StatusReport) {
            self.clock.advance(0.1);
            self.server.proc(&msg).unwrap()
        }

        fn speed_set(&mut self, state: OperatingState, gear: Gear, speed: f32) -> SpeedSetReply {
            let msg = SpeedServerMsg::SpeedSet(SpeedSet {
                state,
                gear,
                speed,
                acceleration: 0.0,
                curvature: 0.0,
            });
            self.proc(Some(msg)).0.unwrap()
        }

        /// Repeat a request until the reply shows `state`.
        fn request_until(&mut self, state: OperatingState, gear: Gear, max_cycles: usize) {
            for _ in 0..max_cycles {
                let reply = self.speed_set(state, gear, 0.0);
                if reply.state == state && reply.gear == gear {
                    return;
                }
            }
            panic!("Did not reach {} in {}", state, gear);
        }
    }

    #[test]
    fn test_init() {
        let vehicle = SimVehicle::new(SimParams::default());
        let mut server = SpeedServer::new(vehicle.actuators(), Box::new(ManualClock::new(0.0)));

        assert!(matches!(
            server.proc(&None),
            Err(SpeedServerError::NotInitialised)
        ));
        assert!(server.snapshot().is_none());

        let mut params = SpeedServerParams::default();
        params.chassis.brake_p_gain = -1.0;
        assert!(matches!(
            server.init(params, None),
            Err(SpeedServerError::InvalidParams(_))
        ));

        // The actuators were consumed by the failed attempt
        assert!(matches!(
            server.init(SpeedServerParams::default(), None),
            Err(SpeedServerError::AlreadyInitialised)
        ));
    }

    #[test]
    fn test_startup_reports_busy() {
        let mut h = Harness::new();

        let reply = h.speed_set(OperatingState::Idle, Gear::Neutral, 0.0);
        assert_eq!(reply.state, OperatingState::Starting);
        assert_eq!(reply.hint, Hint::Busy);
        assert_eq!(reply.last_fault, None);

        h.request_until(OperatingState::Idle, Gear::Neutral, 200);
    }

    #[test]
    fn test_run_while_starting_busy() {
        let mut h = Harness::new();

        let reply = h.speed_set(OperatingState::Idle, Gear::Neutral, 0.0);
        assert_eq!(reply.state, OperatingState::Starting);

        // Asking to run mid-crank must not abort the start
        let (reply, report) = h.proc(Some(SpeedServerMsg::SpeedSet(SpeedSet {
            state: OperatingState::Run,
            gear: Gear::Neutral,
            speed: 0.0,
            acceleration: 0.0,
            curvature: 0.0,
        })));
        let reply = reply.unwrap();
        assert!(!report.sequence_error);
        assert_eq!(reply.hint, Hint::Busy);
        assert_eq!(reply.last_fault, None);
        assert_eq!(reply.state, OperatingState::Starting);
    }

    #[test]
    fn test_run_in_gear() {
        let mut h = Harness::new();
        h.request_until(OperatingState::Idle, Gear::Neutral, 200);

        // Running in another gear goes through Shifting
        let reply = h.speed_set(OperatingState::Run, Gear::Low, 0.0);
        assert_eq!(reply.state, OperatingState::Shifting);

        h.request_until(OperatingState::Run, Gear::Low, 20);

        // Now moving
        let reply = h.speed_set(OperatingState::Run, Gear::Low, 2.0);
        assert_eq!(reply.last_fault, None);
        assert!(h.vehicle.goal_fraction(SimAxis::Throttle) > 0.0);
        assert_eq!(h.vehicle.goal_fraction(SimAxis::Brake), 0.0);
    }

    #[test]
    fn test_timeout_stops_and_clears() {
        let mut h = Harness::new();
        h.request_until(OperatingState::Idle, Gear::Neutral, 200);
        h.request_until(OperatingState::Run, Gear::Low, 20);

        let (reply, report) = h.proc(None);
        assert!(reply.is_none());
        assert!(report.timeout);
        assert_eq!(h.server.snapshot().unwrap().state, OperatingState::Idle);

        // Reported once, then cleared since the vehicle is stopped
        let reply = h.speed_set(OperatingState::Idle, Gear::Low, 0.0);
        assert_eq!(reply.last_fault, Some(FaultCode::MoveTimeout));
        let reply = h.speed_set(OperatingState::Idle, Gear::Low, 0.0);
        assert_eq!(reply.last_fault, None);
    }

    #[test]
    fn test_timeout_ignored_when_not_running() {
        let mut h = Harness::new();

        let (_, report) = h.proc(None);
        assert!(report.timeout);
        assert_eq!(h.server.snapshot().unwrap().last_fault, None);
    }

    #[test]
    fn test_speed_stop() {
        let mut h = Harness::new();
        h.request_until(OperatingState::Idle, Gear::Neutral, 200);

        let msg = SpeedServerMsg::SpeedStop(SpeedStop {
            fault: FaultCode::ManualKill,
        });
        let (reply, _) = h.proc(Some(msg));
        assert!(reply.is_none());

        let snapshot = h.server.snapshot().unwrap();
        assert_eq!(snapshot.last_fault, Some(FaultCode::ManualKill));
        assert_eq!(snapshot.state, OperatingState::Idle);
    }

    #[test]
    fn test_illegal_request_faults() {
        let mut h = Harness::new();

        let msg = SpeedServerMsg::SpeedSet(SpeedSet {
            state: OperatingState::Run,
            gear: Gear::Neutral,
            speed: 1.0,
            acceleration: 0.0,
            curvature: 0.0,
        });
        let (reply, report) = h.proc(Some(msg));

        assert!(report.sequence_error);
        assert_eq!(reply.unwrap().last_fault, Some(FaultCode::EventSequenceError));
        assert_eq!(h.server.snapshot().unwrap().state, OperatingState::Parked);
    }
}
