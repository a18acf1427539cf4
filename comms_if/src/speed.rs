//! # Speed Server Messages
//!
//! The speed server owns the vehicle's chassis. Clients send it a `SpeedSet`
//! once per control cycle describing the desired state, gear and motion, and
//! receive a `SpeedSetReply` describing what the vehicle is actually doing.
//! Anybody may send a `SpeedStop` to force a recoverable emergency stop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Request to set the vehicle's state, gear and motion.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SpeedSet {
    /// Desired operating state
    pub state: OperatingState,

    /// Desired gear
    pub gear: Gear,

    /// Desired speed in meters/second, always nonnegative.
    pub speed: f32,

    /// Rate at which the vehicle should change its speed to match `speed`, in meters/second^2.
    pub acceleration: f32,

    /// Desired curvature (1/r) in 1/meters, positive turns right.
    pub curvature: f32,
}

/// Reply to a `SpeedSet` request, a snapshot of the chassis.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SpeedSetReply {
    /// Actual operating state
    pub state: OperatingState,

    /// Actual gear
    pub gear: Gear,

    /// Actual (filtered) speed in meters/second
    pub speed: f32,

    /// Actual curvature in 1/meters
    pub curvature: f32,

    /// Odometer reading in meters
    pub odometer: f64,

    pub hint: Hint,

    /// The latched fault, if any
    pub last_fault: Option<FaultCode>,
}

/// Force an emergency stop, latching the given fault.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SpeedStop {
    pub fault: FaultCode,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// All messages accepted by the speed server.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum SpeedServerMsg {
    SpeedSet(SpeedSet),
    SpeedStop(SpeedStop),
}

/// Operating states of the vehicle, ordered from least to most active.
///
/// The ordering is meaningful, "at least `Idle`" is written `state >= Idle`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperatingState {
    Parked,
    Reset,
    Starting,
    StartWait,
    Paused,
    RunWait,
    Idle,
    Shifting,
    Run,
}

/// Transmission gears.
///
/// `Unknown` is only ever observed (for instance mid-shift), never commanded.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gear {
    Unknown,
    Reverse,
    Neutral,
    Low,
    High,
}

/// Hint given alongside a reply
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    None,
    /// The request was accepted but needs more time (intermediate states) to take effect.
    Busy,
}

/// Faults that can be latched by the chassis.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCode {
    // Actuator faults
    Engine,
    Brake,
    Throttle,
    Transmission,
    Steering,

    // Dynamics faults
    SlipBack,
    Stuck,
    Roll,

    // Sequencing faults
    ManualMode,
    EventSequenceError,
    ManualKill,

    // Infrastructure faults
    MoveTimeout,
    SpeedTimeout,
    NetworkError,
    InternalError,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OperatingState {
    /// Every state in ascending order.
    pub const ALL: [OperatingState; 9] = [
        OperatingState::Parked,
        OperatingState::Reset,
        OperatingState::Starting,
        OperatingState::StartWait,
        OperatingState::Paused,
        OperatingState::RunWait,
        OperatingState::Idle,
        OperatingState::Shifting,
        OperatingState::Run,
    ];

    /// Position of the state in `ALL`.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            OperatingState::Parked => "parked",
            OperatingState::Reset => "reset",
            OperatingState::Starting => "starting",
            OperatingState::StartWait => "startwait",
            OperatingState::Paused => "paused",
            OperatingState::RunWait => "runwait",
            OperatingState::Idle => "idle",
            OperatingState::Shifting => "shifting",
            OperatingState::Run => "run",
        }
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Gear {
    /// Returns `-1` for reverse and `1` otherwise.
    pub fn direction(self) -> f32 {
        match self {
            Gear::Reverse => -1.0,
            _ => 1.0,
        }
    }
}

impl fmt::Display for Gear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gear::Unknown => "unknown gear",
            Gear::Reverse => "reverse",
            Gear::Neutral => "neutral",
            Gear::Low => "low",
            Gear::High => "high",
        })
    }
}

impl FaultCode {
    /// Short message for the fault, suitable for an LED sign.
    pub fn message(self) -> &'static str {
        match self {
            FaultCode::Engine => "ENGINE FAULT",
            FaultCode::Brake => "BRAKE FAULT",
            FaultCode::Throttle => "THROTTLE FAULT",
            FaultCode::Transmission => "TRANS FAULT",
            FaultCode::Steering => "STEERING FAULT",
            FaultCode::SlipBack => "SLIPPED BACK",
            FaultCode::Stuck => "VEHICLE STUCK",
            FaultCode::Roll => "ROLL FAULT",
            FaultCode::ManualMode => "MANUAL DRIVING",
            FaultCode::EventSequenceError => "EVENT SEQUENCE FAULT",
            FaultCode::ManualKill => "E-STOP",
            FaultCode::MoveTimeout => "MOVE SERVER TIMEOUT",
            FaultCode::SpeedTimeout => "SPEED SERVER TIMEOUT",
            FaultCode::NetworkError => "NETWORK FAULT",
            FaultCode::InternalError => "INTERNAL ERROR",
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl Default for Hint {
    fn default() -> Self {
        Hint::None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_state_order() {
        assert!(OperatingState::Run > OperatingState::Shifting);
        assert!(OperatingState::Idle >= OperatingState::Idle);
        assert!(OperatingState::Paused > OperatingState::StartWait);

        for (i, s) in OperatingState::ALL.iter().enumerate() {
            assert_eq!(s.index(), i);
        }
    }

    #[test]
    fn test_msg_json() {
        let msg = SpeedServerMsg::SpeedSet(SpeedSet {
            state: OperatingState::Run,
            gear: Gear::Low,
            speed: 2.0,
            acceleration: 0.5,
            curvature: 0.0,
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.starts_with("{\"SpeedSet\":"));
        assert!(json.contains("\"Low\""));

        let stop: SpeedServerMsg =
            serde_json::from_str("{\"SpeedStop\":{\"fault\":\"Roll\"}}").unwrap();
        assert_eq!(
            stop,
            SpeedServerMsg::SpeedStop(SpeedStop {
                fault: FaultCode::Roll
            })
        );
    }

    #[test]
    fn test_reply_no_fault() {
        let reply = SpeedSetReply {
            state: OperatingState::Parked,
            gear: Gear::Neutral,
            speed: 0.0,
            curvature: 0.0,
            odometer: 12.5,
            hint: Hint::default(),
            last_fault: None,
        };

        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("\"last_fault\":null"));
    }
}
