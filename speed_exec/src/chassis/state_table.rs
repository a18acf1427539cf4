//! Operating state table
//!
//! Each operating state is described by one row: whether it enables the
//! hardware watchdog, which engine relays it drives, and how long the vehicle
//! may stay in it before falling back to another state.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::speed::OperatingState;
use std::time::Duration;

use super::ChassisParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Immutable description of one operating state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDescriptor {
    pub state: OperatingState,
    pub name: &'static str,

    /// Watchdog resets are issued (which also sounds the horn)
    pub enables_watchdog: bool,

    /// Engine run relay on
    pub engine_should_run: bool,

    /// Starter crank relay on
    pub cranking: bool,

    /// Maximum time allowed in this state, `None` for no limit
    pub time_limit: Option<Duration>,

    /// State to fall back to once `time_limit` is exceeded
    pub timeout_target: OperatingState,
}

/// The descriptors of all operating states, in `OperatingState` order.
#[derive(Debug, Clone)]
pub struct StateTable {
    rows: Vec<StateDescriptor>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl StateTable {
    /// Build the table, taking the time limits from the parameters.
    pub fn new(params: &ChassisParams) -> Self {
        use OperatingState::*;

        let secs = Duration::from_secs_f64;
        let row = |state: OperatingState,
                   enables_watchdog,
                   engine_should_run,
                   cranking,
                   limit: Option<(Duration, OperatingState)>| StateDescriptor {
            state,
            name: state.name(),
            enables_watchdog,
            engine_should_run,
            cranking,
            time_limit: limit.map(|l| l.0),
            timeout_target: limit.map(|l| l.1).unwrap_or(Parked),
        };

        let rows = vec![
            //   state      watch  engine crank  limit
            row(Parked, false, false, false, None),
            row(Reset, false, false, false, Some((secs(params.reset_timeout_s), Parked))),
            row(Starting, false, true, true, Some((secs(params.cranking_timeout_s), StartWait))),
            row(StartWait, false, false, false, Some((secs(params.recrank_timeout_s), Starting))),
            row(Paused, false, true, false, Some((secs(params.paused_timeout_s), Parked))),
            row(RunWait, true, true, false, Some((secs(params.runwait_timeout_s), Idle))),
            row(Idle, false, true, false, None),
            row(Shifting, true, true, false, Some((secs(params.shift_timeout_s), Reset))),
            row(Run, true, true, false, None),
        ];

        let table = Self { rows };

        // The rows must line up with the enumeration, a mismatch is a
        // programming error.
        assert_eq!(table.rows.len(), OperatingState::ALL.len());
        for (row, state) in table.rows.iter().zip(OperatingState::ALL.iter()) {
            assert_eq!(row.state, *state, "State table out of order");
        }

        table
    }

    /// Get the descriptor of a state.
    pub fn get(&self, state: OperatingState) -> &StateDescriptor {
        &self.rows[state.index()]
    }

    /// The state to be in after `elapsed` in `state`.
    ///
    /// Returns `Some(target)` if the state's time limit has been exceeded.
    pub fn advance_on_timeout(
        &self,
        state: OperatingState,
        elapsed: Duration,
    ) -> Option<OperatingState> {
        let desc = self.get(state);

        match desc.time_limit {
            Some(limit) if elapsed > limit => Some(desc.timeout_target),
            _ => None,
        }
    }
}
