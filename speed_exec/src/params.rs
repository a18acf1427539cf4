//! # Speed Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeedExecParams {
    /// Network endpoint the speed server binds its REP socket to
    pub speed_set_endpoint: String,

    /// Maximum time to wait for a client message in one cycle.
    ///
    /// Units: milliseconds
    pub msg_timeout_ms: i32,

    /// Target period of one cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Periodically dump the chassis state
    pub verbose: bool,

    /// Drive the simulated vehicle rather than hardware
    pub simulated: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SpeedExecParams {
    fn default() -> Self {
        Self {
            speed_set_endpoint: String::from("tcp://*:5040"),
            msg_timeout_ms: 120,
            cycle_period_s: 0.1,
            verbose: false,
            simulated: true,
        }
    }
}
