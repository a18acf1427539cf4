//! Parameters structure for the chassis

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// MACROS
// ---------------------------------------------------------------------------

/// Check that each named field lies within its inclusive range.
macro_rules! check_ranges {
    ($params:expr, $(($field:ident, $min:expr, $max:expr)),+ $(,)?) => {
        $(
            let value = $params.$field as f64;
            if !(value >= $min && value <= $max) {
                return Err(ParamsError::OutOfRange {
                    name: stringify!($field),
                    value,
                    min: $min,
                    max: $max,
                });
            }
        )+
    };
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Tuning of the chassis controller.
///
/// Missing fields in the parameter file take their field-tested default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChassisParams {
    // ---- CONTROL LAWS ----
    /// Brake proportional gain
    pub brake_p_gain: f32,

    /// Above this speed in the wrong direction the vehicle is slipping back.
    ///
    /// Units: meters/second
    pub max_slipback_speed_ms: f32,

    /// Overshoot of the desired speed before the brakes are used instead of
    /// the throttle.
    ///
    /// Units: meters/second
    pub max_speed_overshoot_ms: f32,

    /// Below this speed, stopping locks the brakes.
    ///
    /// Units: meters/second
    pub lock_brakes_speed_ms: f32,

    /// Brake fraction applied while hill holding
    pub hill_hold_brake_fraction: f32,

    /// Engine RPM above which hill holding releases the brakes
    pub hill_hold_rpm_release: f32,

    /// Speed low-pass filter constant, 1 disables filtering
    pub speed_filter_constant: f32,

    /// Acceleration low-pass filter constant, 1 disables filtering
    pub accel_filter_constant: f32,

    /// Curvature to steering fraction, linear term
    pub steer_p1: f32,

    /// Curvature to steering fraction, quadratic term
    pub steer_p2: f32,

    /// Throttle PID overall gain
    pub throttle_gain: f32,

    /// Throttle PID integral term
    pub throttle_i_term: f32,

    /// Throttle PID derivative term
    pub throttle_d_term: f32,

    /// Maximum change of the throttle once the engine is above idle.
    ///
    /// Units: fraction/second
    pub max_throttle_rate: f32,

    // ---- ENGINE ----
    /// Engine is running above this RPM
    pub min_idle_rpm: f32,

    /// Engine is above idle above this RPM
    pub max_idle_rpm: f32,

    /// Clutch is definitely engaged above this RPM
    pub operating_rpm: f32,

    // ---- ACTUATOR COMMS ----
    /// Units: seconds
    pub connect_timeout_s: f64,

    /// Refresh attempts per update outside of `Run`
    pub startup_retries: u32,

    /// Refresh attempts per update in `Run`
    pub run_retries: u32,

    // ---- STATE TIME LIMITS ----
    /// Units: seconds
    pub reset_timeout_s: f64,

    /// Crank for this long, then wait.
    ///
    /// Units: seconds
    pub cranking_timeout_s: f64,

    /// Wait for this long for the starter to cool before cranking again.
    ///
    /// Units: seconds
    pub recrank_timeout_s: f64,

    /// After this long paused, stop the engine.
    ///
    /// Units: seconds
    pub paused_timeout_s: f64,

    /// A shift which hasn't completed in this time resets the controllers.
    ///
    /// Units: seconds
    pub shift_timeout_s: f64,

    /// Mandatory wait between leaving pause and moving.
    ///
    /// Units: seconds
    pub runwait_timeout_s: f64,

    // ---- POLICY ----
    /// While paused, only allow shifting into neutral.
    pub paused_shift_neutral_only: bool,

    // ---- DIAGNOSTICS ----
    /// Interval between chassis dumps in verbose mode.
    ///
    /// Units: seconds
    pub dump_interval_s: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("Parameter {name} = {value} is outside of its legal range [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for ChassisParams {
    fn default() -> Self {
        Self {
            brake_p_gain: 1000.0,
            max_slipback_speed_ms: 0.6,
            max_speed_overshoot_ms: 1.0,
            lock_brakes_speed_ms: 3.0,
            hill_hold_brake_fraction: 0.5,
            hill_hold_rpm_release: 2500.0,
            speed_filter_constant: 0.5,
            accel_filter_constant: 0.5,
            steer_p1: 8.17,
            steer_p2: -13.82,
            throttle_gain: 0.12,
            throttle_i_term: 0.25,
            throttle_d_term: 1.0,
            max_throttle_rate: 0.25,
            min_idle_rpm: 250.0,
            max_idle_rpm: 1750.0,
            operating_rpm: 5250.0,
            connect_timeout_s: 0.05,
            startup_retries: 5,
            run_retries: 1,
            reset_timeout_s: 5.0,
            cranking_timeout_s: 10.0,
            recrank_timeout_s: 20.0,
            paused_timeout_s: 300.0,
            shift_timeout_s: 30.0,
            runwait_timeout_s: 5.0,
            paused_shift_neutral_only: true,
            dump_interval_s: 1.0,
        }
    }
}

impl ChassisParams {
    /// Check every tunable against its legal range.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        check_ranges!(
            self,
            (brake_p_gain, 0.0, 1000.0),
            (max_slipback_speed_ms, 0.0, 2.0),
            (max_speed_overshoot_ms, 0.0, 3.0),
            (lock_brakes_speed_ms, 0.0, 4.0),
            (hill_hold_brake_fraction, 0.0, 1.0),
            (hill_hold_rpm_release, 1750.0, 5250.0),
            (speed_filter_constant, 0.05, 1.0),
            (accel_filter_constant, 0.05, 1.0),
            (steer_p1, 5.0, 10.0),
            (steer_p2, -30.0, 30.0),
            (throttle_gain, 0.0, 20.0),
            (throttle_i_term, 0.0, 10.0),
            (throttle_d_term, 0.0, 10.0),
            (max_throttle_rate, 0.01, 2.0),
            (min_idle_rpm, -1.0, 2500.0),
            (max_idle_rpm, 1000.0, 2500.0),
            (operating_rpm, 3000.0, 6000.0),
            (connect_timeout_s, 0.001, 1.0),
            (startup_retries, 1.0, 100.0),
            (run_retries, 1.0, 100.0),
            (reset_timeout_s, 0.1, 3600.0),
            (cranking_timeout_s, 0.1, 3600.0),
            (recrank_timeout_s, 0.1, 3600.0),
            (paused_timeout_s, 0.1, 3600.0),
            (shift_timeout_s, 0.1, 3600.0),
            (runwait_timeout_s, 0.1, 3600.0),
            (dump_interval_s, 0.0, 60.0),
        );

        Ok(())
    }
}
