//! # Speed library.
//!
//! This library allows other crates in the workspace (and the benches) to access items defined
//! inside the speed crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Actuator proxies - the chassis' view of the throttle, brake, transmission and steering
pub mod actuator;

/// Chassis - operating state machine, control laws and fault handling
pub mod chassis;

/// Low pass filtering of measured signals
pub mod filter;

/// Parameters of the speed executable
pub mod params;

/// Speed server - handles client messages and owns the chassis
pub mod speed_server;
