//! # Communications interface crate.
//!
//! Provides the messages exchanged between the speed server and its clients,
//! and the network abstractions they travel over.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Speed server messages and the vehicle enumerations they carry
pub mod speed;

/// Network module
pub mod net;
