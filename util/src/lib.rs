//! Utility library for the drive-by-wire software

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod host;
pub mod logger;
pub mod maths;
pub mod module;
pub mod params;
pub mod session;
pub mod time;

// ---------------------------------------------------------------------------
// MACROS
// ---------------------------------------------------------------------------

/// Report an unrecoverable software defect and abort the process.
///
/// # Notes
/// - Only for states the software must never reach. Recoverable conditions
///   shall be returned as a `Result<_, Error>` instead.
/// - The process is aborted rather than unwound, so no cleanup code gets a
///   chance to run with the vehicle in an inconsistent state. The hardware
///   watchdog stops the vehicle once the control loop goes silent.
#[macro_export]
macro_rules! raise_fatal {
    () => ({
        log::error!("Explicit fatal error raised.");
        log::logger().flush();
        std::process::abort();
    });
    ($fmt:expr) => ({
        log::error!("{}", $fmt);
        log::logger().flush();
        std::process::abort();
    });
    ($fmt:expr, $($arg:tt)*) => ({
        log::error!("{}", std::format_args!($fmt, $($arg)*));
        log::logger().flush();
        std::process::abort();
    });
}
