//! # Speed Executable
//!
//! Runs the speed server: the chassis controller of the drive-by-wire
//! vehicle, serving `SpeedSet` requests from a single client over a ZMQ REP
//! socket.
//!
//! # Architecture
//!
//! - Initialise the session, logging and parameters
//! - Build the chassis over the actuators
//! - Main loop, once per cycle:
//!     - Receive a message from the client, waiting at most `msg_timeout_ms`
//!     - Process it in the speed server, which updates the chassis
//!     - Reply to the client
//!     - Step the simulated vehicle if simulated

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::{info, warn};
use std::{
    thread,
    time::{Duration, Instant},
};

// Internal
use comms_if::{
    net::{zmq, MonitoredSocket, SocketOptions},
    speed::SpeedServerMsg,
};
use speed_lib::{
    actuator::sim::{SimParams, SimVehicle},
    chassis::ChassisParams,
    params::SpeedExecParams,
    speed_server::{SpeedServer, SpeedServerParams},
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
    time::MonotonicClock,
};

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("speed_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Speed Executable\n");
    info!(
        "Software root: {:?}",
        host::get_sw_root().wrap_err("Software root is not set")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: SpeedExecParams =
        util::params::load("speed_exec.toml").wrap_err("Could not load exec params")?;
    let chassis_params: ChassisParams =
        util::params::load("chassis.toml").wrap_err("Could not load chassis params")?;

    info!("Parameters loaded");

    // ---- INITIALISE SPEED SERVER ----

    if !exec_params.simulated {
        return Err(eyre!(
            "Only simulated actuators are available, set `simulated = true` in speed_exec.toml"
        ));
    }

    let vehicle = SimVehicle::new(SimParams::default());
    info!("Using simulated actuators");

    let mut server = SpeedServer::new(vehicle.actuators(), Box::new(MonotonicClock::new()));
    server
        .init(
            SpeedServerParams {
                chassis: chassis_params,
                verbose: exec_params.verbose,
            },
            Some(&session),
        )
        .wrap_err("Failed to initialise the SpeedServer")?;

    info!("SpeedServer initialised");

    // ---- INITIALISE NETWORK ----

    let zmq_ctx = zmq::Context::new();

    let socket_options = SocketOptions {
        bind: true,
        block_on_first_connect: false,
        recv_timeout: exec_params.msg_timeout_ms,
        send_timeout: 10,
        ..Default::default()
    };
    let socket = MonitoredSocket::new(
        &zmq_ctx,
        zmq::REP,
        socket_options,
        &exec_params.speed_set_endpoint,
    )
    .wrap_err("Failed to create the speed set socket")?;

    info!("Listening on {}", exec_params.speed_set_endpoint);

    // ---- MAIN LOOP ----

    info!("Initialisation complete, entering main loop\n");

    let cycle_period = Duration::from_secs_f64(exec_params.cycle_period_s);
    let mut client_connected = false;

    loop {
        let cycle_start_instant = Instant::now();

        // ---- MESSAGE INPUT ----

        let (received, msg) = match socket.recv_str() {
            Ok(Some(s)) => match serde_json::from_str::<SpeedServerMsg>(&s) {
                Ok(m) => (true, Some(m)),
                Err(e) => {
                    warn!("Could not deserialize message: {}", e);
                    (true, None)
                }
            },
            Ok(None) => (false, None),
            Err(e) => {
                warn!("Could not read from the speed set socket: {}", e);
                (false, None)
            }
        };

        // ---- SPEED SERVER PROCESSING ----

        let reply = match server.proc(&msg) {
            Ok((reply, report)) => {
                if report.sequence_error {
                    warn!("Client requested an illegal state or gear change");
                }
                reply
            }
            Err(e) => return Err(e).wrap_err("Error during SpeedServer processing"),
        };

        // A REP socket must answer every request, even ones without a reply of their own
        if received {
            match reply.or_else(|| server.snapshot()) {
                Some(r) => {
                    if let Err(e) = socket.send_json(&r) {
                        warn!("Could not send reply to client: {}", e);
                    }
                }
                None => warn!("No chassis snapshot available to reply with"),
            }
        }

        // ---- SIMULATION ----

        vehicle.step(exec_params.cycle_period_s);

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
            ),
        }

        if socket.connected() != client_connected {
            client_connected = socket.connected();
            if client_connected {
                info!("Client connected");
            } else {
                warn!("Client disconnected");
            }
        }
    }
}
