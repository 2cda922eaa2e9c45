//! Main rover-side executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Open the equipment links (hardware serial ports or the simulator)
//!     - Start the connection watchdog and the operator TC thread
//!     - Main loop, every 100 ms:
//!         - Position and heading acquisition
//!         - Safety evaluation
//!         - Navigation state machine and trajectory control
//!         - Motor commanding
//!
//! The rover control structure sits behind a single mutex. The main loop, the
//! watchdog's emergency stop and the operator TC thread all take that guard
//! before touching the rover, so a cycle is never interleaved with a command.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, error, info, warn};
use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use comms_if::{
    tc::{mission::MissionDescriptor, Tc},
    tm::StatusTm,
};
use rov_lib::{
    loc::{Gnss, HeadingSource, NmeaHeading},
    motor_client::MotorClient,
    nav_mgr::EmergencyCause,
    params::RovExecParams,
    rover_ctrl::{self, RoverCtrl},
    serial::{HwSerial, SerialLink},
    sim_client::SimClient,
    tc_processor,
    watchdog::ConnectionWatchdog,
};
use util::{
    geo::LatLon,
    host,
    logger::{level_from_verbosity, logger_init},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.10;

/// Number of cycles between status reports in the log.
const STATUS_PERIOD_CYCLES: u64 = 20;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "rov_exec", about = "RTK GPS waypoint rover executive")]
struct Opt {
    /// Parameter file, relative to the `params` directory of the software root
    #[structopt(long, default_value = "rov_exec.toml")]
    params: String,

    /// Mission file to load at startup
    #[structopt(long, parse(from_os_str))]
    mission: Option<PathBuf>,

    /// Run against the simulated rover instead of the hardware
    #[structopt(long)]
    sim: bool,

    /// Starting latitude of the simulated rover
    #[structopt(long, default_value = "50.9345", allow_hyphen_values = true)]
    sim_lat: f64,

    /// Starting longitude of the simulated rover
    #[structopt(long, default_value = "-1.3962", allow_hyphen_values = true)]
    sim_lon: f64,

    /// Starting heading of the simulated rover in degrees
    #[structopt(long, default_value = "0.0", allow_hyphen_values = true)]
    sim_heading: f64,

    /// Increase log verbosity, may be repeated
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

/// Equipment the rover is built from.
struct Devices {
    gnss_link: Box<dyn SerialLink>,
    motor_link: Box<dyn SerialLink>,
    heading: Box<dyn HeadingSource>,
    sim: Option<SimClient>,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Without the root variable set run from the working directory
    let root = match host::get_sw_root() {
        Ok(r) => r,
        Err(_) => env::current_dir().wrap_err("Failed to get the working directory")?,
    };

    // Initialise session
    let session =
        Session::new_in(&root, "rov_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(level_from_verbosity(opt.verbose), &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("RTK Waypoint Rover Executable\n");
    info!("Software root: {:?}", root);
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI options: {:?}", opt);

    // ---- LOAD PARAMETERS ----

    let params: RovExecParams =
        util::params::load(&root, &opt.params).wrap_err("Could not load rov_exec params")?;

    for warning in params
        .are_valid()
        .wrap_err("Invalid rov_exec params")?
    {
        warn!("{}", warning);
    }

    info!("Exec parameters loaded");

    // ---- INITIALISE EQUIPMENT ----

    let devices = if opt.sim {
        open_sim(&opt, &params)
    } else {
        open_hardware(&params)?
    };

    let gnss = Gnss::new(devices.gnss_link, &params.loc);
    let motors = MotorClient::connect(devices.motor_link, &params.hardware);
    let sim = devices.sim;

    let ctrl = Arc::new(Mutex::new(RoverCtrl::new(
        gnss,
        devices.heading,
        motors,
        &params.traj_ctrl,
        &params.safety,
    )));

    info!("Rover control initialised");

    // ---- LOAD MISSION ----

    if let Some(ref path) = opt.mission {
        let mission = MissionDescriptor::from_file(path)
            .wrap_err_with(|| format!("Could not load mission from {:?}", path))?;

        rover_ctrl::lock(&ctrl)
            .load_mission(&mission)
            .wrap_err("Mission rejected")?;
    }

    // ---- START WATCHDOG ----

    let mut watchdog = ConnectionWatchdog::new(
        Duration::from_secs_f64(params.safety.max_connection_loss_s),
        Duration::from_secs_f64(params.safety.watchdog_check_period_s),
    );

    watchdog
        .start(connection_lost_callback(&ctrl))
        .wrap_err("Failed to start the connection watchdog")?;

    // ---- START TC THREAD ----

    spawn_tc_thread(&ctrl).wrap_err("Failed to start the TC thread")?;

    info!("Initialisation complete, entering main loop\n");

    // ---- MAIN LOOP ----

    let mut num_cycles: u64 = 0;

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        let (position_updated, mission_complete, operational, status) = {
            let mut ctrl = rover_ctrl::lock(&ctrl);
            let updated = ctrl.cycle();
            (
                updated,
                ctrl.is_mission_complete(),
                ctrl.is_operational(),
                ctrl.get_status(),
            )
        };

        if position_updated {
            watchdog.ping();
        }

        if let Some(ref sim) = sim {
            sim.step(CYCLE_PERIOD_S);
        }

        if num_cycles % STATUS_PERIOD_CYCLES == 0 {
            info!("{}", format_status(&status));
        }

        if mission_complete {
            info!("Mission complete");
            break;
        }

        // Once an operator has cleared a connection loss the watchdog needs to
        // protect the rover again.
        if operational && watchdog.has_triggered() && !watchdog.is_running() {
            info!("Restarting the connection watchdog");
            if let Err(e) = watchdog.start(connection_lost_callback(&ctrl)) {
                error!("Could not restart the connection watchdog: {}", e);
            }
        }

        // ---- CYCLE MANAGEMENT ----

        num_cycles += 1;

        // Get the end time of the cycle
        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
            ),
        }
    }

    // ---- SHUTDOWN ----

    watchdog.stop();
    rover_ctrl::lock(&ctrl).shutdown();

    info!("End of execution");

    Ok(())
}

/// Open the serial ports of the rover's equipment. Failing to open any of them
/// is fatal.
fn open_hardware(params: &RovExecParams) -> Result<Devices, Report> {
    let timeout = params.serial.read_timeout();

    let gnss = HwSerial::open(&params.serial.gnss_port, params.serial.gnss_baud, timeout)
        .wrap_err("Failed to open the GNSS receiver")?;
    let motor = HwSerial::open(&params.serial.motor_port, params.serial.motor_baud, timeout)
        .wrap_err("Failed to open the motor controller")?;
    let heading = HwSerial::open(
        &params.serial.heading_port,
        params.serial.heading_baud,
        timeout,
    )
    .wrap_err("Failed to open the heading sensor")?;

    Ok(Devices {
        gnss_link: Box::new(gnss),
        motor_link: Box::new(motor),
        heading: Box::new(NmeaHeading::new(Box::new(heading))),
        sim: None,
    })
}

/// Build the simulated rover's equipment.
fn open_sim(opt: &Opt, params: &RovExecParams) -> Devices {
    let sim = SimClient::new(
        LatLon::new(opt.sim_lat, opt.sim_lon),
        opt.sim_heading,
        &params.hardware,
        &params.loc,
    );

    Devices {
        gnss_link: Box::new(sim.gnss_link()),
        motor_link: Box::new(sim.motor_link()),
        heading: Box::new(sim.heading_source()),
        sim: Some(sim),
    }
}

/// Build the function the watchdog calls when positions stop arriving.
fn connection_lost_callback(ctrl: &Arc<Mutex<RoverCtrl>>) -> impl FnOnce(String) + Send + 'static {
    let ctrl = ctrl.clone();

    move |reason: String| {
        rover_ctrl::lock(&ctrl).emergency_stop(EmergencyCause::ConnectionLost, &reason);
    }
}

/// Read JSON telecommands from stdin, one per line, and execute them.
fn spawn_tc_thread(ctrl: &Arc<Mutex<RoverCtrl>>) -> io::Result<()> {
    let ctrl = ctrl.clone();

    thread::Builder::new()
        .name("tc".into())
        .spawn(move || {
            let stdin = io::stdin();

            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        error!("Could not read TC input: {}", e);
                        break;
                    }
                };

                if line.trim().is_empty() {
                    continue;
                }

                let tc = match Tc::from_json(&line) {
                    Ok(tc) => tc,
                    Err(e) => {
                        warn!("Invalid TC: {}", e);
                        continue;
                    }
                };

                debug!("Received TC: {:?}", tc);

                let response = tc_processor::exec(&mut rover_ctrl::lock(&ctrl), &tc);

                match serde_json::to_string(&response) {
                    Ok(s) => info!("TC response: {}", s),
                    Err(e) => error!("Could not serialize the TC response: {}", e),
                }
            }

            debug!("TC input closed");
        })?;

    Ok(())
}

/// One line summary of the rover's status.
fn format_status(status: &StatusTm) -> String {
    let position = match status.position {
        Some(ref p) => format!("{:.8}, {:.8}", p.lat_deg, p.lon_deg),
        None => "no position".into(),
    };

    let heading = match status.heading_deg {
        Some(h) => format!("{:.1} deg", h),
        None => "no heading".into(),
    };

    format!(
        "{} | WP {}/{}{} | {} | {} | {} {} sats HDOP {:.1}",
        status.state.as_str(),
        status.waypoint_index,
        status.waypoint_total,
        if status.mission_paused { " (paused)" } else { "" },
        position,
        heading,
        status.gnss.fix_label,
        status.gnss.num_satellites,
        status.gnss.hdop
    )
}
