//! # Telecommand processor module
//!
//! The telecommand processor handles TCs coming from the operator, executing
//! them on the rover control object and building the response.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};

// Internal
use comms_if::tc::{mission::MissionDescriptor, Tc, TcResponse};

use crate::{nav_mgr::EmergencyCause, rover_ctrl::RoverCtrl};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Execute a telecommand.
///
/// The caller must hold the rover control guard for the whole call.
pub fn exec(ctrl: &mut RoverCtrl, tc: &Tc) -> TcResponse {
    debug!("Executing {:?} TC", tc.tc_type());

    let response = match tc {
        Tc::LoadMission(mission) => load_mission(ctrl, mission),
        Tc::LoadMissionFile(path) => match MissionDescriptor::from_file(path) {
            Ok(m) => {
                info!("Loaded mission file {:?}", path);
                load_mission(ctrl, &m)
            }
            Err(e) => TcResponse::Rejected(format!("{}", e)),
        },
        Tc::Stop => {
            ctrl.gentle_stop();
            TcResponse::Ok
        }
        Tc::Resume => match ctrl.resume() {
            Ok(()) => TcResponse::Ok,
            Err(e) => TcResponse::Rejected(format!("{}", e)),
        },
        Tc::EmergencyStop(reason) => {
            let reason = reason
                .clone()
                .unwrap_or_else(|| "Operator emergency stop".to_string());
            ctrl.emergency_stop(EmergencyCause::Operator, &reason);
            TcResponse::Ok
        }
        Tc::ClearError => {
            if ctrl.clear_error() {
                TcResponse::Ok
            } else {
                TcResponse::Rejected("No error to clear".into())
            }
        }
        Tc::MotorSpeeds(speeds) => match ctrl.set_motor_speeds(speeds.left, speeds.right) {
            Ok(()) => TcResponse::Ok,
            Err(e) => TcResponse::Rejected(format!("{}", e)),
        },
        Tc::GetStatus => TcResponse::Status(ctrl.get_status()),
        Tc::GetTelemetry => TcResponse::Telemetry(Box::new(ctrl.get_telemetry())),
    };

    if let TcResponse::Rejected(ref r) = response {
        warn!("{:?} TC rejected: {}", tc.tc_type(), r);
    }

    response
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn load_mission(ctrl: &mut RoverCtrl, mission: &MissionDescriptor) -> TcResponse {
    match ctrl.load_mission(mission) {
        Ok(()) => TcResponse::Ok,
        Err(e) => TcResponse::Rejected(format!("{}", e)),
    }
}
