//! # Rover control
//!
//! The rover control object owns every piece of equipment and algorithm the
//! control loop needs: position source, heading source, trajectory control,
//! the mission, the navigation state machine and the motors.
//!
//! It is shared between the control loop, the connection watchdog and the
//! operator as a single `Arc<Mutex<RoverCtrl>>`, so a manual command can
//! never interleave with a control cycle's motor demand.
//!
//! Each call to [`RoverCtrl::cycle`] performs:
//!
//! 1. Sensor update: heading then position, neither blocks.
//! 2. Safety check of the position solution.
//! 3. One step of the navigation state machine, which commands the motors.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

pub use params::Params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::Utc;
use log::{debug, error, info, warn};
use std::mem::discriminant;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use comms_if::{
    eqpt::{gnss::FixQuality, motor::MotorStatus},
    tc::mission::{MissionDescriptor, DEFAULT_SPEED_MS},
    tm::{GnssTm, PositionTm, StatusTm, TelemetryTm},
};
use util::{geo::LatLon, maths::clamp_sym};

use crate::{
    loc::{Gnss, HeadingSource},
    mission::{MissionError, Waypoint, WaypointSequence},
    motor_client::{MotorClient, MotorClientError},
    nav_mgr::{EmergencyCause, NavMgr, NavState, ReasonKind, TransitionReason},
    traj_ctrl::{self, TrajCtrl},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of consecutive failed motor commands before the rover enters the
/// error state.
const MAX_MOTOR_ERROR_LIMIT: u64 = 5;

/// Number of cycles between motor telemetry reads.
const MOTOR_TM_PERIOD_CYCLES: u64 = 10;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct RoverCtrl {
    params: Params,

    gnss: Gnss,
    heading: Box<dyn HeadingSource>,
    motors: MotorClient,

    traj_ctrl: TrajCtrl,
    nav: NavMgr,

    mission: WaypointSequence,

    /// Set by an operator stop, the mission is not started from `IDLE`
    /// until resumed
    mission_paused: bool,

    /// Current safety fault, if the last check failed
    safety_fault: Option<SafetyFault>,

    /// Last motor telemetry read
    motor_status: MotorStatus,

    num_cycles: u64,
    num_consec_motor_errors: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Ways the position solution can fail the safety check.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SafetyFault {
    #[error("No valid position fix")]
    NoFix,

    #[error("Insufficient satellites ({found} < {min})")]
    InsufficientSatellites { found: u32, min: u32 },

    #[error("HDOP too high ({found:.1} > {max:.1})")]
    ExcessiveHdop { found: f64, max: f64 },

    #[error("Fix quality {found} is below the minimum of {min}")]
    InsufficientQuality { found: FixQuality, min: FixQuality },
}

#[derive(Debug, Error)]
pub enum RoverCtrlError {
    #[error("Cannot {0} while in {1}")]
    NotOperational(&'static str, NavState),

    #[error("Mission rejected: {0}")]
    InvalidMission(#[from] MissionError),

    #[error("Motor speeds must be finite, got ({0}, {1})")]
    InvalidSpeeds(f64, f64),

    #[error("There is no paused mission to resume")]
    NothingToResume,

    #[error("Motor command failed: {0}")]
    MotorError(#[from] MotorClientError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RoverCtrl {
    pub fn new(
        gnss: Gnss,
        heading: Box<dyn HeadingSource>,
        motors: MotorClient,
        traj_ctrl_params: &traj_ctrl::Params,
        safety_params: &Params,
    ) -> Self {
        Self {
            params: safety_params.clone(),
            gnss,
            heading,
            motors,
            traj_ctrl: TrajCtrl::new(traj_ctrl_params),
            nav: NavMgr::new(),
            mission: WaypointSequence::default(),
            mission_paused: false,
            safety_fault: None,
            motor_status: MotorStatus::default(),
            num_cycles: 0,
            num_consec_motor_errors: 0,
        }
    }

    /// Run one control cycle.
    ///
    /// Returns true if a new position was accepted this cycle, the control
    /// loop pings the connection watchdog when it is.
    pub fn cycle(&mut self) -> bool {
        self.num_cycles += 1;

        let position_updated = self.update_sensors();

        let safety = self.check_safety();
        self.handle_safety(safety);

        self.execute_state_machine();

        if self.num_cycles % MOTOR_TM_PERIOD_CYCLES == 0 {
            self.motor_status = self.motors.status();
        }

        position_updated
    }

    /// Poll the heading and position sources. Returns true if a position was
    /// accepted.
    pub fn update_sensors(&mut self) -> bool {
        self.heading.update();

        let updated = self.gnss.update();

        if updated {
            let est = self.gnss.estimate();
            self.traj_ctrl
                .adapt_to_gnss_quality(est.fix_quality, est.hdop);
        }

        updated
    }

    /// Check the position solution against the safety thresholds.
    pub fn check_safety(&self) -> Result<(), SafetyFault> {
        let est = self.gnss.estimate();

        if !self.gnss.has_valid_fix() {
            return Err(SafetyFault::NoFix);
        }

        if est.num_satellites < self.params.min_satellites {
            return Err(SafetyFault::InsufficientSatellites {
                found: est.num_satellites,
                min: self.params.min_satellites,
            });
        }

        if est.hdop > self.params.max_hdop {
            return Err(SafetyFault::ExcessiveHdop {
                found: est.hdop,
                max: self.params.max_hdop,
            });
        }

        if let Some(min) = self.min_fix_quality() {
            if !est.fix_quality.meets(min) {
                return Err(SafetyFault::InsufficientQuality {
                    found: est.fix_quality,
                    min,
                });
            }
        }

        Ok(())
    }

    /// Advance the navigation state machine by one step.
    pub fn execute_state_machine(&mut self) {
        let state = self.nav.state();

        if state.is_moving() && self.safety_fault.is_some() && self.params.pause_on_degraded_fix {
            self.stop_motors();
            return;
        }

        match state {
            NavState::Idle => self.exec_idle(),
            NavState::Rotating => self.exec_rotating(),
            NavState::Driving => self.exec_driving(),
            NavState::ReachedWaypoint => self.exec_reached_waypoint(),
            NavState::MissionComplete | NavState::Error | NavState::EmergencyStop => {
                self.stop_motors()
            }
        }
    }

    // ---- API ----

    pub fn get_status(&self) -> StatusTm {
        let (waypoint_index, waypoint_total) = self.mission.progress();

        StatusTm {
            state: self.nav.state(),
            operational: self.nav.is_operational(),
            mission_id: self.mission.id().to_string(),
            mission_paused: self.mission_paused,
            waypoint_index,
            waypoint_total,
            position: self.position_tm(),
            heading_deg: self.heading.heading_deg(),
            gnss: self.gnss_tm(),
            error: self.nav.error_message().map(String::from),
        }
    }

    pub fn get_telemetry(&self) -> TelemetryTm {
        let (waypoint_index, waypoint_total) = self.mission.progress();

        let mut motors = self.motor_status.clone();
        motors.connected = self.motors.is_connected();

        TelemetryTm {
            timestamp: Utc::now(),
            state: self.nav.state(),
            position: self.position_tm(),
            heading_deg: self.heading.heading_deg(),
            waypoint_index,
            waypoint_total,
            gnss: self.gnss_tm(),
            motors,
            cross_track_error_m: self.traj_ctrl.cross_track_error_m(),
            max_cross_track_error_m: self.traj_ctrl.max_cross_track_error_m(),
            error: self.nav.error_message().map(String::from),
        }
    }

    /// Replace the active mission, returning to `IDLE`.
    ///
    /// The new mission starts on the next cycle.
    pub fn load_mission(&mut self, mission: &MissionDescriptor) -> Result<(), RoverCtrlError> {
        if !self.nav.is_operational() {
            return Err(RoverCtrlError::NotOperational(
                "load a mission",
                self.nav.state(),
            ));
        }

        let sequence = WaypointSequence::from_descriptor(mission)?;

        self.stop_motors();
        self.traj_ctrl.reset_controllers();

        self.mission = sequence;
        self.mission_paused = false;

        self.nav.set_state(
            NavState::Idle,
            TransitionReason::with_detail(
                ReasonKind::MissionLoaded,
                format!("{} ({} waypoints)", self.mission.id(), self.mission.len()),
            ),
        );

        Ok(())
    }

    /// Stop the motors and pause the mission.
    pub fn gentle_stop(&mut self) {
        self.stop_motors();
        self.mission_paused = true;

        if self.nav.is_operational() {
            self.nav
                .set_state(NavState::Idle, TransitionReason::new(ReasonKind::OperatorStop));
        }
    }

    /// Resume a mission paused by [`RoverCtrl::gentle_stop`] or by clearing an
    /// error.
    pub fn resume(&mut self) -> Result<(), RoverCtrlError> {
        if !self.nav.is_operational() {
            return Err(RoverCtrlError::NotOperational("resume", self.nav.state()));
        }

        if !self.mission_paused || self.mission.is_complete() {
            return Err(RoverCtrlError::NothingToResume);
        }

        info!("Mission resumed");
        self.mission_paused = false;

        Ok(())
    }

    /// Enter `EMERGENCY_STOP` and stop the motors.
    pub fn emergency_stop(&mut self, cause: EmergencyCause, reason: &str) {
        self.nav.emergency_stop(cause, reason);
        self.stop_motors();
    }

    /// Leave `ERROR` or `EMERGENCY_STOP`. The mission stays paused until
    /// resumed.
    pub fn clear_error(&mut self) -> bool {
        if !self.nav.clear_error() {
            return false;
        }

        self.stop_motors();
        self.traj_ctrl.reset_controllers();
        self.num_consec_motor_errors = 0;

        if self.mission.current().is_some() {
            self.mission_paused = true;
        }

        true
    }

    /// Manual motor override, each side normalised to [-1, 1].
    pub fn set_motor_speeds(&mut self, left: f64, right: f64) -> Result<(), RoverCtrlError> {
        if self.nav.state() == NavState::EmergencyStop {
            return Err(RoverCtrlError::NotOperational(
                "drive the motors",
                self.nav.state(),
            ));
        }

        if !left.is_finite() || !right.is_finite() {
            return Err(RoverCtrlError::InvalidSpeeds(left, right));
        }

        let v_max = self.motors.max_velocity_ms();

        self.motors
            .set_velocity(clamp_sym(left, 1.0) * v_max, clamp_sym(right, 1.0) * v_max)?;

        Ok(())
    }

    pub fn is_mission_complete(&self) -> bool {
        self.nav.state() == NavState::MissionComplete
    }

    pub fn is_operational(&self) -> bool {
        self.nav.is_operational()
    }

    pub fn state(&self) -> NavState {
        self.nav.state()
    }

    pub fn nav(&self) -> &NavMgr {
        &self.nav
    }

    pub fn traj_ctrl(&self) -> &TrajCtrl {
        &self.traj_ctrl
    }

    pub fn safety_fault(&self) -> Option<SafetyFault> {
        self.safety_fault
    }

    /// Stop the motors and release the motor link.
    pub fn shutdown(&mut self) {
        info!("Shutting down rover control");
        self.motors.disconnect();
    }

    // ---- STATE HANDLERS ----

    fn exec_idle(&mut self) {
        if self.mission_paused {
            return;
        }

        let wp = match self.mission.current() {
            Some(wp) => *wp,
            None => return,
        };

        let position = match self.nav_position() {
            Some(p) => p,
            None => {
                debug!("Waiting for a position fix to start the mission");
                return;
            }
        };

        self.start_waypoint(position, &wp);

        let (index, total) = self.mission.progress();
        let kind = if index > 0 {
            ReasonKind::MissionResumed
        } else {
            ReasonKind::MissionStarted
        };

        self.nav.set_state(
            NavState::Rotating,
            TransitionReason::with_detail(kind, format!("waypoint {}/{}", index + 1, total)),
        );
    }

    fn exec_rotating(&mut self) {
        let (position, heading) = match (self.nav_position(), self.heading.heading_deg()) {
            (Some(p), Some(h)) => (p, h),
            _ => {
                self.stop_motors();
                return;
            }
        };

        // Already on the waypoint, no point turning towards it
        if self.traj_ctrl.is_waypoint_reached(&position, None) {
            self.stop_motors();
            self.begin_driving(position, "already at target".into());
            return;
        }

        let bearing = match self.traj_ctrl.get_bearing_to_target(&position) {
            Some(b) => b,
            None => {
                self.nav.set_error("Rotating without a target");
                self.stop_motors();
                return;
            }
        };

        if self.traj_ctrl.is_heading_aligned(heading, bearing, None) {
            self.stop_motors();
            self.begin_driving(
                position,
                format!("heading {:.1} deg, bearing {:.1} deg", heading, bearing),
            );
        } else {
            let cmd = self.traj_ctrl.calc_rotation_cmd(heading, bearing);
            self.command_motors(cmd.left_ms, cmd.right_ms);
        }
    }

    fn exec_driving(&mut self) {
        let position = match self.nav_position() {
            Some(p) => p,
            None => {
                self.stop_motors();
                return;
            }
        };

        if self.traj_ctrl.is_waypoint_reached(&position, None) {
            self.stop_motors();

            let (index, total) = self.mission.progress();
            let distance_m = self
                .traj_ctrl
                .get_distance_to_target(&position)
                .unwrap_or(0.0);

            self.nav.set_state(
                NavState::ReachedWaypoint,
                TransitionReason::with_detail(
                    ReasonKind::WaypointReached,
                    format!(
                        "waypoint {}/{} within {:.2} m, max cross track error {:.2} m",
                        index + 1,
                        total,
                        distance_m,
                        self.traj_ctrl.max_cross_track_error_m()
                    ),
                ),
            );
            return;
        }

        // Leave headroom above the base speed for the steering modulation
        let max_base_ms =
            self.motors.max_velocity_ms() / (1.0 + self.traj_ctrl.params().output_limit);
        let speed_ms = self
            .mission
            .current()
            .map(|wp| wp.speed_ms)
            .unwrap_or(DEFAULT_SPEED_MS)
            .min(max_base_ms);

        let cmd = self.traj_ctrl.calc_line_following_cmd(&position, speed_ms);
        self.command_motors(cmd.left_ms, cmd.right_ms);
    }

    fn exec_reached_waypoint(&mut self) {
        self.stop_motors();

        if self.mission.advance() {
            let wp = match self.mission.current() {
                Some(wp) => *wp,
                None => return,
            };

            let from = match self.nav_position().or_else(|| self.traj_ctrl.target()) {
                Some(p) => p,
                None => wp.position,
            };

            self.start_waypoint(from, &wp);

            let (index, total) = self.mission.progress();
            self.nav.set_state(
                NavState::Rotating,
                TransitionReason::with_detail(
                    ReasonKind::NextWaypoint,
                    format!("waypoint {}/{}", index + 1, total),
                ),
            );
        } else {
            self.nav.set_state(
                NavState::MissionComplete,
                TransitionReason::with_detail(
                    ReasonKind::MissionComplete,
                    format!("{} waypoints reached", self.mission.len()),
                ),
            );
            info!("Mission \"{}\" complete", self.mission.name());
        }
    }

    // ---- HELPERS ----

    /// Target the waypoint along the line from the given position.
    fn start_waypoint(&mut self, from: LatLon, wp: &Waypoint) {
        self.traj_ctrl.set_target(wp.position);
        self.traj_ctrl.set_line_segment(from, wp.position);
        self.traj_ctrl.reset_controllers();
    }

    fn begin_driving(&mut self, position: LatLon, detail: String) {
        if let Some(target) = self.traj_ctrl.target() {
            self.traj_ctrl.set_line_segment(position, target);
        }
        self.traj_ctrl.reset_controllers();

        self.nav.set_state(
            NavState::Driving,
            TransitionReason::with_detail(ReasonKind::HeadingAligned, detail),
        );
    }

    /// Log changes in the safety check and raise the RTK loss emergency.
    fn handle_safety(&mut self, result: Result<(), SafetyFault>) {
        let fault = match result {
            Ok(()) => {
                if let Some(prev) = self.safety_fault.take() {
                    info!("Safety check passing again (was: {})", prev);
                }
                return;
            }
            Err(f) => f,
        };

        let changed = match self.safety_fault {
            Some(prev) => discriminant(&prev) != discriminant(&fault),
            None => true,
        };

        if changed {
            warn!("Safety check failed: {}", fault);
        }

        self.safety_fault = Some(fault);

        let state = self.nav.state();
        if self.params.rtk_loss_stop_enabled && state.is_moving() && self.is_quality_loss(&fault) {
            self.emergency_stop(
                EmergencyCause::RtkLost,
                &format!("RTK lost while {}: {}", state, fault),
            );
        }
    }

    fn is_quality_loss(&self, fault: &SafetyFault) -> bool {
        match fault {
            SafetyFault::InsufficientQuality { .. } => true,
            SafetyFault::NoFix => self.min_fix_quality().is_some(),
            _ => false,
        }
    }

    fn min_fix_quality(&self) -> Option<FixQuality> {
        match self.params.min_rtk_quality {
            Some(q) => Some(q),
            None if self.params.require_rtk => Some(FixQuality::RtkFloat),
            None => None,
        }
    }

    /// Position used for navigation, the filtered position corrected for the
    /// antenna offset when a heading is available.
    fn nav_position(&self) -> Option<LatLon> {
        match self.heading.heading_deg() {
            Some(h) if self.gnss.params().apply_antenna_offset => {
                self.gnss.get_position_with_offset_correction(h, true)
            }
            _ => self.gnss.get_position(true),
        }
    }

    fn position_tm(&self) -> Option<PositionTm> {
        match (self.nav_position(), self.gnss.get_position(false)) {
            (Some(p), Some(raw)) => Some(PositionTm {
                lat_deg: p.lat_deg,
                lon_deg: p.lon_deg,
                raw_lat_deg: raw.lat_deg,
                raw_lon_deg: raw.lon_deg,
            }),
            _ => None,
        }
    }

    fn gnss_tm(&self) -> GnssTm {
        let est = self.gnss.estimate();

        GnssTm {
            fix_quality: est.fix_quality,
            fix_label: self.gnss.fix_quality_label().to_string(),
            num_satellites: est.num_satellites,
            hdop: est.hdop,
            speed_kmh: est.speed_kmh,
        }
    }

    fn stop_motors(&mut self) {
        self.command_motors(0.0, 0.0);
    }

    fn command_motors(&mut self, left_ms: f64, right_ms: f64) {
        match self.motors.set_velocity(left_ms, right_ms) {
            Ok(()) => self.num_consec_motor_errors = 0,
            Err(e) => {
                self.num_consec_motor_errors += 1;

                if self.num_consec_motor_errors > MAX_MOTOR_ERROR_LIMIT {
                    if self.nav.is_operational() {
                        error!(
                            "Maximum number of consecutive motor errors ({}) exceeded",
                            MAX_MOTOR_ERROR_LIMIT
                        );
                        self.nav.set_error(&format!("Motor link failed: {}", e));
                    }
                } else {
                    warn!("Motor command failed: {}", e);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Take the rover control guard.
///
/// A poisoned guard is recovered so the rover can still be stopped.
pub fn lock(ctrl: &Mutex<RoverCtrl>) -> MutexGuard<'_, RoverCtrl> {
    match ctrl.lock() {
        Ok(g) => g,
        Err(p) => {
            error!("Rover control guard was poisoned");
            p.into_inner()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::loc;
    use crate::motor_client;
    use crate::serial::test::MockLink;
    use comms_if::eqpt::gnss::{format_gga, GgaFix};
    use comms_if::eqpt::motor::{decode_packet, duty_from_wire, MotorCmd, DUTY_MAX};
    use comms_if::tc::mission::{WaypointAction, WaypointRecord};
    use std::sync::{Arc, Mutex};

    const START: LatLon = LatLon {
        lat_deg: 50.934,
        lon_deg: -1.395,
    };

    #[derive(Clone)]
    struct TestHeading(Arc<Mutex<Option<f64>>>);

    impl HeadingSource for TestHeading {
        fn update(&mut self) -> bool {
            false
        }

        fn heading_deg(&self) -> Option<f64> {
            *self.0.lock().unwrap()
        }
    }

    struct Harness {
        ctrl: RoverCtrl,
        gnss_link: MockLink,
        motor_link: MockLink,
        heading: TestHeading,
    }

    impl Harness {
        fn new(safety: Params) -> Self {
            let gnss_link = MockLink::default();
            let motor_link = MockLink::default();
            let heading = TestHeading(Arc::new(Mutex::new(Some(0.0))));

            let loc_params = loc::Params {
                antenna_offset_m: 0.0,
                ..Default::default()
            };

            let ctrl = RoverCtrl::new(
                Gnss::new(Box::new(gnss_link.clone()), &loc_params),
                Box::new(heading.clone()),
                MotorClient::connect(
                    Box::new(motor_link.clone()),
                    &motor_client::Params::default(),
                ),
                &traj_ctrl::Params::default(),
                &safety,
            );

            motor_link.take_tx();

            Self {
                ctrl,
                gnss_link,
                motor_link,
                heading,
            }
        }

        fn push_fix(&self, position: &LatLon, fix_quality: FixQuality) {
            let fix = GgaFix {
                lat_deg: position.lat_deg,
                lon_deg: position.lon_deg,
                alt_m: 10.0,
                fix_quality,
                num_satellites: 12,
                hdop: 0.8,
            };
            self.gnss_link
                .push_rx(format!("{}\r\n", format_gga("GN", &fix)).as_bytes());
        }

        fn set_heading(&self, heading_deg: f64) {
            *self.heading.0.lock().unwrap() = Some(heading_deg);
        }

        /// Duties of the last pair of drive packets sent.
        fn last_duties(&self) -> (i16, i16) {
            let tx = self.motor_link.take_tx();
            let drive: Vec<_> = tx
                .chunks(6)
                .filter_map(|c| decode_packet(c).ok())
                .filter(|p| p.cmd == MotorCmd::DriveM1Duty || p.cmd == MotorCmd::DriveM2Duty)
                .collect();
            let n = drive.len();
            assert!(n >= 2);
            (
                duty_from_wire(&drive[n - 2].data),
                duty_from_wire(&drive[n - 1].data),
            )
        }
    }

    fn mission(waypoints: &[LatLon]) -> MissionDescriptor {
        MissionDescriptor {
            id: "test".into(),
            name: "Test".into(),
            waypoints: waypoints
                .iter()
                .map(|p| WaypointRecord {
                    lat: p.lat_deg,
                    lon: p.lon_deg,
                    action: WaypointAction::Forward,
                    speed_ms: 0.2,
                    duration_s: 0.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_idle_to_rotating() {
        let mut h = Harness::new(Params::default());
        h.ctrl
            .load_mission(&mission(&[START.offset_m(0.0, 10.0)]))
            .unwrap();

        h.push_fix(&START, FixQuality::RtkFixed);
        assert!(h.ctrl.cycle());
        assert_eq!(h.ctrl.state(), NavState::Rotating);

        // Target is due east, so turn clockwise
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Rotating);
        let (left, right) = h.last_duties();
        assert!(left > 0);
        assert!(right < 0);
    }

    #[test]
    fn test_rotating_to_driving_when_aligned() {
        let mut h = Harness::new(Params::default());
        h.ctrl
            .load_mission(&mission(&[START.offset_m(10.0, 0.0)]))
            .unwrap();

        h.push_fix(&START, FixQuality::RtkFixed);
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Rotating);

        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Driving);

        // On the line, both wheels forward at the same speed
        h.ctrl.cycle();
        let (left, right) = h.last_duties();
        assert!(left > 0);
        assert_eq!(left, right);
    }

    #[test]
    fn test_last_waypoint_completes_mission() {
        let mut h = Harness::new(Params::default());
        h.ctrl.load_mission(&mission(&[START])).unwrap();

        h.push_fix(&START, FixQuality::RtkFixed);

        let expected = [
            NavState::Rotating,
            NavState::Driving,
            NavState::ReachedWaypoint,
            NavState::MissionComplete,
            NavState::MissionComplete,
        ];

        for state in expected.iter() {
            h.ctrl.cycle();
            assert_eq!(h.ctrl.state(), *state);
        }

        assert!(h.ctrl.is_mission_complete());
        assert_eq!(h.ctrl.get_status().waypoint_index, 1);
    }

    #[test]
    fn test_next_waypoint_rotates() {
        let mut h = Harness::new(Params::default());
        h.ctrl
            .load_mission(&mission(&[START, START.offset_m(0.0, 5.0)]))
            .unwrap();

        h.push_fix(&START, FixQuality::RtkFixed);
        for _ in 0..3 {
            h.ctrl.cycle();
        }
        assert_eq!(h.ctrl.state(), NavState::ReachedWaypoint);

        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Rotating);
        assert_eq!(h.ctrl.get_status().waypoint_index, 1);
    }

    #[test]
    fn test_emergency_stop_is_sticky() {
        let mut h = Harness::new(Params::default());
        h.ctrl
            .load_mission(&mission(&[START.offset_m(10.0, 0.0)]))
            .unwrap();
        h.push_fix(&START, FixQuality::RtkFixed);
        h.ctrl.cycle();
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Driving);

        h.ctrl
            .emergency_stop(EmergencyCause::Operator, "operator request");
        assert_eq!(h.ctrl.state(), NavState::EmergencyStop);

        for _ in 0..5 {
            h.push_fix(&START, FixQuality::RtkFixed);
            h.ctrl.cycle();
            assert_eq!(h.ctrl.state(), NavState::EmergencyStop);
            assert_eq!(h.last_duties(), (0, 0));
        }

        assert!(h.ctrl.set_motor_speeds(0.5, 0.5).is_err());
        assert!(h.ctrl.load_mission(&mission(&[START])).is_err());
        assert!(!h.ctrl.get_status().operational);
        assert_eq!(
            h.ctrl.get_status().error.as_deref(),
            Some("operator request")
        );

        // Clearing returns to IDLE with the mission paused
        assert!(h.ctrl.clear_error());
        assert_eq!(h.ctrl.state(), NavState::Idle);
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Idle);
        assert!(h.ctrl.get_status().mission_paused);

        h.ctrl.resume().unwrap();
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Rotating);
    }

    #[test]
    fn test_rtk_loss_while_moving() {
        let mut h = Harness::new(Params::default());
        h.ctrl
            .load_mission(&mission(&[START.offset_m(10.0, 0.0)]))
            .unwrap();
        h.push_fix(&START, FixQuality::RtkFixed);
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Rotating);

        h.push_fix(&START, FixQuality::Gps);
        h.ctrl.cycle();

        assert_eq!(h.ctrl.state(), NavState::EmergencyStop);
        assert_eq!(h.ctrl.nav().emergency_cause(), Some(EmergencyCause::RtkLost));
    }

    #[test]
    fn test_degraded_fix_while_idle_is_not_an_emergency() {
        let mut h = Harness::new(Params::default());
        h.push_fix(&START, FixQuality::Gps);
        h.ctrl.cycle();

        assert_eq!(h.ctrl.state(), NavState::Idle);
        assert!(matches!(
            h.ctrl.safety_fault(),
            Some(SafetyFault::InsufficientQuality { .. })
        ));

        h.push_fix(&START, FixQuality::RtkFixed);
        h.ctrl.cycle();
        assert_eq!(h.ctrl.safety_fault(), None);
    }

    #[test]
    fn test_pause_on_degraded_fix() {
        let safety = Params {
            rtk_loss_stop_enabled: false,
            pause_on_degraded_fix: true,
            ..Default::default()
        };
        let mut h = Harness::new(safety);
        h.ctrl
            .load_mission(&mission(&[START.offset_m(0.0, 10.0)]))
            .unwrap();
        h.push_fix(&START, FixQuality::RtkFixed);
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Rotating);

        h.push_fix(&START, FixQuality::Gps);
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Rotating);
        assert_eq!(h.last_duties(), (0, 0));
    }

    #[test]
    fn test_gentle_stop_and_resume() {
        let mut h = Harness::new(Params::default());
        assert!(matches!(
            h.ctrl.resume(),
            Err(RoverCtrlError::NothingToResume)
        ));

        h.ctrl
            .load_mission(&mission(&[START.offset_m(10.0, 0.0)]))
            .unwrap();
        h.push_fix(&START, FixQuality::RtkFixed);
        h.ctrl.cycle();
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Driving);

        h.ctrl.gentle_stop();
        assert_eq!(h.ctrl.state(), NavState::Idle);
        assert_eq!(h.last_duties(), (0, 0));

        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Idle);

        h.ctrl.resume().unwrap();
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Rotating);
    }

    #[test]
    fn test_set_motor_speeds() {
        let mut h = Harness::new(Params::default());

        h.ctrl.set_motor_speeds(2.0, -0.5).unwrap();
        assert_eq!(h.last_duties(), (DUTY_MAX, -16384));

        assert!(matches!(
            h.ctrl.set_motor_speeds(std::f64::NAN, 0.0),
            Err(RoverCtrlError::InvalidSpeeds(_, _))
        ));
    }

    #[test]
    fn test_load_mission_rejects_invalid() {
        let mut h = Harness::new(Params::default());

        assert!(matches!(
            h.ctrl.load_mission(&mission(&[])),
            Err(RoverCtrlError::InvalidMission(MissionError::Empty))
        ));
        assert_eq!(h.ctrl.get_status().waypoint_total, 0);
    }

    #[test]
    fn test_no_heading_holds_rotation() {
        let mut h = Harness::new(Params::default());
        h.ctrl
            .load_mission(&mission(&[START.offset_m(0.0, 10.0)]))
            .unwrap();
        h.push_fix(&START, FixQuality::RtkFixed);
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Rotating);

        *h.heading.0.lock().unwrap() = None;
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Rotating);
        assert_eq!(h.last_duties(), (0, 0));

        h.set_heading(90.0);
        h.ctrl.cycle();
        assert_eq!(h.ctrl.state(), NavState::Driving);
    }
}
