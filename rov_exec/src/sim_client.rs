//! # Simulation Client
//!
//! The SimClient stands in for the rover's equipment when running without
//! hardware. It is to be used for testing and development of systems rather
//! than actual driving of the rover. The SimClient provides:
//!
//! - A GNSS link emitting checksummed `GGA` and `RMC` sentences for the
//!   antenna's position, once per simulation step.
//! - A motor link which decodes the real motor controller packets, applies
//!   the commanded duties to the wheels and answers telemetry requests.
//! - A heading source reporting the simulated rover's true heading.
//!
//! The world is a kinematic differential drive model. Heading follows the
//! compass convention, driving the left wheel faster than the right turns
//! the rover clockwise. The world only moves when [`SimClient::step`] is
//! called.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use comms_if::eqpt::{
    gnss::{self, FixQuality, GgaFix},
    motor::{self, MotorCmd, DUTY_MAX},
};
use util::{geo::LatLon, maths::wrap_360_deg};

use crate::{loc, loc::HeadingSource, motor_client, serial::SerialLink};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Talker ID used for the simulated receiver's sentences
const TALKER: &str = "GN";

/// Battery voltage reported by the simulated motor controller
const SIM_BATTERY_V: f64 = 12.6;

/// Logic battery voltage reported by the simulated motor controller
const SIM_LOGIC_BATTERY_V: f64 = 5.0;

/// Temperature reported by the simulated motor controller
const SIM_TEMP_C: f64 = 25.0;

/// Motor current at standstill and the additional current at full speed
const SIM_IDLE_CURRENT_A: f64 = 0.2;
const SIM_FULL_SPEED_CURRENT_A: f64 = 2.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle on the simulated world, cheap to clone.
#[derive(Clone)]
pub struct SimClient {
    world: Arc<Mutex<SimWorld>>,
}

/// The simulated rover and its environment.
#[derive(Debug, Clone)]
pub struct SimWorld {
    /// Position of the rover's rotation centre
    position: LatLon,
    heading_deg: f64,

    /// Current (left, right) wheel velocity
    wheel_vel_ms: (f64, f64),

    wheelbase_m: f64,
    max_velocity_ms: f64,
    antenna_offset_m: f64,
    motor_address: u8,

    fix_quality: FixQuality,
    num_satellites: u32,
    hdop: f64,
    gnss_enabled: bool,

    /// Incremented on every step, the GNSS link emits a new fix whenever it
    /// changes
    fix_seq: u64,

    elapsed_s: f64,
}

/// Simulated GNSS receiver link.
pub struct SimGnssLink {
    world: Arc<Mutex<SimWorld>>,
    last_seq: u64,
    rx: VecDeque<u8>,
}

/// Simulated motor controller link.
pub struct SimMotorLink {
    world: Arc<Mutex<SimWorld>>,
    rx: VecDeque<u8>,
    pending: Vec<u8>,
}

/// Simulated heading sensor.
pub struct SimHeading {
    world: Arc<Mutex<SimWorld>>,
    heading_deg: Option<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimClient {
    /// Create a new simulated world with the rover's centre at the given
    /// position and heading.
    pub fn new(
        start: LatLon,
        heading_deg: f64,
        hardware: &motor_client::Params,
        loc_params: &loc::Params,
    ) -> Self {
        info!(
            "Simulated rover at {:.8}, {:.8} heading {:.1} deg",
            start.lat_deg, start.lon_deg, heading_deg
        );

        Self {
            world: Arc::new(Mutex::new(SimWorld {
                position: start,
                heading_deg: wrap_360_deg(heading_deg),
                wheel_vel_ms: (0.0, 0.0),
                wheelbase_m: hardware.wheelbase_m,
                max_velocity_ms: hardware.max_velocity_ms(),
                antenna_offset_m: loc_params.antenna_offset_m,
                motor_address: hardware.address,
                fix_quality: FixQuality::RtkFixed,
                num_satellites: 12,
                hdop: 0.8,
                gnss_enabled: true,
                fix_seq: 1,
                elapsed_s: 0.0,
            })),
        }
    }

    pub fn gnss_link(&self) -> SimGnssLink {
        SimGnssLink {
            world: self.world.clone(),
            last_seq: 0,
            rx: VecDeque::new(),
        }
    }

    pub fn motor_link(&self) -> SimMotorLink {
        SimMotorLink {
            world: self.world.clone(),
            rx: VecDeque::new(),
            pending: Vec::new(),
        }
    }

    pub fn heading_source(&self) -> SimHeading {
        SimHeading {
            world: self.world.clone(),
            heading_deg: None,
        }
    }

    /// Advance the world by `dt_s` seconds.
    pub fn step(&self, dt_s: f64) {
        lock(&self.world).step(dt_s);
    }

    /// Position of the rover's rotation centre.
    pub fn position(&self) -> LatLon {
        lock(&self.world).position
    }

    /// Position of the GNSS antenna.
    pub fn antenna_position(&self) -> LatLon {
        lock(&self.world).antenna_position()
    }

    pub fn heading_deg(&self) -> f64 {
        lock(&self.world).heading_deg
    }

    pub fn wheel_vel_ms(&self) -> (f64, f64) {
        lock(&self.world).wheel_vel_ms
    }

    pub fn elapsed_s(&self) -> f64 {
        lock(&self.world).elapsed_s
    }

    /// Stop or restart the receiver's output.
    pub fn set_gnss_enabled(&self, enabled: bool) {
        info!("Simulated GNSS {}", if enabled { "enabled" } else { "disabled" });
        lock(&self.world).gnss_enabled = enabled;
    }

    /// Change the quality of the simulated solution.
    pub fn set_fix(&self, fix_quality: FixQuality, num_satellites: u32, hdop: f64) {
        let mut world = lock(&self.world);
        world.fix_quality = fix_quality;
        world.num_satellites = num_satellites;
        world.hdop = hdop;
    }
}

impl SimWorld {
    fn step(&mut self, dt_s: f64) {
        let (v_left, v_right) = self.wheel_vel_ms;

        let v_ms = 0.5 * (v_left + v_right);
        let yaw_rate_deg = ((v_left - v_right) / self.wheelbase_m).to_degrees();

        // Integrate along the mid-step heading
        let heading_mid = (self.heading_deg + 0.5 * yaw_rate_deg * dt_s).to_radians();
        let dist_m = v_ms * dt_s;

        self.position = self
            .position
            .offset_m(dist_m * heading_mid.cos(), dist_m * heading_mid.sin());
        self.heading_deg = wrap_360_deg(self.heading_deg + yaw_rate_deg * dt_s);

        self.fix_seq += 1;
        self.elapsed_s += dt_s;
    }

    fn antenna_position(&self) -> LatLon {
        let heading = self.heading_deg.to_radians();

        self.position.offset_m(
            self.antenna_offset_m * heading.cos(),
            self.antenna_offset_m * heading.sin(),
        )
    }

    fn speed_kmh(&self) -> f64 {
        0.5 * (self.wheel_vel_ms.0 + self.wheel_vel_ms.1).abs() * 3.6
    }

    /// Apply a decoded command, returning the response data for reads.
    fn exec_motor_cmd(&mut self, cmd: MotorCmd, data: &[u8]) -> Option<Vec<u8>> {
        let max_velocity_ms = self.max_velocity_ms;
        let duty_to_vel =
            |data: &[u8]| motor::duty_from_wire(data) as f64 / DUTY_MAX as f64 * max_velocity_ms;

        match cmd {
            MotorCmd::DriveM1Duty => {
                self.wheel_vel_ms.0 = duty_to_vel(data);
                None
            }
            MotorCmd::DriveM2Duty => {
                self.wheel_vel_ms.1 = duty_to_vel(data);
                None
            }
            MotorCmd::ReadMainBattery => Some(encode_tenths(SIM_BATTERY_V).to_vec()),
            MotorCmd::ReadLogicBattery => Some(encode_tenths(SIM_LOGIC_BATTERY_V).to_vec()),
            MotorCmd::ReadCurrents => {
                let mut d = Vec::with_capacity(4);
                d.extend_from_slice(&encode_hundredths(self.wheel_current_a(self.wheel_vel_ms.0)));
                d.extend_from_slice(&encode_hundredths(self.wheel_current_a(self.wheel_vel_ms.1)));
                Some(d)
            }
            MotorCmd::ReadTemp1 | MotorCmd::ReadTemp2 => Some(encode_tenths(SIM_TEMP_C).to_vec()),
        }
    }

    fn wheel_current_a(&self, vel_ms: f64) -> f64 {
        if self.max_velocity_ms <= 0.0 {
            return SIM_IDLE_CURRENT_A;
        }

        SIM_IDLE_CURRENT_A + SIM_FULL_SPEED_CURRENT_A * (vel_ms / self.max_velocity_ms).abs()
    }
}

impl SimGnssLink {
    /// Queue the sentences for a new fix if the world has stepped.
    fn refresh(&mut self) {
        let world = lock(&self.world);

        if !world.gnss_enabled || world.fix_seq == self.last_seq {
            return;
        }
        self.last_seq = world.fix_seq;

        let antenna = world.antenna_position();
        let fix = GgaFix {
            lat_deg: antenna.lat_deg,
            lon_deg: antenna.lon_deg,
            alt_m: 10.0,
            fix_quality: world.fix_quality,
            num_satellites: world.num_satellites,
            hdop: world.hdop,
        };

        let text = format!(
            "{}\r\n{}\r\n",
            gnss::format_gga(TALKER, &fix),
            gnss::format_rmc(TALKER, antenna.lat_deg, antenna.lon_deg, world.speed_kmh())
        );

        self.rx.extend(text.bytes());
    }
}

impl Read for SimGnssLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.refresh();
        Ok(drain_into(&mut self.rx, buf))
    }
}

impl Write for SimGnssLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for SimGnssLink {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        self.refresh();
        Ok(self.rx.len())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.rx.clear();
        Ok(())
    }
}

impl SimMotorLink {
    /// Decode and execute every complete packet received so far.
    fn process_pending(&mut self) {
        loop {
            if self.pending.len() < motor::READ_PACKET_LEN {
                return;
            }

            let cmd = match MotorCmd::from_code(self.pending[1]) {
                Some(c) => c,
                None => {
                    // Resynchronise on the next byte
                    debug!("Sim motor link dropping byte {:#04x}", self.pending[0]);
                    self.pending.remove(0);
                    continue;
                }
            };

            let len = cmd.data_len() + 4;
            if self.pending.len() < len {
                return;
            }

            let raw: Vec<u8> = self.pending.drain(..len).collect();

            let packet = match motor::decode_packet(&raw) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Sim motor link rejected packet: {}", e);
                    continue;
                }
            };

            let mut world = lock(&self.world);

            if packet.address != world.motor_address {
                debug!("Sim motor link ignoring packet for {:#04x}", packet.address);
                continue;
            }

            if let Some(data) = world.exec_motor_cmd(packet.cmd, &packet.data) {
                self.rx.extend(motor::encode_response(&data));
            }
        }
    }
}

impl Read for SimMotorLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(drain_into(&mut self.rx, buf))
    }
}

impl Write for SimMotorLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.process_pending();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for SimMotorLink {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.rx.len())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.rx.clear();
        Ok(())
    }
}

impl HeadingSource for SimHeading {
    fn update(&mut self) -> bool {
        self.heading_deg = Some(lock(&self.world).heading_deg);
        true
    }

    fn heading_deg(&self) -> Option<f64> {
        self.heading_deg
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn lock(world: &Arc<Mutex<SimWorld>>) -> MutexGuard<'_, SimWorld> {
    match world.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    }
}

fn drain_into(rx: &mut VecDeque<u8>, buf: &mut [u8]) -> usize {
    let n = buf.len().min(rx.len());
    for (b, v) in buf.iter_mut().zip(rx.drain(..n)) {
        *b = v;
    }
    n
}

fn encode_tenths(value: f64) -> [u8; 2] {
    ((value * 10.0).round() as u16).to_be_bytes()
}

fn encode_hundredths(value: f64) -> [u8; 2] {
    ((value * 100.0).round() as u16).to_be_bytes()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::loc::Gnss;
    use crate::motor_client::MotorClient;

    const START: LatLon = LatLon {
        lat_deg: 50.934,
        lon_deg: -1.395,
    };

    fn sim() -> SimClient {
        SimClient::new(
            START,
            0.0,
            &motor_client::Params::default(),
            &loc::Params::default(),
        )
    }

    #[test]
    fn test_gnss_link_reports_antenna() {
        let sim = sim();
        let params = loc::Params::default();
        let mut gnss = Gnss::new(Box::new(sim.gnss_link()), &params);

        assert!(gnss.update());

        // Nothing new until the world steps
        assert!(!gnss.update());

        let raw = gnss.get_position(false).unwrap();
        assert!(raw.distance_m(&sim.antenna_position()) < 0.01);
        assert!(gnss.has_rtk_fix());

        // The offset correction recovers the rotation centre
        let centre = gnss
            .get_position_with_offset_correction(sim.heading_deg(), false)
            .unwrap();
        assert!(centre.distance_m(&START) < 0.01);

        sim.step(0.1);
        assert!(gnss.update());

        sim.set_gnss_enabled(false);
        sim.step(0.1);
        assert!(!gnss.update());
    }

    #[test]
    fn test_motor_link_drives_wheels() {
        let sim = sim();
        let params = motor_client::Params::default();
        let mut motors = MotorClient::connect(Box::new(sim.motor_link()), &params);
        let v_max = motors.max_velocity_ms();

        motors.set_velocity(0.1, 0.1).unwrap();
        let (l, r) = sim.wheel_vel_ms();
        assert!((l - 0.1).abs() < 1e-4);
        assert!((r - 0.1).abs() < 1e-4);

        // Straight north
        for _ in 0..10 {
            sim.step(0.1);
        }
        let north = sim.position();
        assert!((START.distance_m(&north) - 0.1).abs() < 0.005);
        assert!(north.lat_deg > START.lat_deg);
        assert!((sim.heading_deg() - 0.0).abs() < 1e-9);

        // Left forward, right back turns clockwise
        motors.set_velocity(v_max, -v_max).unwrap();
        sim.step(0.1);
        assert!(sim.heading_deg() > 0.0 && sim.heading_deg() < 180.0);

        assert_eq!(motors.battery_voltage(), Some(SIM_BATTERY_V));
        let (i_left, i_right) = motors.currents().unwrap();
        assert!((i_left - 2.2).abs() < 1e-9);
        assert!((i_right - 2.2).abs() < 1e-9);
        assert_eq!(motors.temperatures(), Some((SIM_TEMP_C, SIM_TEMP_C)));

        motors.stop().unwrap();
        assert_eq!(sim.wheel_vel_ms(), (0.0, 0.0));
    }

    #[test]
    fn test_motor_link_rejects_corrupt_packet() {
        let sim = sim();
        let mut link = sim.motor_link();

        let mut packet = motor::encode_duty_packet(0x80, MotorCmd::DriveM1Duty, DUTY_MAX);
        packet[3] ^= 0x01;
        link.write_all(&packet).unwrap();

        assert_eq!(sim.wheel_vel_ms(), (0.0, 0.0));
        assert_eq!(link.bytes_to_read().unwrap(), 0);
    }

    #[test]
    fn test_heading_source() {
        let sim = SimClient::new(
            START,
            370.0,
            &motor_client::Params::default(),
            &loc::Params::default(),
        );
        let mut heading = sim.heading_source();

        assert_eq!(heading.heading_deg(), None);
        assert!(heading.update());
        assert!((heading.heading_deg().unwrap() - 10.0).abs() < 1e-9);
    }
}
