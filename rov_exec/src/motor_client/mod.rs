//! # Motor Client
//!
//! Drives the left and right wheels through the dual channel motor controller
//! and reads back its telemetry. Motor 1 is the left wheel, motor 2 the
//! right.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;

pub use params::Params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, trace, warn};
use std::io::{self, Read};

use comms_if::eqpt::motor::{self, MotorCmd, MotorStatus, PacketError, DUTY_MAX};
use util::maths::clamp_sym;

use crate::serial::SerialLink;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct MotorClient {
    link: Option<Box<dyn SerialLink>>,
    address: u8,
    max_velocity_ms: f64,

    /// Last commanded (left, right) velocity
    last_cmd_ms: (f64, f64),
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MotorClientError {
    #[error("The client is not connected to the motor controller")]
    NotConnected,

    #[error("Could not send the command: {0}")]
    SendError(io::Error),

    #[error("Could not recieve the response: {0}")]
    RecvError(io::Error),

    #[error("The controller did not answer in time")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(PacketError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotorClient {
    /// Create a new motor client over the given link.
    ///
    /// The controller is probed by reading its battery voltage, a silent
    /// controller is only warned about since it may still accept commands.
    pub fn connect(link: Box<dyn SerialLink>, params: &Params) -> Self {
        let mut client = Self {
            link: Some(link),
            address: params.address,
            max_velocity_ms: params.max_velocity_ms(),
            last_cmd_ms: (0.0, 0.0),
        };

        match client.battery_voltage() {
            Some(v) => info!("Motor controller connected, battery at {:.1} V", v),
            None => warn!("Motor controller did not answer the battery voltage probe"),
        }

        info!("Max wheel velocity: {:.3} m/s", client.max_velocity_ms);

        client
    }

    /// Stop the motors and release the link.
    pub fn disconnect(&mut self) {
        if self.link.is_some() {
            if let Err(e) = self.stop() {
                warn!("Could not stop motors while disconnecting: {}", e);
            }
            self.link = None;
            info!("Motor controller disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn max_velocity_ms(&self) -> f64 {
        self.max_velocity_ms
    }

    /// Last commanded (left, right) wheel velocity.
    pub fn last_cmd_ms(&self) -> (f64, f64) {
        self.last_cmd_ms
    }

    /// Command the wheel velocities, clamped to the maximum velocity.
    pub fn set_velocity(&mut self, left_ms: f64, right_ms: f64) -> Result<(), MotorClientError> {
        let left_duty = self.velocity_to_duty(left_ms);
        let right_duty = self.velocity_to_duty(right_ms);

        trace!(
            "Wheel demands: left {:.3} m/s ({}), right {:.3} m/s ({})",
            left_ms,
            left_duty,
            right_ms,
            right_duty
        );

        let m1 = motor::encode_duty_packet(self.address, MotorCmd::DriveM1Duty, left_duty);
        let m2 = motor::encode_duty_packet(self.address, MotorCmd::DriveM2Duty, right_duty);

        let link = self.link.as_mut().ok_or(MotorClientError::NotConnected)?;
        link.write_all(&m1).map_err(MotorClientError::SendError)?;
        link.write_all(&m2).map_err(MotorClientError::SendError)?;
        link.flush().map_err(MotorClientError::SendError)?;

        self.last_cmd_ms = (
            clamp_sym(left_ms, self.max_velocity_ms),
            clamp_sym(right_ms, self.max_velocity_ms),
        );

        Ok(())
    }

    /// Command zero velocity on both wheels.
    pub fn stop(&mut self) -> Result<(), MotorClientError> {
        self.set_velocity(0.0, 0.0)
    }

    /// Convert a wheel velocity into a signed duty.
    ///
    /// The velocity is clamped to the maximum, scaled to the duty range and
    /// rounded.
    pub fn velocity_to_duty(&self, velocity_ms: f64) -> i16 {
        if self.max_velocity_ms <= 0.0 || !velocity_ms.is_finite() {
            return 0;
        }

        let ratio = clamp_sym(velocity_ms, self.max_velocity_ms) / self.max_velocity_ms;

        (ratio * DUTY_MAX as f64).round() as i16
    }

    /// Main battery voltage.
    pub fn battery_voltage(&mut self) -> Option<f64> {
        self.read_telemetry(MotorCmd::ReadMainBattery)
            .map(|d| motor::decode_voltage(&d))
    }

    /// Motor (left, right) currents in amps.
    pub fn currents(&mut self) -> Option<(f64, f64)> {
        self.read_telemetry(MotorCmd::ReadCurrents)
            .map(|d| motor::decode_currents(&d))
    }

    /// Controller temperatures in degrees celsius.
    pub fn temperatures(&mut self) -> Option<(f64, f64)> {
        let t1 = self.read_telemetry(MotorCmd::ReadTemp1)?;
        let t2 = self.read_telemetry(MotorCmd::ReadTemp2)?;

        Some((motor::decode_temperature(&t1), motor::decode_temperature(&t2)))
    }

    /// Read all telemetry.
    pub fn status(&mut self) -> MotorStatus {
        MotorStatus {
            connected: self.is_connected(),
            battery_v: self.battery_voltage(),
            currents_a: self.currents(),
            temps_c: self.temperatures(),
        }
    }

    /// Read a telemetry value, logging and discarding any failure.
    fn read_telemetry(&mut self, cmd: MotorCmd) -> Option<Vec<u8>> {
        match self.request(cmd) {
            Ok(d) => Some(d),
            Err(MotorClientError::NotConnected) => None,
            Err(e) => {
                debug!("Motor controller {:?} failed: {}", cmd, e);
                None
            }
        }
    }

    /// Send a read command and return the verified response data.
    fn request(&mut self, cmd: MotorCmd) -> Result<Vec<u8>, MotorClientError> {
        let data_len = cmd.response_len().unwrap_or(0);
        let packet = motor::encode_packet(self.address, cmd, &[]);

        let link = self.link.as_mut().ok_or(MotorClientError::NotConnected)?;

        // Drop anything left over from a previous timed out request
        link.clear_input().map_err(MotorClientError::RecvError)?;

        link.write_all(&packet).map_err(MotorClientError::SendError)?;
        link.flush().map_err(MotorClientError::SendError)?;

        let mut frame = vec![0u8; data_len + 1];
        read_full(link.as_mut(), &mut frame)?;

        motor::verify_response(&frame, data_len)
            .map(|d| d.to_vec())
            .map_err(MotorClientError::InvalidResponse)
    }
}

impl Drop for MotorClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Fill the buffer from the link, failing if the link times out first.
fn read_full(link: &mut dyn SerialLink, buf: &mut [u8]) -> Result<(), MotorClientError> {
    let mut filled = 0;

    while filled < buf.len() {
        match link.read(&mut buf[filled..]) {
            Ok(0) => return Err(MotorClientError::Timeout),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
            {
                return Err(MotorClientError::Timeout)
            }
            Err(e) => return Err(MotorClientError::RecvError(e)),
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::serial::test::MockLink;
    use comms_if::eqpt::motor::{decode_packet, duty_from_wire, DEFAULT_ADDRESS};

    fn client() -> (MotorClient, MockLink) {
        let link = MockLink::default();
        let client = MotorClient::connect(Box::new(link.clone()), &Params::default());
        link.take_tx();
        (client, link)
    }

    #[test]
    fn test_max_velocity() {
        let (c, _) = client();
        let expected = std::f64::consts::PI * 0.079;
        assert!((c.max_velocity_ms() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_velocity_to_duty() {
        let (c, _) = client();
        let v_max = c.max_velocity_ms();

        assert_eq!(c.velocity_to_duty(0.0), 0);
        assert_eq!(c.velocity_to_duty(v_max), DUTY_MAX);
        assert_eq!(c.velocity_to_duty(-v_max), -DUTY_MAX);
        assert_eq!(c.velocity_to_duty(10.0 * v_max), DUTY_MAX);
        assert_eq!(c.velocity_to_duty(-10.0 * v_max), -DUTY_MAX);
        assert_eq!(c.velocity_to_duty(v_max / 2.0), 16384);
        assert_eq!(c.velocity_to_duty(std::f64::NAN), 0);
    }

    #[test]
    fn test_set_velocity_packets() {
        let (mut c, link) = client();
        let v_max = c.max_velocity_ms();

        c.set_velocity(v_max, -v_max).unwrap();
        let tx = link.take_tx();
        assert_eq!(tx.len(), 12);

        let m1 = decode_packet(&tx[..6]).unwrap();
        let m2 = decode_packet(&tx[6..]).unwrap();

        assert_eq!(m1.address, DEFAULT_ADDRESS);
        assert_eq!(m1.cmd, MotorCmd::DriveM1Duty);
        assert_eq!(duty_from_wire(&m1.data), DUTY_MAX);
        assert_eq!(&m1.data, &[0x7F, 0xFF]);

        assert_eq!(m2.cmd, MotorCmd::DriveM2Duty);
        assert_eq!(duty_from_wire(&m2.data), -DUTY_MAX);
        assert_eq!(&m2.data, &[0x80, 0x01]);

        c.stop().unwrap();
        let tx = link.take_tx();
        assert_eq!(duty_from_wire(&decode_packet(&tx[..6]).unwrap().data), 0);
        assert_eq!(duty_from_wire(&decode_packet(&tx[6..]).unwrap().data), 0);
        assert_eq!(c.last_cmd_ms(), (0.0, 0.0));
    }

    #[test]
    fn test_telemetry_responses() {
        let (mut c, link) = client();

        link.queue_reply(&motor::encode_response(&[0x00, 0x7E]));
        assert_eq!(c.battery_voltage(), Some(12.6));

        let tx = link.take_tx();
        assert_eq!(decode_packet(&tx).unwrap().cmd, MotorCmd::ReadMainBattery);

        link.queue_reply(&motor::encode_response(&[0x00, 0x64, 0x00, 0xC8]));
        assert_eq!(c.currents(), Some((1.0, 2.0)));

        // Bad checksum
        let mut frame = motor::encode_response(&[0x00, 0x7E]);
        frame[2] ^= 0xFF;
        link.queue_reply(&frame);
        assert_eq!(c.battery_voltage(), None);

        // Stale bytes from an earlier timed out request are discarded
        link.push_rx(&[0x55; 3]);
        link.queue_reply(&motor::encode_response(&[0x00, 0x7E]));
        assert_eq!(c.battery_voltage(), Some(12.6));

        // No response at all
        assert_eq!(c.battery_voltage(), None);
    }

    #[test]
    fn test_disconnected() {
        let (mut c, _link) = client();
        c.disconnect();

        assert!(!c.is_connected());
        assert!(matches!(
            c.set_velocity(0.1, 0.1),
            Err(MotorClientError::NotConnected)
        ));
        assert_eq!(c.battery_voltage(), None);
        assert!(!c.status().connected);
    }
}
