//! # Motor controller packet serial protocol
//!
//! Packets sent to the dual channel motor controller have the layout
//!
//! ```text
//! [address, command, data..., crc_hi, crc_lo]
//! ```
//!
//! where the CRC is a CRC16 (polynomial 0x1021, initial value 0, MSB first)
//! over the address, command and data bytes. Responses to read commands are
//! `N` data bytes followed by a single checksum byte, which must equal the low
//! byte of the CRC16 of the data.
//!
//! Duty demands are signed 16 bit values in `[-DUTY_MAX, DUTY_MAX]` sent as
//! big endian two's complement.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default packet serial address of the controller.
pub const DEFAULT_ADDRESS: u8 = 0x80;

/// Maximum magnitude of a duty demand.
pub const DUTY_MAX: i16 = 32767;

/// CRC16 generator polynomial.
const CRC16_POLY: u16 = 0x1021;

/// Length of a command packet carrying no data.
pub const READ_PACKET_LEN: usize = 4;

/// Length of a duty command packet.
pub const DUTY_PACKET_LEN: usize = 6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A decoded command packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdPacket {
    pub address: u8,
    pub cmd: MotorCmd,
    pub data: Vec<u8>,
}

/// Telemetry reported by the motor controller.
///
/// Each field is `None` if the controller did not answer the corresponding
/// request with a valid response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorStatus {
    pub connected: bool,
    pub battery_v: Option<f64>,
    pub currents_a: Option<(f64, f64)>,
    pub temps_c: Option<(f64, f64)>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Commands understood by the motor controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorCmd {
    /// Read the main battery voltage, 2 bytes in tenths of a volt
    ReadMainBattery,

    /// Read the logic battery voltage, 2 bytes in tenths of a volt
    ReadLogicBattery,

    /// Drive motor 1 (left) with a signed duty
    DriveM1Duty,

    /// Drive motor 2 (right) with a signed duty
    DriveM2Duty,

    /// Read both motor currents, 2 x 2 bytes in hundredths of an amp
    ReadCurrents,

    /// Read the board temperature, 2 bytes in tenths of a degree
    ReadTemp1,

    /// Read the second temperature sensor, 2 bytes in tenths of a degree
    ReadTemp2,
}

/// Errors raised when decoding packets or responses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("Expected at least {expected} bytes but found {found}")]
    TooShort { expected: usize, found: usize },

    #[error("Checksum mismatch (expected {expected:#06x}, found {found:#06x})")]
    ChecksumMismatch { expected: u16, found: u16 },

    #[error("Unknown command code {0}")]
    UnknownCommand(u8),

    #[error("Command {0:?} expects {1} data bytes")]
    BadDataLength(MotorCmd, usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MotorCmd {
    /// The command byte sent on the wire.
    pub fn code(self) -> u8 {
        match self {
            MotorCmd::ReadMainBattery => 24,
            MotorCmd::ReadLogicBattery => 25,
            MotorCmd::DriveM1Duty => 32,
            MotorCmd::DriveM2Duty => 33,
            MotorCmd::ReadCurrents => 49,
            MotorCmd::ReadTemp1 => 82,
            MotorCmd::ReadTemp2 => 83,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            24 => Some(MotorCmd::ReadMainBattery),
            25 => Some(MotorCmd::ReadLogicBattery),
            32 => Some(MotorCmd::DriveM1Duty),
            33 => Some(MotorCmd::DriveM2Duty),
            49 => Some(MotorCmd::ReadCurrents),
            82 => Some(MotorCmd::ReadTemp1),
            83 => Some(MotorCmd::ReadTemp2),
            _ => None,
        }
    }

    /// Number of data bytes carried by the command packet.
    pub fn data_len(self) -> usize {
        match self {
            MotorCmd::DriveM1Duty | MotorCmd::DriveM2Duty => 2,
            _ => 0,
        }
    }

    /// Number of data bytes in the controller's response, not counting the
    /// checksum byte. `None` for commands which are not answered.
    pub fn response_len(self) -> Option<usize> {
        match self {
            MotorCmd::ReadMainBattery
            | MotorCmd::ReadLogicBattery
            | MotorCmd::ReadTemp1
            | MotorCmd::ReadTemp2 => Some(2),
            MotorCmd::ReadCurrents => Some(4),
            MotorCmd::DriveM1Duty | MotorCmd::DriveM2Duty => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// CRC16 with polynomial 0x1021, zero initial value, no reflection.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;

    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

/// Checksum byte appended to controller responses.
pub fn response_checksum(data: &[u8]) -> u8 {
    (crc16(data) & 0xFF) as u8
}

/// Build a command packet with its trailing CRC.
pub fn encode_packet(address: u8, cmd: MotorCmd, data: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(data.len() + 4);
    packet.push(address);
    packet.push(cmd.code());
    packet.extend_from_slice(data);

    let mut crc_bytes = [0u8; 2];
    BigEndian::write_u16(&mut crc_bytes, crc16(&packet));
    packet.extend_from_slice(&crc_bytes);

    packet
}

/// Build a duty command packet.
pub fn encode_duty_packet(address: u8, cmd: MotorCmd, duty: i16) -> Vec<u8> {
    encode_packet(address, cmd, &duty_to_wire(duty))
}

/// Decode and verify a complete command packet.
pub fn decode_packet(packet: &[u8]) -> Result<CmdPacket, PacketError> {
    if packet.len() < READ_PACKET_LEN {
        return Err(PacketError::TooShort {
            expected: READ_PACKET_LEN,
            found: packet.len(),
        });
    }

    let cmd = MotorCmd::from_code(packet[1]).ok_or(PacketError::UnknownCommand(packet[1]))?;

    if packet.len() != cmd.data_len() + 4 {
        return Err(PacketError::BadDataLength(cmd, cmd.data_len()));
    }

    let body_len = packet.len() - 2;
    let expected = crc16(&packet[..body_len]);
    let found = BigEndian::read_u16(&packet[body_len..]);
    if expected != found {
        return Err(PacketError::ChecksumMismatch { expected, found });
    }

    Ok(CmdPacket {
        address: packet[0],
        cmd,
        data: packet[2..body_len].to_vec(),
    })
}

/// Build a response frame (data followed by the checksum byte).
pub fn encode_response(data: &[u8]) -> Vec<u8> {
    let mut frame = data.to_vec();
    frame.push(response_checksum(data));
    frame
}

/// Verify a response frame of `data_len` data bytes plus checksum, returning
/// the data bytes.
pub fn verify_response(frame: &[u8], data_len: usize) -> Result<&[u8], PacketError> {
    if frame.len() < data_len + 1 {
        return Err(PacketError::TooShort {
            expected: data_len + 1,
            found: frame.len(),
        });
    }

    let data = &frame[..data_len];
    let expected = response_checksum(data);
    let found = frame[data_len];

    if expected != found {
        return Err(PacketError::ChecksumMismatch {
            expected: expected as u16,
            found: found as u16,
        });
    }

    Ok(data)
}

/// Convert a signed duty into its big endian two's complement wire form.
pub fn duty_to_wire(duty: i16) -> [u8; 2] {
    let mut bytes = [0u8; 2];
    BigEndian::write_i16(&mut bytes, duty.max(-DUTY_MAX));
    bytes
}

/// Convert the wire form back into a signed duty.
pub fn duty_from_wire(bytes: &[u8]) -> i16 {
    BigEndian::read_i16(bytes)
}

/// Decode a battery voltage response in volts.
pub fn decode_voltage(data: &[u8]) -> f64 {
    BigEndian::read_u16(data) as f64 / 10.0
}

/// Decode a currents response into (motor 1, motor 2) amps.
pub fn decode_currents(data: &[u8]) -> (f64, f64) {
    (
        BigEndian::read_u16(&data[0..2]) as f64 / 100.0,
        BigEndian::read_u16(&data[2..4]) as f64 / 100.0,
    )
}

/// Decode a temperature response in degrees celsius.
pub fn decode_temperature(data: &[u8]) -> f64 {
    BigEndian::read_u16(data) as f64 / 10.0
}
