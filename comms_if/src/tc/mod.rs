//! # Telecommand module
//!
//! This module provides telecommand functionality to the communications
//! interface. Telecommands are JSON objects of the form
//! `{"type": "<TYPE>", "payload": <payload>}`, where the payload is omitted
//! for types which don't carry one.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod mission;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use serde_json::{self, json, Value};
use std::path::PathBuf;
use thiserror::Error;

// Internal
use crate::tm::{StatusTm, TelemetryTm};
use mission::MissionDescriptor;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static TYPE_HAS_NO_PAYLOAD: [TcType; 6] = [
    TcType::Stop,
    TcType::Resume,
    TcType::EmergencyStop,
    TcType::ClearError,
    TcType::GetStatus,
    TcType::GetTelemetry,
];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Manual wheel speed demand, each side normalised to [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorSpeeds {
    pub left: f64,
    pub right: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A telecommand, i.e. an instruction sent to the rover by the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Tc {
    /// Replace the active mission
    LoadMission(MissionDescriptor),

    /// Replace the active mission with one read from a file on the rover
    LoadMissionFile(PathBuf),

    /// Gently stop the rover and pause the mission
    Stop,

    /// Resume a paused mission
    Resume,

    /// Emergency stop with an optional reason
    EmergencyStop(Option<String>),

    /// Clear an error or emergency stop
    ClearError,

    /// Manual motor override
    MotorSpeeds(MotorSpeeds),

    /// Request a status report
    GetStatus,

    /// Request a full telemetry report
    GetTelemetry,
}

/// Telecommand types.
///
/// The type is used to identify the purpose of the telecommand, and is used
/// by the rover's telecommand processor to determine what to do.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub enum TcType {
    LoadMission,
    LoadMissionFile,
    Stop,
    Resume,
    EmergencyStop,
    ClearError,
    MotorSpeeds,
    GetStatus,
    GetTelemetry,
}

/// Response to a telecommand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TcResponse {
    /// The command was accepted and executed
    Ok,

    /// The command was rejected, with the reason
    Rejected(String),

    /// Status report
    Status(StatusTm),

    /// Telemetry report
    Telemetry(Box<TelemetryTm>),
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("TC contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("TC has an invalid type ({0})")]
    InvalidType(String),

    #[error("TC of type {0:?} is expected to have a payload but it doesn't")]
    MissingPayload(TcType),

    #[error("TC of type {0:?} has an invalid payload: {1}")]
    InvalidPayload(TcType, serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tc {
    /// Parse a new TC from a JSON packet
    pub fn from_json(json_str: &str) -> Result<Self, TcParseError> {
        // Parse the JSON string into a value
        let val: Value = match serde_json::from_str(json_str) {
            Ok(v) => v,
            Err(e) => return Err(TcParseError::InvalidJson(e)),
        };

        // Get the type of the TC
        let type_str = match val["type"].as_str() {
            Some(s) => s,
            None => {
                return Err(TcParseError::InvalidType(String::from(
                    "Expected \"type\" to be a string",
                )))
            }
        };
        let tc_type = match TcType::from_str(type_str) {
            Some(t) => t,
            None => {
                return Err(TcParseError::InvalidType(format!(
                    "{} is not a recognised TC type",
                    type_str
                )))
            }
        };

        // Get the payload. If it's null and the type requires a payload then
        // an error is returned
        let payload = val["payload"].clone();
        if payload.is_null() && !TYPE_HAS_NO_PAYLOAD.contains(&tc_type) {
            return Err(TcParseError::MissingPayload(tc_type));
        }

        let invalid = |e| TcParseError::InvalidPayload(tc_type, e);

        Ok(match tc_type {
            TcType::LoadMission => Tc::LoadMission(serde_json::from_value(payload).map_err(invalid)?),
            TcType::LoadMissionFile => {
                Tc::LoadMissionFile(serde_json::from_value(payload).map_err(invalid)?)
            }
            TcType::Stop => Tc::Stop,
            TcType::Resume => Tc::Resume,
            TcType::EmergencyStop => {
                Tc::EmergencyStop(serde_json::from_value(payload).map_err(invalid)?)
            }
            TcType::ClearError => Tc::ClearError,
            TcType::MotorSpeeds => Tc::MotorSpeeds(serde_json::from_value(payload).map_err(invalid)?),
            TcType::GetStatus => Tc::GetStatus,
            TcType::GetTelemetry => Tc::GetTelemetry,
        })
    }

    /// Serialise the TC into its JSON packet form.
    pub fn to_json(&self) -> String {
        let payload = match self {
            Tc::LoadMission(m) => json!(m),
            Tc::LoadMissionFile(p) => json!(p),
            Tc::EmergencyStop(r) => json!(r),
            Tc::MotorSpeeds(s) => json!(s),
            _ => Value::Null,
        };

        json!({
            "type": self.tc_type().as_str(),
            "payload": payload
        })
        .to_string()
    }

    pub fn tc_type(&self) -> TcType {
        match self {
            Tc::LoadMission(_) => TcType::LoadMission,
            Tc::LoadMissionFile(_) => TcType::LoadMissionFile,
            Tc::Stop => TcType::Stop,
            Tc::Resume => TcType::Resume,
            Tc::EmergencyStop(_) => TcType::EmergencyStop,
            Tc::ClearError => TcType::ClearError,
            Tc::MotorSpeeds(_) => TcType::MotorSpeeds,
            Tc::GetStatus => TcType::GetStatus,
            Tc::GetTelemetry => TcType::GetTelemetry,
        }
    }
}

impl TcType {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "LOAD_MISSION" => Some(TcType::LoadMission),
            "LOAD_MISSION_FILE" => Some(TcType::LoadMissionFile),
            "STOP" => Some(TcType::Stop),
            "RESUME" => Some(TcType::Resume),
            "EMERGENCY_STOP" => Some(TcType::EmergencyStop),
            "CLEAR_ERROR" => Some(TcType::ClearError),
            "MOTOR_SPEEDS" => Some(TcType::MotorSpeeds),
            "GET_STATUS" => Some(TcType::GetStatus),
            "GET_TELEMETRY" => Some(TcType::GetTelemetry),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            TcType::LoadMission => "LOAD_MISSION",
            TcType::LoadMissionFile => "LOAD_MISSION_FILE",
            TcType::Stop => "STOP",
            TcType::Resume => "RESUME",
            TcType::EmergencyStop => "EMERGENCY_STOP",
            TcType::ClearError => "CLEAR_ERROR",
            TcType::MotorSpeeds => "MOTOR_SPEEDS",
            TcType::GetStatus => "GET_STATUS",
            TcType::GetTelemetry => "GET_TELEMETRY",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_no_payload() {
        assert_eq!(Tc::from_json(r#"{"type": "STOP"}"#).unwrap(), Tc::Stop);
        assert_eq!(
            Tc::from_json(r#"{"type": "EMERGENCY_STOP"}"#).unwrap(),
            Tc::EmergencyStop(None)
        );
        assert_eq!(
            Tc::from_json(r#"{"type": "EMERGENCY_STOP", "payload": "Person in path"}"#).unwrap(),
            Tc::EmergencyStop(Some("Person in path".into()))
        );
    }

    #[test]
    fn test_parse_motor_speeds() {
        assert_eq!(
            Tc::from_json(r#"{"type": "MOTOR_SPEEDS", "payload": {"left": 0.5, "right": -0.25}}"#)
                .unwrap(),
            Tc::MotorSpeeds(MotorSpeeds {
                left: 0.5,
                right: -0.25
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Tc::from_json("not json"),
            Err(TcParseError::InvalidJson(_))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"type": "SELF_DESTRUCT"}"#),
            Err(TcParseError::InvalidType(_))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"type": 4}"#),
            Err(TcParseError::InvalidType(_))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"type": "MOTOR_SPEEDS"}"#),
            Err(TcParseError::MissingPayload(TcType::MotorSpeeds))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"type": "MOTOR_SPEEDS", "payload": {"left": "fast"}}"#),
            Err(TcParseError::InvalidPayload(TcType::MotorSpeeds, _))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let tcs = vec![
            Tc::Stop,
            Tc::LoadMissionFile(PathBuf::from("missions/demo.json")),
            Tc::MotorSpeeds(MotorSpeeds {
                left: 1.0,
                right: 0.0,
            }),
            Tc::EmergencyStop(Some("test".into())),
        ];

        for tc in tcs {
            assert_eq!(Tc::from_json(&tc.to_json()).unwrap(), tc);
        }
    }
}
