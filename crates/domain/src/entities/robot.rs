//! Robot entity - one member of the backend's authoritative robot snapshot

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{ControllerId, RobotId};

/// Connection status of a robot as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Seen on the network but never connected
    Discovered,
}

impl RobotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotStatus::Disconnected => "disconnected",
            RobotStatus::Connecting => "connecting",
            RobotStatus::Connected => "connected",
            RobotStatus::Discovered => "discovered",
        }
    }
}

impl fmt::Display for RobotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RobotStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "discovered" => Ok(Self::Discovered),
            other => Err(DomainError::parse(format!("Unknown robot status: {}", other))),
        }
    }
}

/// Backend timestamps arrive either as fractional epoch seconds or as epoch
/// milliseconds. Both are normalised to whole milliseconds; zero means "never".
mod epoch_millis {
    use serde::{Deserialize, Deserializer};

    /// Anything below this is too small to be milliseconds after 1973.
    const SECONDS_CEILING: f64 = 1e11;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<f64> = Option::deserialize(deserializer)?;
        Ok(raw.and_then(normalise))
    }

    pub(super) fn normalise(value: f64) -> Option<i64> {
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        let millis = if value < SECONDS_CEILING {
            value * 1000.0
        } else {
            value
        };
        Some(millis.round() as i64)
    }
}

/// A remote-controlled robot.
///
/// Records only exist as members of the latest snapshot; there is no
/// per-field patching, so every field here is exactly what the backend sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Robot {
    pub id: RobotId,
    pub name: String,
    #[serde(default)]
    pub status: RobotStatus,
    #[serde(default)]
    pub ip_address: String,
    /// Signal quality 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<u8>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_controller_id: Option<ControllerId>,
    /// Milliseconds since the Unix epoch; `None` if no command was ever sent
    #[serde(
        default,
        deserialize_with = "epoch_millis::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_command_time: Option<i64>,
    #[serde(
        default,
        deserialize_with = "epoch_millis::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_seen_time: Option<i64>,
    /// Transient activity indicator (commands flowing right now)
    #[serde(default)]
    pub receiving: bool,
}

impl Robot {
    pub fn new(id: impl Into<RobotId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: RobotStatus::Disconnected,
            ip_address: String::new(),
            signal: None,
            disabled: false,
            paired_controller_id: None,
            last_command_time: None,
            last_seen_time: None,
            receiving: false,
        }
    }

    pub fn with_status(mut self, status: RobotStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = ip_address.into();
        self
    }

    pub fn paired_with(mut self, controller_id: impl Into<ControllerId>) -> Self {
        self.paired_controller_id = Some(controller_id.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.status == RobotStatus::Connected
    }

    pub fn is_paired(&self) -> bool {
        self.paired_controller_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_backend_payload() {
        let json = serde_json::json!({
            "id": "minibot-1",
            "name": "Minibot 1",
            "ipAddress": "192.168.4.21",
            "status": "connected",
            "connected": true,
            "signal": 85,
            "disabled": false,
            "pairedControllerId": "ps5-0",
            "lastSeenTime": 1700000000000i64,
            "lastCommandTime": null
        });

        let robot: Robot = serde_json::from_value(json).expect("robot payload");
        assert_eq!(robot.id.as_str(), "minibot-1");
        assert_eq!(robot.status, RobotStatus::Connected);
        assert_eq!(robot.signal, Some(85));
        assert_eq!(robot.paired_controller_id, Some(ControllerId::from("ps5-0")));
        assert_eq!(robot.last_seen_time, Some(1_700_000_000_000));
        assert_eq!(robot.last_command_time, None);
        assert!(!robot.receiving);
    }

    #[test]
    fn decodes_python_backend_robot_list() {
        // Shape produced by the backend's Robot.to_dict(): time.time() floats
        let json = serde_json::json!([{
            "id": "minibot-1",
            "name": "Minibot 1",
            "ipAddress": "192.168.4.21",
            "status": "discovered",
            "connected": false,
            "signal": 85,
            "disabled": false,
            "pairedControllerId": null,
            "lastSeenTime": 1700000000.123456,
            "lastCommandTime": 0
        }]);

        let robots: Vec<Robot> = serde_json::from_value(json).expect("robot list");
        assert_eq!(robots.len(), 1);
        assert_eq!(robots[0].status, RobotStatus::Discovered);
        assert_eq!(robots[0].last_seen_time, Some(1_700_000_000_123));
        assert_eq!(robots[0].last_command_time, None);
        assert!(!robots[0].is_paired());
    }

    #[test]
    fn timestamps_normalise_to_millis() {
        assert_eq!(epoch_millis::normalise(1_700_000_000_000.0), Some(1_700_000_000_000));
        assert_eq!(epoch_millis::normalise(1_700_000_000.5), Some(1_700_000_000_500));
        assert_eq!(epoch_millis::normalise(0.0), None);
        assert_eq!(epoch_millis::normalise(f64::NAN), None);
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let robot: Robot =
            serde_json::from_value(serde_json::json!({"id": "r1", "name": "R1"})).expect("robot");
        assert_eq!(robot.status, RobotStatus::Disconnected);
        assert!(!robot.disabled);
        assert!(!robot.is_paired());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Discovered".parse::<RobotStatus>(), Ok(RobotStatus::Discovered));
        assert!("flying".parse::<RobotStatus>().is_err());
    }
}
