//! Push channel message types
//!
//! Every frame on the push channel is a JSON envelope:
//!
//! ```json
//! { "type": "robot_connected", "data": { "id": "minibot-1", "name": "Minibot 1" }, "timestamp": 1700000000000 }
//! ```
//!
//! The envelope is decoded eagerly; the payload stays opaque until a consumer
//! asks for a typed view with [`ServerEvent::decode`]. Unknown type tags are
//! valid envelopes and are delivered like any other.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use robodeck_domain::{ControllerId, RobotId};

/// Type tags observed on the push channel.
pub mod event_types {
    pub const ROBOT_CONNECTED: &str = "robot_connected";
    pub const ROBOT_DISCONNECTED: &str = "robot_disconnected";
    pub const ROBOT_ENABLED: &str = "robot_enabled";
    pub const ROBOT_DISABLED: &str = "robot_disabled";
    pub const ROBOTS_REFRESHING: &str = "robots_refreshing";

    pub const CONTROLLER_CONNECTED: &str = "controller_connected";
    pub const CONTROLLER_DISCONNECTED: &str = "controller_disconnected";
    pub const CONTROLLER_PAIRED: &str = "controller_paired";
    pub const CONTROLLER_UNPAIRED: &str = "controller_unpaired";
    pub const CONTROLLER_ENABLED: &str = "controller_enabled";
    pub const CONTROLLER_DISABLED: &str = "controller_disabled";
    pub const CONTROLLERS_REFRESHING: &str = "controllers_refreshing";
    pub const CONTROLLERS_UPDATED: &str = "controllers_updated";

    pub const EMERGENCY_STOP: &str = "emergency_stop";

    pub const TIMER_UPDATE: &str = "timer_update";
    pub const MATCH_START: &str = "match_start";
    pub const MATCH_STOP: &str = "match_stop";
    pub const MATCH_END: &str = "match_end";
    pub const MATCH_RESET: &str = "match_reset";
    pub const MATCH_DURATION_CHANGED: &str = "match_duration_changed";

    /// Events after which the robot snapshot is stale
    pub const ROBOT_SNAPSHOT_EVENTS: &[&str] = &[
        ROBOT_CONNECTED,
        ROBOT_DISCONNECTED,
        ROBOT_ENABLED,
        ROBOT_DISABLED,
    ];

    /// Events after which the controller snapshot (and pairing on robots) is stale
    pub const CONTROLLER_SNAPSHOT_EVENTS: &[&str] = &[
        CONTROLLER_CONNECTED,
        CONTROLLER_DISCONNECTED,
        CONTROLLER_PAIRED,
        CONTROLLER_UNPAIRED,
        CONTROLLER_ENABLED,
        CONTROLLER_DISABLED,
        CONTROLLERS_UPDATED,
    ];

    pub const MATCH_TIMER_EVENTS: &[&str] = &[
        TIMER_UPDATE,
        MATCH_START,
        MATCH_STOP,
        MATCH_END,
        MATCH_RESET,
        MATCH_DURATION_CHANGED,
    ];
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is not a `{type, data}` envelope
    #[error("malformed envelope: {reason} (frame: {excerpt})")]
    MalformedEnvelope { reason: String, excerpt: String },

    /// The envelope is fine but its payload does not have the expected shape
    #[error("unexpected payload for '{event_type}': {reason}")]
    UnexpectedPayload { event_type: String, reason: String },

    /// A binary frame arrived on a text-only channel
    #[error("unsupported binary frame ({0} bytes)")]
    BinaryFrame(usize),
}

/// Longest slice of an offending frame kept in a diagnostic
const EXCERPT_LEN: usize = 120;

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_LEN) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// A decoded push-channel envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    /// Backend emission time in milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ServerEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: None,
        }
    }

    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    /// Decode the payload into a typed view.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.data.clone()).map_err(|e| ProtocolError::UnexpectedPayload {
            event_type: self.event_type.clone(),
            reason: e.to_string(),
        })
    }
}

/// Parse one text frame from the push channel.
pub fn parse_server_event(text: &str) -> Result<ServerEvent, ProtocolError> {
    let event: ServerEvent =
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedEnvelope {
            reason: e.to_string(),
            excerpt: excerpt(text),
        })?;

    if event.event_type.trim().is_empty() {
        return Err(ProtocolError::MalformedEnvelope {
            reason: "empty type tag".to_string(),
            excerpt: excerpt(text),
        });
    }

    Ok(event)
}

// =============================================================================
// Typed payloads
// =============================================================================

/// `robot_*` payloads. `robot_connected` carries the full robot record, the
/// others only the id; both decode into this view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotEventData {
    pub id: RobotId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RobotEventData {
    /// Display name falling back to the id
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// `controller_*` payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerEventData {
    pub controller_id: ControllerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_id: Option<RobotId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyStopData {
    pub active: bool,
}

/// `timer_update` payload. Older backends only send whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerUpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_remaining_ms: Option<u64>,
    #[serde(default)]
    pub time_remaining_seconds: u64,
    pub running: bool,
}

impl TimerUpdateData {
    pub fn remaining_ms(&self) -> u64 {
        self.time_remaining_ms
            .unwrap_or_else(|| self.time_remaining_seconds.saturating_mul(1000))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStartData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationChangedData {
    pub duration_ms: u64,
}

/// `robots_refreshing` / `controllers_refreshing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RefreshingData {
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllersUpdatedData {
    pub count: u32,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_envelope_with_payload() {
        let event = parse_server_event(
            r#"{"type":"emergency_stop","data":{"active":true},"timestamp":1700000000000}"#,
        )
        .expect("valid envelope");

        assert!(event.is(event_types::EMERGENCY_STOP));
        assert_eq!(event.timestamp, Some(1_700_000_000_000));
        let data: EmergencyStopData = event.decode().expect("payload");
        assert!(data.active);
    }

    #[test]
    fn missing_data_defaults_to_null() {
        let event = parse_server_event(r#"{"type":"match_stop"}"#).expect("valid envelope");
        assert_eq!(event.data, serde_json::Value::Null);
    }

    #[test]
    fn unknown_types_are_still_envelopes() {
        let event = parse_server_event(r#"{"type":"firmware_flashed","data":{}}"#)
            .expect("unknown types are carried");
        assert_eq!(event.event_type, "firmware_flashed");
    }

    #[test]
    fn rejects_frames_without_type() {
        let err = parse_server_event(r#"{"data":{"active":true}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEnvelope { .. }));

        let err = parse_server_event("not json at all").unwrap_err();
        assert!(err.to_string().contains("not json at all"));
    }

    #[test]
    fn rejects_blank_type_tag() {
        assert!(parse_server_event(r#"{"type":"  ","data":null}"#).is_err());
    }

    #[test]
    fn long_frames_are_truncated_in_errors() {
        let frame = "x".repeat(500);
        let err = parse_server_event(&frame).unwrap_err();
        match err {
            ProtocolError::MalformedEnvelope { excerpt, .. } => {
                assert!(excerpt.chars().count() <= EXCERPT_LEN + 1)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn timer_update_prefers_milliseconds() {
        let with_ms: TimerUpdateData = serde_json::from_value(json!({
            "timeRemainingMs": 61_500, "timeRemainingSeconds": 61, "running": true
        }))
        .expect("payload");
        assert_eq!(with_ms.remaining_ms(), 61_500);

        let seconds_only: TimerUpdateData =
            serde_json::from_value(json!({"timeRemainingSeconds": 61, "running": false}))
                .expect("payload");
        assert_eq!(seconds_only.remaining_ms(), 61_000);
    }

    #[test]
    fn robot_label_falls_back_to_id() {
        let event = ServerEvent::new(event_types::ROBOT_DISCONNECTED, json!({"id": "r7"}));
        let data: RobotEventData = event.decode().expect("payload");
        assert_eq!(data.label(), "r7");
    }

    #[test]
    fn wrong_payload_shape_is_reported_with_type() {
        let event = ServerEvent::new(event_types::EMERGENCY_STOP, json!({"active": "yes"}));
        let err = event.decode::<EmergencyStopData>().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnexpectedPayload { ref event_type, .. } if event_type == "emergency_stop"
        ));
    }
}
