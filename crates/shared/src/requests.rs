//! The backend's request surface.
//!
//! Every request is a one-shot call: list/get calls return a JSON document,
//! intents return an acknowledgement the console does not interpret beyond
//! success/failure.

use std::fmt;

use robodeck_domain::{ControllerId, RobotId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    /// Sent as `text/plain`, not JSON-wrapped
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    Health,

    ListRobots,
    GetRobot { robot_id: RobotId },
    ConnectRobot { robot_id: RobotId },
    DisconnectRobot { robot_id: RobotId },
    EnableRobot { robot_id: RobotId },
    DisableRobot { robot_id: RobotId },
    RefreshRobots,

    ListControllers,
    PairController {
        controller_id: ControllerId,
        robot_id: RobotId,
    },
    UnpairController { controller_id: ControllerId },
    EnableController { controller_id: ControllerId },
    DisableController { controller_id: ControllerId },
    RefreshControllers,

    ActivateEmergencyStop,
    DeactivateEmergencyStop,

    GetMatchTimer,
    StartMatch,
    StopMatch,
    ResetMatch,
    SetMatchDuration { seconds: u64 },

    GetNetworkStats,
}

impl ApiRequest {
    pub fn method(&self) -> HttpMethod {
        match self {
            ApiRequest::Health
            | ApiRequest::ListRobots
            | ApiRequest::GetRobot { .. }
            | ApiRequest::ListControllers
            | ApiRequest::GetMatchTimer
            | ApiRequest::GetNetworkStats => HttpMethod::Get,
            _ => HttpMethod::Post,
        }
    }

    /// Path segments below the base URL, unencoded. Adapters are responsible
    /// for percent-encoding each segment.
    pub fn path_segments(&self) -> Vec<&str> {
        match self {
            ApiRequest::Health => vec!["api", "health"],
            ApiRequest::ListRobots => vec!["api", "robots"],
            ApiRequest::GetRobot { robot_id } => vec!["api", "robots", robot_id.as_str()],
            ApiRequest::ConnectRobot { robot_id } => {
                vec!["api", "robots", robot_id.as_str(), "connect"]
            }
            ApiRequest::DisconnectRobot { robot_id } => {
                vec!["api", "robots", robot_id.as_str(), "disconnect"]
            }
            ApiRequest::EnableRobot { robot_id } => {
                vec!["api", "robots", robot_id.as_str(), "enable"]
            }
            ApiRequest::DisableRobot { robot_id } => {
                vec!["api", "robots", robot_id.as_str(), "disable"]
            }
            ApiRequest::RefreshRobots => vec!["api", "robots", "refresh"],
            ApiRequest::ListControllers => vec!["api", "controllers"],
            ApiRequest::PairController {
                controller_id,
                robot_id,
            } => vec![
                "api",
                "controllers",
                controller_id.as_str(),
                "pair",
                robot_id.as_str(),
            ],
            ApiRequest::UnpairController { controller_id } => {
                vec!["api", "controllers", controller_id.as_str(), "unpair"]
            }
            ApiRequest::EnableController { controller_id } => {
                vec!["api", "controllers", controller_id.as_str(), "enable"]
            }
            ApiRequest::DisableController { controller_id } => {
                vec!["api", "controllers", controller_id.as_str(), "disable"]
            }
            ApiRequest::RefreshControllers => vec!["api", "controllers", "refresh"],
            ApiRequest::ActivateEmergencyStop => vec!["api", "emergency-stop"],
            ApiRequest::DeactivateEmergencyStop => vec!["api", "emergency-stop", "deactivate"],
            ApiRequest::GetMatchTimer => vec!["api", "match", "timer"],
            ApiRequest::StartMatch => vec!["api", "match", "start"],
            ApiRequest::StopMatch => vec!["api", "match", "stop"],
            ApiRequest::ResetMatch => vec!["api", "match", "reset"],
            ApiRequest::SetMatchDuration { .. } => vec!["api", "match", "duration"],
            ApiRequest::GetNetworkStats => vec!["api", "network", "stats"],
        }
    }

    /// Unencoded path, for logging.
    pub fn path(&self) -> String {
        format!("/{}", self.path_segments().join("/"))
    }

    pub fn body(&self) -> RequestBody {
        match self {
            ApiRequest::SetMatchDuration { seconds } => RequestBody::Text(seconds.to_string()),
            _ => RequestBody::Empty,
        }
    }

    /// Stable operation name used in diagnostics and log fields.
    pub fn operation(&self) -> &'static str {
        match self {
            ApiRequest::Health => "health",
            ApiRequest::ListRobots => "list_robots",
            ApiRequest::GetRobot { .. } => "get_robot",
            ApiRequest::ConnectRobot { .. } => "connect_robot",
            ApiRequest::DisconnectRobot { .. } => "disconnect_robot",
            ApiRequest::EnableRobot { .. } => "enable_robot",
            ApiRequest::DisableRobot { .. } => "disable_robot",
            ApiRequest::RefreshRobots => "refresh_robots",
            ApiRequest::ListControllers => "list_controllers",
            ApiRequest::PairController { .. } => "pair_controller",
            ApiRequest::UnpairController { .. } => "unpair_controller",
            ApiRequest::EnableController { .. } => "enable_controller",
            ApiRequest::DisableController { .. } => "disable_controller",
            ApiRequest::RefreshControllers => "refresh_controllers",
            ApiRequest::ActivateEmergencyStop => "activate_emergency_stop",
            ApiRequest::DeactivateEmergencyStop => "deactivate_emergency_stop",
            ApiRequest::GetMatchTimer => "get_match_timer",
            ApiRequest::StartMatch => "start_match",
            ApiRequest::StopMatch => "stop_match",
            ApiRequest::ResetMatch => "reset_match",
            ApiRequest::SetMatchDuration { .. } => "set_match_duration",
            ApiRequest::GetNetworkStats => "get_network_stats",
        }
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method(), self.path())
    }
}
