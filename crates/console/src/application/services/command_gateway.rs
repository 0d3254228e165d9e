//! Command Gateway - one method per backend request.
//!
//! Every intent issues exactly one request and reports whether the backend
//! accepted it. Nothing is retried and no local state is touched: visible
//! effects arrive later as snapshots and push events.

use std::sync::Arc;

use serde_json::Value;

use robodeck_domain::{Controller, ControllerId, Robot, RobotId};
use robodeck_shared::{ApiRequest, HealthStatus, MatchTimerSnapshot, NetworkStats};

use crate::application::error::{CommandError, ParseResponse};
use crate::ports::outbound::{ApiError, RawApiPort};

#[derive(Clone)]
pub struct CommandGateway {
    api: Arc<dyn RawApiPort>,
}

impl CommandGateway {
    pub fn new(api: Arc<dyn RawApiPort>) -> Self {
        Self { api }
    }

    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let result = self.api.execute(&request).await;
        match &result {
            Ok(_) => tracing::debug!(request = %request, "Backend accepted request"),
            Err(e) => tracing::warn!(request = %request, error = %e, "Backend request failed"),
        }
        result
    }

    async fn intent(&self, request: ApiRequest) -> Result<(), CommandError> {
        let operation = request.operation();
        self.send(request).await.parse_empty(operation)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub async fn list_robots(&self) -> Result<Vec<Robot>, CommandError> {
        let request = ApiRequest::ListRobots;
        let operation = request.operation();
        self.send(request).await.parse(operation)
    }

    pub async fn get_robot(&self, robot_id: &RobotId) -> Result<Robot, CommandError> {
        let request = ApiRequest::GetRobot {
            robot_id: robot_id.clone(),
        };
        let operation = request.operation();
        self.send(request).await.parse(operation)
    }

    pub async fn list_controllers(&self) -> Result<Vec<Controller>, CommandError> {
        let request = ApiRequest::ListControllers;
        let operation = request.operation();
        self.send(request).await.parse(operation)
    }

    pub async fn get_match_timer(&self) -> Result<MatchTimerSnapshot, CommandError> {
        let request = ApiRequest::GetMatchTimer;
        let operation = request.operation();
        self.send(request).await.parse(operation)
    }

    pub async fn get_network_stats(&self) -> Result<NetworkStats, CommandError> {
        let request = ApiRequest::GetNetworkStats;
        let operation = request.operation();
        self.send(request).await.parse(operation)
    }

    pub async fn health(&self) -> Result<HealthStatus, CommandError> {
        let request = ApiRequest::Health;
        let operation = request.operation();
        self.send(request).await.parse(operation)
    }

    // -------------------------------------------------------------------------
    // Robot intents
    // -------------------------------------------------------------------------

    pub async fn connect_robot(&self, robot_id: &RobotId) -> Result<(), CommandError> {
        self.intent(ApiRequest::ConnectRobot {
            robot_id: robot_id.clone(),
        })
        .await
    }

    pub async fn disconnect_robot(&self, robot_id: &RobotId) -> Result<(), CommandError> {
        self.intent(ApiRequest::DisconnectRobot {
            robot_id: robot_id.clone(),
        })
        .await
    }

    pub async fn enable_robot(&self, robot_id: &RobotId) -> Result<(), CommandError> {
        self.intent(ApiRequest::EnableRobot {
            robot_id: robot_id.clone(),
        })
        .await
    }

    pub async fn disable_robot(&self, robot_id: &RobotId) -> Result<(), CommandError> {
        self.intent(ApiRequest::DisableRobot {
            robot_id: robot_id.clone(),
        })
        .await
    }

    /// Ask the backend to rediscover robots
    pub async fn refresh_robots(&self) -> Result<(), CommandError> {
        self.intent(ApiRequest::RefreshRobots).await
    }

    // -------------------------------------------------------------------------
    // Controller intents
    // -------------------------------------------------------------------------

    pub async fn pair_controller(
        &self,
        controller_id: &ControllerId,
        robot_id: &RobotId,
    ) -> Result<(), CommandError> {
        self.intent(ApiRequest::PairController {
            controller_id: controller_id.clone(),
            robot_id: robot_id.clone(),
        })
        .await
    }

    pub async fn unpair_controller(&self, controller_id: &ControllerId) -> Result<(), CommandError> {
        self.intent(ApiRequest::UnpairController {
            controller_id: controller_id.clone(),
        })
        .await
    }

    pub async fn enable_controller(&self, controller_id: &ControllerId) -> Result<(), CommandError> {
        self.intent(ApiRequest::EnableController {
            controller_id: controller_id.clone(),
        })
        .await
    }

    pub async fn disable_controller(
        &self,
        controller_id: &ControllerId,
    ) -> Result<(), CommandError> {
        self.intent(ApiRequest::DisableController {
            controller_id: controller_id.clone(),
        })
        .await
    }

    pub async fn refresh_controllers(&self) -> Result<(), CommandError> {
        self.intent(ApiRequest::RefreshControllers).await
    }

    // -------------------------------------------------------------------------
    // Emergency stop and match
    // -------------------------------------------------------------------------

    pub async fn activate_emergency_stop(&self) -> Result<(), CommandError> {
        self.intent(ApiRequest::ActivateEmergencyStop).await
    }

    pub async fn deactivate_emergency_stop(&self) -> Result<(), CommandError> {
        self.intent(ApiRequest::DeactivateEmergencyStop).await
    }

    pub async fn start_match(&self) -> Result<(), CommandError> {
        self.intent(ApiRequest::StartMatch).await
    }

    pub async fn stop_match(&self) -> Result<(), CommandError> {
        self.intent(ApiRequest::StopMatch).await
    }

    pub async fn reset_match(&self) -> Result<(), CommandError> {
        self.intent(ApiRequest::ResetMatch).await
    }

    /// The body is the bare number of seconds.
    pub async fn set_match_duration(&self, seconds: u64) -> Result<(), CommandError> {
        self.intent(ApiRequest::SetMatchDuration { seconds }).await
    }
}
