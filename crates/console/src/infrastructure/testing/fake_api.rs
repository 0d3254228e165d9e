//! Recording fake of `RawApiPort`.
//!
//! Serves canned robot/controller/timer documents and records every request
//! so tests can assert on what the core asked for, and in which order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use robodeck_domain::{Controller, Robot};
use robodeck_shared::{ApiRequest, MatchTimerSnapshot, NetworkStats};

use crate::infrastructure::lock;
use crate::ports::outbound::{ApiError, RawApiPort};

#[derive(Default)]
struct State {
    requests: Vec<ApiRequest>,
    robots: Vec<Robot>,
    controllers: Vec<Controller>,
    timer: Option<MatchTimerSnapshot>,
    stats: Option<NetworkStats>,
    failures: HashMap<&'static str, ApiError>,
}

#[derive(Clone, Default)]
pub struct FakeApi {
    state: Arc<Mutex<State>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_robots(&self, robots: Vec<Robot>) {
        lock(&self.state).robots = robots;
    }

    pub fn set_controllers(&self, controllers: Vec<Controller>) {
        lock(&self.state).controllers = controllers;
    }

    pub fn set_timer(&self, timer: MatchTimerSnapshot) {
        lock(&self.state).timer = Some(timer);
    }

    pub fn set_stats(&self, stats: NetworkStats) {
        lock(&self.state).stats = Some(stats);
    }

    /// Make every request with this operation name fail with `error`.
    pub fn fail(&self, operation: &'static str, error: ApiError) {
        lock(&self.state).failures.insert(operation, error);
    }

    pub fn succeed(&self, operation: &'static str) {
        lock(&self.state).failures.remove(operation);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        lock(&self.state).requests.clone()
    }

    /// Number of recorded requests with this operation name.
    pub fn count(&self, operation: &str) -> usize {
        lock(&self.state)
            .requests
            .iter()
            .filter(|r| r.operation() == operation)
            .count()
    }

    pub fn clear_requests(&self) {
        lock(&self.state).requests.clear();
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

fn not_found(what: &str) -> ApiError {
    ApiError::HttpStatus {
        status: 404,
        body: json!({ "error": format!("{what} not found") }).to_string(),
    }
}

#[async_trait]
impl RawApiPort for FakeApi {
    async fn execute(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let mut state = lock(&self.state);
        state.requests.push(request.clone());

        if let Some(error) = state.failures.get(request.operation()) {
            return Err(error.clone());
        }

        match request {
            ApiRequest::Health => Ok(json!({ "status": "online" })),
            ApiRequest::ListRobots => to_value(&state.robots),
            ApiRequest::GetRobot { robot_id } => state
                .robots
                .iter()
                .find(|r| &r.id == robot_id)
                .ok_or_else(|| not_found("robot"))
                .and_then(to_value),
            ApiRequest::ListControllers => to_value(&state.controllers),
            ApiRequest::GetMatchTimer => state
                .timer
                .as_ref()
                .ok_or_else(|| not_found("match timer"))
                .and_then(to_value),
            ApiRequest::GetNetworkStats => state
                .stats
                .as_ref()
                .ok_or_else(|| not_found("network stats"))
                .and_then(to_value),
            _ => Ok(json!({ "success": true })),
        }
    }
}
