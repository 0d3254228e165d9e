//! Response bodies returned by the request surface

use serde::{Deserialize, Serialize};

/// `GET /api/match/timer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTimerSnapshot {
    pub running: bool,
    pub time_remaining_ms: u64,
    pub duration_ms: u64,
    #[serde(default)]
    pub time_remaining_seconds: u64,
}

/// `GET /api/network/stats`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Round-trip latency in milliseconds
    pub latency: f64,
    pub bandwidth: f64,
    pub active_connections: u32,
}

/// Acknowledgement body of intent endpoints. Decoded leniently: only the HTTP
/// status decides success.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandAck {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /api/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl HealthStatus {
    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("online")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_snapshot_matches_backend_shape() {
        let snapshot: MatchTimerSnapshot = serde_json::from_str(
            r#"{"running":true,"timeRemainingMs":61500,"durationMs":120000,"timeRemainingSeconds":61}"#,
        )
        .expect("snapshot");
        assert!(snapshot.running);
        assert_eq!(snapshot.time_remaining_ms, 61_500);
    }

    #[test]
    fn network_stats_accept_integer_and_float_metrics() {
        let stats: NetworkStats = serde_json::from_str(
            r#"{"timestamp":1700000000000,"latency":12,"bandwidth":48.5,"activeConnections":3}"#,
        )
        .expect("stats");
        assert_eq!(stats.latency, 12.0);
        assert_eq!(stats.active_connections, 3);
    }
}
