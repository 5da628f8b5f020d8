use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An agent identity under which memories are remembered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Robot {
    pub id: i64,
    /// Display name; reused names resolve to the same row on registration.
    pub name: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// The robot↔node edge with per-edge statistics.
///
/// `in_working_memory` mirrors the robot's hot cache and is the durable
/// source of truth for reconciliation after missed channel events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotNode {
    pub robot_id: i64,
    pub node_id: i64,
    pub first_remembered_at: DateTime<Utc>,
    pub last_remembered_at: DateTime<Utc>,
    /// Number of `remember` calls for this (robot, node) pair. Always >= 1.
    pub remember_count: i64,
    pub in_working_memory: bool,
}
