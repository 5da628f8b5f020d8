use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Working-memory change kinds broadcast over the group channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WmEventKind {
    Added,
    Evicted,
    Cleared,
}

/// Wire payload published on the channel:
/// `{"event":"added","node_id":7,"robot_id":1,"ts":"..."}`.
///
/// Delivery is at-most-once and best-effort; consumers reconcile against
/// the `in_working_memory` flag in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmEvent {
    pub event: WmEventKind,
    pub node_id: Option<i64>,
    pub robot_id: i64,
    pub ts: DateTime<Utc>,
}

impl WmEvent {
    pub fn new(event: WmEventKind, node_id: Option<i64>, robot_id: i64) -> Self {
        Self {
            event,
            node_id,
            robot_id,
            ts: Utc::now(),
        }
    }
}
