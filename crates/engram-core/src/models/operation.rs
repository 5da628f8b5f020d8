use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audited store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Add,
    Retrieve,
    Recall,
    Forget,
    Restore,
    Evict,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Retrieve => "retrieve",
            Operation::Recall => "recall",
            Operation::Forget => "forget",
            Operation::Restore => "restore",
            Operation::Evict => "evict",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(Operation::Add),
            "retrieve" => Some(Operation::Retrieve),
            "recall" => Some(Operation::Recall),
            "forget" => Some(Operation::Forget),
            "restore" => Some(Operation::Restore),
            "evict" => Some(Operation::Evict),
            _ => None,
        }
    }
}

/// An append-only audit row. Immutable once written; hard-deleting a node
/// nulls `node_id` but retains the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub operation: Operation,
    pub node_id: Option<i64>,
    pub robot_id: Option<i64>,
    pub details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_round_trips_through_str() {
        for op in [
            Operation::Add,
            Operation::Retrieve,
            Operation::Recall,
            Operation::Forget,
            Operation::Restore,
            Operation::Evict,
        ] {
            assert_eq!(Operation::parse(op.as_str()), Some(op));
        }
        assert_eq!(Operation::parse("vacuum"), None);
    }
}
