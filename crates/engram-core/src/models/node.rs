use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A remembered piece of content. The durable unit of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Database-assigned monotonic identifier.
    pub id: i64,
    /// Non-empty text, bounded by `constants::MAX_CONTENT_BYTES`.
    pub content: String,
    /// blake3 hash of the canonicalised content; unique across the store.
    pub content_hash: String,
    /// Token count of `content` as computed at insertion time.
    pub token_count: i64,
    /// Dense embedding vector, absent until enrichment has run.
    pub embedding: Option<Vec<f32>>,
    /// Free-form metadata map.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Monotonic access counter, bumped by retrieve/track_access.
    pub access_count: i64,
    /// Soft-delete marker. A set value excludes the node from search.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Node {
    /// Canonical form of content used for hashing: surrounding whitespace
    /// stripped, line endings normalised to `\n`.
    pub fn canonicalise(content: &str) -> String {
        content.trim().replace("\r\n", "\n")
    }

    /// blake3 hash of the canonicalised content. Stable across processes
    /// for the same bytes.
    pub fn compute_content_hash(content: &str) -> String {
        blake3::hash(Self::canonicalise(content).as_bytes())
            .to_hex()
            .to_string()
    }

    /// Whether the node is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
