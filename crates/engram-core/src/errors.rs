//! Error taxonomy shared by every crate in the workspace.

/// Result alias used throughout the workspace.
pub type EngramResult<T> = Result<T, EngramError>;

/// All failures the store can surface to callers.
#[derive(Debug, thiserror::Error)]
pub enum EngramError {
    /// Empty/oversize content, a bad confirmation sentinel, a malformed tag,
    /// an embedding dimension mismatch, or invalid configuration.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Retrieve/forget/restore on an id that does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    /// The embedding callable raised or returned an invalid shape.
    #[error("embedding provider error: {0}")]
    EmbeddingError(String),

    /// The tag extractor raised or returned an invalid payload.
    #[error("tag extractor error: {0}")]
    TagError(String),

    /// A circuit breaker is open; the call was rejected without reaching
    /// the provider.
    #[error("circuit breaker '{service}' is open")]
    CircuitBreakerOpen { service: String },

    /// A statement exceeded its deadline and was interrupted.
    #[error("query timed out after {timeout_ms} ms")]
    QueryTimeout { timeout_ms: u64 },

    /// Any other storage failure.
    #[error("database error: {0}")]
    DatabaseError(String),
}

impl EngramError {
    /// Shorthand for a node-not-found error.
    pub fn node_not_found(id: i64) -> Self {
        Self::NotFound { kind: "node", id }
    }

    /// Shorthand for a robot-not-found error.
    pub fn robot_not_found(id: i64) -> Self {
        Self::NotFound { kind: "robot", id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let e = EngramError::CircuitBreakerOpen {
            service: "embedding".to_string(),
        };
        assert_eq!(e.to_string(), "circuit breaker 'embedding' is open");

        let e = EngramError::node_not_found(42);
        assert_eq!(e.to_string(), "node 42 not found");
    }
}
