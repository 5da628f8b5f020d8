//! # engram-core
//!
//! Foundation crate for the Engram memory store.
//! Defines all shared types, traits, errors, config, and constants.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use config::Config;
pub use errors::{EngramError, EngramResult};
pub use models::{Node, Robot, RobotNode, SearchHit, SearchStrategy, TimeInterval, Timeframe};
pub use traits::{EmbeddingProvider, TagExtractor, TagPayload, TokenCounter};
