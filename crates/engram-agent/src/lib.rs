//! # engram-agent
//!
//! The public facade of the memory store. An [`Agent`] binds one robot
//! identity to one working memory and the shared long-term memory; a
//! [`GroupCoordinator`] keeps a named set of agents' working memories in
//! lock-step over the pub/sub channel.

pub mod agent;
pub mod group;
pub mod store;

pub use agent::{Agent, AgentMetrics};
pub use group::{GroupCoordinator, GroupStatus, MemberRole, MemberStatus};
pub use store::Store;
