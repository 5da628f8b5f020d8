//! The group coordinator: a named set of active/passive agents sharing
//! one working-memory view over the channel.
//!
//! At least one active member exists at all times (once the first one is
//! added); demoting the last active member fails. Events published by a
//! member are mirrored into every other member's working memory by the
//! coordinator's channel subscription; reconciliation against the edge
//! flags in the database corrects anything the best-effort channel lost.

use std::sync::{Arc, Mutex};

use engram_core::errors::{EngramError, EngramResult};
use engram_core::models::{SearchHit, SearchStrategy, Timeframe, WmEventKind};
use engram_channel::WmChannel;
use engram_memory::WmAdd;

use crate::agent::Agent;
use crate::store::Store;

/// Whether a member serves reads/writes or only mirrors the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Active,
    Passive,
}

struct Member {
    agent: Arc<Agent>,
    role: MemberRole,
}

/// One member's row in [`GroupCoordinator::status`].
#[derive(Debug, Clone)]
pub struct MemberStatus {
    pub name: String,
    pub robot_id: i64,
    pub role: MemberRole,
    pub wm_nodes: usize,
    pub wm_tokens: usize,
}

/// Snapshot of the whole group.
#[derive(Debug, Clone)]
pub struct GroupStatus {
    pub name: String,
    pub channel: String,
    pub members: Vec<MemberStatus>,
    pub events_received: u64,
}

pub struct GroupCoordinator {
    name: String,
    store: Arc<Store>,
    channel: Arc<WmChannel>,
    members: Arc<Mutex<Vec<Member>>>,
}

impl GroupCoordinator {
    /// Create the coordinator, subscribe to its channel, and start the
    /// listener.
    pub fn new(name: &str, store: Arc<Store>) -> EngramResult<Self> {
        let channel = Arc::new(WmChannel::new(Arc::clone(store.engine()), name));
        let members: Arc<Mutex<Vec<Member>>> = Arc::new(Mutex::new(Vec::new()));

        {
            let members = Arc::clone(&members);
            channel.on_change(move |event| {
                let guard = members.lock().unwrap();
                for member in guard.iter() {
                    // The originator already applied the change locally.
                    if member.agent.robot_id() == event.robot_id {
                        continue;
                    }
                    let result = match event.event {
                        WmEventKind::Added => match event.node_id {
                            Some(node_id) => member.agent.apply_peer_added(node_id),
                            None => Ok(()),
                        },
                        WmEventKind::Evicted => match event.node_id {
                            Some(node_id) => member.agent.apply_peer_evicted(node_id),
                            None => Ok(()),
                        },
                        WmEventKind::Cleared => member.agent.apply_peer_cleared(),
                    };
                    if let Err(e) = result {
                        tracing::warn!(
                            robot_id = member.agent.robot_id(),
                            event = ?event.event,
                            error = %e,
                            "failed to mirror peer event"
                        );
                    }
                }
            });
        }
        channel.start()?;

        Ok(Self {
            name: name.to_string(),
            store,
            channel,
            members,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel_name(&self) -> &str {
        self.channel.channel_name()
    }

    // ── membership ───────────────────────────────────────────────────────

    pub fn add_active(&self, robot_name: &str) -> EngramResult<Arc<Agent>> {
        self.add_member(robot_name, MemberRole::Active)
    }

    pub fn add_passive(&self, robot_name: &str) -> EngramResult<Arc<Agent>> {
        self.add_member(robot_name, MemberRole::Passive)
    }

    fn add_member(&self, robot_name: &str, role: MemberRole) -> EngramResult<Arc<Agent>> {
        let mut guard = self.members.lock().unwrap();
        if guard
            .iter()
            .any(|m| m.agent.robot().name == robot_name)
        {
            return Err(EngramError::InvalidInput(format!(
                "robot '{robot_name}' is already a member of group '{}'",
                self.name
            )));
        }
        let agent = Arc::new(
            Agent::new(Arc::clone(&self.store), robot_name, None)?
                .with_channel(Arc::clone(&self.channel), false),
        );
        guard.push(Member {
            agent: Arc::clone(&agent),
            role,
        });
        tracing::info!(group = %self.name, robot = robot_name, ?role, "member added");
        Ok(agent)
    }

    /// Remove a member. Removing the last active member fails while
    /// passives remain; fail over first.
    pub fn remove(&self, robot_name: &str) -> EngramResult<()> {
        let mut guard = self.members.lock().unwrap();
        let idx = guard
            .iter()
            .position(|m| m.agent.robot().name == robot_name)
            .ok_or_else(|| {
                EngramError::InvalidInput(format!("robot '{robot_name}' is not a member"))
            })?;
        let actives = guard
            .iter()
            .filter(|m| m.role == MemberRole::Active)
            .count();
        if guard[idx].role == MemberRole::Active && actives == 1 && guard.len() > 1 {
            return Err(EngramError::InvalidInput(
                "cannot remove the last active member of a non-empty group".to_string(),
            ));
        }
        guard.remove(idx);
        Ok(())
    }

    pub fn promote(&self, robot_name: &str) -> EngramResult<()> {
        self.set_role(robot_name, MemberRole::Active)
    }

    /// Demote an active member. Fails when it is the only active one.
    pub fn demote(&self, robot_name: &str) -> EngramResult<()> {
        let guard = self.members.lock().unwrap();
        let actives = guard
            .iter()
            .filter(|m| m.role == MemberRole::Active)
            .count();
        let is_active = guard
            .iter()
            .any(|m| m.agent.robot().name == robot_name && m.role == MemberRole::Active);
        drop(guard);
        if is_active && actives == 1 {
            return Err(EngramError::InvalidInput(
                "cannot demote the last active member".to_string(),
            ));
        }
        self.set_role(robot_name, MemberRole::Passive)
    }

    fn set_role(&self, robot_name: &str, role: MemberRole) -> EngramResult<()> {
        let mut guard = self.members.lock().unwrap();
        let member = guard
            .iter_mut()
            .find(|m| m.agent.robot().name == robot_name)
            .ok_or_else(|| {
                EngramError::InvalidInput(format!("robot '{robot_name}' is not a member"))
            })?;
        member.role = role;
        Ok(())
    }

    /// Promote the first passive member, demoting the previous leader.
    /// Returns the new leader's robot name.
    pub fn failover(&self) -> EngramResult<String> {
        let mut guard = self.members.lock().unwrap();
        let passive_idx = guard
            .iter()
            .position(|m| m.role == MemberRole::Passive)
            .ok_or_else(|| {
                EngramError::InvalidInput("no passive member available for failover".to_string())
            })?;
        if let Some(leader) = guard.iter_mut().find(|m| m.role == MemberRole::Active) {
            leader.role = MemberRole::Passive;
        }
        guard[passive_idx].role = MemberRole::Active;
        let name = guard[passive_idx].agent.robot().name.clone();
        tracing::info!(group = %self.name, leader = %name, "failover complete");
        Ok(name)
    }

    fn leader(&self) -> EngramResult<Arc<Agent>> {
        let guard = self.members.lock().unwrap();
        guard
            .iter()
            .find(|m| m.role == MemberRole::Active)
            .map(|m| Arc::clone(&m.agent))
            .ok_or_else(|| EngramError::InvalidInput("group has no active member".to_string()))
    }

    /// All member agents, for reads.
    fn agents(&self) -> Vec<Arc<Agent>> {
        self.members
            .lock()
            .unwrap()
            .iter()
            .map(|m| Arc::clone(&m.agent))
            .collect()
    }

    fn find_agent(&self, robot_name: &str) -> EngramResult<Arc<Agent>> {
        self.members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.agent.robot().name == robot_name)
            .map(|m| Arc::clone(&m.agent))
            .ok_or_else(|| {
                EngramError::InvalidInput(format!("robot '{robot_name}' is not a member"))
            })
    }

    // ── delegated operations ─────────────────────────────────────────────

    /// Delegate a remember to the first active member.
    pub fn remember(
        &self,
        content: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
        tags: &[String],
    ) -> EngramResult<i64> {
        self.leader()?.remember(content, metadata, tags)
    }

    /// Delegate a recall to the first active member.
    pub fn recall(
        &self,
        query: &str,
        timeframe: Option<Timeframe>,
        limit: usize,
        strategy: SearchStrategy,
        metadata: serde_json::Map<String, serde_json::Value>,
        raw: bool,
    ) -> EngramResult<Vec<SearchHit>> {
        self.leader()?
            .recall(query, timeframe, limit, strategy, metadata, raw)
    }

    // ── view maintenance ─────────────────────────────────────────────────

    /// Drop every member's working memory, clear the flags in one batch
    /// per member, and announce `cleared`.
    pub fn clear_working_memory(&self) -> EngramResult<()> {
        let leader_id = self.leader()?.robot_id();
        for agent in self.agents() {
            agent.working_memory().clear();
            self.store
                .engine()
                .clear_working_memory_flags(agent.robot_id())?;
        }
        self.channel.notify(WmEventKind::Cleared, None, leader_id)?;
        Ok(())
    }

    /// Copy the source member's working-memory view onto the destination
    /// member, optionally clearing the source.
    pub fn transfer_working_memory(
        &self,
        src_name: &str,
        dst_name: &str,
        clear_source: bool,
    ) -> EngramResult<usize> {
        let src = self.find_agent(src_name)?;
        let dst = self.find_agent(dst_name)?;
        if src.robot_id() == dst.robot_id() {
            return Err(EngramError::InvalidInput(
                "transfer needs two distinct members".to_string(),
            ));
        }

        let node_ids = src.working_memory().node_ids();
        let mut moved = 0usize;
        for node_id in &node_ids {
            let Some(entry) = src.working_memory().entry(*node_id) else {
                continue;
            };
            let evicted = dst.working_memory().add(WmAdd {
                node_id: entry.node_id,
                content: entry.content,
                token_count: entry.token_count,
                access_count: entry.access_count,
                last_accessed: entry.last_accessed,
                from_recall: true,
            });
            match evicted {
                Ok(evicted) => {
                    if !evicted.is_empty() {
                        let ids: Vec<i64> = evicted.iter().map(|e| e.node_id).collect();
                        self.store.ltm().mark_evicted(dst.robot_id(), &ids)?;
                    }
                    moved += 1;
                }
                Err(EngramError::InvalidInput(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        self.store
            .ltm()
            .promote_to_working_memory(dst.robot_id(), &node_ids)?;

        if clear_source {
            src.working_memory().clear();
            self.store
                .engine()
                .clear_working_memory_flags(src.robot_id())?;
        }
        Ok(moved)
    }

    /// Reconcile one member's working memory against the database flags
    /// (the source of truth after missed channel events).
    pub fn sync_robot(&self, robot_name: &str) -> EngramResult<()> {
        let agent = self.find_agent(robot_name)?;
        self.sync_agent(&agent)
    }

    fn sync_agent(&self, agent: &Arc<Agent>) -> EngramResult<()> {
        let robot_id = agent.robot_id();
        let flagged = self.store.ltm().wm_node_ids(robot_id)?;
        let resident = agent.working_memory().node_ids();

        // Pull flagged-but-missing nodes into the cache.
        for node_id in &flagged {
            if resident.contains(node_id) {
                continue;
            }
            let Some(node) = self.store.engine().get_node(*node_id, false)? else {
                continue;
            };
            let result = agent.working_memory().add(WmAdd {
                node_id: node.id,
                content: node.content,
                token_count: node.token_count.max(0) as usize,
                access_count: node.access_count,
                last_accessed: node.last_accessed,
                from_recall: true,
            });
            match result {
                Ok(evicted) if !evicted.is_empty() => {
                    let ids: Vec<i64> = evicted.iter().map(|e| e.node_id).collect();
                    self.store.ltm().mark_evicted(robot_id, &ids)?;
                }
                Ok(_) => {}
                Err(EngramError::InvalidInput(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        // Flag resident-but-unflagged nodes.
        let unflagged: Vec<i64> = resident
            .iter()
            .filter(|id| !flagged.contains(id))
            .copied()
            .collect();
        if !unflagged.is_empty() {
            self.store
                .ltm()
                .promote_to_working_memory(robot_id, &unflagged)?;
        }
        Ok(())
    }

    /// Bring every member onto the shared view: the union of all resident
    /// nodes, mirrored into each working memory and flagged on each edge.
    pub fn sync_all(&self) -> EngramResult<()> {
        let agents = self.agents();
        let mut shared: Vec<i64> = Vec::new();
        for agent in &agents {
            for node_id in agent.working_memory().node_ids() {
                if !shared.contains(&node_id) {
                    shared.push(node_id);
                }
            }
        }

        for agent in &agents {
            let robot_id = agent.robot_id();
            for node_id in &shared {
                if agent.working_memory().contains(*node_id) {
                    continue;
                }
                let Some(node) = self.store.engine().get_node(*node_id, false)? else {
                    continue;
                };
                let result = agent.working_memory().add(WmAdd {
                    node_id: node.id,
                    content: node.content,
                    token_count: node.token_count.max(0) as usize,
                    access_count: node.access_count,
                    last_accessed: node.last_accessed,
                    from_recall: true,
                });
                match result {
                    Ok(evicted) if !evicted.is_empty() => {
                        let ids: Vec<i64> = evicted.iter().map(|e| e.node_id).collect();
                        self.store.ltm().mark_evicted(robot_id, &ids)?;
                    }
                    Ok(_) => {}
                    Err(EngramError::InvalidInput(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
            // Flags follow residency.
            let resident = agent.working_memory().node_ids();
            self.store
                .ltm()
                .promote_to_working_memory(robot_id, &resident)?;
        }
        Ok(())
    }

    /// Whether every member's cache matches its database flags.
    pub fn in_sync(&self) -> EngramResult<bool> {
        for agent in self.agents() {
            let mut flagged = self.store.ltm().wm_node_ids(agent.robot_id())?;
            let mut resident = agent.working_memory().node_ids();
            flagged.sort();
            resident.sort();
            if flagged != resident {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn status(&self) -> GroupStatus {
        let guard = self.members.lock().unwrap();
        GroupStatus {
            name: self.name.clone(),
            channel: self.channel.channel_name().to_string(),
            members: guard
                .iter()
                .map(|m| MemberStatus {
                    name: m.agent.robot().name.clone(),
                    robot_id: m.agent.robot_id(),
                    role: m.role,
                    wm_nodes: m.agent.working_memory().node_count(),
                    wm_tokens: m.agent.working_memory().token_count(),
                })
                .collect(),
            events_received: self.channel.received_count(),
        }
    }

    /// Stop the channel listener. Members remain usable without mirroring.
    pub fn shutdown(&self) {
        self.channel.stop();
    }
}

impl Drop for GroupCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
