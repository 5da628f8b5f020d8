//! Working memory: the per-agent token-budgeted hot cache.
//!
//! An insertion-ordered set of active nodes whose token counts never sum
//! past `max_tokens` after any public operation. A mutex guards the state
//! so an orchestrator can be shared across threads; every method takes
//! the lock for its whole duration.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use engram_core::errors::{EngramError, EngramResult};

/// How an entry got here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    /// Added by a fresh `remember`.
    Fresh,
    /// Promoted by a `recall`.
    Recalled,
}

/// One cached node.
#[derive(Debug, Clone)]
pub struct WmEntry {
    pub node_id: i64,
    pub content: String,
    pub token_count: usize,
    pub added_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: i64,
    pub source: EntrySource,
}

/// Context assembly strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStrategy {
    /// Most recently accessed first.
    Recent,
    /// Most frequently accessed first.
    Frequent,
    /// Frequency damped by recency decay.
    Balanced,
}

struct WmInner {
    /// Insertion-ordered entries.
    entries: Vec<WmEntry>,
    current_tokens: usize,
}

pub struct WorkingMemory {
    inner: Mutex<WmInner>,
    max_tokens: usize,
}

/// Arguments for [`WorkingMemory::add`].
#[derive(Debug, Clone)]
pub struct WmAdd {
    pub node_id: i64,
    pub content: String,
    pub token_count: usize,
    pub access_count: i64,
    pub last_accessed: DateTime<Utc>,
    pub from_recall: bool,
}

impl WorkingMemory {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            inner: Mutex::new(WmInner {
                entries: Vec::new(),
                current_tokens: 0,
            }),
            max_tokens,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Insert a node, evicting as needed. Returns the evicted entries.
    ///
    /// An entry larger than the whole budget is rejected with
    /// `InvalidInput`. Re-adding a resident node refreshes its statistics
    /// instead of duplicating it.
    pub fn add(&self, add: WmAdd) -> EngramResult<Vec<WmEntry>> {
        if add.token_count > self.max_tokens {
            return Err(EngramError::InvalidInput(format!(
                "entry of {} tokens exceeds working memory budget of {}",
                add.token_count, self.max_tokens
            )));
        }

        let mut inner = self.inner.lock().unwrap();

        if let Some(existing) = inner.entries.iter_mut().find(|e| e.node_id == add.node_id) {
            existing.last_accessed = add.last_accessed;
            existing.access_count = existing.access_count.max(add.access_count);
            if add.from_recall {
                existing.source = EntrySource::Recalled;
            }
            return Ok(Vec::new());
        }

        let available = self.max_tokens - inner.current_tokens;
        let evicted = if add.token_count > available {
            Self::evict_locked(&mut inner, add.token_count - available)
        } else {
            Vec::new()
        };

        inner.current_tokens += add.token_count;
        inner.entries.push(WmEntry {
            node_id: add.node_id,
            content: add.content,
            token_count: add.token_count,
            added_at: Utc::now(),
            last_accessed: add.last_accessed,
            access_count: add.access_count,
            source: if add.from_recall {
                EntrySource::Recalled
            } else {
                EntrySource::Fresh
            },
        });

        Ok(evicted)
    }

    /// Remove a node. Idempotent; returns the entry when it was resident.
    pub fn remove(&self, node_id: i64) -> Option<WmEntry> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.entries.iter().position(|e| e.node_id == node_id)?;
        let entry = inner.entries.remove(idx);
        inner.current_tokens -= entry.token_count;
        Some(entry)
    }

    /// Whether `tokens` more would fit right now.
    pub fn has_space(&self, tokens: usize) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.current_tokens + tokens <= self.max_tokens
    }

    /// Evict until at least `needed` tokens are free. With insufficient
    /// total tokens, evicts everything and returns it; the caller decides
    /// whether to reject.
    pub fn evict_to_make_space(&self, needed: usize) -> Vec<WmEntry> {
        let mut inner = self.inner.lock().unwrap();
        Self::evict_locked(&mut inner, needed)
    }

    /// Eviction order: least-accessed first, then least-recently-accessed,
    /// with node id as the deterministic tiebreak. Stops as soon as the
    /// freed budget is met.
    fn evict_locked(inner: &mut WmInner, needed: usize) -> Vec<WmEntry> {
        let mut order: Vec<(i64, DateTime<Utc>, i64)> = inner
            .entries
            .iter()
            .map(|e| (e.access_count, e.last_accessed, e.node_id))
            .collect();
        order.sort();

        let mut evicted = Vec::new();
        let mut freed = 0usize;
        for (_, _, node_id) in order {
            if freed >= needed {
                break;
            }
            let idx = inner
                .entries
                .iter()
                .position(|e| e.node_id == node_id)
                .expect("eviction candidate is resident");
            let entry = inner.entries.remove(idx);
            inner.current_tokens -= entry.token_count;
            freed += entry.token_count;
            evicted.push(entry);
        }
        evicted
    }

    /// Drain every entry (group clear).
    pub fn clear(&self) -> Vec<WmEntry> {
        let mut inner = self.inner.lock().unwrap();
        inner.current_tokens = 0;
        std::mem::take(&mut inner.entries)
    }

    /// Join entry contents, best-ranked first per strategy, stopping
    /// before the entry that would exceed `max_tokens` (the WM cap when
    /// not given).
    pub fn assemble_context(
        &self,
        strategy: ContextStrategy,
        max_tokens: Option<usize>,
    ) -> String {
        let budget = max_tokens.unwrap_or(self.max_tokens);
        let inner = self.inner.lock().unwrap();
        let now = Utc::now();

        let mut ranked: Vec<&WmEntry> = inner.entries.iter().collect();
        match strategy {
            ContextStrategy::Recent => {
                ranked.sort_by(|a, b| {
                    b.last_accessed
                        .cmp(&a.last_accessed)
                        .then(a.node_id.cmp(&b.node_id))
                });
            }
            ContextStrategy::Frequent => {
                ranked.sort_by(|a, b| {
                    b.access_count
                        .cmp(&a.access_count)
                        .then(b.last_accessed.cmp(&a.last_accessed))
                        .then(a.node_id.cmp(&b.node_id))
                });
            }
            ContextStrategy::Balanced => {
                ranked.sort_by(|a, b| {
                    balanced_score(b, now)
                        .partial_cmp(&balanced_score(a, now))
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.node_id.cmp(&b.node_id))
                });
            }
        }

        let mut parts: Vec<&str> = Vec::new();
        let mut used = 0usize;
        for entry in ranked {
            if used + entry.token_count > budget {
                break;
            }
            used += entry.token_count;
            parts.push(&entry.content);
        }
        parts.join("\n\n")
    }

    pub fn token_count(&self) -> usize {
        self.inner.lock().unwrap().current_tokens
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn utilisation_percentage(&self) -> f64 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        self.token_count() as f64 / self.max_tokens as f64 * 100.0
    }

    pub fn contains(&self, node_id: i64) -> bool {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .any(|e| e.node_id == node_id)
    }

    /// Resident node ids in insertion order.
    pub fn node_ids(&self) -> Vec<i64> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(|e| e.node_id)
            .collect()
    }

    /// Cloned snapshot of an entry.
    pub fn entry(&self, node_id: i64) -> Option<WmEntry> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|e| e.node_id == node_id)
            .cloned()
    }
}

/// `access_count × 1/(1 + hours_since_last_accessed)`.
fn balanced_score(entry: &WmEntry, now: DateTime<Utc>) -> f64 {
    let hours = (now - entry.last_accessed)
        .num_minutes()
        .max(0) as f64
        / 60.0;
    entry.access_count as f64 * (1.0 / (1.0 + hours))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn add(wm: &WorkingMemory, id: i64, tokens: usize, access: i64, age: Duration) -> Vec<WmEntry> {
        wm.add(WmAdd {
            node_id: id,
            content: format!("node {id}"),
            token_count: tokens,
            access_count: access,
            last_accessed: Utc::now() - age,
            from_recall: false,
        })
        .unwrap()
    }

    #[test]
    fn add_within_budget_evicts_nothing() {
        let wm = WorkingMemory::new(100);
        assert!(add(&wm, 1, 40, 0, Duration::zero()).is_empty());
        assert!(add(&wm, 2, 40, 0, Duration::zero()).is_empty());
        assert_eq!(wm.token_count(), 80);
        assert_eq!(wm.node_count(), 2);
    }

    #[test]
    fn entry_at_exact_budget_fits_one_over_fails() {
        let wm = WorkingMemory::new(100);
        assert!(add(&wm, 1, 100, 0, Duration::zero()).is_empty());

        let wm = WorkingMemory::new(100);
        let err = wm
            .add(WmAdd {
                node_id: 2,
                content: "too big".into(),
                token_count: 101,
                access_count: 0,
                last_accessed: Utc::now(),
                from_recall: false,
            })
            .unwrap_err();
        assert!(matches!(err, EngramError::InvalidInput(_)));
    }

    #[test]
    fn eviction_prefers_low_access_then_oldest() {
        let wm = WorkingMemory::new(100);
        add(&wm, 1, 40, 1, Duration::hours(3));
        add(&wm, 2, 40, 5, Duration::hours(1));
        // The third insert breaches the cap: n1 and n3 tie on access,
        // n1 is older and goes first.
        let evicted = add(&wm, 3, 40, 1, Duration::hours(2));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].node_id, 1);
        // The fourth insert evicts n3 (lowest access among survivors).
        let evicted = add(&wm, 4, 40, 0, Duration::zero());
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].node_id, 3);

        let mut resident = wm.node_ids();
        resident.sort();
        assert_eq!(resident, vec![2, 4]);
        assert_eq!(wm.token_count(), 80);
    }

    #[test]
    fn eviction_tie_breaks_by_node_id() {
        let wm = WorkingMemory::new(100);
        let t = Utc::now() - Duration::hours(1);
        for id in [7, 3, 5] {
            wm.add(WmAdd {
                node_id: id,
                content: "x".into(),
                token_count: 30,
                access_count: 2,
                last_accessed: t,
                from_recall: false,
            })
            .unwrap();
        }
        let evicted = wm.evict_to_make_space(30);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].node_id, 3);
    }

    #[test]
    fn evicting_more_than_total_drains_everything() {
        let wm = WorkingMemory::new(100);
        add(&wm, 1, 30, 0, Duration::zero());
        add(&wm, 2, 30, 0, Duration::zero());
        let evicted = wm.evict_to_make_space(1000);
        assert_eq!(evicted.len(), 2);
        assert_eq!(wm.token_count(), 0);
    }

    #[test]
    fn has_space_reflects_remaining_budget() {
        let wm = WorkingMemory::new(100);
        assert!(wm.has_space(100));
        add(&wm, 1, 60, 0, Duration::zero());
        assert!(wm.has_space(40));
        assert!(!wm.has_space(41));
    }

    #[test]
    fn remove_is_idempotent() {
        let wm = WorkingMemory::new(100);
        add(&wm, 1, 30, 0, Duration::zero());
        assert!(wm.remove(1).is_some());
        assert!(wm.remove(1).is_none());
        assert_eq!(wm.token_count(), 0);
    }

    #[test]
    fn readding_resident_node_refreshes_without_duplicate() {
        let wm = WorkingMemory::new(100);
        add(&wm, 1, 30, 0, Duration::hours(2));
        let evicted = wm
            .add(WmAdd {
                node_id: 1,
                content: "node 1".into(),
                token_count: 30,
                access_count: 4,
                last_accessed: Utc::now(),
                from_recall: true,
            })
            .unwrap();
        assert!(evicted.is_empty());
        assert_eq!(wm.node_count(), 1);
        assert_eq!(wm.token_count(), 30);
        let entry = wm.entry(1).unwrap();
        assert_eq!(entry.access_count, 4);
        assert_eq!(entry.source, EntrySource::Recalled);
    }

    #[test]
    fn context_strategies_rank_as_specified() {
        let wm = WorkingMemory::new(10_000);
        let now = Utc::now();
        // E1(access=10, last=now), E2(access=1, now-10min), E3(access=5, now-5h)
        for (id, access, age_min, content) in [
            (1, 10, 0, "E1"),
            (2, 1, 10, "E2"),
            (3, 5, 300, "E3"),
        ] {
            wm.add(WmAdd {
                node_id: id,
                content: content.to_string(),
                token_count: 10,
                access_count: access,
                last_accessed: now - Duration::minutes(age_min),
                from_recall: false,
            })
            .unwrap();
        }

        assert_eq!(
            wm.assemble_context(ContextStrategy::Balanced, None),
            "E1\n\nE2\n\nE3"
        );
        assert_eq!(
            wm.assemble_context(ContextStrategy::Recent, None),
            "E1\n\nE2\n\nE3"
        );
        assert_eq!(
            wm.assemble_context(ContextStrategy::Frequent, None),
            "E1\n\nE3\n\nE2"
        );
    }

    #[test]
    fn context_respects_token_budget() {
        let wm = WorkingMemory::new(100);
        add(&wm, 1, 40, 3, Duration::zero());
        add(&wm, 2, 40, 2, Duration::zero());
        add(&wm, 3, 20, 1, Duration::zero());

        // Budget 60: best entry (40) fits, the next (40) would exceed.
        let ctx = wm.assemble_context(ContextStrategy::Frequent, Some(60));
        assert_eq!(ctx, "node 1");
    }

    #[test]
    fn utilisation_tracks_tokens() {
        let wm = WorkingMemory::new(200);
        add(&wm, 1, 50, 0, Duration::zero());
        assert!((wm.utilisation_percentage() - 25.0).abs() < f64::EPSILON);
    }
}
