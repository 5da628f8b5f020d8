//! End-to-end orchestrator tests over an in-memory store with inline
//! enrichment.

use engram_agent::Agent;
use engram_core::constants::CONFIRMED;
use engram_core::errors::EngramError;
use engram_core::models::SearchStrategy;
use engram_memory::ContextStrategy;
use test_fixtures::{no_metadata, open_store, test_config};

#[test]
fn remember_deduplicates_across_robots() {
    let store = open_store();
    let a = Agent::new(store.clone(), "A", None).unwrap();
    let b = Agent::new(store.clone(), "B", None).unwrap();

    let id_a = a.remember("PostgreSQL is great", no_metadata(), &[]).unwrap();
    let id_b = b.remember("PostgreSQL is great", no_metadata(), &[]).unwrap();
    assert_eq!(id_a, id_b);

    let edge_a = store.ltm().get_edge(a.robot_id(), id_a).unwrap().unwrap();
    let edge_b = store.ltm().get_edge(b.robot_id(), id_a).unwrap().unwrap();
    assert_eq!(edge_a.remember_count, 1);
    assert_eq!(edge_b.remember_count, 1);

    a.remember("PostgreSQL is great", no_metadata(), &[]).unwrap();
    let edge_a = store.ltm().get_edge(a.robot_id(), id_a).unwrap().unwrap();
    assert_eq!(edge_a.remember_count, 2);
}

#[test]
fn remember_enriches_inline_and_flags_working_memory() {
    let store = open_store();
    let agent = Agent::new(store.clone(), "solo", None).unwrap();
    let node_id = agent
        .remember("postgres connection pooling patterns", no_metadata(), &[])
        .unwrap();

    // Inline backend: enrichment finished before remember returned.
    let node = store.engine().get_node(node_id, false).unwrap().unwrap();
    assert!(node.embedding.is_some());
    assert!(!store.ltm().get_node_tags(node_id).unwrap().is_empty());

    assert!(agent.working_memory().contains(node_id));
    let edge = store.ltm().get_edge(agent.robot_id(), node_id).unwrap().unwrap();
    assert!(edge.in_working_memory);
}

#[test]
fn explicit_tags_are_validated_and_stored() {
    let store = open_store();
    let agent = Agent::new(store.clone(), "tagger", None).unwrap();
    let node_id = agent
        .remember(
            "indexes make postgres fast",
            no_metadata(),
            &["database:postgresql:performance".to_string()],
        )
        .unwrap();
    assert!(store
        .ltm()
        .get_node_tags(node_id)
        .unwrap()
        .contains(&"database:postgresql:performance".to_string()));

    assert!(matches!(
        agent.remember("x", no_metadata(), &["Bad Tag".to_string()]),
        Err(EngramError::InvalidInput(_))
    ));
}

#[test]
fn eviction_keeps_ltm_and_clears_the_flag() {
    let mut config = test_config();
    config.working_memory.max_tokens = 16;
    let store = engram_agent::Store::open(config).unwrap();
    let agent = Agent::new(store.clone(), "tiny", None).unwrap();

    // Each sentence is a handful of tokens; enough of them forces
    // evictions.
    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(
            agent
                .remember(&format!("note number {i}"), no_metadata(), &[])
                .unwrap(),
        );
    }

    let resident = agent.working_memory().node_ids();
    let evicted: Vec<i64> = ids
        .iter()
        .copied()
        .filter(|id| !resident.contains(id))
        .collect();
    assert!(!evicted.is_empty(), "small budget must evict something");

    for node_id in evicted {
        // Still retrievable from LTM, with the edge flag cleared.
        let node = agent.retrieve(node_id).unwrap();
        assert!(!node.content.is_empty());
        let edge = store.ltm().get_edge(agent.robot_id(), node_id).unwrap().unwrap();
        assert!(!edge.in_working_memory);
    }
}

#[test]
fn recall_promotes_hits_into_working_memory() {
    let store = open_store();
    let writer = Agent::new(store.clone(), "writer", None).unwrap();
    let reader = Agent::new(store.clone(), "reader", None).unwrap();

    let node_id = writer
        .remember("postgres autovacuum tuning notes", no_metadata(), &[])
        .unwrap();

    let hits = reader
        .recall(
            "autovacuum tuning",
            None,
            10,
            SearchStrategy::Fulltext,
            no_metadata(),
            false,
        )
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].node.id, node_id);

    // Promotion: resident in the reader's WM, edge flagged, access
    // tracked, remember stats untouched.
    assert!(reader.working_memory().contains(node_id));
    let edge = store.ltm().get_edge(reader.robot_id(), node_id).unwrap().unwrap();
    assert!(edge.in_working_memory);
    assert_eq!(edge.remember_count, 1);
    let node = store.engine().get_node(node_id, false).unwrap().unwrap();
    assert!(node.access_count >= 1);
}

#[test]
fn recall_raw_skips_promotion() {
    let store = open_store();
    let agent = Agent::new(store.clone(), "raw", None).unwrap();
    let node_id = agent
        .remember("ephemeral context", no_metadata(), &[])
        .unwrap();
    agent.working_memory().remove(node_id);

    let hits = agent
        .recall(
            "ephemeral context",
            None,
            10,
            SearchStrategy::Fulltext,
            no_metadata(),
            true,
        )
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(!agent.working_memory().contains(node_id));
}

#[test]
fn recall_parses_timeframe_from_the_query() {
    let store = open_store();
    let agent = Agent::new(store.clone(), "temporal", None).unwrap();
    agent
        .remember("we discussed postgres sharding", no_metadata(), &[])
        .unwrap();

    // "last week" covers now, so the fresh node matches.
    let hits = agent
        .recall(
            "what did we discuss last week about postgres",
            None,
            10,
            SearchStrategy::Fulltext,
            no_metadata(),
            false,
        )
        .unwrap();
    assert_eq!(hits.len(), 1);

    // "yesterday" excludes a node created today.
    let hits = agent
        .recall(
            "postgres sharding yesterday",
            None,
            10,
            SearchStrategy::Fulltext,
            no_metadata(),
            true,
        )
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn vector_recall_downgrades_to_fulltext_when_embedding_fails() {
    // An unreachable endpoint makes every embed call fail fast.
    let mut config = test_config();
    config.embedding.provider = "openai".to_string();
    config.embedding.base_url = Some("http://127.0.0.1:9".to_string());
    config.embedding.api_key = Some("test-key".to_string());
    let store = engram_agent::Store::open(config).unwrap();
    let agent = Agent::new(store.clone(), "degraded", None).unwrap();

    agent
        .remember("postgres failover runbook", no_metadata(), &[])
        .unwrap();

    let hits = agent
        .recall(
            "postgres failover",
            None,
            10,
            SearchStrategy::Vector,
            no_metadata(),
            true,
        )
        .unwrap();
    assert_eq!(hits.len(), 1);
    // The fallback path is full-text: rank populated, no similarity.
    assert!(hits[0].rank.is_some());
    assert!(hits[0].similarity.is_none());
    assert_eq!(agent.metrics().search_downgrades, 1);

    // The breaker saw the failures (one from the inline enrichment job,
    // one from the recall embedding) without opening at the default
    // threshold.
    let stats = store.breaker_stats();
    let embedding = stats.iter().find(|s| s.service == "embedding").unwrap();
    assert!(embedding.total_failures >= 2);
}

#[test]
fn forget_requires_sentinel_for_hard_delete() {
    let store = open_store();
    let agent = Agent::new(store.clone(), "careful", None).unwrap();
    let node_id = agent.remember("dangerous data", no_metadata(), &[]).unwrap();

    let err = agent.forget(node_id, false, None).unwrap_err();
    assert!(matches!(err, EngramError::InvalidInput(_)));
    // No side effects without the sentinel.
    assert!(store.ltm().exists(node_id).unwrap());

    let err = agent.forget(node_id, false, Some("confirmed")).unwrap_err();
    assert!(matches!(err, EngramError::InvalidInput(_)));

    agent.forget(node_id, false, Some(CONFIRMED)).unwrap();
    assert!(store.engine().get_node(node_id, true).unwrap().is_none());
}

#[test]
fn soft_forget_then_restore_round_trips() {
    let store = open_store();
    let agent = Agent::new(store.clone(), "fickle", None).unwrap();
    let node_id = agent
        .remember("transient thought", no_metadata(), &[])
        .unwrap();

    agent.forget(node_id, true, None).unwrap();
    assert!(!agent.working_memory().contains(node_id));
    assert!(matches!(
        agent.retrieve(node_id),
        Err(EngramError::NotFound { .. })
    ));

    let restored = agent.restore(node_id).unwrap();
    assert_eq!(restored.id, node_id);
    assert_eq!(restored.content, "transient thought");
    assert_eq!(restored.content_hash, engram_core::models::Node::compute_content_hash("transient thought"));
    assert!(agent.retrieve(node_id).is_ok());
}

#[test]
fn assemble_context_joins_working_memory() {
    let store = open_store();
    let agent = Agent::new(store.clone(), "ctx", None).unwrap();
    agent.remember("first fact", no_metadata(), &[]).unwrap();
    agent.remember("second fact", no_metadata(), &[]).unwrap();

    let context = agent.assemble_context(ContextStrategy::Recent, None);
    assert!(context.contains("first fact"));
    assert!(context.contains("second fact"));
    assert!(context.contains("\n\n"));
}
