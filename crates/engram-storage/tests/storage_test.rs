//! Integration tests: node lifecycle, dedup, edges, audit log.

use engram_core::errors::EngramError;
use engram_core::models::{Node, Operation, Timeframe};
use engram_storage::queries::node_crud::NewNode;
use engram_storage::StorageEngine;

fn empty_metadata() -> serde_json::Map<String, serde_json::Value> {
    serde_json::Map::new()
}

fn add(engine: &StorageEngine, robot_id: i64, content: &str) -> engram_storage::engine::AddOutcome {
    let hash = Node::compute_content_hash(content);
    let metadata = empty_metadata();
    engine
        .add_node(
            &NewNode {
                content,
                content_hash: &hash,
                token_count: 4,
                metadata: &metadata,
                embedding: None,
            },
            robot_id,
        )
        .unwrap()
}

#[test]
fn add_and_get_round_trip() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("alpha").unwrap();
    let outcome = add(&engine, robot.id, "PostgreSQL is great");

    assert!(outcome.is_new);
    assert_eq!(outcome.edge.remember_count, 1);

    let node = engine.get_node(outcome.node.id, false).unwrap().unwrap();
    assert_eq!(node.content, "PostgreSQL is great");
    assert_eq!(node.content_hash, Node::compute_content_hash("PostgreSQL is great"));
    assert_eq!(node.access_count, 0);
    assert!(node.deleted_at.is_none());
}

#[test]
fn duplicate_content_reuses_node_and_increments_edge() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let a = engine.register_robot("a").unwrap();
    let b = engine.register_robot("b").unwrap();

    let first = add(&engine, a.id, "PostgreSQL is great");
    let second = add(&engine, b.id, "PostgreSQL is great");
    assert_eq!(first.node.id, second.node.id);
    assert!(!second.is_new);
    assert_eq!(second.edge.remember_count, 1);

    // Third remember by the first robot bumps that robot's edge only.
    let third = add(&engine, a.id, "PostgreSQL is great");
    assert_eq!(third.edge.remember_count, 2);
    assert!(third.edge.first_remembered_at <= third.edge.last_remembered_at);

    let edge_b = engine.get_edge(b.id, first.node.id).unwrap().unwrap();
    assert_eq!(edge_b.remember_count, 1);
}

#[test]
fn soft_delete_hides_then_restore_revives() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    let outcome = add(&engine, robot.id, "ephemeral fact");
    let id = outcome.node.id;

    engine.forget_node(id, Some(robot.id), true).unwrap();
    assert!(engine.get_node(id, false).unwrap().is_none());
    assert!(engine.get_node(id, true).unwrap().is_some());
    assert!(!engine.node_exists(id).unwrap());

    let restored = engine.restore_node(id, Some(robot.id)).unwrap();
    assert_eq!(restored.id, id);
    assert!(engine.node_exists(id).unwrap());
}

#[test]
fn remembering_soft_deleted_content_revives_the_row() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    let outcome = add(&engine, robot.id, "come back");
    engine.forget_node(outcome.node.id, None, true).unwrap();

    let again = add(&engine, robot.id, "come back");
    assert_eq!(again.node.id, outcome.node.id);
    assert!(!again.is_new);
    assert!(again.node.deleted_at.is_none());
}

#[test]
fn hard_delete_cascades_and_keeps_nulled_log_rows() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    let outcome = add(&engine, robot.id, "purge me");
    let id = outcome.node.id;
    engine.insert_tags(id, &["topic:a".to_string()]).unwrap();

    engine.forget_node(id, Some(robot.id), false).unwrap();

    assert!(engine.get_node(id, true).unwrap().is_none());
    assert!(engine.node_tags(id).unwrap().is_empty());
    assert!(engine.get_edge(robot.id, id).unwrap().is_none());

    // The forget audit row survives with its node reference nulled.
    let log = engine.recent_operations(10).unwrap();
    let forget_row = log
        .iter()
        .find(|e| e.operation == Operation::Forget)
        .expect("forget must be audited");
    assert_eq!(forget_row.node_id, None);
}

#[test]
fn forget_unknown_node_is_not_found() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let err = engine.forget_node(999, None, true).unwrap_err();
    assert!(matches!(err, EngramError::NotFound { .. }));
}

#[test]
fn track_access_bulk_updates_counts() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    let n1 = add(&engine, robot.id, "first").node.id;
    let n2 = add(&engine, robot.id, "second").node.id;

    let updated = engine.track_access(&[n1, n2]).unwrap();
    assert_eq!(updated, 2);
    assert_eq!(engine.get_node(n1, false).unwrap().unwrap().access_count, 1);
    assert_eq!(engine.get_node(n2, false).unwrap().unwrap().access_count, 1);
}

#[test]
fn register_robot_is_idempotent_on_name() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let first = engine.register_robot("sigma").unwrap();
    let second = engine.register_robot("sigma").unwrap();
    assert_eq!(first.id, second.id);

    let other = engine.register_robot("tau").unwrap();
    assert_ne!(first.id, other.id);
}

#[test]
fn working_memory_flags_round_trip() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    let n1 = add(&engine, robot.id, "wm one").node.id;
    let n2 = add(&engine, robot.id, "wm two").node.id;

    engine.set_in_working_memory(robot.id, &[n1, n2], true).unwrap();
    assert_eq!(engine.wm_node_ids(robot.id).unwrap(), vec![n1, n2]);

    engine.mark_evicted(robot.id, &[n1]).unwrap();
    assert_eq!(engine.wm_node_ids(robot.id).unwrap(), vec![n2]);

    // The eviction is audited and the node itself is untouched.
    let evicted = engine
        .recent_operations(10)
        .unwrap()
        .into_iter()
        .find(|e| e.operation == Operation::Evict)
        .unwrap();
    assert_eq!(evicted.node_id, Some(n1));
    assert!(engine.get_node(n1, false).unwrap().is_some());
}

#[test]
fn counts_reflect_store_state() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    add(&engine, robot.id, "one");
    add(&engine, robot.id, "two");

    let counts = engine.counts().unwrap();
    assert_eq!(counts.nodes, 2);
    assert_eq!(counts.robots, 1);
    assert_eq!(counts.edges, 2);
}

#[test]
fn ontology_views_expose_roots_and_cooccurrence() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    let n1 = add(&engine, robot.id, "pg tuning").node.id;
    let n2 = add(&engine, robot.id, "pg backups").node.id;
    engine
        .insert_tags(n1, &["database:postgresql".to_string(), "ops:backup".to_string()])
        .unwrap();
    engine
        .insert_tags(n2, &["database:postgresql".to_string(), "ops:backup".to_string()])
        .unwrap();

    let structure = engine.ontology_structure().unwrap();
    assert!(structure.contains(&("database".to_string(), "database:postgresql".to_string())));
    assert!(structure.contains(&("ops".to_string(), "ops:backup".to_string())));

    // The pair co-occurs on two nodes, so it crosses the view threshold.
    let related = engine.topic_relationships().unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].0, "database:postgresql");
    assert_eq!(related[0].1, "ops:backup");
    assert_eq!(related[0].2, 2);
}

#[test]
fn search_by_tags_any_and_all() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    let n1 = add(&engine, robot.id, "postgres tuning").node.id;
    let n2 = add(&engine, robot.id, "redis caching").node.id;
    engine
        .insert_tags(n1, &["database:postgresql".to_string(), "performance".to_string()])
        .unwrap();
    engine.insert_tags(n2, &["database:redis".to_string()]).unwrap();

    let any = engine
        .search_by_tags(
            &["database:postgresql".to_string(), "database:redis".to_string()],
            false,
            &Timeframe::None,
            10,
        )
        .unwrap();
    assert_eq!(any.len(), 2);

    let all = engine
        .search_by_tags(
            &["database:postgresql".to_string(), "performance".to_string()],
            true,
            &Timeframe::None,
            10,
        )
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, n1);
}
