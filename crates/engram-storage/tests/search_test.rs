//! Integration tests: full-text, vector, and hybrid search paths.

use engram_core::models::{Node, TimeInterval, Timeframe};
use engram_storage::predicates::sanitise_fts_match;
use engram_storage::queries::node_crud::NewNode;
use engram_storage::StorageEngine;

fn add_with_embedding(
    engine: &StorageEngine,
    robot_id: i64,
    content: &str,
    embedding: Option<&[f32]>,
) -> i64 {
    let hash = Node::compute_content_hash(content);
    let metadata = serde_json::Map::new();
    engine
        .add_node(
            &NewNode {
                content,
                content_hash: &hash,
                token_count: 4,
                metadata: &metadata,
                embedding,
            },
            robot_id,
        )
        .unwrap()
        .node
        .id
}

#[test]
fn fulltext_matches_and_ranks() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    add_with_embedding(&engine, robot.id, "PostgreSQL query planning and indexes", None);
    add_with_embedding(&engine, robot.id, "Gardening tips for spring", None);

    let m = sanitise_fts_match("postgresql indexes").unwrap();
    let hits = engine
        .search_fulltext(&m, &Timeframe::None, &serde_json::Map::new(), 10)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].0.content.contains("PostgreSQL"));
}

#[test]
fn fulltext_excludes_soft_deleted() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    let id = add_with_embedding(&engine, robot.id, "secret postgres notes", None);

    let m = sanitise_fts_match("postgres").unwrap();
    assert_eq!(
        engine
            .search_fulltext(&m, &Timeframe::None, &serde_json::Map::new(), 10)
            .unwrap()
            .len(),
        1
    );

    engine.forget_node(id, None, true).unwrap();
    assert!(engine
        .search_fulltext(&m, &Timeframe::None, &serde_json::Map::new(), 10)
        .unwrap()
        .is_empty());

    engine.restore_node(id, None).unwrap();
    assert_eq!(
        engine
            .search_fulltext(&m, &Timeframe::None, &serde_json::Map::new(), 10)
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn vector_search_orders_by_similarity() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    let close = add_with_embedding(&engine, robot.id, "close", Some(&[1.0, 0.0, 0.0]));
    let far = add_with_embedding(&engine, robot.id, "far", Some(&[0.0, 1.0, 0.1]));

    let hits = engine
        .search_vector(&[1.0, 0.1, 0.0], &Timeframe::None, &serde_json::Map::new(), 10)
        .unwrap();
    assert_eq!(hits[0].0.id, close);
    assert!(hits[0].1 > 0.9);
    if let Some(second) = hits.get(1) {
        assert_eq!(second.0.id, far);
        assert!(second.1 < hits[0].1);
    }
}

#[test]
fn vector_search_skips_unembedded_nodes() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    add_with_embedding(&engine, robot.id, "pending enrichment", None);

    let hits = engine
        .search_vector(&[1.0, 0.0], &Timeframe::None, &serde_json::Map::new(), 10)
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn timeframe_filter_excludes_old_nodes() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    add_with_embedding(&engine, robot.id, "fresh postgres note", None);

    // A window wholly in the past matches nothing just inserted.
    let end = chrono::Utc::now() - chrono::Duration::days(30);
    let start = end - chrono::Duration::days(7);
    let tf = Timeframe::Interval(TimeInterval::new(start, end));
    let m = sanitise_fts_match("postgres").unwrap();
    assert!(engine
        .search_fulltext(&m, &tf, &serde_json::Map::new(), 10)
        .unwrap()
        .is_empty());
}

#[test]
fn metadata_filter_is_containment() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();

    let hash = Node::compute_content_hash("tagged with source");
    let mut metadata = serde_json::Map::new();
    metadata.insert("source".to_string(), serde_json::json!("chat"));
    engine
        .add_node(
            &NewNode {
                content: "tagged with source",
                content_hash: &hash,
                token_count: 3,
                metadata: &metadata,
                embedding: None,
            },
            robot.id,
        )
        .unwrap();

    let m = sanitise_fts_match("tagged").unwrap();
    let mut filter = serde_json::Map::new();
    filter.insert("source".to_string(), serde_json::json!("chat"));
    assert_eq!(
        engine.search_fulltext(&m, &Timeframe::None, &filter, 10).unwrap().len(),
        1
    );

    filter.insert("source".to_string(), serde_json::json!("email"));
    assert!(engine
        .search_fulltext(&m, &Timeframe::None, &filter, 10)
        .unwrap()
        .is_empty());
}

#[test]
fn hybrid_prefilters_then_reranks() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let robot = engine.register_robot("r").unwrap();
    let best = add_with_embedding(
        &engine,
        robot.id,
        "postgres vacuum internals",
        Some(&[1.0, 0.0]),
    );
    add_with_embedding(
        &engine,
        robot.id,
        "postgres backup strategies",
        Some(&[0.0, 1.0]),
    );
    add_with_embedding(&engine, robot.id, "unrelated topic", Some(&[1.0, 0.0]));

    let m = sanitise_fts_match("postgres").unwrap();
    let hits = engine
        .search_hybrid(&m, &[1.0, 0.0], &Timeframe::None, &serde_json::Map::new(), 100, 2)
        .unwrap();
    // The unrelated node never enters the candidate set, even with a
    // perfect embedding match.
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0.id, best);
}
