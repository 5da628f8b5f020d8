//! Durability: state written through one engine is visible after reopen,
//! and the read pool sees the writer's committed rows.

use std::time::Duration;

use engram_core::models::Node;
use engram_storage::queries::node_crud::NewNode;
use engram_storage::StorageEngine;

fn open(dir: &tempfile::TempDir) -> StorageEngine {
    StorageEngine::open_at(
        &dir.path().join("persist.db"),
        4,
        5_000,
        Duration::from_secs(30),
    )
    .unwrap()
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let node_id;
    {
        let engine = open(&dir);
        let robot = engine.register_robot("durable").unwrap();
        let hash = Node::compute_content_hash("written before restart");
        let metadata = serde_json::Map::new();
        node_id = engine
            .add_node(
                &NewNode {
                    content: "written before restart",
                    content_hash: &hash,
                    token_count: 4,
                    metadata: &metadata,
                    embedding: Some(&[0.25, 0.5]),
                },
                robot.id,
            )
            .unwrap()
            .node
            .id;
        engine
            .insert_tags(node_id, &["durability:test".to_string()])
            .unwrap();
    }

    let engine = open(&dir);
    let node = engine.get_node(node_id, false).unwrap().unwrap();
    assert_eq!(node.content, "written before restart");
    assert_eq!(node.embedding.as_deref(), Some(&[0.25f32, 0.5][..]));
    assert_eq!(engine.node_tags(node_id).unwrap(), vec!["durability:test"]);

    // Migrations are idempotent on reopen.
    let robot = engine.register_robot("durable").unwrap();
    assert_eq!(engine.counts().unwrap().robots, 1);
    let _ = robot;
}

#[test]
fn read_pool_sees_committed_writes() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open(&dir);
    let robot = engine.register_robot("reader").unwrap();
    let hash = Node::compute_content_hash("wal visibility");
    let metadata = serde_json::Map::new();
    let node_id = engine
        .add_node(
            &NewNode {
                content: "wal visibility",
                content_hash: &hash,
                token_count: 2,
                metadata: &metadata,
                embedding: None,
            },
            robot.id,
        )
        .unwrap()
        .node
        .id;

    // get_node routes through the read pool in file-backed mode.
    for _ in 0..8 {
        assert!(engine.get_node(node_id, false).unwrap().is_some());
    }
}
