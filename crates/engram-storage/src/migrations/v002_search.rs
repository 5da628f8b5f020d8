//! v002: search structures — FTS5 index with sync triggers, plus the
//! ontology views over tags.

use rusqlite::Connection;

use engram_core::errors::EngramResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> EngramResult<()> {
    conn.execute_batch(
        "
        CREATE VIRTUAL TABLE IF NOT EXISTS nodes_fts USING fts5(
            content,
            content='nodes',
            content_rowid='id'
        );

        CREATE TRIGGER IF NOT EXISTS nodes_fts_insert AFTER INSERT ON nodes BEGIN
            INSERT INTO nodes_fts (rowid, content) VALUES (new.id, new.content);
        END;

        CREATE TRIGGER IF NOT EXISTS nodes_fts_delete AFTER DELETE ON nodes BEGIN
            INSERT INTO nodes_fts (nodes_fts, rowid, content)
            VALUES ('delete', old.id, old.content);
        END;

        CREATE TRIGGER IF NOT EXISTS nodes_fts_update AFTER UPDATE OF content ON nodes BEGIN
            INSERT INTO nodes_fts (nodes_fts, rowid, content)
            VALUES ('delete', old.id, old.content);
            INSERT INTO nodes_fts (rowid, content) VALUES (new.id, new.content);
        END;

        -- Distinct roots and full paths present in the tag ontology.
        CREATE VIEW IF NOT EXISTS ontology_structure AS
        SELECT DISTINCT
            CASE WHEN instr(tag, ':') > 0
                 THEN substr(tag, 1, instr(tag, ':') - 1)
                 ELSE tag
            END AS root,
            tag AS path
        FROM tags;

        -- Tag pairs that co-occur on at least two nodes.
        CREATE VIEW IF NOT EXISTS topic_relationships AS
        SELECT a.tag AS tag_a, b.tag AS tag_b, COUNT(*) AS shared_nodes
        FROM tags a
        JOIN tags b ON a.node_id = b.node_id AND a.tag < b.tag
        GROUP BY a.tag, b.tag
        HAVING COUNT(*) >= 2;
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
