//! Embedding similarity search.
//!
//! Embeddings are stored as little-endian f32 BLOBs next to the node row
//! and scanned with an in-process cosine computation. Zero right-padding
//! makes vectors of different model dimensions comparable: padded entries
//! contribute nothing to either the dot product or the norms.

use rusqlite::Connection;

use engram_core::errors::EngramResult;
use engram_core::models::{Node, Timeframe};

use super::node_crud::{parse_node_row, NODE_COLUMNS};
use crate::predicates::{metadata_predicate, timeframe_predicate};
use crate::to_storage_err;

/// Scan non-deleted, embedded nodes under the given filters and return
/// the `limit` nearest by cosine similarity, descending.
pub fn search_vector(
    conn: &Connection,
    query_embedding: &[f32],
    timeframe: &Timeframe,
    metadata: &serde_json::Map<String, serde_json::Value>,
    limit: usize,
) -> EngramResult<Vec<(Node, f64)>> {
    let query_norm_sq: f64 = query_embedding
        .iter()
        .map(|x| (*x as f64) * (*x as f64))
        .sum();
    if query_norm_sq == 0.0 {
        return Ok(Vec::new());
    }

    let mut sql = format!(
        "SELECT {NODE_COLUMNS} FROM nodes
         WHERE deleted_at IS NULL AND embedding IS NOT NULL"
    );
    let mut params: Vec<rusqlite::types::Value> = Vec::new();
    if let Some(p) = timeframe_predicate("created_at", timeframe) {
        sql.push_str(&format!(" AND {}", p.sql));
        params.extend(p.params);
    }
    if let Some(p) = metadata_predicate("metadata", metadata)? {
        sql.push_str(&format!(" AND {}", p.sql));
        params.extend(p.params);
    }

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), |row| {
            Ok(parse_node_row(row))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut scored: Vec<(Node, f64)> = Vec::new();
    for row in rows {
        let node = row.map_err(|e| to_storage_err(e.to_string()))??;
        let Some(stored) = node.embedding.as_deref() else {
            continue;
        };
        let sim = cosine_similarity(query_embedding, stored);
        if sim > 0.0 {
            scored.push((node, sim));
        }
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    scored.truncate(limit);
    Ok(scored)
}

/// Rerank a candidate id set by cosine similarity against the query
/// embedding. Used as the second stage of hybrid search.
pub fn rerank_by_similarity(
    conn: &Connection,
    candidate_ids: &[i64],
    query_embedding: &[f32],
    limit: usize,
) -> EngramResult<Vec<(Node, f64)>> {
    if candidate_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<&str> = candidate_ids.iter().map(|_| "?").collect();
    let sql = format!(
        "SELECT {NODE_COLUMNS} FROM nodes
         WHERE id IN ({}) AND deleted_at IS NULL AND embedding IS NOT NULL",
        placeholders.join(", ")
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(
            rusqlite::params_from_iter(candidate_ids.iter().copied()),
            |row| Ok(parse_node_row(row)),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut scored: Vec<(Node, f64)> = Vec::new();
    for row in rows {
        let node = row.map_err(|e| to_storage_err(e.to_string()))??;
        let Some(stored) = node.embedding.as_deref() else {
            continue;
        };
        let sim = cosine_similarity(query_embedding, stored);
        scored.push((node, sim));
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    scored.truncate(limit);
    Ok(scored)
}

/// Convert an f32 slice to little-endian bytes.
pub(crate) fn f32_vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert little-endian bytes back to an f32 vec.
pub(crate) fn bytes_to_f32_vec(bytes: &[u8], expected_dims: usize) -> Vec<f32> {
    let mut result = Vec::with_capacity(expected_dims);
    for chunk in bytes.chunks_exact(4) {
        result.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    result
}

/// Cosine similarity over the shared prefix. Vectors of unequal length
/// behave as if the shorter were zero-padded.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let norm_a: f64 = a
        .iter()
        .map(|x| (*x as f64) * (*x as f64))
        .sum::<f64>()
        .sqrt();
    let norm_b: f64 = b
        .iter()
        .map(|x| (*x as f64) * (*x as f64))
        .sum::<f64>()
        .sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_round_trips() {
        let v = vec![1.5f32, -2.25, 0.0, 3.125];
        assert_eq!(bytes_to_f32_vec(&f32_vec_to_bytes(&v), v.len()), v);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [0.6f32, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_ignores_zero_padding() {
        let short = [0.6f32, 0.8];
        let padded = [0.6f32, 0.8, 0.0, 0.0];
        assert!((cosine_similarity(&short, &padded) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }
}
