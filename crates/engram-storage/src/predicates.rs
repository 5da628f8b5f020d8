//! Safe composition of SQL filter fragments.
//!
//! Fragments are pre-built with `?` placeholders; every caller-provided
//! value travels through bind parameters. Column names are internal
//! identifiers, never user input.

use rusqlite::types::Value;

use engram_core::errors::{EngramError, EngramResult};
use engram_core::models::Timeframe;

/// A composable `AND`-able SQL fragment with its bound values.
#[derive(Debug, Clone)]
pub struct SqlPredicate {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Build a timeframe filter on `column`. One interval emits a single
/// `BETWEEN`-style test; several are ORed together; `Timeframe::None`
/// emits nothing.
pub fn timeframe_predicate(column: &str, timeframe: &Timeframe) -> Option<SqlPredicate> {
    let intervals = timeframe.intervals();
    if intervals.is_empty() {
        return None;
    }

    let mut clauses = Vec::with_capacity(intervals.len());
    let mut params = Vec::with_capacity(intervals.len() * 2);
    for interval in intervals {
        clauses.push(format!("({column} >= ? AND {column} <= ?)"));
        params.push(Value::Text(interval.start.to_rfc3339()));
        params.push(Value::Text(interval.end.to_rfc3339()));
    }

    Some(SqlPredicate {
        sql: format!("({})", clauses.join(" OR ")),
        params,
    })
}

/// Build a JSON-containment filter on `column`: every key in `metadata`
/// must be present with an equal value. Key paths and values are bound,
/// not spliced.
pub fn metadata_predicate(
    column: &str,
    metadata: &serde_json::Map<String, serde_json::Value>,
) -> EngramResult<Option<SqlPredicate>> {
    if metadata.is_empty() {
        return Ok(None);
    }

    let mut clauses = Vec::with_capacity(metadata.len());
    let mut params = Vec::with_capacity(metadata.len() * 2);
    for (key, value) in metadata {
        if key.contains('"') {
            return Err(EngramError::InvalidInput(format!(
                "metadata key may not contain '\"': {key}"
            )));
        }
        clauses.push(format!("json_extract({column}, ?) = json_extract(?, '$')"));
        params.push(Value::Text(format!("$.\"{key}\"")));
        params.push(Value::Text(
            serde_json::to_string(value).map_err(|e| EngramError::InvalidInput(e.to_string()))?,
        ));
    }

    Ok(Some(SqlPredicate {
        sql: format!("({})", clauses.join(" AND ")),
        params,
    }))
}

/// Escape `%`, `_`, and `\` for use with `LIKE ... ESCAPE '\'`.
pub fn sanitise_like(pattern: &str) -> String {
    pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Turn free text into a safe FTS5 match string: alphanumeric tokens,
/// each quoted, ORed together. Returns `None` when no token survives.
pub fn sanitise_fts_match(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

/// Validate an embedding and right-pad it with zeros to `max_dims`.
/// Rejects empty vectors, non-finite values, and vectors longer than the
/// maximum indexed dimension.
pub fn sanitise_embedding(vector: &[f32], max_dims: usize) -> EngramResult<Vec<f32>> {
    if vector.is_empty() {
        return Err(EngramError::InvalidInput(
            "embedding vector is empty".to_string(),
        ));
    }
    if vector.len() > max_dims {
        return Err(EngramError::InvalidInput(format!(
            "embedding has {} dimensions, maximum indexed is {max_dims}",
            vector.len()
        )));
    }
    if let Some(idx) = vector.iter().position(|v| !v.is_finite()) {
        return Err(EngramError::InvalidInput(format!(
            "embedding contains a non-finite value at index {idx}"
        )));
    }

    let mut padded = vector.to_vec();
    padded.resize(max_dims, 0.0);
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use engram_core::models::TimeInterval;

    #[test]
    fn none_timeframe_emits_nothing() {
        assert!(timeframe_predicate("n.created_at", &Timeframe::None).is_none());
    }

    #[test]
    fn single_interval_binds_two_values() {
        let end = Utc::now();
        let tf = Timeframe::Interval(TimeInterval::new(end - Duration::days(7), end));
        let p = timeframe_predicate("n.created_at", &tf).unwrap();
        assert_eq!(p.sql, "((n.created_at >= ? AND n.created_at <= ?))");
        assert_eq!(p.params.len(), 2);
    }

    #[test]
    fn interval_union_is_ored() {
        let end = Utc::now();
        let tf = Timeframe::Intervals(vec![
            TimeInterval::new(end - Duration::days(7), end - Duration::days(6)),
            TimeInterval::new(end - Duration::days(2), end),
        ]);
        let p = timeframe_predicate("created_at", &tf).unwrap();
        assert!(p.sql.contains(" OR "));
        assert_eq!(p.params.len(), 4);
    }

    #[test]
    fn metadata_predicate_binds_paths_and_values() {
        let mut map = serde_json::Map::new();
        map.insert("source".to_string(), serde_json::json!("chat"));
        map.insert("priority".to_string(), serde_json::json!(3));
        let p = metadata_predicate("n.metadata", &map).unwrap().unwrap();
        assert_eq!(p.params.len(), 4);
        assert!(!p.sql.contains("chat"));
    }

    #[test]
    fn metadata_key_with_quote_rejected() {
        let mut map = serde_json::Map::new();
        map.insert("bad\"key".to_string(), serde_json::json!(1));
        assert!(metadata_predicate("metadata", &map).is_err());
    }

    #[test]
    fn like_escaping() {
        assert_eq!(sanitise_like("100%_done\\"), "100\\%\\_done\\\\");
    }

    #[test]
    fn fts_match_quotes_tokens() {
        let m = sanitise_fts_match("what's new: PostgreSQL?").unwrap();
        assert_eq!(m, "\"what\" OR \"s\" OR \"new\" OR \"postgresql\"");
        assert!(sanitise_fts_match("!!! ---").is_none());
    }

    #[test]
    fn embedding_padded_to_max() {
        let v = sanitise_embedding(&[1.0, 2.0], 4).unwrap();
        assert_eq!(v, vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn non_finite_embedding_rejected() {
        assert!(sanitise_embedding(&[1.0, f32::NAN], 4).is_err());
        assert!(sanitise_embedding(&[f32::INFINITY], 4).is_err());
        assert!(sanitise_embedding(&[], 4).is_err());
        assert!(sanitise_embedding(&[1.0; 8], 4).is_err());
    }
}
