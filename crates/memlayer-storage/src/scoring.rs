// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Similarity scoring, metadata filtering and result ordering shared by
//! every index backend.

use std::cmp::Ordering;

use memlayer_core::{Filters, MemoryItem, Metadata};
use serde_json::Value;

/// Convert an f32 vector to a little-endian SQLite BLOB.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a SQLite BLOB back to an f32 vector. Trailing partial bytes are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`.
///
/// Returns 0.0 for mismatched lengths or a zero-norm vector rather than NaN,
/// so such records simply rank last.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Whether `metadata` satisfies every equality filter.
pub fn matches_filters(metadata: &Metadata, filters: &Filters) -> bool {
    filters.iter().all(|(key, expected)| {
        metadata
            .get(key)
            .is_some_and(|actual| value_matches(actual, expected))
    })
}

/// JSON equality, loosened so that a string filter matches a scalar whose
/// textual form is equal (`"3"` matches `3`, `"true"` matches `true`), and
/// numbers compare by value (`1` matches `1.0`).
fn value_matches(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Number(a), Value::String(s)) => {
            a.to_string() == *s || s.parse::<f64>().ok() == a.as_f64()
        }
        (Value::Bool(b), Value::String(s)) => s.eq_ignore_ascii_case(if *b { "true" } else { "false" }),
        _ => false,
    }
}

/// Score, filter and order `items` against a query vector.
///
/// Items are assumed already scoped to the query's user. Those scoring below
/// `threshold` are dropped; the rest are ordered by score descending, ties
/// broken by `updated_at` descending then id, and cut to `limit`.
pub fn rank(
    items: impl IntoIterator<Item = MemoryItem>,
    vector: &[f32],
    filters: &Filters,
    threshold: Option<f32>,
    limit: usize,
) -> Vec<MemoryItem> {
    let mut scored: Vec<MemoryItem> = items
        .into_iter()
        .filter(|item| matches_filters(&item.metadata, filters))
        .filter_map(|item| {
            let score = cosine_similarity(vector, &item.embedding);
            match threshold {
                Some(t) if score < t => None,
                _ => Some(item.with_score(score)),
            }
        })
        .collect();
    scored.sort_by(compare_scored);
    scored.truncate(limit);
    scored
}

/// Filter and order `items` newest first, without scores.
pub fn recent(
    items: impl IntoIterator<Item = MemoryItem>,
    filters: &Filters,
    limit: usize,
) -> Vec<MemoryItem> {
    let mut listed: Vec<MemoryItem> = items
        .into_iter()
        .filter(|item| matches_filters(&item.metadata, filters))
        .map(|mut item| {
            item.score = None;
            item
        })
        .collect();
    listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    listed.truncate(limit);
    listed
}

fn compare_scored(a: &MemoryItem, b: &MemoryItem) -> Ordering {
    let (sa, sb) = (a.score.unwrap_or(f32::MIN), b.score.unwrap_or(f32::MIN));
    sb.total_cmp(&sa)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use memlayer_core::MemoryType;
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn item(id: &str, embedding: Vec<f32>, metadata: Metadata) -> MemoryItem {
        let mut item = MemoryItem::new("u", id, MemoryType::Factual, metadata, embedding);
        item.id = id.to_string();
        item
    }

    fn meta(pairs: &[(&str, Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn blob_roundtrip() {
        let original = vec![0.1_f32, 0.2, 0.3, -0.5, 1.0];
        let blob = vec_to_blob(&original);
        assert_eq!(blob.len(), original.len() * 4);
        assert_eq!(blob_to_vec(&blob), original);
    }

    #[test]
    fn cosine_handles_unnormalized_vectors() {
        assert!((cosine_similarity(&[2.0, 0.0], &[5.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn filters_use_lenient_equality() {
        let m = meta(&[
            ("topic", json!("food")),
            ("rating", json!(5)),
            ("pinned", json!(true)),
        ]);
        assert!(matches_filters(&m, &Filters::new()));
        assert!(matches_filters(&m, &meta(&[("topic", json!("food"))])));
        assert!(matches_filters(&m, &meta(&[("rating", json!("5"))])));
        assert!(matches_filters(&m, &meta(&[("rating", json!(5.0))])));
        assert!(matches_filters(&m, &meta(&[("pinned", json!("true"))])));
        assert!(!matches_filters(&m, &meta(&[("topic", json!("travel"))])));
        assert!(!matches_filters(&m, &meta(&[("missing", json!("x"))])));
        assert!(!matches_filters(
            &m,
            &meta(&[("topic", json!("food")), ("rating", json!(4))])
        ));
    }

    #[test]
    fn rank_orders_by_score_then_recency_then_id() {
        let mut older = item("b", vec![1.0, 0.0], Metadata::new());
        let mut newer = item("c", vec![1.0, 0.0], Metadata::new());
        let same_time = item("a", vec![1.0, 0.0], Metadata::new());
        let far = item("d", vec![0.0, 1.0], Metadata::new());
        older.updated_at = same_time.updated_at - chrono::Duration::seconds(10);
        newer.updated_at = same_time.updated_at + chrono::Duration::seconds(10);

        let ranked = rank(
            vec![far, older, same_time, newer],
            &[1.0, 0.0],
            &Filters::new(),
            None,
            10,
        );
        let ids: Vec<&str> = ranked.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);
        assert!(ranked.iter().all(|i| i.score.is_some()));
    }

    #[test]
    fn rank_applies_threshold_filters_and_limit() {
        let items = vec![
            item("x", vec![1.0, 0.0], meta(&[("k", json!("v"))])),
            item("y", vec![0.7, 0.7], meta(&[("k", json!("v"))])),
            item("z", vec![1.0, 0.1], meta(&[("k", json!("other"))])),
        ];
        let ranked = rank(
            items.clone(),
            &[1.0, 0.0],
            &meta(&[("k", json!("v"))]),
            Some(0.8),
            10,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "x");

        let limited = rank(items, &[1.0, 0.0], &Filters::new(), None, 2);
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn recent_orders_newest_first_without_scores() {
        let mut first = item("first", vec![1.0], Metadata::new());
        let second = item("second", vec![1.0], Metadata::new()).with_score(0.5);
        first.created_at = second.created_at - chrono::Duration::seconds(5);

        let listed = recent(vec![first, second], &Filters::new(), 10);
        assert_eq!(listed[0].id, "second");
        assert_eq!(listed[1].id, "first");
        assert!(listed.iter().all(|i| i.score.is_none()));
    }

    fn embedding() -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(-1.0_f32..1.0, 4)
    }

    proptest! {
        #[test]
        fn higher_threshold_yields_subset_with_same_scores(
            query in embedding(),
            vectors in prop::collection::vec(embedding(), 0..20),
            t1 in -1.0_f32..1.0,
            delta in 0.0_f32..1.0,
        ) {
            let t2 = t1 + delta;
            let items: Vec<MemoryItem> = vectors
                .into_iter()
                .enumerate()
                .map(|(i, v)| item(&format!("m{i:02}"), v, Metadata::new()))
                .collect();

            let low = rank(items.clone(), &query, &Filters::new(), Some(t1), usize::MAX);
            let high = rank(items, &query, &Filters::new(), Some(t2), usize::MAX);

            prop_assert!(high.len() <= low.len());
            for hit in &high {
                let matching = low.iter().find(|l| l.id == hit.id);
                prop_assert!(matching.is_some());
                prop_assert_eq!(matching.and_then(|m| m.score), hit.score);
            }
        }

        #[test]
        fn cosine_is_bounded_and_symmetric(a in embedding(), b in embedding()) {
            let ab = cosine_similarity(&a, &b);
            let ba = cosine_similarity(&b, &a);
            prop_assert!((-1.0..=1.0).contains(&ab));
            prop_assert!((ab - ba).abs() < 1e-6);
        }
    }
}
