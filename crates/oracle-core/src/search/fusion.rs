//! Rank Fusion
//!
//! Deduplicates keyword and vector hit lists by id and combines their
//! normalized scores. A document found by both backends gets a 1.10 boost
//! (capped at 1.0) — agreement between lexically and semantically grounded
//! evidence outranks either alone.

use std::collections::HashMap;

use serde::Serialize;

use super::Weights;

/// Which backend(s) produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Fts,
    Vector,
    Hybrid,
}

/// A fused, deduplicated hit.
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub id: String,
    pub source: MatchSource,
    /// Combined score in [0, 1]
    pub score: f64,
    pub fts_score: Option<f64>,
    pub vector_score: Option<f64>,
}

/// Boost applied when both backends agree on a document.
const HYBRID_BOOST: f64 = 1.10;

/// Fuse normalized `(id, score)` lists. Ordering is by combined score
/// descending; ties break by insertion order, keyword list first.
pub fn fuse(
    keyword: &[(String, f64)],
    vector: &[(String, f64)],
    weights: &Weights,
) -> Vec<FusedHit> {
    let vector_by_id: HashMap<&str, f64> = vector
        .iter()
        .map(|(id, score)| (id.as_str(), *score))
        .collect();

    let mut hits: Vec<FusedHit> = Vec::with_capacity(keyword.len() + vector.len());
    let mut seen: HashMap<&str, ()> = HashMap::new();

    for (id, fts_score) in keyword {
        seen.insert(id.as_str(), ());
        match vector_by_id.get(id.as_str()) {
            Some(v) => hits.push(FusedHit {
                id: id.clone(),
                source: MatchSource::Hybrid,
                score: ((weights.fts * fts_score + weights.vector * v) * HYBRID_BOOST).min(1.0),
                fts_score: Some(*fts_score),
                vector_score: Some(*v),
            }),
            None => hits.push(FusedHit {
                id: id.clone(),
                source: MatchSource::Fts,
                score: weights.fts * fts_score,
                fts_score: Some(*fts_score),
                vector_score: None,
            }),
        }
    }

    for (id, v) in vector {
        if seen.contains_key(id.as_str()) {
            continue;
        }
        hits.push(FusedHit {
            id: id.clone(),
            source: MatchSource::Vector,
            score: weights.vector * v,
            fts_score: None,
            vector_score: Some(*v),
        });
    }

    // Stable sort preserves keyword-first insertion order on ties
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits
}

// ============================================================================
// TESTS
// ============================================================================
