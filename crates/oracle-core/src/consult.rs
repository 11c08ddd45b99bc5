//! Consult
//!
//! Specialized retrieval that turns a decision question into ranked
//! principles and patterns plus a templated guidance reply. Two typed
//! keyword queries feed the buckets; one type-less vector query enriches
//! both, classified by metadata.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::document::DocType;
use crate::error::{OracleError, Result};
use crate::search::{normalize_fts_rank, sanitize_query};
use crate::store::{ProjectScope, Store};
use crate::vector::{distance_to_similarity, VectorBackend};

/// Per-bucket candidate cap before the top-3 cut
const BUCKET_CAP: usize = 5;

/// Vector query breadth
const VECTOR_K: usize = 15;

/// Guidance snippet length
const SNIPPET_LEN: usize = 150;

/// Closing aphorism, pinned by tests
pub const APHORISM: &str = "Remember: The Oracle Keeps the Human Human.";

/// One ranked consult hit.
#[derive(Debug, Clone, Serialize)]
pub struct ConsultHit {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub content: String,
    pub score: f64,
}

/// Consult response.
#[derive(Debug, Clone, Serialize)]
pub struct ConsultResponse {
    pub decision: String,
    pub principles: Vec<ConsultHit>,
    pub patterns: Vec<ConsultHit>,
    pub guidance: String,
}

/// The consultation synthesizer.
pub struct Consult {
    store: Arc<Store>,
    vector: Arc<VectorBackend>,
    collection: String,
}

struct Candidate {
    id: String,
    doc_type: DocType,
    content: String,
    keyword_score: Option<f64>,
    vector_score: Option<f64>,
}

impl Consult {
    pub fn new(store: Arc<Store>, vector: Arc<VectorBackend>, collection: impl Into<String>) -> Self {
        Self {
            store,
            vector,
            collection: collection.into(),
        }
    }

    /// Answer a decision question.
    pub async fn consult(&self, decision: &str, context: Option<&str>) -> Result<ConsultResponse> {
        if decision.trim().is_empty() {
            return Err(OracleError::Validation("Decision cannot be empty".into()));
        }

        let combined = match context {
            Some(c) if !c.trim().is_empty() => format!("{} {}", decision, c),
            _ => decision.to_string(),
        };
        let sanitized = sanitize_query(&combined);

        let mut principles = self.keyword_bucket(&sanitized, DocType::Principle)?;
        let mut patterns = self.keyword_bucket(&sanitized, DocType::Learning)?;

        // One type-less vector sweep; rows are classified by their own type
        // metadata. Unreachable backend degrades to keyword-only buckets.
        match self
            .vector
            .query(&self.collection, &combined, VECTOR_K, None)
            .await
        {
            Ok(raw) => {
                for (i, id) in raw.ids.iter().enumerate() {
                    let metadata = raw.metadatas.get(i).cloned().unwrap_or(Value::Null);
                    let doc_type = metadata
                        .get("type")
                        .and_then(Value::as_str)
                        .and_then(DocType::parse)
                        .unwrap_or(DocType::Learning);
                    let similarity =
                        distance_to_similarity(raw.distances.get(i).copied().unwrap_or(2.0));
                    let content = raw.documents.get(i).cloned().unwrap_or_default();

                    let bucket = match doc_type {
                        DocType::Principle => &mut principles,
                        DocType::Learning | DocType::Pattern => &mut patterns,
                        DocType::Retro => continue,
                    };
                    merge_vector_hit(bucket, id, doc_type, content, similarity);
                }
            }
            Err(e) => {
                tracing::warn!("oracle: consult vector query degraded: {}", e);
            }
        }

        let principles = finish_bucket(principles);
        let patterns = finish_bucket(patterns);
        let guidance = render_guidance(decision, &principles, &patterns);

        self.store.log_consult(
            decision,
            context,
            principles.len() as i64,
            patterns.len() as i64,
            &guidance,
            None,
        );

        Ok(ConsultResponse {
            decision: decision.to_string(),
            principles,
            patterns,
            guidance,
        })
    }

    fn keyword_bucket(&self, sanitized: &str, doc_type: DocType) -> Result<Vec<Candidate>> {
        // Decisions are natural language: any matching term qualifies a
        // candidate, ranking sorts out relevance.
        let match_expr = sanitized
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" OR ");
        let hits = match self.store.search_keyword(
            &match_expr,
            Some(doc_type),
            &ProjectScope::Any,
            BUCKET_CAP,
        ) {
            Ok(hits) => hits,
            // A query that sanitized to nothing matchable yields an FTS
            // syntax error; consult treats that as an empty bucket.
            Err(OracleError::Database(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(hits
            .into_iter()
            .map(|h| Candidate {
                id: h.id,
                doc_type: h.doc_type,
                content: h.content,
                keyword_score: Some(normalize_fts_rank(h.rank)),
                vector_score: None,
            })
            .collect())
    }
}

fn merge_vector_hit(
    bucket: &mut Vec<Candidate>,
    id: &str,
    doc_type: DocType,
    content: String,
    similarity: f64,
) {
    if let Some(existing) = bucket.iter_mut().find(|c| c.id == id) {
        existing.vector_score = Some(similarity);
        return;
    }
    if bucket.len() < BUCKET_CAP {
        bucket.push(Candidate {
            id: id.to_string(),
            doc_type,
            content,
            keyword_score: None,
            vector_score: Some(similarity),
        });
    }
}

/// Score each candidate (found by both backends: max of the two + 0.1
/// boost, capped at 1.0), sort, take top 3.
fn finish_bucket(candidates: Vec<Candidate>) -> Vec<ConsultHit> {
    let mut hits: Vec<ConsultHit> = candidates
        .into_iter()
        .map(|c| {
            let score = match (c.keyword_score, c.vector_score) {
                (Some(k), Some(v)) => (k.max(v) + 0.1).min(1.0),
                (Some(k), None) => k,
                (None, Some(v)) => v,
                (None, None) => 0.0,
            };
            ConsultHit {
                id: c.id,
                doc_type: c.doc_type,
                content: c.content,
                score,
            }
        })
        .collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(3);
    hits
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    flat.chars().take(SNIPPET_LEN).collect()
}

/// The templated synthesis. The exact shape is a compatibility point.
fn render_guidance(decision: &str, principles: &[ConsultHit], patterns: &[ConsultHit]) -> String {
    if principles.is_empty() && patterns.is_empty() {
        return format!("No matching principles or patterns for: \"{}\"", decision);
    }

    let mut out = format!("Guidance for: \"{}\"\n", decision);
    if !principles.is_empty() {
        out.push_str("\nRelevant principles:\n");
        for (i, p) in principles.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, snippet(&p.content)));
        }
    }
    if !patterns.is_empty() {
        out.push_str("\nRelevant patterns:\n");
        for (i, p) in patterns.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, snippet(&p.content)));
        }
    }
    out.push('\n');
    out.push_str(APHORISM);
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{seed_doc, temp_store};
    use std::time::Duration;

    fn consult_engine() -> (tempfile::TempDir, Consult) {
        let (tmp, store) = temp_store();
        let vector = VectorBackend::new("oracle-embedd-test-missing")
            .with_timeout(Duration::from_millis(100));
        (tmp, Consult::new(Arc::new(store), Arc::new(vector), "oracle_knowledge"))
    }

    #[tokio::test]
    async fn test_empty_decision_rejected() {
        let (_tmp, consult) = consult_engine();
        assert!(matches!(
            consult.consult("  ", None).await.unwrap_err(),
            OracleError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_buckets_template() {
        let (_tmp, consult) = consult_engine();
        let response = consult.consult("should I do the thing?", None).await.unwrap();
        assert!(response.principles.is_empty());
        assert!(response.patterns.is_empty());
        assert_eq!(
            response.guidance,
            "No matching principles or patterns for: \"should I do the thing?\""
        );
    }

    #[tokio::test]
    async fn test_both_buckets_populated() {
        let (_tmp, consult) = consult_engine();
        seed_doc(
            consult.store.as_ref(),
            "resonance_core_0",
            DocType::Principle,
            "Nothing is Deleted: append only, preserve history",
        );
        seed_doc(
            consult.store.as_ref(),
            "learning_trash",
            DocType::Learning,
            "Use move-to-trash instead of rm -rf when deleting build output",
        );

        let response = consult
            .consult("should I rm -rf and delete the build dir?", Some("cleaning up artifacts"))
            .await
            .unwrap();

        assert!(!response.principles.is_empty());
        assert!(!response.patterns.is_empty());
        assert!(response.guidance.contains("Relevant principles:"));
        assert!(response.guidance.contains("Relevant patterns:"));
        assert!(response.guidance.ends_with(APHORISM));
    }

    #[tokio::test]
    async fn test_buckets_capped_at_three() {
        let (_tmp, consult) = consult_engine();
        for i in 0..5 {
            seed_doc(
                consult.store.as_ref(),
                &format!("p{}", i),
                DocType::Principle,
                &format!("principle about careful deletion number {}", i),
            );
        }

        let response = consult.consult("careful deletion", None).await.unwrap();
        assert!(response.principles.len() <= 3);
    }

    #[tokio::test]
    async fn test_consult_log_written() {
        let (_tmp, consult) = consult_engine();
        consult.consult("log me", None).await.unwrap();

        let reader = consult.store.reader().unwrap();
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM consult_log", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_guidance_snippet_truncation() {
        let long = "word ".repeat(100);
        let hit = ConsultHit {
            id: "x".into(),
            doc_type: DocType::Principle,
            content: long,
            score: 1.0,
        };
        let guidance = render_guidance("q", &[hit], &[]);
        let line = guidance
            .lines()
            .find(|l| l.starts_with("1. "))
            .unwrap();
        assert!(line.chars().count() <= SNIPPET_LEN + 3);
    }

    #[test]
    fn test_both_boost_rule() {
        let candidates = vec![
            Candidate {
                id: "both".into(),
                doc_type: DocType::Principle,
                content: String::new(),
                keyword_score: Some(0.6),
                vector_score: Some(0.7),
            },
            Candidate {
                id: "kw".into(),
                doc_type: DocType::Principle,
                content: String::new(),
                keyword_score: Some(0.75),
                vector_score: None,
            },
        ];
        let hits = finish_bucket(candidates);
        assert_eq!(hits[0].id, "both");
        assert!((hits[0].score - 0.8).abs() < 1e-9);
        assert!((hits[1].score - 0.75).abs() < 1e-9);
    }
}
