//! Dashboard Aggregations
//!
//! Read-only rollups over the telemetry tables. These functions never
//! write; they exist to feed the dashboard routes and `oracle_stats`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rusqlite::params;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::store::Store;

/// Activity feed row cap per table
const ACTIVITY_CAP: usize = 20;

/// Truncation width for activity content fields
const ACTIVITY_PREVIEW: usize = 80;

/// Corpus + activity summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_documents: i64,
    pub by_type: Vec<TypeCount>,
    pub total_concepts: i64,
    pub top_concepts: Vec<ConceptCount>,
    pub consultations_7d: i64,
    pub searches_7d: i64,
    pub learnings_7d: i64,
    pub fts_status: String,
    pub last_indexed: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConceptCount {
    pub concept: String,
    pub count: i64,
}

/// Session activity counts since a timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub searches: i64,
    pub consultations: i64,
    pub learnings: i64,
}

pub struct Dashboard {
    store: Arc<Store>,
}

impl Dashboard {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn count_since(&self, table: &str, since: &str) -> Result<i64> {
        let reader = self.store.reader()?;
        let sql = format!("SELECT COUNT(*) FROM {} WHERE created_at > ?1", table);
        let n = reader.query_row(&sql, params![since], |r| r.get(0))?;
        Ok(n)
    }

    /// The `oracle_stats` / `/api/stats` summary.
    pub fn summary(&self) -> Result<Summary> {
        let total_documents = self.store.document_count()?;
        let by_type = self
            .store
            .counts_by_type()?
            .into_iter()
            .map(|(doc_type, count)| TypeCount { doc_type, count })
            .collect();

        let all_concepts = self.store.concept_counts(None, usize::MAX)?;
        let total_concepts = all_concepts.len() as i64;
        let top_concepts = all_concepts
            .into_iter()
            .take(10)
            .map(|(concept, count)| ConceptCount { concept, count })
            .collect();

        let week_ago = (Utc::now() - Duration::days(7)).to_rfc3339();
        let consultations_7d = self.count_since("consult_log", &week_ago)?;
        let searches_7d = self.count_since("search_log", &week_ago)?;
        let learnings_7d = self.count_since("learn_log", &week_ago)?;

        let status = self.store.indexing_status()?;
        let fts_status = if status.is_indexing {
            "indexing".to_string()
        } else if status.error.is_some() {
            "error".to_string()
        } else {
            "ok".to_string()
        };

        Ok(Summary {
            total_documents,
            by_type,
            total_concepts,
            top_concepts,
            consultations_7d,
            searches_7d,
            learnings_7d,
            fts_status,
            last_indexed: status.completed_at.map(|dt| dt.to_rfc3339()),
        })
    }

    /// Recent rows per log table, capped at 20 each, preview-truncated.
    pub fn activity(&self, days: i64) -> Result<Value> {
        let since = (Utc::now() - Duration::days(days.clamp(1, 90))).to_rfc3339();
        let reader = self.store.reader()?;

        let truncate = |s: String| -> String {
            let preview: String = s.chars().take(ACTIVITY_PREVIEW).collect();
            if preview.chars().count() < s.chars().count() {
                format!("{}...", preview)
            } else {
                preview
            }
        };

        let mut searches = Vec::new();
        {
            let mut stmt = reader.prepare(
                "SELECT query, mode, results_count, created_at FROM search_log
                 WHERE created_at > ?1 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![since, ACTIVITY_CAP as i64], |r| {
                Ok(json!({
                    "query": truncate(r.get::<_, String>(0)?),
                    "mode": r.get::<_, Option<String>>(1)?,
                    "resultsCount": r.get::<_, i64>(2)?,
                    "createdAt": r.get::<_, String>(3)?,
                }))
            })?;
            for row in rows {
                searches.push(row?);
            }
        }

        let mut consultations = Vec::new();
        {
            let mut stmt = reader.prepare(
                "SELECT decision, principles_found, patterns_found, created_at FROM consult_log
                 WHERE created_at > ?1 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![since, ACTIVITY_CAP as i64], |r| {
                Ok(json!({
                    "decision": truncate(r.get::<_, String>(0)?),
                    "principlesFound": r.get::<_, i64>(1)?,
                    "patternsFound": r.get::<_, i64>(2)?,
                    "createdAt": r.get::<_, String>(3)?,
                }))
            })?;
            for row in rows {
                consultations.push(row?);
            }
        }

        let mut learnings = Vec::new();
        {
            let mut stmt = reader.prepare(
                "SELECT document_id, pattern_preview, created_at FROM learn_log
                 WHERE created_at > ?1 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![since, ACTIVITY_CAP as i64], |r| {
                Ok(json!({
                    "documentId": r.get::<_, String>(0)?,
                    "preview": truncate(r.get::<_, Option<String>>(1)?.unwrap_or_default()),
                    "createdAt": r.get::<_, String>(2)?,
                }))
            })?;
            for row in rows {
                learnings.push(row?);
            }
        }

        Ok(json!({
            "days": days,
            "searches": searches,
            "consultations": consultations,
            "learnings": learnings,
        }))
    }

    /// Per-day counts of new documents, consultations, and searches.
    /// Period maps week/month/quarter onto 7/30/90 days.
    pub fn growth(&self, period: &str) -> Result<Value> {
        let days: i64 = match period {
            "month" => 30,
            "quarter" => 90,
            _ => 7,
        };
        let since = (Utc::now() - Duration::days(days)).to_rfc3339();
        let reader = self.store.reader()?;

        let per_day = |table: &str, column: &str| -> Result<Vec<Value>> {
            let sql = format!(
                "SELECT date({0}), COUNT(*) FROM {1} WHERE {0} > ?1 GROUP BY date({0}) ORDER BY date({0})",
                column, table
            );
            let mut stmt = reader.prepare(&sql)?;
            let rows = stmt.query_map(params![since], |r| {
                Ok(json!({
                    "date": r.get::<_, String>(0)?,
                    "count": r.get::<_, i64>(1)?,
                }))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        };

        Ok(json!({
            "period": period,
            "days": days,
            "documents": per_day("oracle_documents", "indexed_at")?,
            "consultations": per_day("consult_log", "created_at")?,
            "searches": per_day("search_log", "created_at")?,
        }))
    }

    /// Counts of activity rows newer than `since` (RFC3339).
    pub fn session_stats(&self, since: &str) -> Result<SessionStats> {
        Ok(SessionStats {
            searches: self.count_since("search_log", since)?,
            consultations: self.count_since("consult_log", since)?,
            learnings: self.count_since("learn_log", since)?,
        })
    }

    /// `/api/graph`: principles plus a sample of learnings; edges connect
    /// documents sharing concepts with weight = |A ∩ B|.
    pub fn graph(&self, learning_sample: usize) -> Result<Value> {
        let docs = self.store.graph_documents(learning_sample)?;

        let nodes: Vec<Value> = docs
            .iter()
            .map(|d| {
                json!({
                    "id": d.id,
                    "type": d.doc_type,
                    "sourceFile": d.source_file,
                    "concepts": d.concepts,
                })
            })
            .collect();

        let mut edges = Vec::new();
        for (i, a) in docs.iter().enumerate() {
            for b in docs.iter().skip(i + 1) {
                let weight = a
                    .concepts
                    .iter()
                    .filter(|c| b.concepts.contains(c))
                    .count();
                if weight > 0 {
                    edges.push(json!({
                        "source": a.id,
                        "target": b.id,
                        "weight": weight,
                    }));
                }
            }
        }

        Ok(json!({ "nodes": nodes, "edges": edges }))
    }
}

// ============================================================================
// TESTS
// ============================================================================
