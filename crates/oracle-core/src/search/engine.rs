//! Retrieval Engine
//!
//! Orchestrates one search call: sanitize, run the keyword and vector
//! backends concurrently, normalize both score spaces, fuse, paginate, and
//! log. Either backend may degrade; the final ranking is a deterministic
//! function of the surviving inputs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::document::DocType;
use crate::error::{OracleError, Result};
use crate::project::resolve_scope;
use crate::store::{KeywordHit, Store};
use crate::vector::{distance_to_similarity, VectorBackend};

use super::fusion::{fuse, MatchSource};
use super::{query_weights, sanitize_query, SearchMode, Weights, DEFAULT_WEIGHTS};

/// Maximum allowed limit
pub const MAX_LIMIT: usize = 100;

/// One retrieval request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// None = all types
    pub doc_type: Option<DocType>,
    pub limit: usize,
    pub offset: usize,
    pub mode: SearchMode,
    /// Outer None = not passed; Some(None) = explicit "universal only"
    pub project: Option<Option<String>>,
    /// For project auto-detection when `project` is absent
    pub cwd: Option<PathBuf>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            doc_type: None,
            limit: 10,
            offset: 0,
            mode: SearchMode::Hybrid,
            project: None,
            cwd: None,
        }
    }
}

/// One ranked result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    /// First 500 chars of the chunk
    pub content: String,
    pub source_file: String,
    pub concepts: Vec<String>,
    pub project: Option<String>,
    pub source: MatchSource,
    pub score: f64,
    #[serde(rename = "ftsScore", skip_serializing_if = "Option::is_none")]
    pub fts_score: Option<f64>,
    #[serde(rename = "vectorScore", skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
}

/// The retrieval response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total: i64,
    pub offset: usize,
    pub limit: usize,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Metadata carried alongside a normalized vector hit.
struct VectorHit {
    id: String,
    similarity: f64,
    content: String,
    doc_type: DocType,
    source_file: String,
    concepts: Vec<String>,
    project: Option<String>,
}

/// The hybrid search engine.
pub struct Retrieval {
    store: Arc<Store>,
    vector: Arc<VectorBackend>,
    collection: String,
}

impl Retrieval {
    pub fn new(store: Arc<Store>, vector: Arc<VectorBackend>, collection: impl Into<String>) -> Self {
        Self {
            store,
            vector,
            collection: collection.into(),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn vector(&self) -> &Arc<VectorBackend> {
        &self.vector
    }

    /// Execute one search call (§public contract). Errors are Validation
    /// for bad input, Database when the keyword side fails, Backend only
    /// when vector-only mode cannot reach its backend.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        if request.query.trim().is_empty() {
            return Err(OracleError::Validation("Query cannot be empty".into()));
        }
        if request.limit < 1 || request.limit > MAX_LIMIT {
            return Err(OracleError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }

        let started = Instant::now();
        let scope = resolve_scope(&self.store, request.project.clone(), request.cwd.as_deref())?;
        let sanitized = sanitize_query(&request.query);
        let fetch = request.limit * 2;

        // Keyword side on the blocking pool, vector side on the pipe —
        // concurrently; the fused ranking does not depend on arrival order.
        let keyword_task = if request.mode != SearchMode::Vector {
            let store = Arc::clone(&self.store);
            let scope = scope.clone();
            let doc_type = request.doc_type;
            let sanitized = sanitized.clone();
            Some(tokio::task::spawn_blocking(move || {
                let hits = store.search_keyword(&sanitized, doc_type, &scope, fetch)?;
                let total = store.count_keyword(&sanitized, doc_type, &scope)?;
                Ok::<(Vec<KeywordHit>, i64), OracleError>((hits, total))
            }))
        } else {
            None
        };

        let vector_result = if request.mode != SearchMode::Fts {
            Some(
                self.vector
                    .query(
                        &self.collection,
                        &request.query,
                        fetch,
                        request.doc_type.map(|t| t.as_str()),
                    )
                    .await,
            )
        } else {
            None
        };

        let (keyword_hits, keyword_total) = match keyword_task {
            Some(task) => {
                let joined = task
                    .await
                    .map_err(|e| OracleError::Init(format!("keyword task panicked: {}", e)))?;
                let (hits, total) = joined?;
                (hits, total)
            }
            None => (Vec::new(), 0),
        };

        let mut warning = None;
        let vector_hits: Vec<VectorHit> = match vector_result {
            Some(Ok(raw)) => {
                let mut hits = Vec::with_capacity(raw.ids.len());
                for (i, id) in raw.ids.iter().enumerate() {
                    // Join back against the metadata table for the project
                    // tag; a row missing mid-reindex counts as universal.
                    let project = self.store.project_of(id)?.flatten();
                    if !scope.matches(project.as_deref()) {
                        continue;
                    }
                    let distance = raw.distances.get(i).copied().unwrap_or(2.0);
                    let metadata = raw.metadatas.get(i).cloned().unwrap_or(Value::Null);
                    hits.push(VectorHit {
                        id: id.clone(),
                        similarity: distance_to_similarity(distance),
                        content: raw.documents.get(i).cloned().unwrap_or_default(),
                        doc_type: metadata
                            .get("type")
                            .and_then(Value::as_str)
                            .and_then(DocType::parse)
                            .unwrap_or(DocType::Learning),
                        source_file: metadata
                            .get("source_file")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        concepts: metadata
                            .get("concepts")
                            .and_then(Value::as_str)
                            .map(|s| s.split_whitespace().map(String::from).collect())
                            .unwrap_or_default(),
                        project,
                    });
                }
                hits
            }
            Some(Err(e)) => {
                if request.mode == SearchMode::Vector {
                    return Err(OracleError::Backend(e.to_string()));
                }
                warning = Some(format!(
                    "Vector search unavailable: {}. Using FTS5 only.",
                    e
                ));
                Vec::new()
            }
            None => Vec::new(),
        };

        // Single-backend modes report the backend's own normalized score;
        // only hybrid applies the query-aware weight split.
        let weights: Weights = match request.mode {
            SearchMode::Hybrid => query_weights(&request.query),
            _ => Weights { fts: 1.0, vector: 1.0, label: DEFAULT_WEIGHTS.label },
        };

        let keyword_scored: Vec<(String, f64)> = keyword_hits
            .iter()
            .map(|h| (h.id.clone(), super::normalize_fts_rank(h.rank)))
            .collect();
        let vector_scored: Vec<(String, f64)> = vector_hits
            .iter()
            .map(|h| (h.id.clone(), h.similarity))
            .collect();

        let fused = fuse(&keyword_scored, &vector_scored, &weights);
        let combined_count = fused.len() as i64;

        let keyword_by_id: HashMap<&str, &KeywordHit> =
            keyword_hits.iter().map(|h| (h.id.as_str(), h)).collect();
        let vector_by_id: HashMap<&str, &VectorHit> =
            vector_hits.iter().map(|h| (h.id.as_str(), h)).collect();

        let results: Vec<SearchResult> = fused
            .iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|hit| {
                let (doc_type, content, source_file, concepts, project) =
                    match keyword_by_id.get(hit.id.as_str()) {
                        Some(k) => (
                            k.doc_type,
                            k.content.clone(),
                            k.source_file.clone(),
                            k.concepts.clone(),
                            k.project.clone(),
                        ),
                        None => {
                            let v = vector_by_id
                                .get(hit.id.as_str())
                                .expect("fused hit came from one of the two lists");
                            (
                                v.doc_type,
                                v.content.clone(),
                                v.source_file.clone(),
                                v.concepts.clone(),
                                v.project.clone(),
                            )
                        }
                    };
                SearchResult {
                    id: hit.id.clone(),
                    doc_type,
                    content: content.chars().take(500).collect(),
                    source_file,
                    concepts,
                    project,
                    source: hit.source,
                    score: hit.score,
                    fts_score: hit.fts_score,
                    vector_score: hit.vector_score,
                }
            })
            .collect();

        let total = match request.mode {
            SearchMode::Fts => keyword_total,
            SearchMode::Vector => vector_hits.len() as i64,
            SearchMode::Hybrid => keyword_total.max(combined_count),
        };

        let mode = match request.mode {
            SearchMode::Hybrid => weights.label.to_string(),
            other => other.as_str().to_string(),
        };

        let response = SearchResponse {
            results,
            total,
            offset: request.offset,
            limit: request.limit,
            mode,
            warning,
        };

        // Telemetry happens after the result exists and never blocks it.
        let elapsed_ms = started.elapsed().as_millis() as i64;
        let type_str = request
            .doc_type
            .map(|t| t.as_str())
            .unwrap_or("all");
        self.store.log_search(
            &request.query,
            type_str,
            &response.mode,
            response.total,
            elapsed_ms,
            scope.telemetry_tag(),
        );
        for result in &response.results {
            self.store
                .log_access(&result.id, "search", scope.telemetry_tag());
        }

        Ok(response)
    }
}

// ============================================================================
// TESTS
// ============================================================================
