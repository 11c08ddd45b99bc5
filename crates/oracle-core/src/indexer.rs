//! Indexer
//!
//! One-shot job that rebuilds both indices from the markdown corpus:
//! clear, parse the three subtrees, write metadata + keyword rows, batch
//! vector upserts. The store side is authoritative; the vector side may
//! degrade. Progress is published through the indexing-status singleton,
//! which also acts as the global indexing mutex.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use crate::document::{DocumentMeta, ParsedDocument};
use crate::error::{OracleError, Result};
use crate::parser::Parser;
use crate::store::Store;
use crate::vector::{VectorBackend, VectorItem, UPSERT_BATCH};

/// Outcome of one indexing run.
#[derive(Debug, Clone)]
pub struct IndexReport {
    pub documents: usize,
    pub vector_indexed: usize,
    /// False when the vector backend was unreachable during the run
    pub vector_ok: bool,
    pub duration_ms: u128,
}

pub struct Indexer {
    store: Arc<Store>,
    vector: Arc<VectorBackend>,
    collection: String,
    memory_root: PathBuf,
}

impl Indexer {
    pub fn new(
        store: Arc<Store>,
        vector: Arc<VectorBackend>,
        collection: impl Into<String>,
        memory_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            vector,
            collection: collection.into(),
            memory_root: memory_root.into(),
        }
    }

    /// Run one full re-index to completion.
    pub async fn run(&self) -> Result<IndexReport> {
        let status = self.store.indexing_status()?;
        if status.is_indexing {
            return Err(OracleError::Conflict("Indexing already in progress".into()));
        }

        self.store.begin_indexing(0)?;
        match self.run_inner().await {
            Ok(report) => {
                self.store.finish_indexing(None)?;
                info!(
                    documents = report.documents,
                    vector_indexed = report.vector_indexed,
                    duration_ms = report.duration_ms as u64,
                    "Indexing complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.store.finish_indexing(Some(&e.to_string()))?;
                Err(e)
            }
        }
    }

    async fn run_inner(&self) -> Result<IndexReport> {
        let started = Instant::now();

        // Clear both indices. The rebuild is the only way to reconcile
        // chunk-boundary drift, so this is the one sanctioned deviation
        // from append-only.
        self.store.clear_index()?;

        let mut vector_ok = true;
        if let Err(e) = self.vector.delete_collection(&self.collection).await {
            warn!("oracle: vector collection delete failed: {}", e);
            vector_ok = false;
        }
        if vector_ok {
            if let Err(e) = self.vector.ensure_collection(&self.collection).await {
                warn!("oracle: vector collection create failed: {}", e);
                vector_ok = false;
            }
        }

        // Parse the three subtrees in order, accumulating in memory.
        let docs = Parser::new(&self.memory_root).parse_corpus()?;
        let total = docs.len();
        self.store.update_indexing_progress(0, total as i64)?;

        let mut staged: Vec<VectorItem> = Vec::with_capacity(total.min(UPSERT_BATCH));
        let mut vector_indexed = 0usize;

        for (i, doc) in docs.iter().enumerate() {
            self.insert_document(doc)?;

            staged.push(VectorItem {
                id: doc.id.clone(),
                text: doc.content.clone(),
                metadata: serde_json::json!({
                    "type": doc.doc_type.as_str(),
                    "source_file": doc.source_file,
                    "concepts": doc.concepts.join(" "),
                }),
            });
            if staged.len() == UPSERT_BATCH {
                vector_indexed += self.flush_batch(&mut staged, &mut vector_ok).await;
            }

            if (i + 1) % 10 == 0 || i + 1 == total {
                self.store
                    .update_indexing_progress((i + 1) as i64, total as i64)?;
            }
        }
        vector_indexed += self.flush_batch(&mut staged, &mut vector_ok).await;

        Ok(IndexReport {
            documents: total,
            vector_indexed,
            vector_ok,
            duration_ms: started.elapsed().as_millis(),
        })
    }

    /// Metadata + keyword rows for one chunk. All three timestamps are
    /// indexer time; source mtime is deliberately ignored.
    fn insert_document(&self, doc: &ParsedDocument) -> Result<()> {
        let now = Utc::now();
        self.store.insert_document(&DocumentMeta {
            id: doc.id.clone(),
            doc_type: doc.doc_type,
            source_file: doc.source_file.clone(),
            concepts: doc.concepts.clone(),
            project: None,
            created_at: now,
            updated_at: now,
            indexed_at: now,
            superseded_by: None,
            superseded_at: None,
            superseded_reason: None,
            origin: None,
            created_by: None,
        })?;
        self.store.insert_fts(doc)?;
        Ok(())
    }

    /// Upsert one staged batch; a failed batch marks the backend degraded
    /// and later batches are skipped (the store side stays authoritative).
    async fn flush_batch(&self, staged: &mut Vec<VectorItem>, vector_ok: &mut bool) -> usize {
        if staged.is_empty() {
            return 0;
        }
        let batch = std::mem::take(staged);
        if !*vector_ok {
            return 0;
        }
        match self.vector.upsert(&self.collection, &batch).await {
            Ok(()) => batch.len(),
            Err(e) => {
                warn!("oracle: vector upsert failed, continuing store-only: {}", e);
                *vector_ok = false;
                0
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocType;
    use crate::search::{Retrieval, SearchMode, SearchRequest};
    use crate::store::tests::temp_store;
    use std::time::Duration;
    use tempfile::TempDir;

    fn dead_vector() -> Arc<VectorBackend> {
        Arc::new(
            VectorBackend::new("oracle-embedd-test-missing")
                .with_timeout(Duration::from_millis(100)),
        )
    }

    fn corpus(tmp: &TempDir, rel: &str, content: &str) {
        let path = tmp.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_empty_corpus_indexes_cleanly() {
        let (_db, store) = temp_store();
        let corpus_dir = TempDir::new().unwrap();
        let store = Arc::new(store);
        let indexer = Indexer::new(
            Arc::clone(&store),
            dead_vector(),
            "oracle_knowledge",
            corpus_dir.path(),
        );

        let report = indexer.run().await.unwrap();
        assert_eq!(report.documents, 0);
        assert!(!report.vector_ok);
        assert_eq!(store.document_count().unwrap(), 0);

        let status = store.indexing_status().unwrap();
        assert!(!status.is_indexing);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_canonical_seed_three_documents() {
        let (_db, store) = temp_store();
        let corpus_dir = TempDir::new().unwrap();
        corpus(
            &corpus_dir,
            "resonance/core.md",
            "### 1. Nothing is Deleted\n- append only\n- preserve history\n",
        );

        let store = Arc::new(store);
        let indexer = Indexer::new(
            Arc::clone(&store),
            dead_vector(),
            "oracle_knowledge",
            corpus_dir.path(),
        );
        let report = indexer.run().await.unwrap();
        assert_eq!(report.documents, 3);

        // Two-store parity on the store side
        assert_eq!(store.document_ids().unwrap(), store.fts_ids().unwrap());

        // Both the parent section and the bullet sub-document are reachable
        // by keyword search
        let engine = Retrieval::new(Arc::clone(&store), dead_vector(), "oracle_knowledge");
        let mut req = SearchRequest::new("append");
        req.mode = SearchMode::Fts;
        let response = engine.search(req).await.unwrap();
        let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"resonance_core_0"));
        assert!(ids.contains(&"resonance_core_0_sub_0"));
    }

    #[tokio::test]
    async fn test_reindex_rebuild_parity() {
        let (_db, store) = temp_store();
        let corpus_dir = TempDir::new().unwrap();
        corpus(&corpus_dir, "learnings/one.md", "First learning body.\n");

        let store = Arc::new(store);
        let indexer = Indexer::new(
            Arc::clone(&store),
            dead_vector(),
            "oracle_knowledge",
            corpus_dir.path(),
        );
        indexer.run().await.unwrap();
        assert_eq!(store.document_count().unwrap(), 1);

        corpus(&corpus_dir, "learnings/two.md", "Second learning body.\n");
        indexer.run().await.unwrap();

        let doc_ids = store.document_ids().unwrap();
        assert_eq!(doc_ids.len(), 2);
        assert_eq!(doc_ids, store.fts_ids().unwrap());
        assert!(store.get_document("learning_one").unwrap().is_some());
        assert_eq!(
            store
                .get_document("learning_two")
                .unwrap()
                .unwrap()
                .doc_type,
            DocType::Learning
        );
    }

    #[tokio::test]
    async fn test_concurrent_start_rejected() {
        let (_db, store) = temp_store();
        let corpus_dir = TempDir::new().unwrap();
        let store = Arc::new(store);
        store.begin_indexing(10).unwrap();

        let indexer = Indexer::new(
            Arc::clone(&store),
            dead_vector(),
            "oracle_knowledge",
            corpus_dir.path(),
        );
        let err = indexer.run().await.unwrap_err();
        assert!(matches!(err, OracleError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_progress_totals_published() {
        let (_db, store) = temp_store();
        let corpus_dir = TempDir::new().unwrap();
        corpus(
            &corpus_dir,
            "resonance/core.md",
            "### A\nbody a\n### B\nbody b\n",
        );

        let store = Arc::new(store);
        let indexer = Indexer::new(
            Arc::clone(&store),
            dead_vector(),
            "oracle_knowledge",
            corpus_dir.path(),
        );
        indexer.run().await.unwrap();

        let status = store.indexing_status().unwrap();
        assert_eq!(status.progress_total, 2);
        assert_eq!(status.progress_current, 2);
        assert!(status.completed_at.is_some());
    }
}
