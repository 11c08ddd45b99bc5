//! Learn
//!
//! Appends a new pattern to the corpus: a markdown file under
//! `ψ/memory/learnings/` plus metadata and keyword-index rows. The vector
//! index is deliberately not touched — newly-learned documents become
//! vector-searchable at the next full re-index.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::document::{DocType, DocumentMeta, Origin, ParsedDocument};
use crate::error::{OracleError, Result};
use crate::parser::extract_concepts;
use crate::project::resolve_scope;
use crate::store::Store;

/// Slug length cap
const SLUG_MAX: usize = 50;

/// Preview length for learn_log
const PREVIEW_LEN: usize = 100;

/// Input for one learn call.
#[derive(Debug, Clone, Default)]
pub struct LearnRequest {
    pub pattern: String,
    pub source: Option<String>,
    pub concepts: Vec<String>,
    pub origin: Option<Origin>,
    /// Outer None = not passed; Some(None) = explicitly universal
    pub project: Option<Option<String>>,
    pub cwd: Option<PathBuf>,
}

/// Result of one learn call.
#[derive(Debug, Clone, Serialize)]
pub struct LearnResponse {
    pub id: String,
    pub file: String,
    pub concepts: Vec<String>,
    pub project: Option<String>,
}

pub struct Learn {
    store: Arc<Store>,
    learnings_dir: PathBuf,
}

/// Slugify the first non-empty line of a pattern: lowercase, keep
/// `[a-z0-9\s-]`, collapse whitespace to `-`, trim `-`, cap at 50 chars.
fn slugify(pattern: &str) -> String {
    let line = pattern
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let kept: String = line
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();
    let slug = kept
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .trim_matches('-')
        .to_string();
    let slug: String = slug.chars().take(SLUG_MAX).collect();
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "pattern".to_string()
    } else {
        slug
    }
}

impl Learn {
    pub fn new(store: Arc<Store>, learnings_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            learnings_dir: learnings_dir.into(),
        }
    }

    /// Append one learning. The markdown file is written first, then the
    /// store rows commit before this returns; a duplicate filename on the
    /// same day is a Conflict, never a silent overwrite.
    pub fn learn(&self, request: LearnRequest) -> Result<LearnResponse> {
        if request.pattern.trim().is_empty() {
            return Err(OracleError::Validation("Pattern cannot be empty".into()));
        }

        let now = Utc::now();
        let date = now.format("%Y-%m-%d").to_string();
        let slug = slugify(&request.pattern);
        let filename = format!("{}_{}.md", date, slug);
        let path = self.learnings_dir.join(&filename);

        if path.exists() {
            return Err(OracleError::Conflict(format!(
                "File already exists: {}",
                filename
            )));
        }

        let scope = resolve_scope(&self.store, request.project.clone(), request.cwd.as_deref())?;
        let project = scope.telemetry_tag().map(String::from);

        let title = request
            .pattern
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("Pattern")
            .to_string();

        let mut concepts = request.concepts.clone();
        if concepts.is_empty() {
            concepts = extract_concepts(&request.pattern);
        }

        let markdown = render_markdown(&title, &concepts, &date, request.source.as_deref(), &request.pattern);

        std::fs::create_dir_all(&self.learnings_dir)?;
        std::fs::write(&path, &markdown)?;

        let id = format!("learning_{}_{}", date, slug);
        self.store.insert_document(&DocumentMeta {
            id: id.clone(),
            doc_type: DocType::Learning,
            source_file: format!("learnings/{}", filename),
            concepts: concepts.clone(),
            project: project.clone(),
            created_at: now,
            updated_at: now,
            indexed_at: now,
            superseded_by: None,
            superseded_at: None,
            superseded_reason: None,
            origin: request.origin,
            created_by: Some(
                request
                    .origin
                    .map(|o| o.as_str().to_string())
                    .unwrap_or_else(|| "oracle-learn".to_string()),
            ),
        })?;
        self.store.insert_fts(&ParsedDocument {
            id: id.clone(),
            doc_type: DocType::Learning,
            title,
            content: markdown,
            source_file: format!("learnings/{}", filename),
            concepts: concepts.clone(),
        })?;

        let preview: String = request.pattern.chars().take(PREVIEW_LEN).collect();
        self.store.log_learn(
            &id,
            &preview,
            request.source.as_deref(),
            &concepts,
            project.as_deref(),
        );

        Ok(LearnResponse {
            id,
            file: path.to_string_lossy().into_owned(),
            concepts,
            project,
        })
    }
}

fn render_markdown(
    title: &str,
    concepts: &[String],
    date: &str,
    source: Option<&str>,
    pattern: &str,
) -> String {
    format!(
        "---\ntitle: {}\ntags: [{}]\ncreated: {}\nsource: {}\n---\n\n# {}\n\n{}\n\n---\n*Added via Oracle Learn*\n",
        title,
        concepts.join(", "),
        date,
        source.unwrap_or("oracle-learn"),
        title,
        pattern,
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{Retrieval, SearchMode, SearchRequest};
    use crate::store::tests::temp_store;
    use crate::vector::VectorBackend;
    use std::time::Duration;
    use tempfile::TempDir;

    fn learn_engine() -> (TempDir, TempDir, Learn) {
        let (db, store) = temp_store();
        let dir = TempDir::new().unwrap();
        let learn = Learn::new(Arc::new(store), dir.path().join("learnings"));
        (db, dir, learn)
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Always Verify Before Destructive Ops!"), "always-verify-before-destructive-ops");
        assert_eq!(slugify("  \nSecond line is first non-empty\nthird"), "second-line-is-first-non-empty");
        assert_eq!(slugify("!!!"), "pattern");
        let long = "word ".repeat(30);
        assert!(slugify(&long).chars().count() <= SLUG_MAX);
    }

    #[test]
    fn test_learn_writes_file_and_rows() {
        let (_db, _dir, learn) = learn_engine();
        let response = learn
            .learn(LearnRequest {
                pattern: "always verify before destructive operations".into(),
                concepts: vec!["safety".into(), "git".into()],
                ..Default::default()
            })
            .unwrap();

        let date = Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(
            response.id,
            format!("learning_{}_always-verify-before-destructive-operations", date)
        );

        let markdown = std::fs::read_to_string(&response.file).unwrap();
        assert!(markdown.starts_with("---\ntitle: always verify before destructive operations\n"));
        assert!(markdown.contains("tags: [safety, git]"));
        assert!(markdown.ends_with("*Added via Oracle Learn*\n"));
        // The pattern appears exactly once in the body
        assert_eq!(
            markdown.matches("always verify before destructive operations").count(),
            3 // front-matter title, heading, body
        );

        let meta = learn.store.get_document(&response.id).unwrap().unwrap();
        assert_eq!(meta.doc_type, DocType::Learning);
        assert_eq!(meta.concepts, vec!["safety", "git"]);
    }

    #[test]
    fn test_learn_duplicate_same_day_conflicts() {
        let (_db, _dir, learn) = learn_engine();
        let request = LearnRequest {
            pattern: "the same pattern twice".into(),
            ..Default::default()
        };
        learn.learn(request.clone()).unwrap();
        let err = learn.learn(request).unwrap_err();
        assert!(matches!(err, OracleError::Conflict(_)));
    }

    #[test]
    fn test_learn_empty_pattern_rejected() {
        let (_db, _dir, learn) = learn_engine();
        let err = learn
            .learn(LearnRequest {
                pattern: "  \n ".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, OracleError::Validation(_)));
    }

    #[test]
    fn test_learn_log_written() {
        let (_db, _dir, learn) = learn_engine();
        learn
            .learn(LearnRequest {
                pattern: "logged pattern".into(),
                source: Some("retro".into()),
                ..Default::default()
            })
            .unwrap();

        let reader = learn.store.reader().unwrap();
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM learn_log", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_learn_immediately_keyword_searchable() {
        let (_db, _dir, learn) = learn_engine();
        learn
            .learn(LearnRequest {
                pattern: "always verify before destructive operations".into(),
                concepts: vec!["safety".into()],
                ..Default::default()
            })
            .unwrap();

        let vector = Arc::new(
            VectorBackend::new("oracle-embedd-test-missing")
                .with_timeout(Duration::from_millis(100)),
        );
        let engine = Retrieval::new(Arc::clone(&learn.store), vector, "oracle_knowledge");
        let mut req = SearchRequest::new("destructive operations");
        req.mode = SearchMode::Fts;
        let response = engine.search(req).await.unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].doc_type, DocType::Learning);
        assert!(response.results[0].score > 0.0);
        assert!(response.results[0].concepts.contains(&"safety".to_string()));
    }

    #[test]
    fn test_learn_concepts_extracted_when_absent() {
        let (_db, _dir, learn) = learn_engine();
        let response = learn
            .learn(LearnRequest {
                pattern: "trust the append-only history".into(),
                ..Default::default()
            })
            .unwrap();
        assert!(response.concepts.contains(&"trust".to_string()));
        assert!(response.concepts.contains(&"append".to_string()));
    }
}
