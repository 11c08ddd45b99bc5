//! SQLite Store
//!
//! Durable, single-writer, many-reader storage: document metadata, the FTS5
//! keyword index, projects, the indexing-status singleton, and the
//! append-only telemetry tables.
//!
//! Uses separate reader/writer connections for interior mutability. All
//! methods take `&self`, making Store `Send + Sync` so the protocol layers
//! can share an `Arc<Store>`.

pub mod migrations;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::document::{DocType, DocumentMeta, Origin, ParsedDocument, Project};
use crate::error::{OracleError, Result};

/// Project filter applied to both retrieval backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectScope {
    /// No filter at all (neither project nor cwd supplied)
    Any,
    /// Explicit empty project: universal rows only
    UniversalOnly,
    /// Rows tagged with this project OR universal rows
    Project(String),
}

impl ProjectScope {
    /// Whether a row with the given project tag passes this scope.
    pub fn matches(&self, project: Option<&str>) -> bool {
        match self {
            ProjectScope::Any => true,
            ProjectScope::UniversalOnly => project.is_none(),
            ProjectScope::Project(p) => project.is_none() || project == Some(p.as_str()),
        }
    }

    /// Project tag to stamp onto telemetry rows.
    pub fn telemetry_tag(&self) -> Option<&str> {
        match self {
            ProjectScope::Project(p) => Some(p.as_str()),
            _ => None,
        }
    }
}

/// One keyword-index hit, joined against the metadata table.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub id: String,
    pub doc_type: DocType,
    pub title: String,
    pub content: String,
    pub source_file: String,
    pub concepts: Vec<String>,
    pub project: Option<String>,
    /// FTS5 bm25 rank: negative, more negative = better
    pub rank: f64,
}

/// A document row with content, as returned by list/reflect/graph reads.
#[derive(Debug, Clone, Serialize)]
pub struct StoredDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub title: String,
    pub content: String,
    pub source_file: String,
    pub concepts: Vec<String>,
    pub project: Option<String>,
    pub indexed_at: DateTime<Utc>,
}

/// The indexing-status singleton row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingStatus {
    pub is_indexing: bool,
    pub progress_current: i64,
    pub progress_total: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Main store with writer/reader connection pair.
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    path: PathBuf,
}

impl Store {
    /// Apply PRAGMAs to a connection.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at `path` and apply migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let writer_conn = Connection::open(path)?;
        Self::configure_connection(&writer_conn)?;
        migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            path: path.to_path_buf(),
        })
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| OracleError::Init("Writer lock poisoned".into()))
    }

    pub(crate) fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| OracleError::Init("Reader lock poisoned".into()))
    }

    /// Parse RFC3339 timestamp stored as text.
    pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    pub(crate) fn parse_opt_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
        value.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
    }

    pub(crate) fn parse_json_array(value: &str) -> Vec<String> {
        serde_json::from_str(value).unwrap_or_default()
    }

    // ========================================================================
    // DOCUMENTS
    // ========================================================================

    /// Insert (or replace) a document metadata row.
    pub fn insert_document(&self, meta: &DocumentMeta) -> Result<()> {
        let concepts = serde_json::to_string(&meta.concepts).unwrap_or_else(|_| "[]".into());
        let writer = self.writer()?;
        writer.execute(
            "INSERT OR REPLACE INTO oracle_documents (
                id, type, source_file, concepts, project,
                created_at, updated_at, indexed_at,
                superseded_by, superseded_at, superseded_reason,
                origin, created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                meta.id,
                meta.doc_type.as_str(),
                meta.source_file,
                concepts,
                meta.project,
                meta.created_at.to_rfc3339(),
                meta.updated_at.to_rfc3339(),
                meta.indexed_at.to_rfc3339(),
                meta.superseded_by,
                meta.superseded_at.map(|dt| dt.to_rfc3339()),
                meta.superseded_reason,
                meta.origin.map(|o| o.as_str()),
                meta.created_by,
            ],
        )?;
        Ok(())
    }

    /// Insert the keyword-index row for a document.
    pub fn insert_fts(&self, doc: &ParsedDocument) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO oracle_fts (id, type, title, content, concepts)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                doc.id,
                doc.doc_type.as_str(),
                doc.title,
                doc.content,
                doc.concepts.join(" "),
            ],
        )?;
        Ok(())
    }

    /// Truncate both the metadata table and the keyword index. The only
    /// deviation from append-only; used by the full re-index (which holds
    /// the indexing-status mutex).
    pub fn clear_index(&self) -> Result<()> {
        let writer = self.writer()?;
        writer.execute_batch("DELETE FROM oracle_fts; DELETE FROM oracle_documents;")?;
        Ok(())
    }

    /// Fetch a document metadata row.
    pub fn get_document(&self, id: &str) -> Result<Option<DocumentMeta>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, type, source_file, concepts, project,
                    created_at, updated_at, indexed_at,
                    superseded_by, superseded_at, superseded_reason,
                    origin, created_by
             FROM oracle_documents WHERE id = ?1",
        )?;
        let meta = stmt
            .query_row(params![id], Self::row_to_meta)
            .optional()?;
        Ok(meta)
    }

    fn row_to_meta(row: &rusqlite::Row) -> rusqlite::Result<DocumentMeta> {
        let type_str: String = row.get(1)?;
        let concepts: String = row.get(3)?;
        let created: String = row.get(5)?;
        let updated: String = row.get(6)?;
        let indexed: String = row.get(7)?;
        let superseded_at: Option<String> = row.get(9)?;
        let origin: Option<String> = row.get(11)?;

        Ok(DocumentMeta {
            id: row.get(0)?,
            doc_type: DocType::parse(&type_str).unwrap_or(DocType::Learning),
            source_file: row.get(2)?,
            concepts: Self::parse_json_array(&concepts),
            project: row.get(4)?,
            created_at: Self::parse_timestamp(&created),
            updated_at: Self::parse_timestamp(&updated),
            indexed_at: Self::parse_timestamp(&indexed),
            superseded_by: row.get(8)?,
            superseded_at: Self::parse_opt_timestamp(superseded_at),
            superseded_reason: row.get(10)?,
            origin: origin.as_deref().and_then(Origin::parse),
            created_by: row.get(12)?,
        })
    }

    /// Total number of documents.
    pub fn document_count(&self) -> Result<i64> {
        let reader = self.reader()?;
        let n = reader.query_row("SELECT COUNT(*) FROM oracle_documents", [], |r| r.get(0))?;
        Ok(n)
    }

    /// Document counts grouped by type.
    pub fn counts_by_type(&self) -> Result<Vec<(String, i64)>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT type, COUNT(*) FROM oracle_documents GROUP BY type ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// All document ids (re-index parity checks).
    pub fn document_ids(&self) -> Result<Vec<String>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT id FROM oracle_documents ORDER BY id")?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// All keyword-index ids.
    pub fn fts_ids(&self) -> Result<Vec<String>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT id FROM oracle_fts ORDER BY id")?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Mark `old_id` as superseded by `new_id`. Provenance fields are write-
    /// once: a document that is already superseded is left untouched.
    pub fn supersede(&self, old_id: &str, new_id: &str, reason: Option<&str>) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE oracle_documents
             SET superseded_by = ?1, superseded_at = ?2, superseded_reason = ?3
             WHERE id = ?4 AND superseded_by IS NULL",
            params![new_id, Utc::now().to_rfc3339(), reason, old_id],
        )?;
        if changed == 0 {
            return Err(OracleError::NotFound(format!(
                "Document not found or already superseded: {}",
                old_id
            )));
        }
        Ok(())
    }

    // ========================================================================
    // KEYWORD SEARCH
    // ========================================================================

    fn scope_clause(scope: &ProjectScope) -> (&'static str, Option<&str>) {
        match scope {
            ProjectScope::Any => ("", None),
            ProjectScope::UniversalOnly => (" AND d.project IS NULL", None),
            ProjectScope::Project(p) => {
                (" AND (d.project = :project OR d.project IS NULL)", Some(p.as_str()))
            }
        }
    }

    /// Run one FTS5 MATCH query joined on metadata, ordered by rank.
    pub fn search_keyword(
        &self,
        match_expr: &str,
        type_filter: Option<DocType>,
        scope: &ProjectScope,
        limit: usize,
    ) -> Result<Vec<KeywordHit>> {
        let (scope_sql, scope_param) = Self::scope_clause(scope);
        let type_sql = if type_filter.is_some() { " AND d.type = :type" } else { "" };
        let sql = format!(
            "SELECT f.id, d.type, f.title, f.content, d.source_file, d.concepts, d.project, f.rank
             FROM oracle_fts f
             JOIN oracle_documents d ON d.id = f.id
             WHERE oracle_fts MATCH :query{}{}
             ORDER BY f.rank
             LIMIT :limit",
            type_sql, scope_sql
        );

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let limit = limit as i64;
        let mut params: Vec<(&str, &dyn rusqlite::ToSql)> =
            vec![(":query", &match_expr), (":limit", &limit)];
        let type_str = type_filter.map(|t| t.as_str());
        if let Some(ref t) = type_str {
            params.push((":type", t));
        }
        if let Some(ref p) = scope_param {
            params.push((":project", p));
        }

        let rows = stmt.query_map(params.as_slice(), |row| {
            let type_str: String = row.get(1)?;
            let concepts: String = row.get(5)?;
            Ok(KeywordHit {
                id: row.get(0)?,
                doc_type: DocType::parse(&type_str).unwrap_or(DocType::Learning),
                title: row.get(2)?,
                content: row.get(3)?,
                source_file: row.get(4)?,
                concepts: Self::parse_json_array(&concepts),
                project: row.get(6)?,
                rank: row.get(7)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Total-count query with the same filters, no limit.
    pub fn count_keyword(
        &self,
        match_expr: &str,
        type_filter: Option<DocType>,
        scope: &ProjectScope,
    ) -> Result<i64> {
        let (scope_sql, scope_param) = Self::scope_clause(scope);
        let type_sql = if type_filter.is_some() { " AND d.type = :type" } else { "" };
        let sql = format!(
            "SELECT COUNT(*)
             FROM oracle_fts f
             JOIN oracle_documents d ON d.id = f.id
             WHERE oracle_fts MATCH :query{}{}",
            type_sql, scope_sql
        );

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let mut params: Vec<(&str, &dyn rusqlite::ToSql)> = vec![(":query", &match_expr)];
        let type_str = type_filter.map(|t| t.as_str());
        if let Some(ref t) = type_str {
            params.push((":type", t));
        }
        if let Some(ref p) = scope_param {
            params.push((":project", p));
        }
        let n = stmt.query_row(params.as_slice(), |r| r.get(0))?;
        Ok(n)
    }

    /// Project tag of a document, for post-filtering vector hits.
    /// Outer `None` means the metadata row does not exist.
    pub fn project_of(&self, id: &str) -> Result<Option<Option<String>>> {
        let reader = self.reader()?;
        let project = reader
            .query_row(
                "SELECT project FROM oracle_documents WHERE id = ?1",
                params![id],
                |r| r.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(project)
    }

    // ========================================================================
    // BROWSING READS
    // ========================================================================

    fn row_to_stored(row: &rusqlite::Row) -> rusqlite::Result<StoredDocument> {
        let type_str: String = row.get(1)?;
        let concepts: String = row.get(5)?;
        let indexed: String = row.get(7)?;
        Ok(StoredDocument {
            id: row.get(0)?,
            doc_type: DocType::parse(&type_str).unwrap_or(DocType::Learning),
            title: row.get(2)?,
            content: row.get(3)?,
            source_file: row.get(4)?,
            concepts: Self::parse_json_array(&concepts),
            project: row.get(6)?,
            indexed_at: Self::parse_timestamp(&indexed),
        })
    }

    /// List documents, optionally one row per source file (the row with the
    /// newest `indexed_at`; which chunk of a multi-chunk file surfaces is
    /// unspecified).
    pub fn list_documents(
        &self,
        type_filter: Option<DocType>,
        limit: usize,
        offset: usize,
        group_by_file: bool,
    ) -> Result<Vec<StoredDocument>> {
        let type_sql = if type_filter.is_some() { "WHERE d.type = :type" } else { "" };
        let sql = if group_by_file {
            format!(
                "SELECT d.id, d.type, f.title, f.content, d.source_file, d.concepts, d.project,
                        MAX(d.indexed_at) AS indexed_at
                 FROM oracle_documents d JOIN oracle_fts f ON f.id = d.id
                 {}
                 GROUP BY d.source_file
                 ORDER BY d.source_file
                 LIMIT :limit OFFSET :offset",
                type_sql
            )
        } else {
            format!(
                "SELECT d.id, d.type, f.title, f.content, d.source_file, d.concepts, d.project,
                        d.indexed_at
                 FROM oracle_documents d JOIN oracle_fts f ON f.id = d.id
                 {}
                 ORDER BY d.id
                 LIMIT :limit OFFSET :offset",
                type_sql
            )
        };

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let limit = limit as i64;
        let offset = offset as i64;
        let mut params: Vec<(&str, &dyn rusqlite::ToSql)> =
            vec![(":limit", &limit), (":offset", &offset)];
        let type_str = type_filter.map(|t| t.as_str());
        if let Some(ref t) = type_str {
            params.push((":type", t));
        }
        let rows = stmt.query_map(params.as_slice(), Self::row_to_stored)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// One randomly-chosen principle-or-learning document with full content.
    pub fn random_reflect(&self) -> Result<Option<StoredDocument>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT d.id, d.type, f.title, f.content, d.source_file, d.concepts, d.project,
                    d.indexed_at
             FROM oracle_documents d JOIN oracle_fts f ON f.id = d.id
             WHERE d.type IN ('principle', 'learning')
             ORDER BY RANDOM()
             LIMIT 1",
        )?;
        let doc = stmt.query_row([], Self::row_to_stored).optional()?;
        Ok(doc)
    }

    /// Concept tag counts sorted descending.
    pub fn concept_counts(
        &self,
        type_filter: Option<DocType>,
        limit: usize,
    ) -> Result<Vec<(String, i64)>> {
        let sql = match type_filter {
            Some(_) => "SELECT concepts FROM oracle_documents WHERE type = ?1",
            None => "SELECT concepts FROM oracle_documents",
        };
        let reader = self.reader()?;
        let mut stmt = reader.prepare(sql)?;

        let mut counts: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
        let mut tally = |concepts_json: String| {
            for c in Self::parse_json_array(&concepts_json) {
                *counts.entry(c).or_default() += 1;
            }
        };
        match type_filter {
            Some(t) => {
                let rows = stmt.query_map(params![t.as_str()], |r| r.get::<_, String>(0))?;
                for row in rows {
                    tally(row?);
                }
            }
            None => {
                let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
                for row in rows {
                    tally(row?);
                }
            }
        }

        let mut out: Vec<(String, i64)> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out.truncate(limit);
        Ok(out)
    }

    /// Graph source data: all principles plus a random sample of learnings.
    pub fn graph_documents(&self, learning_sample: usize) -> Result<Vec<StoredDocument>> {
        let reader = self.reader()?;
        let mut out = Vec::new();

        let mut stmt = reader.prepare(
            "SELECT d.id, d.type, f.title, f.content, d.source_file, d.concepts, d.project,
                    d.indexed_at
             FROM oracle_documents d JOIN oracle_fts f ON f.id = d.id
             WHERE d.type = 'principle'",
        )?;
        let rows = stmt.query_map([], Self::row_to_stored)?;
        for row in rows {
            out.push(row?);
        }

        let mut stmt = reader.prepare(
            "SELECT d.id, d.type, f.title, f.content, d.source_file, d.concepts, d.project,
                    d.indexed_at
             FROM oracle_documents d JOIN oracle_fts f ON f.id = d.id
             WHERE d.type = 'learning'
             ORDER BY RANDOM()
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![learning_sample as i64], Self::row_to_stored)?;
        for row in rows {
            out.push(row?);
        }

        Ok(out)
    }

    // ========================================================================
    // INDEXING STATUS
    // ========================================================================

    /// Read the indexing-status singleton.
    pub fn indexing_status(&self) -> Result<IndexingStatus> {
        let reader = self.reader()?;
        let status = reader.query_row(
            "SELECT is_indexing, progress_current, progress_total, started_at, completed_at, error
             FROM indexing_status WHERE id = 1",
            [],
            |row| {
                let started: Option<String> = row.get(3)?;
                let completed: Option<String> = row.get(4)?;
                Ok(IndexingStatus {
                    is_indexing: row.get::<_, i64>(0)? != 0,
                    progress_current: row.get(1)?,
                    progress_total: row.get(2)?,
                    started_at: Self::parse_opt_timestamp(started),
                    completed_at: Self::parse_opt_timestamp(completed),
                    error: row.get(5)?,
                })
            },
        )?;
        Ok(status)
    }

    /// Mark an indexing run as started.
    pub fn begin_indexing(&self, total: i64) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "UPDATE indexing_status
             SET is_indexing = 1, progress_current = 0, progress_total = ?1,
                 started_at = ?2, completed_at = NULL, error = NULL
             WHERE id = 1",
            params![total, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Publish progress.
    pub fn update_indexing_progress(&self, current: i64, total: i64) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "UPDATE indexing_status SET progress_current = ?1, progress_total = ?2 WHERE id = 1",
            params![current, total],
        )?;
        Ok(())
    }

    /// Mark an indexing run as finished, with an error message on failure.
    pub fn finish_indexing(&self, error: Option<&str>) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "UPDATE indexing_status
             SET is_indexing = 0, completed_at = ?1, error = ?2,
                 progress_current = CASE WHEN ?2 IS NULL THEN progress_total ELSE progress_current END
             WHERE id = 1",
            params![Utc::now().to_rfc3339(), error],
        )?;
        Ok(())
    }

    /// Clear a stale `is_indexing` flag. Called by the HTTP server at
    /// startup: if we are starting, nothing is indexing.
    pub fn reset_indexing_flag(&self) -> Result<()> {
        let writer = self.writer()?;
        writer.execute("UPDATE indexing_status SET is_indexing = 0 WHERE id = 1", [])?;
        Ok(())
    }

    // ========================================================================
    // PROJECTS
    // ========================================================================

    /// Register or update a project.
    pub fn upsert_project(&self, project: &Project) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO projects (slug, name, color, description, path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(slug) DO UPDATE SET
                 name = excluded.name, color = excluded.color,
                 description = excluded.description, path = excluded.path",
            params![
                project.slug,
                project.name,
                project.color,
                project.description,
                project.path,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All registered projects.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT slug, name, color, description, path FROM projects ORDER BY slug",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Project {
                slug: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
                description: row.get(3)?,
                path: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // ========================================================================
    // TELEMETRY (fire-and-forget: failures are logged, never propagated)
    // ========================================================================

    /// Append one search_log row.
    pub fn log_search(
        &self,
        query: &str,
        doc_type: &str,
        mode: &str,
        results_count: i64,
        search_time_ms: i64,
        project: Option<&str>,
    ) {
        let result = self.writer().and_then(|writer| {
            writer
                .execute(
                    "INSERT INTO search_log (query, type, mode, results_count, search_time_ms, project, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![query, doc_type, mode, results_count, search_time_ms, project, Utc::now().to_rfc3339()],
                )
                .map_err(OracleError::from)
        });
        if let Err(e) = result {
            tracing::warn!("oracle: search_log insert failed: {}", e);
        }
    }

    /// Append one consult_log row.
    pub fn log_consult(
        &self,
        decision: &str,
        context: Option<&str>,
        principles_found: i64,
        patterns_found: i64,
        guidance: &str,
        project: Option<&str>,
    ) {
        let result = self.writer().and_then(|writer| {
            writer
                .execute(
                    "INSERT INTO consult_log (decision, context, principles_found, patterns_found, guidance, project, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![decision, context, principles_found, patterns_found, guidance, project, Utc::now().to_rfc3339()],
                )
                .map_err(OracleError::from)
        });
        if let Err(e) = result {
            tracing::warn!("oracle: consult_log insert failed: {}", e);
        }
    }

    /// Append one learn_log row.
    pub fn log_learn(
        &self,
        document_id: &str,
        pattern_preview: &str,
        source: Option<&str>,
        concepts: &[String],
        project: Option<&str>,
    ) {
        let concepts_json = serde_json::to_string(concepts).unwrap_or_else(|_| "[]".into());
        let result = self.writer().and_then(|writer| {
            writer
                .execute(
                    "INSERT INTO learn_log (document_id, pattern_preview, source, concepts, project, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![document_id, pattern_preview, source, concepts_json, project, Utc::now().to_rfc3339()],
                )
                .map_err(OracleError::from)
        });
        if let Err(e) = result {
            tracing::warn!("oracle: learn_log insert failed: {}", e);
        }
    }

    /// Append one document_access row.
    pub fn log_access(&self, document_id: &str, access_type: &str, project: Option<&str>) {
        let result = self.writer().and_then(|writer| {
            writer
                .execute(
                    "INSERT INTO document_access (document_id, access_type, project, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![document_id, access_type, project, Utc::now().to_rfc3339()],
                )
                .map_err(OracleError::from)
        });
        if let Err(e) = result {
            tracing::warn!("oracle: document_access insert failed: {}", e);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn temp_store() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(&tmp.path().join("oracle.db")).unwrap();
        (tmp, store)
    }

    pub(crate) fn seed_doc(store: &Store, id: &str, doc_type: DocType, content: &str) {
        seed_doc_with_project(store, id, doc_type, content, None);
    }

    pub(crate) fn seed_doc_with_project(
        store: &Store,
        id: &str,
        doc_type: DocType,
        content: &str,
        project: Option<&str>,
    ) {
        let now = Utc::now();
        store
            .insert_document(&DocumentMeta {
                id: id.to_string(),
                doc_type,
                source_file: format!("{}.md", id),
                concepts: vec![],
                project: project.map(String::from),
                created_at: now,
                updated_at: now,
                indexed_at: now,
                superseded_by: None,
                superseded_at: None,
                superseded_reason: None,
                origin: None,
                created_by: None,
            })
            .unwrap();
        store
            .insert_fts(&ParsedDocument {
                id: id.to_string(),
                doc_type,
                title: id.to_string(),
                content: content.to_string(),
                source_file: format!("{}.md", id),
                concepts: vec![],
            })
            .unwrap();
    }

    #[test]
    fn test_insert_and_get_document() {
        let (_tmp, store) = temp_store();
        seed_doc(&store, "learning_a", DocType::Learning, "git safety force push");

        let meta = store.get_document("learning_a").unwrap().unwrap();
        assert_eq!(meta.doc_type, DocType::Learning);
        assert_eq!(meta.source_file, "learning_a.md");
        assert!(meta.superseded_by.is_none());
    }

    #[test]
    fn test_keyword_search_ranked() {
        let (_tmp, store) = temp_store();
        seed_doc(&store, "l1", DocType::Learning, "git safety force push safety");
        seed_doc(&store, "l2", DocType::Learning, "unrelated cooking recipe");

        let hits = store
            .search_keyword("safety", None, &ProjectScope::Any, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "l1");
        assert!(hits[0].rank < 0.0);
    }

    #[test]
    fn test_keyword_type_filter() {
        let (_tmp, store) = temp_store();
        seed_doc(&store, "p1", DocType::Principle, "history is preserved");
        seed_doc(&store, "l1", DocType::Learning, "history of the repo");

        let hits = store
            .search_keyword("history", Some(DocType::Principle), &ProjectScope::Any, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "p1");
    }

    #[test]
    fn test_project_scope_filter() {
        let (_tmp, store) = temp_store();
        seed_doc_with_project(&store, "d1", DocType::Learning, "shared term", Some("alpha"));
        seed_doc_with_project(&store, "d2", DocType::Learning, "shared term", None);
        seed_doc_with_project(&store, "d3", DocType::Learning, "shared term", Some("beta"));

        let with_p: Vec<String> = store
            .search_keyword("shared", None, &ProjectScope::Project("alpha".into()), 10)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert!(with_p.contains(&"d1".to_string()));
        assert!(with_p.contains(&"d2".to_string()));
        assert!(!with_p.contains(&"d3".to_string()));

        let universal: Vec<String> = store
            .search_keyword("shared", None, &ProjectScope::UniversalOnly, 10)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(universal, vec!["d2".to_string()]);
    }

    #[test]
    fn test_count_keyword_matches_filters() {
        let (_tmp, store) = temp_store();
        seed_doc(&store, "a", DocType::Learning, "alpha beta");
        seed_doc(&store, "b", DocType::Learning, "alpha gamma");
        seed_doc(&store, "c", DocType::Retro, "alpha delta");

        assert_eq!(store.count_keyword("alpha", None, &ProjectScope::Any).unwrap(), 3);
        assert_eq!(
            store
                .count_keyword("alpha", Some(DocType::Retro), &ProjectScope::Any)
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_clear_index_empties_both() {
        let (_tmp, store) = temp_store();
        seed_doc(&store, "a", DocType::Learning, "something");
        store.clear_index().unwrap();
        assert_eq!(store.document_count().unwrap(), 0);
        assert!(store.fts_ids().unwrap().is_empty());
    }

    #[test]
    fn test_supersede_chain() {
        let (_tmp, store) = temp_store();
        seed_doc(&store, "old", DocType::Learning, "old wisdom");
        seed_doc(&store, "new", DocType::Learning, "new wisdom");

        store.supersede("old", "new", Some("refined")).unwrap();
        let meta = store.get_document("old").unwrap().unwrap();
        assert_eq!(meta.superseded_by.as_deref(), Some("new"));
        assert!(meta.superseded_at.is_some());

        // Write-once: a second supersede is rejected, the row stays
        assert!(store.supersede("old", "other", None).is_err());
        let meta = store.get_document("old").unwrap().unwrap();
        assert_eq!(meta.superseded_by.as_deref(), Some("new"));
    }

    #[test]
    fn test_indexing_status_lifecycle() {
        let (_tmp, store) = temp_store();

        let idle = store.indexing_status().unwrap();
        assert!(!idle.is_indexing);

        store.begin_indexing(42).unwrap();
        let running = store.indexing_status().unwrap();
        assert!(running.is_indexing);
        assert_eq!(running.progress_total, 42);
        assert!(running.started_at.is_some());

        store.finish_indexing(None).unwrap();
        let done = store.indexing_status().unwrap();
        assert!(!done.is_indexing);
        assert_eq!(done.progress_current, 42);
        assert!(done.error.is_none());

        store.begin_indexing(5).unwrap();
        store.finish_indexing(Some("boom")).unwrap();
        let failed = store.indexing_status().unwrap();
        assert!(!failed.is_indexing);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_reset_indexing_flag() {
        let (_tmp, store) = temp_store();
        store.begin_indexing(10).unwrap();
        store.reset_indexing_flag().unwrap();
        assert!(!store.indexing_status().unwrap().is_indexing);
    }

    #[test]
    fn test_list_grouped_by_file() {
        let (_tmp, store) = temp_store();
        let now = Utc::now();
        for (id, file) in [("r_0", "res.md"), ("r_0_sub_0", "res.md"), ("l_0", "learn.md")] {
            store
                .insert_document(&DocumentMeta {
                    id: id.to_string(),
                    doc_type: DocType::Principle,
                    source_file: file.to_string(),
                    concepts: vec![],
                    project: None,
                    created_at: now,
                    updated_at: now,
                    indexed_at: now,
                    superseded_by: None,
                    superseded_at: None,
                    superseded_reason: None,
                    origin: None,
                    created_by: None,
                })
                .unwrap();
            store
                .insert_fts(&ParsedDocument {
                    id: id.to_string(),
                    doc_type: DocType::Principle,
                    title: id.to_string(),
                    content: "body".to_string(),
                    source_file: file.to_string(),
                    concepts: vec![],
                })
                .unwrap();
        }

        let grouped = store.list_documents(None, 10, 0, true).unwrap();
        assert_eq!(grouped.len(), 2);

        let flat = store.list_documents(None, 10, 0, false).unwrap();
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn test_random_reflect_type_bounds() {
        let (_tmp, store) = temp_store();
        seed_doc(&store, "retro_only", DocType::Retro, "a retro section");
        assert!(store.random_reflect().unwrap().is_none());

        seed_doc(&store, "p1", DocType::Principle, "a principle");
        let doc = store.random_reflect().unwrap().unwrap();
        assert_eq!(doc.id, "p1");
    }

    #[test]
    fn test_concept_counts_sorted() {
        let (_tmp, store) = temp_store();
        let now = Utc::now();
        for (id, concepts) in [
            ("a", vec!["trust", "pattern"]),
            ("b", vec!["trust"]),
            ("c", vec!["history"]),
        ] {
            store
                .insert_document(&DocumentMeta {
                    id: id.to_string(),
                    doc_type: DocType::Learning,
                    source_file: format!("{}.md", id),
                    concepts: concepts.iter().map(|s| s.to_string()).collect(),
                    project: None,
                    created_at: now,
                    updated_at: now,
                    indexed_at: now,
                    superseded_by: None,
                    superseded_at: None,
                    superseded_reason: None,
                    origin: None,
                    created_by: None,
                })
                .unwrap();
        }

        let counts = store.concept_counts(None, 10).unwrap();
        assert_eq!(counts[0], ("trust".to_string(), 2));
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn test_telemetry_inserts() {
        let (_tmp, store) = temp_store();
        store.log_search("q", "all", "hybrid", 3, 12, None);
        store.log_consult("d", None, 1, 2, "guidance", None);
        store.log_learn("learning_x", "preview", None, &[], Some("alpha"));
        store.log_access("learning_x", "search", None);

        let reader = store.reader().unwrap();
        let searches: i64 = reader
            .query_row("SELECT COUNT(*) FROM search_log", [], |r| r.get(0))
            .unwrap();
        let accesses: i64 = reader
            .query_row("SELECT COUNT(*) FROM document_access", [], |r| r.get(0))
            .unwrap();
        assert_eq!(searches, 1);
        assert_eq!(accesses, 1);
    }

    #[test]
    fn test_projects_roundtrip() {
        let (_tmp, store) = temp_store();
        store
            .upsert_project(&Project {
                slug: "alpha".into(),
                name: "Alpha".into(),
                color: "#ff0000".into(),
                description: None,
                path: Some("github.com/acme/alpha".into()),
            })
            .unwrap();

        let projects = store.list_projects().unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].path.as_deref(), Some("github.com/acme/alpha"));
    }
}
