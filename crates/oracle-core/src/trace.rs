//! Trace Log
//!
//! Recorded discovery sessions. Each trace holds the dig points a session
//! surfaced (files, commits, issues, retros, learnings, resonance), and
//! traces form a directed forest via parent links — children are tracked
//! redundantly on the parent. A trace can be distilled into an awakening
//! and optionally promoted into a learning.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OracleError, Result};
use crate::learn::{Learn, LearnRequest};
use crate::store::Store;

/// Trace lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Raw,
    Reviewed,
    Distilling,
    Distilled,
}

impl TraceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceStatus::Raw => "raw",
            TraceStatus::Reviewed => "reviewed",
            TraceStatus::Distilling => "distilling",
            TraceStatus::Distilled => "distilled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "raw" => Some(TraceStatus::Raw),
            "reviewed" => Some(TraceStatus::Reviewed),
            "distilling" => Some(TraceStatus::Distilling),
            "distilled" => Some(TraceStatus::Distilled),
            _ => None,
        }
    }
}

/// Dig points accumulated by a discovery session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigPoints {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub retros: Vec<String>,
    #[serde(default)]
    pub learnings: Vec<String>,
    #[serde(default)]
    pub resonance: Vec<String>,
}

/// Input for trace creation.
#[derive(Debug, Clone, Default)]
pub struct TraceInput {
    pub query: String,
    pub query_type: Option<String>,
    pub dig_points: DigPoints,
    pub parent_trace_id: Option<String>,
    pub project: Option<String>,
}

/// One trace row with JSON arrays parsed.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub trace_id: String,
    pub query: String,
    pub query_type: Option<String>,
    #[serde(flatten)]
    pub dig_points: DigPoints,
    pub file_count: i64,
    pub commit_count: i64,
    pub issue_count: i64,
    pub depth: i64,
    pub parent_trace_id: Option<String>,
    pub child_trace_ids: Vec<String>,
    pub status: TraceStatus,
    pub awakening: Option<String>,
    pub distilled_to_id: Option<String>,
    pub distilled_at: Option<DateTime<Utc>>,
    pub project: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A chain walk result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceChain {
    pub traces: Vec<Trace>,
    pub total_depth: i64,
    pub has_awakening: bool,
    pub awakening_trace_id: Option<String>,
}

/// Chain walk direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDirection {
    Up,
    Down,
    Both,
}

impl ChainDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(ChainDirection::Up),
            "down" => Some(ChainDirection::Down),
            "both" => Some(ChainDirection::Both),
            _ => None,
        }
    }
}

/// List filters.
#[derive(Debug, Clone, Default)]
pub struct TraceFilter {
    pub status: Option<TraceStatus>,
    pub query_type: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

pub struct TraceLog {
    store: Arc<Store>,
}

impl TraceLog {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create a trace. With a parent: depth = parent.depth + 1 and the
    /// child id is appended onto the parent's child list in the same
    /// transaction, so the redundant bookkeeping cannot drift.
    pub fn create(&self, input: TraceInput) -> Result<Trace> {
        if input.query.trim().is_empty() {
            return Err(OracleError::Validation("Trace query cannot be empty".into()));
        }

        let parent = match &input.parent_trace_id {
            Some(pid) => Some(
                self.get(pid)?
                    .ok_or_else(|| OracleError::NotFound(format!("Parent trace: {}", pid)))?,
            ),
            None => None,
        };
        let depth = parent.as_ref().map(|p| p.depth + 1).unwrap_or(0);

        let trace_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let dp = &input.dig_points;
        let to_json = |v: &Vec<String>| serde_json::to_string(v).unwrap_or_else(|_| "[]".into());

        let mut writer = self.store.writer()?;
        let tx = writer.transaction()?;
        tx.execute(
            "INSERT INTO trace_log (
                trace_id, query, query_type,
                files, commits, issues, retros, learnings, resonance,
                file_count, commit_count, issue_count,
                depth, parent_trace_id, child_trace_ids,
                status, project, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, '[]', 'raw', ?15, ?16)",
            params![
                trace_id,
                input.query,
                input.query_type,
                to_json(&dp.files),
                to_json(&dp.commits),
                to_json(&dp.issues),
                to_json(&dp.retros),
                to_json(&dp.learnings),
                to_json(&dp.resonance),
                dp.files.len() as i64,
                dp.commits.len() as i64,
                dp.issues.len() as i64,
                depth,
                input.parent_trace_id,
                input.project,
                now.to_rfc3339(),
            ],
        )?;

        if let Some(parent) = &parent {
            let mut children = parent.child_trace_ids.clone();
            children.push(trace_id.clone());
            tx.execute(
                "UPDATE trace_log SET child_trace_ids = ?1 WHERE trace_id = ?2",
                params![to_json(&children), parent.trace_id],
            )?;
        }
        tx.commit()?;
        drop(writer);

        self.get(&trace_id)?
            .ok_or_else(|| OracleError::NotFound(trace_id))
    }

    /// Fetch one trace.
    pub fn get(&self, trace_id: &str) -> Result<Option<Trace>> {
        let reader = self.store.reader()?;
        let mut stmt = reader.prepare(
            "SELECT trace_id, query, query_type,
                    files, commits, issues, retros, learnings, resonance,
                    file_count, commit_count, issue_count,
                    depth, parent_trace_id, child_trace_ids,
                    status, awakening, distilled_to_id, distilled_at,
                    project, created_at
             FROM trace_log WHERE trace_id = ?1",
        )?;
        let trace = stmt
            .query_row(params![trace_id], Self::row_to_trace)
            .optional()?;
        Ok(trace)
    }

    fn row_to_trace(row: &rusqlite::Row) -> rusqlite::Result<Trace> {
        let status: String = row.get(15)?;
        let distilled_at: Option<String> = row.get(18)?;
        let created_at: String = row.get(20)?;
        let arr = |i: usize| -> rusqlite::Result<Vec<String>> {
            let s: String = row.get(i)?;
            Ok(Store::parse_json_array(&s))
        };

        Ok(Trace {
            trace_id: row.get(0)?,
            query: row.get(1)?,
            query_type: row.get(2)?,
            dig_points: DigPoints {
                files: arr(3)?,
                commits: arr(4)?,
                issues: arr(5)?,
                retros: arr(6)?,
                learnings: arr(7)?,
                resonance: arr(8)?,
            },
            file_count: row.get(9)?,
            commit_count: row.get(10)?,
            issue_count: row.get(11)?,
            depth: row.get(12)?,
            parent_trace_id: row.get(13)?,
            child_trace_ids: arr(14)?,
            status: TraceStatus::parse(&status).unwrap_or(TraceStatus::Raw),
            awakening: row.get(16)?,
            distilled_to_id: row.get(17)?,
            distilled_at: Store::parse_opt_timestamp(distilled_at),
            project: row.get(19)?,
            created_at: Store::parse_timestamp(&created_at),
        })
    }

    /// List traces newest-first.
    pub fn list(&self, filter: &TraceFilter) -> Result<Vec<Trace>> {
        let mut clauses = Vec::new();
        if filter.status.is_some() {
            clauses.push("status = :status");
        }
        if filter.query_type.is_some() {
            clauses.push("query_type = :query_type");
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT trace_id, query, query_type,
                    files, commits, issues, retros, learnings, resonance,
                    file_count, commit_count, issue_count,
                    depth, parent_trace_id, child_trace_ids,
                    status, awakening, distilled_to_id, distilled_at,
                    project, created_at
             FROM trace_log {} ORDER BY created_at DESC LIMIT :limit OFFSET :offset",
            where_sql
        );

        let reader = self.store.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let limit = if filter.limit == 0 { 20 } else { filter.limit } as i64;
        let offset = filter.offset as i64;
        let status = filter.status.map(|s| s.as_str());
        let mut params: Vec<(&str, &dyn rusqlite::ToSql)> =
            vec![(":limit", &limit), (":offset", &offset)];
        if let Some(ref s) = status {
            params.push((":status", s));
        }
        if let Some(ref qt) = filter.query_type {
            params.push((":query_type", qt));
        }

        let rows = stmt.query_map(params.as_slice(), Self::row_to_trace)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Walk the chain from `trace_id`. `up` follows parent links to the
    /// root, `down` is a BFS over child lists, `both` concatenates with the
    /// starting trace in the middle.
    pub fn chain(&self, trace_id: &str, direction: ChainDirection) -> Result<TraceChain> {
        let start = self
            .get(trace_id)?
            .ok_or_else(|| OracleError::NotFound(format!("Trace: {}", trace_id)))?;

        let mut traces: Vec<Trace> = Vec::new();

        if matches!(direction, ChainDirection::Up | ChainDirection::Both) {
            let mut ancestors: Vec<Trace> = Vec::new();
            let mut cursor = start.parent_trace_id.clone();
            while let Some(pid) = cursor {
                let parent = self
                    .get(&pid)?
                    .ok_or_else(|| OracleError::NotFound(format!("Trace: {}", pid)))?;
                cursor = parent.parent_trace_id.clone();
                ancestors.push(parent);
            }
            ancestors.reverse();
            traces.extend(ancestors);
        }

        traces.push(start.clone());

        if matches!(direction, ChainDirection::Down | ChainDirection::Both) {
            let mut queue: VecDeque<String> = start.child_trace_ids.iter().cloned().collect();
            while let Some(cid) = queue.pop_front() {
                if let Some(child) = self.get(&cid)? {
                    queue.extend(child.child_trace_ids.iter().cloned());
                    traces.push(child);
                }
            }
        }

        let total_depth = traces.iter().map(|t| t.depth).max().unwrap_or(0);
        let awakening_trace = traces.iter().find(|t| t.awakening.is_some());

        Ok(TraceChain {
            total_depth,
            has_awakening: awakening_trace.is_some(),
            awakening_trace_id: awakening_trace.map(|t| t.trace_id.clone()),
            traces,
        })
    }

    /// Distill a trace: record the awakening and, when asked, promote it
    /// into a learning whose id is linked back via `distilled_to_id`.
    pub fn distill(
        &self,
        trace_id: &str,
        awakening: &str,
        promote: bool,
        learn: &Learn,
    ) -> Result<Trace> {
        if awakening.trim().is_empty() {
            return Err(OracleError::Validation("Awakening cannot be empty".into()));
        }
        let trace = self
            .get(trace_id)?
            .ok_or_else(|| OracleError::NotFound(format!("Trace: {}", trace_id)))?;

        let distilled_to_id = if promote {
            let response = learn.learn(LearnRequest {
                pattern: awakening.to_string(),
                source: Some(format!("trace:{}", trace_id)),
                project: trace.project.clone().map(Some),
                ..Default::default()
            })?;
            Some(response.id)
        } else {
            None
        };

        let writer = self.store.writer()?;
        writer.execute(
            "UPDATE trace_log
             SET status = 'distilled', awakening = ?1, distilled_to_id = ?2, distilled_at = ?3
             WHERE trace_id = ?4",
            params![awakening, distilled_to_id, Utc::now().to_rfc3339(), trace_id],
        )?;
        drop(writer);

        self.get(trace_id)?
            .ok_or_else(|| OracleError::NotFound(trace_id.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::temp_store;
    use tempfile::TempDir;

    fn trace_log() -> (TempDir, Arc<Store>, TraceLog) {
        let (tmp, store) = temp_store();
        let store = Arc::new(store);
        (tmp, Arc::clone(&store), TraceLog::new(store))
    }

    fn input(query: &str, parent: Option<&str>) -> TraceInput {
        TraceInput {
            query: query.to_string(),
            parent_trace_id: parent.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_root_trace() {
        let (_tmp, _store, log) = trace_log();
        let trace = log
            .create(TraceInput {
                query: "shared soul".into(),
                query_type: Some("concept".into()),
                dig_points: DigPoints {
                    files: vec!["a.md".into(), "b.md".into()],
                    commits: vec!["abc123".into()],
                    ..Default::default()
                },
                ..Default::default()
            })
            .unwrap();

        assert_eq!(trace.depth, 0);
        assert_eq!(trace.status, TraceStatus::Raw);
        assert_eq!(trace.file_count, 2);
        assert_eq!(trace.commit_count, 1);
        assert!(trace.child_trace_ids.is_empty());
    }

    #[test]
    fn test_child_depth_and_parent_bookkeeping() {
        let (_tmp, _store, log) = trace_log();
        let a = log.create(input("root", None)).unwrap();
        let b = log.create(input("child", Some(&a.trace_id))).unwrap();

        assert_eq!(b.depth, 1);
        assert_eq!(b.parent_trace_id.as_deref(), Some(a.trace_id.as_str()));

        let a = log.get(&a.trace_id).unwrap().unwrap();
        assert_eq!(a.child_trace_ids, vec![b.trace_id]);
    }

    #[test]
    fn test_missing_parent_rejected() {
        let (_tmp, _store, log) = trace_log();
        let err = log.create(input("orphan", Some("nope"))).unwrap_err();
        assert!(matches!(err, OracleError::NotFound(_)));
    }

    #[test]
    fn test_chain_down_bfs() {
        let (_tmp, _store, log) = trace_log();
        let a = log.create(input("A", None)).unwrap();
        let b = log.create(input("B", Some(&a.trace_id))).unwrap();
        let c = log.create(input("C", Some(&b.trace_id))).unwrap();

        let chain = log.chain(&a.trace_id, ChainDirection::Down).unwrap();
        let ids: Vec<&str> = chain.traces.iter().map(|t| t.trace_id.as_str()).collect();
        assert_eq!(ids, vec![a.trace_id.as_str(), b.trace_id.as_str(), c.trace_id.as_str()]);
        assert_eq!(chain.total_depth, 2);
        assert!(!chain.has_awakening);
    }

    #[test]
    fn test_chain_up_and_both() {
        let (_tmp, _store, log) = trace_log();
        let a = log.create(input("A", None)).unwrap();
        let b = log.create(input("B", Some(&a.trace_id))).unwrap();
        let c = log.create(input("C", Some(&b.trace_id))).unwrap();

        let up = log.chain(&c.trace_id, ChainDirection::Up).unwrap();
        let ids: Vec<&str> = up.traces.iter().map(|t| t.trace_id.as_str()).collect();
        assert_eq!(ids, vec![a.trace_id.as_str(), b.trace_id.as_str(), c.trace_id.as_str()]);

        let both = log.chain(&b.trace_id, ChainDirection::Both).unwrap();
        let ids: Vec<&str> = both.traces.iter().map(|t| t.trace_id.as_str()).collect();
        assert_eq!(ids, vec![a.trace_id.as_str(), b.trace_id.as_str(), c.trace_id.as_str()]);
    }

    #[test]
    fn test_list_newest_first_with_filter() {
        let (_tmp, _store, log) = trace_log();
        log.create(input("first", None)).unwrap();
        log.create(TraceInput {
            query: "second".into(),
            query_type: Some("incident".into()),
            ..Default::default()
        })
        .unwrap();

        let all = log.list(&TraceFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let filtered = log
            .list(&TraceFilter {
                query_type: Some("incident".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].query, "second");
    }

    #[test]
    fn test_distill_promotes_to_learning() {
        let (_tmp, store, log) = trace_log();
        let dir = TempDir::new().unwrap();
        let learn = Learn::new(Arc::clone(&store), dir.path().join("learnings"));

        let t0 = log.create(input("shared soul", None)).unwrap();
        let t1 = log.create(input("Dec 17 awakening", Some(&t0.trace_id))).unwrap();

        let distilled = log
            .distill(&t1.trace_id, "Freedom IS unity", true, &learn)
            .unwrap();

        assert_eq!(distilled.status, TraceStatus::Distilled);
        assert_eq!(distilled.awakening.as_deref(), Some("Freedom IS unity"));
        assert!(distilled.distilled_at.is_some());

        let learning_id = distilled.distilled_to_id.unwrap();
        let meta = store.get_document(&learning_id).unwrap().unwrap();
        assert_eq!(meta.created_by.as_deref(), Some("oracle-learn"));

        // The chain now reports the awakening
        let chain = log.chain(&t0.trace_id, ChainDirection::Down).unwrap();
        assert!(chain.has_awakening);
        assert_eq!(chain.awakening_trace_id.as_deref(), Some(t1.trace_id.as_str()));
    }

    #[test]
    fn test_distill_without_promotion() {
        let (_tmp, store, log) = trace_log();
        let dir = TempDir::new().unwrap();
        let learn = Learn::new(Arc::clone(&store), dir.path().join("learnings"));

        let t = log.create(input("quiet insight", None)).unwrap();
        let distilled = log.distill(&t.trace_id, "keep it", false, &learn).unwrap();
        assert!(distilled.distilled_to_id.is_none());
        assert_eq!(distilled.status, TraceStatus::Distilled);
    }
}
