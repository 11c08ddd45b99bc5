//! Decisions
//!
//! Decision records with a typed status lifecycle. Rows are never deleted;
//! the transition graph is closed and illegal moves are Conflicts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{OracleError, Result};
use crate::store::Store;

/// Decision lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    Pending,
    Parked,
    Researching,
    Decided,
    Implemented,
    Closed,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Pending => "pending",
            DecisionStatus::Parked => "parked",
            DecisionStatus::Researching => "researching",
            DecisionStatus::Decided => "decided",
            DecisionStatus::Implemented => "implemented",
            DecisionStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DecisionStatus::Pending),
            "parked" => Some(DecisionStatus::Parked),
            "researching" => Some(DecisionStatus::Researching),
            "decided" => Some(DecisionStatus::Decided),
            "implemented" => Some(DecisionStatus::Implemented),
            "closed" => Some(DecisionStatus::Closed),
            _ => None,
        }
    }

    /// Legal transition edges. `closed` is terminal.
    pub fn can_transition_to(&self, next: DecisionStatus) -> bool {
        use DecisionStatus::*;
        matches!(
            (self, next),
            (Pending, Parked | Researching | Decided | Closed)
                | (Parked, Pending | Researching | Decided | Closed)
                | (Researching, Pending | Parked | Decided | Closed)
                | (Decided, Implemented | Closed)
                | (Implemented, Closed)
        )
    }
}

/// One decision record.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub id: i64,
    pub title: String,
    pub status: DecisionStatus,
    pub context: Option<String>,
    pub options: Vec<String>,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
}

/// Creation input.
#[derive(Debug, Clone, Default)]
pub struct DecisionInput {
    pub title: String,
    pub context: Option<String>,
    pub options: Vec<String>,
    pub project: Option<String>,
    pub tags: Vec<String>,
}

/// Mutable fields for update.
#[derive(Debug, Clone, Default)]
pub struct DecisionUpdate {
    pub title: Option<String>,
    pub context: Option<String>,
    pub options: Option<Vec<String>>,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub struct Decisions {
    store: Arc<Store>,
}

impl Decisions {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create a decision in `pending`.
    pub fn create(&self, input: DecisionInput) -> Result<Decision> {
        if input.title.trim().is_empty() {
            return Err(OracleError::Validation("Decision title cannot be empty".into()));
        }
        let now = Utc::now().to_rfc3339();
        let options = serde_json::to_string(&input.options).unwrap_or_else(|_| "[]".into());
        let tags = serde_json::to_string(&input.tags).unwrap_or_else(|_| "[]".into());

        let writer = self.store.writer()?;
        writer.execute(
            "INSERT INTO decisions (title, status, context, options, project, tags, created_at, updated_at)
             VALUES (?1, 'pending', ?2, ?3, ?4, ?5, ?6, ?6)",
            params![input.title, input.context, options, input.project, tags, now],
        )?;
        let id = writer.last_insert_rowid();
        drop(writer);

        self.get(id)?
            .ok_or_else(|| OracleError::NotFound(format!("Decision: {}", id)))
    }

    fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<Decision> {
        let status: String = row.get(2)?;
        let options: String = row.get(4)?;
        let tags: String = row.get(8)?;
        let created: String = row.get(9)?;
        let updated: String = row.get(10)?;
        let decided_at: Option<String> = row.get(11)?;

        Ok(Decision {
            id: row.get(0)?,
            title: row.get(1)?,
            status: DecisionStatus::parse(&status).unwrap_or(DecisionStatus::Pending),
            context: row.get(3)?,
            options: Store::parse_json_array(&options),
            decision: row.get(5)?,
            rationale: row.get(6)?,
            project: row.get(7)?,
            tags: Store::parse_json_array(&tags),
            created_at: Store::parse_timestamp(&created),
            updated_at: Store::parse_timestamp(&updated),
            decided_at: Store::parse_opt_timestamp(decided_at),
            decided_by: row.get(12)?,
        })
    }

    const COLUMNS: &'static str = "id, title, status, context, options, decision, rationale, project, tags, created_at, updated_at, decided_at, decided_by";

    /// One decision by id.
    pub fn get(&self, id: i64) -> Result<Option<Decision>> {
        let reader = self.store.reader()?;
        let sql = format!("SELECT {} FROM decisions WHERE id = ?1", Self::COLUMNS);
        let decision = reader
            .query_row(&sql, params![id], Self::row_to_decision)
            .optional()?;
        Ok(decision)
    }

    /// List decisions newest-first, optionally by status.
    pub fn list(&self, status: Option<DecisionStatus>, limit: usize, offset: usize) -> Result<Vec<Decision>> {
        let sql = match status {
            Some(_) => format!(
                "SELECT {} FROM decisions WHERE status = :status ORDER BY created_at DESC LIMIT :limit OFFSET :offset",
                Self::COLUMNS
            ),
            None => format!(
                "SELECT {} FROM decisions ORDER BY created_at DESC LIMIT :limit OFFSET :offset",
                Self::COLUMNS
            ),
        };

        let reader = self.store.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let limit = limit as i64;
        let offset = offset as i64;
        let status_str = status.map(|s| s.as_str());
        let mut params: Vec<(&str, &dyn rusqlite::ToSql)> =
            vec![(":limit", &limit), (":offset", &offset)];
        if let Some(ref s) = status_str {
            params.push((":status", s));
        }
        let rows = stmt.query_map(params.as_slice(), Self::row_to_decision)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Update mutable fields; status changes go through
    /// [`Decisions::transition`].
    pub fn update(&self, id: i64, update: DecisionUpdate) -> Result<Decision> {
        let existing = self
            .get(id)?
            .ok_or_else(|| OracleError::NotFound(format!("Decision: {}", id)))?;

        let options = update.options.unwrap_or(existing.options);
        let tags = update.tags.unwrap_or(existing.tags);
        let writer = self.store.writer()?;
        writer.execute(
            "UPDATE decisions SET
                title = ?1, context = ?2, options = ?3, decision = ?4,
                rationale = ?5, tags = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                update.title.unwrap_or(existing.title),
                update.context.or(existing.context),
                serde_json::to_string(&options).unwrap_or_else(|_| "[]".into()),
                update.decision.or(existing.decision),
                update.rationale.or(existing.rationale),
                serde_json::to_string(&tags).unwrap_or_else(|_| "[]".into()),
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        drop(writer);

        self.get(id)?
            .ok_or_else(|| OracleError::NotFound(format!("Decision: {}", id)))
    }

    /// Move a decision along the status graph. Entering `decided` stamps
    /// `decided_at` and `decided_by`.
    pub fn transition(
        &self,
        id: i64,
        new_status: DecisionStatus,
        decided_by: Option<&str>,
    ) -> Result<Decision> {
        let existing = self
            .get(id)?
            .ok_or_else(|| OracleError::NotFound(format!("Decision: {}", id)))?;

        if !existing.status.can_transition_to(new_status) {
            return Err(OracleError::Conflict(format!(
                "Illegal transition: {} -> {}",
                existing.status.as_str(),
                new_status.as_str()
            )));
        }

        let now = Utc::now().to_rfc3339();
        let writer = self.store.writer()?;
        if new_status == DecisionStatus::Decided {
            writer.execute(
                "UPDATE decisions SET status = ?1, decided_at = ?2, decided_by = ?3, updated_at = ?2 WHERE id = ?4",
                params![new_status.as_str(), now, decided_by, id],
            )?;
        } else {
            writer.execute(
                "UPDATE decisions SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![new_status.as_str(), now, id],
            )?;
        }
        drop(writer);

        self.get(id)?
            .ok_or_else(|| OracleError::NotFound(format!("Decision: {}", id)))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::temp_store;

    fn decisions() -> (tempfile::TempDir, Decisions) {
        let (tmp, store) = temp_store();
        (tmp, Decisions::new(Arc::new(store)))
    }

    #[test]
    fn test_create_starts_pending() {
        let (_tmp, d) = decisions();
        let decision = d
            .create(DecisionInput {
                title: "Pick a database".into(),
                options: vec!["sqlite".into(), "postgres".into()],
                tags: vec!["infra".into()],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(decision.status, DecisionStatus::Pending);
        assert_eq!(decision.options.len(), 2);
        assert!(decision.decided_at.is_none());
    }

    #[test]
    fn test_legal_transition_stamps_decided() {
        let (_tmp, d) = decisions();
        let decision = d
            .create(DecisionInput {
                title: "Ship it?".into(),
                ..Default::default()
            })
            .unwrap();

        let decided = d
            .transition(decision.id, DecisionStatus::Decided, Some("sam"))
            .unwrap();
        assert_eq!(decided.status, DecisionStatus::Decided);
        assert!(decided.decided_at.is_some());
        assert_eq!(decided.decided_by.as_deref(), Some("sam"));

        let read_back = d.get(decision.id).unwrap().unwrap();
        assert_eq!(read_back.status, DecisionStatus::Decided);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let (_tmp, d) = decisions();
        let decision = d
            .create(DecisionInput {
                title: "Terminal check".into(),
                ..Default::default()
            })
            .unwrap();

        d.transition(decision.id, DecisionStatus::Closed, None).unwrap();
        let err = d
            .transition(decision.id, DecisionStatus::Pending, None)
            .unwrap_err();
        assert!(matches!(err, OracleError::Conflict(_)));

        // pending cannot jump straight to implemented
        let other = d
            .create(DecisionInput {
                title: "No shortcuts".into(),
                ..Default::default()
            })
            .unwrap();
        assert!(d
            .transition(other.id, DecisionStatus::Implemented, None)
            .is_err());
    }

    #[test]
    fn test_full_happy_path() {
        let (_tmp, d) = decisions();
        let decision = d
            .create(DecisionInput {
                title: "Lifecycle".into(),
                ..Default::default()
            })
            .unwrap();

        for status in [
            DecisionStatus::Researching,
            DecisionStatus::Decided,
            DecisionStatus::Implemented,
            DecisionStatus::Closed,
        ] {
            d.transition(decision.id, status, Some("sam")).unwrap();
        }
        let done = d.get(decision.id).unwrap().unwrap();
        assert_eq!(done.status, DecisionStatus::Closed);
    }

    #[test]
    fn test_update_fields() {
        let (_tmp, d) = decisions();
        let decision = d
            .create(DecisionInput {
                title: "Original".into(),
                ..Default::default()
            })
            .unwrap();

        let updated = d
            .update(
                decision.id,
                DecisionUpdate {
                    decision: Some("go with sqlite".into()),
                    rationale: Some("embedded, zero ops".into()),
                    tags: Some(vec!["storage".into()]),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "Original");
        assert_eq!(updated.decision.as_deref(), Some("go with sqlite"));
        assert_eq!(updated.tags, vec!["storage"]);
    }

    #[test]
    fn test_list_by_status() {
        let (_tmp, d) = decisions();
        let a = d.create(DecisionInput { title: "A".into(), ..Default::default() }).unwrap();
        d.create(DecisionInput { title: "B".into(), ..Default::default() }).unwrap();
        d.transition(a.id, DecisionStatus::Parked, None).unwrap();

        assert_eq!(d.list(None, 10, 0).unwrap().len(), 2);
        let parked = d.list(Some(DecisionStatus::Parked), 10, 0).unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].id, a.id);
    }

    #[test]
    fn test_not_found() {
        let (_tmp, d) = decisions();
        assert!(d.get(123).unwrap().is_none());
        assert!(matches!(
            d.transition(123, DecisionStatus::Closed, None).unwrap_err(),
            OracleError::NotFound(_)
        ));
    }
}
