//! Forum
//!
//! Append-only discussion threads. Every non-oracle message triggers an
//! oracle auto-reply synthesized by Consult over the thread's recent
//! context. Thread statuses are filter tags; any transition between them
//! is legal.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::consult::Consult;
use crate::error::{OracleError, Result};
use crate::store::Store;

/// Thread status tags.
pub const THREAD_STATUSES: &[&str] = &["active", "pending", "answered", "closed"];

/// Message roles.
pub const MESSAGE_ROLES: &[&str] = &["human", "oracle", "claude"];

/// Title length when derived from the first message.
const DERIVED_TITLE_LEN: usize = 50;

/// Number of prior messages fed to the oracle as context.
const REPLY_CONTEXT_MESSAGES: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct ForumThread {
    pub id: i64,
    pub title: String,
    pub status: String,
    pub project: Option<String>,
    pub created_by: Option<String>,
    pub issue_url: Option<String>,
    pub issue_number: Option<i64>,
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForumMessage {
    pub id: i64,
    pub thread_id: i64,
    pub role: String,
    pub content: String,
    pub author: Option<String>,
    pub principles_found: Option<i64>,
    pub patterns_found: Option<i64>,
    pub search_query: Option<String>,
    pub comment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for one thread message.
#[derive(Debug, Clone, Default)]
pub struct ThreadMessageInput {
    pub message: String,
    pub thread_id: Option<i64>,
    pub title: Option<String>,
    pub role: Option<String>,
    pub project: Option<String>,
}

/// Result of posting one message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadReply {
    pub thread: ForumThread,
    pub message: ForumMessage,
    pub oracle_reply: Option<ForumMessage>,
}

pub struct Forum {
    store: Arc<Store>,
    consult: Consult,
}

impl Forum {
    pub fn new(store: Arc<Store>, consult: Consult) -> Self {
        Self { store, consult }
    }

    /// Post a message, creating the thread on first contact. Non-oracle
    /// messages get an oracle auto-reply.
    pub async fn handle_message(&self, input: ThreadMessageInput) -> Result<ThreadReply> {
        if input.message.trim().is_empty() {
            return Err(OracleError::Validation("Message cannot be empty".into()));
        }
        let role = input.role.clone().unwrap_or_else(|| "human".to_string());
        if !MESSAGE_ROLES.contains(&role.as_str()) {
            return Err(OracleError::Validation(format!("Unknown role: {}", role)));
        }

        let thread = match input.thread_id {
            Some(id) => self
                .get_thread(id)?
                .ok_or_else(|| OracleError::NotFound(format!("Thread: {}", id)))?,
            None => {
                let title = input.title.clone().unwrap_or_else(|| {
                    input.message.chars().take(DERIVED_TITLE_LEN).collect()
                });
                self.create_thread(&title, &role, input.project.as_deref())?
            }
        };

        // Recent context for the oracle reply, oldest first
        let prior: Vec<String> = self
            .messages(thread.id)?
            .into_iter()
            .rev()
            .take(REPLY_CONTEXT_MESSAGES)
            .rev()
            .map(|m| m.content)
            .collect();

        let message = self.insert_message(
            thread.id,
            &role,
            &input.message,
            input.role.as_deref(),
            None,
            None,
            None,
        )?;

        let oracle_reply = if role != "oracle" {
            let context = if prior.is_empty() {
                None
            } else {
                Some(prior.join("\n"))
            };
            let consulted = self
                .consult
                .consult(&input.message, context.as_deref())
                .await?;
            Some(self.insert_message(
                thread.id,
                "oracle",
                &consulted.guidance,
                Some("oracle"),
                Some(consulted.principles.len() as i64),
                Some(consulted.patterns.len() as i64),
                Some(&input.message),
            )?)
        } else {
            None
        };

        self.touch_thread(thread.id)?;
        let thread = self
            .get_thread(thread.id)?
            .ok_or_else(|| OracleError::NotFound(format!("Thread: {}", thread.id)))?;

        Ok(ThreadReply {
            thread,
            message,
            oracle_reply,
        })
    }

    fn create_thread(&self, title: &str, created_by: &str, project: Option<&str>) -> Result<ForumThread> {
        let now = Utc::now().to_rfc3339();
        let writer = self.store.writer()?;
        writer.execute(
            "INSERT INTO forum_threads (title, status, project, created_by, created_at, updated_at)
             VALUES (?1, 'active', ?2, ?3, ?4, ?4)",
            params![title, project, created_by, now],
        )?;
        let id = writer.last_insert_rowid();
        drop(writer);
        self.get_thread(id)?
            .ok_or_else(|| OracleError::NotFound(format!("Thread: {}", id)))
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_message(
        &self,
        thread_id: i64,
        role: &str,
        content: &str,
        author: Option<&str>,
        principles_found: Option<i64>,
        patterns_found: Option<i64>,
        search_query: Option<&str>,
    ) -> Result<ForumMessage> {
        let writer = self.store.writer()?;
        writer.execute(
            "INSERT INTO forum_messages (thread_id, role, content, author, principles_found, patterns_found, search_query, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                thread_id,
                role,
                content,
                author,
                principles_found,
                patterns_found,
                search_query,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = writer.last_insert_rowid();
        let message = writer.query_row(
            "SELECT id, thread_id, role, content, author, principles_found, patterns_found, search_query, comment_id, created_at
             FROM forum_messages WHERE id = ?1",
            params![id],
            Self::row_to_message,
        )?;
        Ok(message)
    }

    fn touch_thread(&self, id: i64) -> Result<()> {
        let writer = self.store.writer()?;
        writer.execute(
            "UPDATE forum_threads SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    fn row_to_thread(row: &rusqlite::Row) -> rusqlite::Result<ForumThread> {
        let synced: Option<String> = row.get(7)?;
        let created: String = row.get(8)?;
        let updated: String = row.get(9)?;
        Ok(ForumThread {
            id: row.get(0)?,
            title: row.get(1)?,
            status: row.get(2)?,
            project: row.get(3)?,
            created_by: row.get(4)?,
            issue_url: row.get(5)?,
            issue_number: row.get(6)?,
            synced_at: Store::parse_opt_timestamp(synced),
            created_at: Store::parse_timestamp(&created),
            updated_at: Store::parse_timestamp(&updated),
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<ForumMessage> {
        let created: String = row.get(9)?;
        Ok(ForumMessage {
            id: row.get(0)?,
            thread_id: row.get(1)?,
            role: row.get(2)?,
            content: row.get(3)?,
            author: row.get(4)?,
            principles_found: row.get(5)?,
            patterns_found: row.get(6)?,
            search_query: row.get(7)?,
            comment_id: row.get(8)?,
            created_at: Store::parse_timestamp(&created),
        })
    }

    /// One thread by id.
    pub fn get_thread(&self, id: i64) -> Result<Option<ForumThread>> {
        let reader = self.store.reader()?;
        let thread = reader
            .query_row(
                "SELECT id, title, status, project, created_by, issue_url, issue_number, synced_at, created_at, updated_at
                 FROM forum_threads WHERE id = ?1",
                params![id],
                Self::row_to_thread,
            )
            .optional()?;
        Ok(thread)
    }

    /// All messages of a thread, oldest first.
    pub fn messages(&self, thread_id: i64) -> Result<Vec<ForumMessage>> {
        let reader = self.store.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, thread_id, role, content, author, principles_found, patterns_found, search_query, comment_id, created_at
             FROM forum_messages WHERE thread_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![thread_id], Self::row_to_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Threads newest-activity-first, optionally filtered by status.
    pub fn list_threads(&self, status: Option<&str>, limit: usize, offset: usize) -> Result<Vec<ForumThread>> {
        if let Some(s) = status {
            if !THREAD_STATUSES.contains(&s) {
                return Err(OracleError::Validation(format!("Unknown thread status: {}", s)));
            }
        }
        let sql = match status {
            Some(_) => {
                "SELECT id, title, status, project, created_by, issue_url, issue_number, synced_at, created_at, updated_at
                 FROM forum_threads WHERE status = :status ORDER BY updated_at DESC LIMIT :limit OFFSET :offset"
            }
            None => {
                "SELECT id, title, status, project, created_by, issue_url, issue_number, synced_at, created_at, updated_at
                 FROM forum_threads ORDER BY updated_at DESC LIMIT :limit OFFSET :offset"
            }
        };

        let reader = self.store.reader()?;
        let mut stmt = reader.prepare(sql)?;
        let limit = limit as i64;
        let offset = offset as i64;
        let mut params: Vec<(&str, &dyn rusqlite::ToSql)> =
            vec![(":limit", &limit), (":offset", &offset)];
        if let Some(ref s) = status {
            params.push((":status", s));
        }
        let rows = stmt.query_map(params.as_slice(), Self::row_to_thread)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Set a thread's status. Any transition between the known statuses is
    /// legal; the dashboard treats them as filter tags.
    pub fn update_status(&self, id: i64, status: &str) -> Result<ForumThread> {
        if !THREAD_STATUSES.contains(&status) {
            return Err(OracleError::Validation(format!("Unknown thread status: {}", status)));
        }
        let writer = self.store.writer()?;
        let changed = writer.execute(
            "UPDATE forum_threads SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, Utc::now().to_rfc3339(), id],
        )?;
        drop(writer);
        if changed == 0 {
            return Err(OracleError::NotFound(format!("Thread: {}", id)));
        }
        self.get_thread(id)?
            .ok_or_else(|| OracleError::NotFound(format!("Thread: {}", id)))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{seed_doc, temp_store};
    use crate::document::DocType;
    use crate::vector::VectorBackend;
    use std::time::Duration;

    fn forum() -> (tempfile::TempDir, Arc<Store>, Forum) {
        let (tmp, store) = temp_store();
        let store = Arc::new(store);
        let vector = Arc::new(
            VectorBackend::new("oracle-embedd-test-missing")
                .with_timeout(Duration::from_millis(100)),
        );
        let consult = Consult::new(Arc::clone(&store), vector, "oracle_knowledge");
        (tmp, Arc::clone(&store), Forum::new(store, consult))
    }

    #[tokio::test]
    async fn test_new_thread_with_oracle_reply() {
        let (_tmp, store, forum) = forum();
        seed_doc(
            store.as_ref(),
            "p1",
            DocType::Principle,
            "Nothing is deleted; preserve history always",
        );

        let reply = forum
            .handle_message(ThreadMessageInput {
                message: "should we delete the old records?".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(reply.thread.status, "active");
        assert_eq!(reply.thread.created_by.as_deref(), Some("human"));
        assert_eq!(reply.message.role, "human");

        let oracle = reply.oracle_reply.unwrap();
        assert_eq!(oracle.role, "oracle");
        assert_eq!(oracle.author.as_deref(), Some("oracle"));
        assert_eq!(
            oracle.search_query.as_deref(),
            Some("should we delete the old records?")
        );
        assert!(oracle.principles_found.unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_title_derived_from_message() {
        let (_tmp, _store, forum) = forum();
        let long_message = "x".repeat(80);
        let reply = forum
            .handle_message(ThreadMessageInput {
                message: long_message,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(reply.thread.title.chars().count(), DERIVED_TITLE_LEN);
    }

    #[tokio::test]
    async fn test_oracle_message_gets_no_reply() {
        let (_tmp, _store, forum) = forum();
        let reply = forum
            .handle_message(ThreadMessageInput {
                message: "an oracle pronouncement".into(),
                role: Some("oracle".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(reply.oracle_reply.is_none());
    }

    #[tokio::test]
    async fn test_followup_message_appends() {
        let (_tmp, _store, forum) = forum();
        let first = forum
            .handle_message(ThreadMessageInput {
                message: "first question".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let second = forum
            .handle_message(ThreadMessageInput {
                message: "second question".into(),
                thread_id: Some(first.thread.id),
                role: Some("claude".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(second.thread.id, first.thread.id);
        let messages = forum.messages(first.thread.id).unwrap();
        // human + oracle + claude + oracle
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_role_rejected() {
        let (_tmp, _store, forum) = forum();
        let err = forum
            .handle_message(ThreadMessageInput {
                message: "hello".into(),
                role: Some("robot".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Validation(_)));
    }

    #[tokio::test]
    async fn test_status_updates() {
        let (_tmp, _store, forum) = forum();
        let reply = forum
            .handle_message(ThreadMessageInput {
                message: "cycle me".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let id = reply.thread.id;
        for status in ["pending", "answered", "closed", "active"] {
            let thread = forum.update_status(id, status).unwrap();
            assert_eq!(thread.status, status);
        }
        assert!(matches!(
            forum.update_status(id, "bogus").unwrap_err(),
            OracleError::Validation(_)
        ));
        assert!(matches!(
            forum.update_status(9999, "closed").unwrap_err(),
            OracleError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_threads_filtered() {
        let (_tmp, _store, forum) = forum();
        let a = forum
            .handle_message(ThreadMessageInput {
                message: "thread a".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        forum
            .handle_message(ThreadMessageInput {
                message: "thread b".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        forum.update_status(a.thread.id, "closed").unwrap();

        assert_eq!(forum.list_threads(None, 10, 0).unwrap().len(), 2);
        let closed = forum.list_threads(Some("closed"), 10, 0).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, a.thread.id);
    }
}
