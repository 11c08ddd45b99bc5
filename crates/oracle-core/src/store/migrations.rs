//! Database Migrations
//!
//! Schema migration definitions for the store.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: documents, FTS5, projects, indexing status",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Telemetry log tables",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Trace log (discovery sessions)",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "Forum threads/messages and decisions",
        up: MIGRATION_V4_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Documents, keyword index, projects, indexing status singleton
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS oracle_documents (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    source_file TEXT NOT NULL,
    concepts TEXT NOT NULL DEFAULT '[]',
    project TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    indexed_at TEXT NOT NULL,

    -- Supersede chain: rows are never deleted, only pointed past
    superseded_by TEXT,
    superseded_at TEXT,
    superseded_reason TEXT,

    -- Provenance (never rewritten once set)
    origin TEXT,
    created_by TEXT
);

CREATE INDEX IF NOT EXISTS idx_documents_type ON oracle_documents(type);
CREATE INDEX IF NOT EXISTS idx_documents_source ON oracle_documents(source_file);
CREATE INDEX IF NOT EXISTS idx_documents_project ON oracle_documents(project);
CREATE INDEX IF NOT EXISTS idx_documents_indexed ON oracle_documents(indexed_at);

-- Standalone FTS5 table: content lives here, metadata in oracle_documents.
-- Porter stemmer over unicode text; rank is bm25 (negative, lower = better).
CREATE VIRTUAL TABLE IF NOT EXISTS oracle_fts USING fts5(
    id, type, title, content, concepts,
    tokenize = 'porter unicode61'
);

CREATE TABLE IF NOT EXISTS projects (
    slug TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    color TEXT NOT NULL DEFAULT '#888888',
    description TEXT,
    path TEXT,
    created_at TEXT NOT NULL
);

-- Singleton row, id = 1
CREATE TABLE IF NOT EXISTS indexing_status (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    is_indexing INTEGER NOT NULL DEFAULT 0,
    progress_current INTEGER NOT NULL DEFAULT 0,
    progress_total INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    completed_at TEXT,
    error TEXT
);
INSERT OR IGNORE INTO indexing_status (id) VALUES (1);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Append-only telemetry tables (fire-and-forget inserts)
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS search_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    type TEXT,
    mode TEXT,
    results_count INTEGER NOT NULL DEFAULT 0,
    search_time_ms INTEGER NOT NULL DEFAULT 0,
    project TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS consult_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    decision TEXT NOT NULL,
    context TEXT,
    principles_found INTEGER NOT NULL DEFAULT 0,
    patterns_found INTEGER NOT NULL DEFAULT 0,
    guidance TEXT,
    project TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS learn_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL,
    pattern_preview TEXT,
    source TEXT,
    concepts TEXT NOT NULL DEFAULT '[]',
    project TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS document_access (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL,
    access_type TEXT NOT NULL,
    project TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_search_log_created ON search_log(created_at);
CREATE INDEX IF NOT EXISTS idx_consult_log_created ON consult_log(created_at);
CREATE INDEX IF NOT EXISTS idx_learn_log_created ON learn_log(created_at);
CREATE INDEX IF NOT EXISTS idx_access_doc ON document_access(document_id);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: Trace log — a directed forest of discovery sessions
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS trace_log (
    trace_id TEXT PRIMARY KEY,
    query TEXT NOT NULL,
    query_type TEXT,

    -- Dig points, JSON arrays
    files TEXT NOT NULL DEFAULT '[]',
    commits TEXT NOT NULL DEFAULT '[]',
    issues TEXT NOT NULL DEFAULT '[]',
    retros TEXT NOT NULL DEFAULT '[]',
    learnings TEXT NOT NULL DEFAULT '[]',
    resonance TEXT NOT NULL DEFAULT '[]',

    -- Counts recomputed from the arrays at create time
    file_count INTEGER NOT NULL DEFAULT 0,
    commit_count INTEGER NOT NULL DEFAULT 0,
    issue_count INTEGER NOT NULL DEFAULT 0,

    depth INTEGER NOT NULL DEFAULT 0,
    parent_trace_id TEXT,
    child_trace_ids TEXT NOT NULL DEFAULT '[]',

    status TEXT NOT NULL DEFAULT 'raw',
    awakening TEXT,
    distilled_to_id TEXT,
    distilled_at TEXT,

    project TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trace_parent ON trace_log(parent_trace_id);
CREATE INDEX IF NOT EXISTS idx_trace_created ON trace_log(created_at);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// V4: Forum threads/messages and decision records
const MIGRATION_V4_UP: &str = r#"
CREATE TABLE IF NOT EXISTS forum_threads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    project TEXT,
    created_by TEXT,
    issue_url TEXT,
    issue_number INTEGER,
    synced_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS forum_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id INTEGER NOT NULL REFERENCES forum_threads(id),
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    author TEXT,
    principles_found INTEGER,
    patterns_found INTEGER,
    search_query TEXT,
    comment_id TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_thread ON forum_messages(thread_id);

CREATE TABLE IF NOT EXISTS decisions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    context TEXT,
    options TEXT NOT NULL DEFAULT '[]',
    decision TEXT,
    rationale TEXT,
    project TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    decided_at TEXT,
    decided_by TEXT
);

CREATE INDEX IF NOT EXISTS idx_decisions_status ON decisions(status);

UPDATE schema_version SET version = 4, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            // execute_batch handles the multi-statement SQL
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
