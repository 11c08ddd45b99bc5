//! Oracle Core - Personal Knowledge Memory Engine
//!
//! Ingests a markdown corpus (principles, learnings, retrospectives) into
//! two co-indexed stores — an FTS5 keyword index and an external vector
//! backend — and answers hybrid retrieval queries with stable ranking under
//! partial failure of either side.
//!
//! Core pieces:
//! - Store: single-writer SQLite with FTS5 + telemetry tables
//! - VectorBackend: child process spoken to over a JSON-RPC pipe
//! - Parser/Indexer: markdown → granular chunks → both indices
//! - Retrieval: sanitize, query both backends, normalize, fuse, log
//! - Consult: decision question → principles + patterns + guidance
//! - Learn: append a pattern (file + both store rows, never the vectors)
//! - Trace/Forum/Decisions: append-only session, thread, and decision logs
//! - Dashboard: read-only telemetry rollups

pub mod config;
pub mod consult;
pub mod dashboard;
pub mod decisions;
pub mod document;
pub mod error;
pub mod forum;
pub mod indexer;
pub mod learn;
pub mod parser;
pub mod project;
pub mod search;
pub mod store;
pub mod trace;
pub mod vector;

pub use config::Config;
pub use consult::{Consult, ConsultResponse};
pub use dashboard::Dashboard;
pub use decisions::{DecisionInput, DecisionStatus, DecisionUpdate, Decisions};
pub use document::{DocType, DocumentMeta, Origin, ParsedDocument, Project};
pub use error::{OracleError, Result};
pub use forum::{Forum, ThreadMessageInput};
pub use indexer::{IndexReport, Indexer};
pub use learn::{Learn, LearnRequest, LearnResponse};
pub use parser::Parser;
pub use project::resolve_scope;
pub use search::{Retrieval, SearchMode, SearchRequest, SearchResponse};
pub use store::{IndexingStatus, ProjectScope, Store};
pub use trace::{ChainDirection, DigPoints, TraceFilter, TraceInput, TraceLog, TraceStatus};
pub use vector::{VectorBackend, VectorError};
