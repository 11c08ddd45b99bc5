//! oracle_search
//!
//! Hybrid search over the knowledge corpus.

use serde::Deserialize;
use serde_json::Value;

use oracle_core::{SearchMode, SearchRequest};

use crate::state::Oracle;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Search query"
            },
            "type": {
                "type": "string",
                "description": "Document type filter",
                "enum": ["principle", "pattern", "learning", "retro", "all"],
                "default": "all"
            },
            "limit": {
                "type": "integer",
                "description": "Maximum number of results (default: 10)",
                "default": 10,
                "minimum": 1,
                "maximum": 100
            },
            "offset": {
                "type": "integer",
                "description": "Pagination offset",
                "default": 0,
                "minimum": 0
            },
            "mode": {
                "type": "string",
                "description": "Retrieval mode: hybrid fuses keyword and vector results",
                "enum": ["hybrid", "fts", "vector"],
                "default": "hybrid"
            },
            "project": {
                "type": "string",
                "description": "Project slug; empty string restricts to universal documents"
            },
            "cwd": {
                "type": "string",
                "description": "Working directory for project auto-detection"
            }
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(rename = "type")]
    doc_type: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
    mode: Option<String>,
    project: Option<String>,
    cwd: Option<String>,
}

pub async fn execute(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: SearchArgs = serde_json::from_value(super::require_args(args)?)
        .map_err(|e| format!("Invalid arguments: {}", e))?;

    let doc_type = super::parse_type_filter(args.doc_type.as_deref())?;
    let mode = match args.mode.as_deref() {
        None => SearchMode::Hybrid,
        Some(s) => SearchMode::parse(s).ok_or_else(|| format!("Invalid mode: {}", s))?,
    };

    let mut request = SearchRequest::new(args.query);
    request.doc_type = doc_type;
    request.limit = args.limit.unwrap_or(10);
    request.offset = args.offset.unwrap_or(0);
    request.mode = mode;
    request.project = super::explicit_project(args.project);
    request.cwd = args.cwd.map(Into::into);

    let response = oracle
        .retrieval
        .search(request)
        .await
        .map_err(|e| e.to_string())?;
    serde_json::to_value(response).map_err(|e| e.to_string())
}
