//! Decision tools
//!
//! oracle_decisions_list / _create / _get / _update. Status changes ride
//! on update and go through the transition graph.

use serde::Deserialize;
use serde_json::Value;

use oracle_core::{DecisionInput, DecisionStatus, DecisionUpdate};

use crate::state::Oracle;

pub fn list_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "status": {
                "type": "string",
                "enum": ["pending", "parked", "researching", "decided", "implemented", "closed"]
            },
            "limit": { "type": "integer", "default": 20, "minimum": 1, "maximum": 100 },
            "offset": { "type": "integer", "default": 0, "minimum": 0 }
        }
    })
}

pub fn create_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "context": { "type": "string" },
            "options": { "type": "array", "items": { "type": "string" } },
            "project": { "type": "string" },
            "tags": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["title"]
    })
}

pub fn get_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": { "type": "integer" }
        },
        "required": ["id"]
    })
}

pub fn update_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": { "type": "integer" },
            "title": { "type": "string" },
            "context": { "type": "string" },
            "options": { "type": "array", "items": { "type": "string" } },
            "decision": { "type": "string" },
            "rationale": { "type": "string" },
            "tags": { "type": "array", "items": { "type": "string" } },
            "status": {
                "type": "string",
                "description": "Target status; must be a legal transition",
                "enum": ["pending", "parked", "researching", "decided", "implemented", "closed"]
            },
            "decidedBy": {
                "type": "string",
                "description": "Recorded when transitioning to decided"
            }
        },
        "required": ["id"]
    })
}

#[derive(Debug, Deserialize, Default)]
struct ListArgs {
    status: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CreateArgs {
    title: String,
    context: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    project: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GetArgs {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    id: i64,
    title: Option<String>,
    context: Option<String>,
    options: Option<Vec<String>>,
    decision: Option<String>,
    rationale: Option<String>,
    tags: Option<Vec<String>>,
    status: Option<String>,
    #[serde(rename = "decidedBy")]
    decided_by: Option<String>,
}

fn parse_status(s: &str) -> Result<DecisionStatus, String> {
    DecisionStatus::parse(s).ok_or_else(|| format!("Invalid status: {}", s))
}

pub async fn execute_list(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: ListArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => ListArgs::default(),
    };
    let status = args.status.as_deref().map(parse_status).transpose()?;
    let decisions = oracle
        .decisions
        .list(
            status,
            args.limit.unwrap_or(20).clamp(1, 100),
            args.offset.unwrap_or(0),
        )
        .map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "decisions": decisions }))
}

pub async fn execute_create(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: CreateArgs = serde_json::from_value(super::require_args(args)?)
        .map_err(|e| format!("Invalid arguments: {}", e))?;
    let decision = oracle
        .decisions
        .create(DecisionInput {
            title: args.title,
            context: args.context,
            options: args.options,
            project: args.project,
            tags: args.tags,
        })
        .map_err(|e| e.to_string())?;
    serde_json::to_value(decision).map_err(|e| e.to_string())
}

pub async fn execute_get(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: GetArgs = serde_json::from_value(super::require_args(args)?)
        .map_err(|e| format!("Invalid arguments: {}", e))?;
    let decision = oracle
        .decisions
        .get(args.id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Not found: decision {}", args.id))?;
    serde_json::to_value(decision).map_err(|e| e.to_string())
}

pub async fn execute_update(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: UpdateArgs = serde_json::from_value(super::require_args(args)?)
        .map_err(|e| format!("Invalid arguments: {}", e))?;

    let has_field_updates = args.title.is_some()
        || args.context.is_some()
        || args.options.is_some()
        || args.decision.is_some()
        || args.rationale.is_some()
        || args.tags.is_some();
    if has_field_updates {
        oracle
            .decisions
            .update(
                args.id,
                DecisionUpdate {
                    title: args.title,
                    context: args.context,
                    options: args.options,
                    decision: args.decision,
                    rationale: args.rationale,
                    tags: args.tags,
                },
            )
            .map_err(|e| e.to_string())?;
    }

    let decision = match args.status {
        Some(status) => oracle
            .decisions
            .transition(args.id, parse_status(&status)?, args.decided_by.as_deref())
            .map_err(|e| e.to_string())?,
        None => oracle
            .decisions
            .get(args.id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("Not found: decision {}", args.id))?,
    };
    serde_json::to_value(decision).map_err(|e| e.to_string())
}
