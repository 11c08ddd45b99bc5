//! Forum thread tools
//!
//! oracle_thread (post a message), oracle_threads (list),
//! oracle_thread_read, oracle_thread_update (status).

use serde::Deserialize;
use serde_json::Value;

use oracle_core::ThreadMessageInput;

use crate::state::Oracle;

pub fn post_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "message": {
                "type": "string",
                "description": "Message content"
            },
            "threadId": {
                "type": "integer",
                "description": "Existing thread id; omitted to start a new thread"
            },
            "title": {
                "type": "string",
                "description": "Thread title when creating; defaults to the first 50 chars of the message"
            },
            "role": {
                "type": "string",
                "enum": ["human", "oracle", "claude"],
                "default": "human"
            },
            "project": {
                "type": "string"
            }
        },
        "required": ["message"]
    })
}

pub fn list_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "status": {
                "type": "string",
                "enum": ["active", "pending", "answered", "closed"]
            },
            "limit": { "type": "integer", "default": 20, "minimum": 1, "maximum": 100 },
            "offset": { "type": "integer", "default": 0, "minimum": 0 }
        }
    })
}

pub fn read_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "threadId": { "type": "integer" }
        },
        "required": ["threadId"]
    })
}

pub fn update_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "threadId": { "type": "integer" },
            "status": {
                "type": "string",
                "enum": ["active", "pending", "answered", "closed"]
            }
        },
        "required": ["threadId", "status"]
    })
}

#[derive(Debug, Deserialize)]
struct PostArgs {
    message: String,
    #[serde(rename = "threadId")]
    thread_id: Option<i64>,
    title: Option<String>,
    role: Option<String>,
    project: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ListArgs {
    status: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ReadArgs {
    #[serde(rename = "threadId")]
    thread_id: i64,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    #[serde(rename = "threadId")]
    thread_id: i64,
    status: String,
}

pub async fn execute_post(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: PostArgs = serde_json::from_value(super::require_args(args)?)
        .map_err(|e| format!("Invalid arguments: {}", e))?;

    let reply = oracle
        .forum
        .handle_message(ThreadMessageInput {
            message: args.message,
            thread_id: args.thread_id,
            title: args.title,
            role: args.role,
            project: args.project,
        })
        .await
        .map_err(|e| e.to_string())?;
    serde_json::to_value(reply).map_err(|e| e.to_string())
}

pub async fn execute_list(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: ListArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => ListArgs::default(),
    };
    let threads = oracle
        .forum
        .list_threads(
            args.status.as_deref(),
            args.limit.unwrap_or(20).clamp(1, 100),
            args.offset.unwrap_or(0),
        )
        .map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "threads": threads }))
}

pub async fn execute_read(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: ReadArgs = serde_json::from_value(super::require_args(args)?)
        .map_err(|e| format!("Invalid arguments: {}", e))?;

    let thread = oracle
        .forum
        .get_thread(args.thread_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Not found: thread {}", args.thread_id))?;
    let messages = oracle
        .forum
        .messages(args.thread_id)
        .map_err(|e| e.to_string())?;

    Ok(serde_json::json!({ "thread": thread, "messages": messages }))
}

pub async fn execute_update(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: UpdateArgs = serde_json::from_value(super::require_args(args)?)
        .map_err(|e| format!("Invalid arguments: {}", e))?;

    let thread = oracle
        .forum
        .update_status(args.thread_id, &args.status)
        .map_err(|e| e.to_string())?;
    serde_json::to_value(thread).map_err(|e| e.to_string())
}
