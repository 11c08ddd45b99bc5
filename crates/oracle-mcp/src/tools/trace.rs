//! Trace tools
//!
//! oracle_trace (create or distill), oracle_trace_list, oracle_trace_get
//! (with optional chain walk).

use serde::Deserialize;
use serde_json::Value;

use oracle_core::{ChainDirection, DigPoints, TraceFilter, TraceInput, TraceStatus};

use crate::state::Oracle;

pub fn create_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "What the discovery session was digging for"
            },
            "queryType": { "type": "string" },
            "files": { "type": "array", "items": { "type": "string" } },
            "commits": { "type": "array", "items": { "type": "string" } },
            "issues": { "type": "array", "items": { "type": "string" } },
            "retros": { "type": "array", "items": { "type": "string" } },
            "learnings": { "type": "array", "items": { "type": "string" } },
            "resonance": { "type": "array", "items": { "type": "string" } },
            "parentTraceId": {
                "type": "string",
                "description": "Links this trace under an existing one"
            },
            "project": { "type": "string" },
            "distill": {
                "type": "object",
                "description": "Distill an existing trace instead of creating one",
                "properties": {
                    "traceId": { "type": "string" },
                    "awakening": { "type": "string" },
                    "promoteToLearning": { "type": "boolean", "default": false }
                },
                "required": ["traceId", "awakening"]
            }
        }
    })
}

pub fn list_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "status": {
                "type": "string",
                "enum": ["raw", "reviewed", "distilling", "distilled"]
            },
            "queryType": { "type": "string" },
            "limit": { "type": "integer", "default": 20, "minimum": 1, "maximum": 100 },
            "offset": { "type": "integer", "default": 0, "minimum": 0 }
        }
    })
}

pub fn get_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "traceId": { "type": "string" },
            "chain": {
                "type": "string",
                "description": "Walk the parent/child chain instead of returning one row",
                "enum": ["up", "down", "both"]
            }
        },
        "required": ["traceId"]
    })
}

#[derive(Debug, Deserialize)]
struct DistillArgs {
    #[serde(rename = "traceId")]
    trace_id: String,
    awakening: String,
    #[serde(rename = "promoteToLearning", default)]
    promote_to_learning: bool,
}

#[derive(Debug, Deserialize)]
struct CreateArgs {
    query: Option<String>,
    #[serde(rename = "queryType")]
    query_type: Option<String>,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    commits: Vec<String>,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    retros: Vec<String>,
    #[serde(default)]
    learnings: Vec<String>,
    #[serde(default)]
    resonance: Vec<String>,
    #[serde(rename = "parentTraceId")]
    parent_trace_id: Option<String>,
    project: Option<String>,
    distill: Option<DistillArgs>,
}

#[derive(Debug, Deserialize, Default)]
struct ListArgs {
    status: Option<String>,
    #[serde(rename = "queryType")]
    query_type: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct GetArgs {
    #[serde(rename = "traceId")]
    trace_id: String,
    chain: Option<String>,
}

pub async fn execute_create(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: CreateArgs = serde_json::from_value(super::require_args(args)?)
        .map_err(|e| format!("Invalid arguments: {}", e))?;

    if let Some(distill) = args.distill {
        let trace = oracle
            .traces
            .distill(
                &distill.trace_id,
                &distill.awakening,
                distill.promote_to_learning,
                &oracle.learn,
            )
            .map_err(|e| e.to_string())?;
        return serde_json::to_value(trace).map_err(|e| e.to_string());
    }

    let query = args
        .query
        .ok_or_else(|| "Missing required field: query".to_string())?;
    let trace = oracle
        .traces
        .create(TraceInput {
            query,
            query_type: args.query_type,
            dig_points: DigPoints {
                files: args.files,
                commits: args.commits,
                issues: args.issues,
                retros: args.retros,
                learnings: args.learnings,
                resonance: args.resonance,
            },
            parent_trace_id: args.parent_trace_id,
            project: args.project,
        })
        .map_err(|e| e.to_string())?;
    serde_json::to_value(trace).map_err(|e| e.to_string())
}

pub async fn execute_list(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: ListArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => ListArgs::default(),
    };
    let status = match args.status.as_deref() {
        None => None,
        Some(s) => Some(TraceStatus::parse(s).ok_or_else(|| format!("Invalid status: {}", s))?),
    };
    let traces = oracle
        .traces
        .list(&TraceFilter {
            status,
            query_type: args.query_type,
            limit: args.limit.unwrap_or(20).clamp(1, 100),
            offset: args.offset.unwrap_or(0),
        })
        .map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "traces": traces }))
}

pub async fn execute_get(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: GetArgs = serde_json::from_value(super::require_args(args)?)
        .map_err(|e| format!("Invalid arguments: {}", e))?;

    match args.chain {
        Some(direction) => {
            let direction = ChainDirection::parse(&direction)
                .ok_or_else(|| format!("Invalid chain direction: {}", direction))?;
            let chain = oracle
                .traces
                .chain(&args.trace_id, direction)
                .map_err(|e| e.to_string())?;
            serde_json::to_value(chain).map_err(|e| e.to_string())
        }
        None => {
            let trace = oracle
                .traces
                .get(&args.trace_id)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("Not found: trace {}", args.trace_id))?;
            serde_json::to_value(trace).map_err(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::temp_oracle;

    #[tokio::test]
    async fn test_trace_create_chain_distill() {
        let (_tmp, oracle) = temp_oracle();

        let t0 = execute_create(
            &oracle,
            Some(serde_json::json!({"query": "shared soul", "files": ["a.md"]})),
        )
        .await
        .unwrap();
        let t0_id = t0["trace_id"].as_str().unwrap().to_string();

        let t1 = execute_create(
            &oracle,
            Some(serde_json::json!({"query": "Dec 17 awakening", "parentTraceId": t0_id})),
        )
        .await
        .unwrap();
        let t1_id = t1["trace_id"].as_str().unwrap().to_string();
        assert_eq!(t1["depth"], 1);

        let chain = execute_get(
            &oracle,
            Some(serde_json::json!({"traceId": t0_id, "chain": "down"})),
        )
        .await
        .unwrap();
        assert_eq!(chain["traces"].as_array().unwrap().len(), 2);

        let distilled = execute_create(
            &oracle,
            Some(serde_json::json!({
                "distill": {
                    "traceId": t1_id,
                    "awakening": "Freedom IS unity",
                    "promoteToLearning": true
                }
            })),
        )
        .await
        .unwrap();
        assert_eq!(distilled["status"], "distilled");
        let learning_id = distilled["distilled_to_id"].as_str().unwrap();
        assert!(oracle.store.get_document(learning_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_trace_list_filtered() {
        let (_tmp, oracle) = temp_oracle();
        execute_create(&oracle, Some(serde_json::json!({"query": "q1"})))
            .await
            .unwrap();

        let listed = execute_list(&oracle, Some(serde_json::json!({"status": "raw"})))
            .await
            .unwrap();
        assert_eq!(listed["traces"].as_array().unwrap().len(), 1);
    }
}
