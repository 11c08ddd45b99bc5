//! oracle_concepts
//!
//! Concept tag counts, descending.

use serde::Deserialize;
use serde_json::Value;

use crate::state::Oracle;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "type": {
                "type": "string",
                "enum": ["principle", "pattern", "learning", "retro", "all"],
                "default": "all"
            },
            "limit": {
                "type": "integer",
                "default": 20,
                "minimum": 1,
                "maximum": 100
            }
        }
    })
}

#[derive(Debug, Deserialize, Default)]
struct ConceptsArgs {
    #[serde(rename = "type")]
    doc_type: Option<String>,
    limit: Option<usize>,
}

pub async fn execute(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: ConceptsArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => ConceptsArgs::default(),
    };

    let doc_type = super::parse_type_filter(args.doc_type.as_deref())?;
    let limit = args.limit.unwrap_or(20).clamp(1, 100);

    let counts = oracle
        .store
        .concept_counts(doc_type, limit)
        .map_err(|e| e.to_string())?;

    let concepts: Vec<Value> = counts
        .into_iter()
        .map(|(concept, count)| serde_json::json!({"concept": concept, "count": count}))
        .collect();
    Ok(serde_json::json!({ "concepts": concepts }))
}
