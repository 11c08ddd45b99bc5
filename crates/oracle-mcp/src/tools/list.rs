//! oracle_list
//!
//! Browse indexed documents. Grouping by source file is the default so UI
//! browsing is not flooded by bullet sub-documents.

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
            },
            "offset": {
                "type": "integer",
                "default": 0,
                "minimum": 0
            },
            "groupByFile": {
                "type": "boolean",
                "description": "One row per source file (default true)",
                "default": true
            }
        }
    })
}

#[derive(Debug, Deserialize, Default)]
struct ListArgs {
    #[serde(rename = "type")]
    doc_type: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
    #[serde(rename = "groupByFile")]
    group_by_file: Option<bool>,
}

pub async fn execute(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: ListArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => ListArgs::default(),
    };

    let doc_type = super::parse_type_filter(args.doc_type.as_deref())?;
    let limit = args.limit.unwrap_or(20).clamp(1, 100);
    let offset = args.offset.unwrap_or(0);
    let group = args.group_by_file.unwrap_or(true);

    let documents = oracle
        .store
        .list_documents(doc_type, limit, offset, group)
        .map_err(|e| e.to_string())?;

    Ok(serde_json::json!({
        "documents": documents,
        "limit": limit,
        "offset": offset,
        "groupByFile": group,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{seed_corpus, temp_oracle};

    #[tokio::test]
    async fn test_list_groups_by_default() {
        let (_tmp, oracle) = temp_oracle();
        seed_corpus(
            &oracle,
            "resonance/core.md",
            "### Rule\n- first bullet\n- second bullet\n",
        );
        oracle.indexer().run().await.unwrap();

        let grouped = execute(&oracle, None).await.unwrap();
        assert_eq!(grouped["documents"].as_array().unwrap().len(), 1);

        let flat = execute(&oracle, Some(serde_json::json!({"groupByFile": false})))
            .await
            .unwrap();
        assert_eq!(flat["documents"].as_array().unwrap().len(), 3);
    }
}
