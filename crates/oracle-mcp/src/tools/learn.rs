//! oracle_learn
//!
//! Append a new pattern to the corpus.

use serde::Deserialize;
use serde_json::Value;

use oracle_core::{LearnRequest, Origin};

use crate::state::Oracle;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "pattern": {
                "type": "string",
                "description": "The pattern or insight to record (multi-line allowed)"
            },
            "source": {
                "type": "string",
                "description": "Where the pattern came from"
            },
            "concepts": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Concept tags; extracted from the pattern when omitted"
            },
            "origin": {
                "type": "string",
                "enum": ["mother", "arthur", "volt", "human"],
                "description": "Provenance origin"
            },
            "project": {
                "type": "string",
                "description": "Project slug; empty string means universal"
            },
            "cwd": {
                "type": "string",
                "description": "Working directory for project auto-detection"
            }
        },
        "required": ["pattern"]
    })
}

#[derive(Debug, Deserialize)]
struct LearnArgs {
    pattern: String,
    source: Option<String>,
    #[serde(default)]
    concepts: Vec<String>,
    origin: Option<String>,
    project: Option<String>,
    cwd: Option<String>,
}

pub async fn execute(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: LearnArgs = serde_json::from_value(super::require_args(args)?)
        .map_err(|e| format!("Invalid arguments: {}", e))?;

    let origin = match args.origin.as_deref() {
        None => None,
        Some(s) => Some(Origin::parse(s).ok_or_else(|| format!("Invalid origin: {}", s))?),
    };

    let response = oracle
        .learn
        .learn(LearnRequest {
            pattern: args.pattern,
            source: args.source,
            concepts: args.concepts,
            origin,
            project: super::explicit_project(args.project),
            cwd: args.cwd.map(Into::into),
        })
        .map_err(|e| e.to_string())?;
    serde_json::to_value(response).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::temp_oracle;

    #[tokio::test]
    async fn test_learn_tool_roundtrip_and_conflict() {
        let (_tmp, oracle) = temp_oracle();
        let args = serde_json::json!({
            "pattern": "verify twice, delete once",
            "concepts": ["safety"],
            "origin": "human"
        });

        let result = execute(&oracle, Some(args.clone())).await.unwrap();
        assert!(result["id"].as_str().unwrap().starts_with("learning_"));

        let err = execute(&oracle, Some(args)).await.unwrap_err();
        assert!(err.contains("File already exists"));
    }
}
