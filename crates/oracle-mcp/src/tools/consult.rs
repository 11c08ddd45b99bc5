//! oracle_consult
//!
//! Decision guidance from principles + patterns.

use serde::Deserialize;
use serde_json::Value;

use crate::state::Oracle;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "decision": {
                "type": "string",
                "description": "The decision question to consult on"
            },
            "context": {
                "type": "string",
                "description": "Additional context around the decision"
            }
        },
        "required": ["decision"]
    })
}

#[derive(Debug, Deserialize)]
struct ConsultArgs {
    decision: String,
    context: Option<String>,
}

pub async fn execute(oracle: &Oracle, args: Option<Value>) -> Result<Value, String> {
    let args: ConsultArgs = serde_json::from_value(super::require_args(args)?)
        .map_err(|e| format!("Invalid arguments: {}", e))?;

    let response = oracle
        .consult
        .consult(&args.decision, args.context.as_deref())
        .await
        .map_err(|e| e.to_string())?;
    serde_json::to_value(response).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::temp_oracle;

    #[tokio::test]
    async fn test_consult_tool_empty_corpus() {
        let (_tmp, oracle) = temp_oracle();
        let result = execute(
            &oracle,
            Some(serde_json::json!({"decision": "rewrite everything?"})),
        )
        .await
        .unwrap();
        assert_eq!(
            result["guidance"],
            "No matching principles or patterns for: \"rewrite everything?\""
        );
    }
}
