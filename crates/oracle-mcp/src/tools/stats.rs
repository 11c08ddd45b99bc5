//! oracle_stats
//!
//! The dashboard summary over the tool protocol.

use serde_json::Value;

use crate::state::Oracle;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute(oracle: &Oracle, _args: Option<Value>) -> Result<Value, String> {
    let summary = oracle.dashboard.summary().map_err(|e| e.to_string())?;
    serde_json::to_value(summary).map_err(|e| e.to_string())
}
