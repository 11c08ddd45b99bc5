//! oracle_reflect
//!
//! One randomly-chosen principle or learning, full content.

use serde_json::Value;

use crate::state::Oracle;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute(oracle: &Oracle, _args: Option<Value>) -> Result<Value, String> {
    let doc = oracle
        .store
        .random_reflect()
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "No principles or learnings indexed yet".to_string())?;
    serde_json::to_value(doc).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{seed_corpus, temp_oracle};

    #[tokio::test]
    async fn test_reflect_returns_principle_or_learning() {
        let (_tmp, oracle) = temp_oracle();
        seed_corpus(&oracle, "resonance/core.md", "### Rule\nbody text\n");
        oracle.indexer().run().await.unwrap();

        let doc = execute(&oracle, None).await.unwrap();
        assert!(matches!(
            doc["type"].as_str().unwrap(),
            "principle" | "learning"
        ));
        assert!(doc["content"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_reflect_empty_corpus_errors() {
        let (_tmp, oracle) = temp_oracle();
        assert!(execute(&oracle, None).await.is_err());
    }
}
