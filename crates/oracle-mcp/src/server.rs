//! Tool Server Core
//!
//! Routes JSON-RPC requests to the closed tool catalog. One tool call per
//! invocation; the result is a single JSON-stringified content block, and
//! handler errors come back as a content block with `isError: true`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
use crate::state::Oracle;
use crate::tools;

pub struct ToolServer {
    oracle: Arc<Oracle>,
}

impl ToolServer {
    pub fn new(oracle: Arc<Oracle>) -> Self {
        Self { oracle }
    }

    /// Handle one JSON-RPC request; notifications return None.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Use the client's version when it is older than ours
        let negotiated = if request.protocol_version.as_str() < PROTOCOL_VERSION {
            request.protocol_version
        } else {
            PROTOCOL_VERSION.to_string()
        };

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "oracle".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
            },
            instructions: Some(
                "The Oracle is a knowledge memory layer over your markdown corpus. \
                 Use oracle_search for hybrid retrieval, oracle_consult before decisions, \
                 and oracle_learn to record new patterns. Nothing is ever deleted."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let describe = |name: &str, description: &str, input_schema: serde_json::Value| {
            ToolDescription {
                name: name.to_string(),
                description: Some(description.to_string()),
                input_schema,
            }
        };

        let tools = vec![
            describe(
                "oracle_search",
                "Hybrid search (keyword + vector) over principles, learnings, patterns, and retros. Degrades to keyword-only when the vector backend is unavailable.",
                tools::search::schema(),
            ),
            describe(
                "oracle_consult",
                "Consult the corpus before a decision. Returns top principles, top patterns, and a guidance synthesis.",
                tools::consult::schema(),
            ),
            describe(
                "oracle_reflect",
                "One randomly-chosen principle or learning with full content.",
                tools::reflect::schema(),
            ),
            describe(
                "oracle_learn",
                "Record a new pattern: writes a markdown learning plus index rows. Keyword-searchable immediately; vector-searchable after the next reindex.",
                tools::learn::schema(),
            ),
            describe(
                "oracle_list",
                "Browse indexed documents, grouped by source file by default.",
                tools::list::schema(),
            ),
            describe(
                "oracle_stats",
                "Corpus and activity summary: totals by type, top concepts, last-7-day counts, index status.",
                tools::stats::schema(),
            ),
            describe(
                "oracle_concepts",
                "Concept tag counts sorted descending, optionally filtered by type.",
                tools::concepts::schema(),
            ),
            describe(
                "oracle_thread",
                "Post a message to a forum thread (creates the thread when threadId is omitted). Non-oracle messages get an oracle auto-reply.",
                tools::thread::post_schema(),
            ),
            describe(
                "oracle_threads",
                "List forum threads, newest activity first.",
                tools::thread::list_schema(),
            ),
            describe(
                "oracle_thread_read",
                "Read one thread with all of its messages.",
                tools::thread::read_schema(),
            ),
            describe(
                "oracle_thread_update",
                "Set a thread's status tag.",
                tools::thread::update_schema(),
            ),
            describe(
                "oracle_decisions_list",
                "List decision records, optionally by status.",
                tools::decisions::list_schema(),
            ),
            describe(
                "oracle_decisions_create",
                "Create a decision record in pending.",
                tools::decisions::create_schema(),
            ),
            describe(
                "oracle_decisions_get",
                "Fetch one decision record.",
                tools::decisions::get_schema(),
            ),
            describe(
                "oracle_decisions_update",
                "Update decision fields and/or move it along the status graph. Entering decided stamps decided_at/decided_by.",
                tools::decisions::update_schema(),
            ),
            describe(
                "oracle_trace",
                "Create a discovery trace (optionally chained under a parent), or distill an existing trace into an awakening.",
                tools::trace::create_schema(),
            ),
            describe(
                "oracle_trace_list",
                "List traces newest-first with status/type filters.",
                tools::trace::list_schema(),
            ),
            describe(
                "oracle_trace_get",
                "Fetch one trace, or walk its parent/child chain.",
                tools::trace::get_schema(),
            ),
        ];

        let result = ListToolsResult { tools };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        let oracle = self.oracle.as_ref();
        let args = request.arguments;
        let result = match request.name.as_str() {
            "oracle_search" => tools::search::execute(oracle, args).await,
            "oracle_consult" => tools::consult::execute(oracle, args).await,
            "oracle_reflect" => tools::reflect::execute(oracle, args).await,
            "oracle_learn" => tools::learn::execute(oracle, args).await,
            "oracle_list" => tools::list::execute(oracle, args).await,
            "oracle_stats" => tools::stats::execute(oracle, args).await,
            "oracle_concepts" => tools::concepts::execute(oracle, args).await,
            "oracle_thread" => tools::thread::execute_post(oracle, args).await,
            "oracle_threads" => tools::thread::execute_list(oracle, args).await,
            "oracle_thread_read" => tools::thread::execute_read(oracle, args).await,
            "oracle_thread_update" => tools::thread::execute_update(oracle, args).await,
            "oracle_decisions_list" => tools::decisions::execute_list(oracle, args).await,
            "oracle_decisions_create" => tools::decisions::execute_create(oracle, args).await,
            "oracle_decisions_get" => tools::decisions::execute_get(oracle, args).await,
            "oracle_decisions_update" => tools::decisions::execute_update(oracle, args).await,
            "oracle_trace" => tools::trace::execute_create(oracle, args).await,
            "oracle_trace_list" => tools::trace::execute_list(oracle, args).await,
            "oracle_trace_get" => tools::trace::execute_get(oracle, args).await,
            name => Err(format!("Unknown tool: {}", name)),
        };

        let call_result = match result {
            Ok(payload) => CallToolResult::success(&payload),
            Err(message) => {
                warn!("Tool call failed: {}", message);
                CallToolResult::error(&message)
            }
        };
        serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::temp_oracle;
    use serde_json::{json, Value};

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn test_initialize_then_list() {
        let (_tmp, oracle) = temp_oracle();
        let mut server = ToolServer::new(oracle);

        let response = server
            .handle_request(request("initialize", None))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "oracle");

        let response = server
            .handle_request(request("tools/list", None))
            .await
            .unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 18);

        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        for expected in [
            "oracle_search",
            "oracle_consult",
            "oracle_reflect",
            "oracle_learn",
            "oracle_list",
            "oracle_stats",
            "oracle_concepts",
            "oracle_thread",
            "oracle_threads",
            "oracle_thread_read",
            "oracle_thread_update",
            "oracle_decisions_list",
            "oracle_decisions_create",
            "oracle_decisions_get",
            "oracle_decisions_update",
            "oracle_trace",
            "oracle_trace_list",
            "oracle_trace_get",
        ] {
            assert!(names.contains(&expected), "missing tool {}", expected);
        }
    }

    #[tokio::test]
    async fn test_tool_error_is_content_block() {
        let (_tmp, oracle) = temp_oracle();
        let mut server = ToolServer::new(oracle);

        let response = server
            .handle_request(request(
                "tools/call",
                Some(json!({"name": "oracle_search", "arguments": {"query": ""}})),
            ))
            .await
            .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Query cannot be empty"));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let (_tmp, oracle) = temp_oracle();
        let mut server = ToolServer::new(oracle);

        let response = server
            .handle_request(request("tools/call", Some(json!({"name": "oracle_dance"}))))
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["isError"], true);

        let response = server.handle_request(request("bogus/method", None)).await.unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let (_tmp, oracle) = temp_oracle();
        let mut server = ToolServer::new(oracle);
        let notification = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: "notifications/initialized".to_string(),
            params: None,
        };
        assert!(server.handle_request(notification).await.is_none());
    }

    #[tokio::test]
    async fn test_call_payload_is_json_text() {
        let (_tmp, oracle) = temp_oracle();
        let mut server = ToolServer::new(oracle);

        let response = server
            .handle_request(request(
                "tools/call",
                Some(json!({"name": "oracle_stats"})),
            ))
            .await
            .unwrap();

        let result = response.result.unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["totalDocuments"], 0);
    }
}
