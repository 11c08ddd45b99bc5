//! Vector Backend Client
//!
//! The embedding model runs as an external child process; this client
//! speaks newline-framed JSON-RPC 2.0 over its piped stdin/stdout. The
//! child owns embedding and top-k similarity over a single named
//! collection. Calls are serialized through one async mutex (the child is
//! single-request-at-a-time) and bounded by a per-call timeout, after which
//! the caller degrades to keyword-only.
//!
//! Distance convention: cosine distance in [0, 2] — 0 identical,
//! 1 orthogonal, 2 opposite.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::warn;

/// Hard limit on one pipe round-trip
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(2);

/// Upsert batch size
pub const UPSERT_BATCH: usize = 100;

/// Vector backend error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    /// Child process could not be spawned
    #[error("Vector backend spawn failed: {0}")]
    Spawn(String),
    /// Pipe I/O failed or the child closed the pipe
    #[error("Vector backend pipe error: {0}")]
    Pipe(String),
    /// The call exceeded the RPC timeout
    #[error("Vector backend timed out after {0:?}")]
    Timeout(Duration),
    /// The child answered with a JSON-RPC error
    #[error("Vector backend error: {0}")]
    Remote(String),
    /// The child answered with something unparseable
    #[error("Vector backend protocol error: {0}")]
    Protocol(String),
}

pub type VectorResult<T> = std::result::Result<T, VectorError>;

/// One item staged for upsert.
#[derive(Debug, Clone, Serialize)]
pub struct VectorItem {
    pub id: String,
    pub text: String,
    pub metadata: Value,
}

/// Parallel arrays returned by a top-k query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VectorQueryResult {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub documents: Vec<String>,
    #[serde(default)]
    pub metadatas: Vec<Value>,
    #[serde(default)]
    pub distances: Vec<f64>,
}

/// Collection statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorStats {
    pub count: i64,
}

struct Pipe {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Client for the external embedding/similarity child process.
pub struct VectorBackend {
    command: String,
    timeout: Duration,
    /// Lazily-spawned child; also serializes request frames on the pipe.
    pipe: Mutex<Option<Pipe>>,
    next_id: AtomicU64,
}

impl VectorBackend {
    /// Create a client for `command`. The child is not spawned until the
    /// first call (but see [`VectorBackend::prewarm`]).
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: DEFAULT_RPC_TIMEOUT,
            pipe: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn(&self) -> VectorResult<Pipe> {
        let mut child = Command::new(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VectorError::Spawn(format!("{}: {}", self.command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| VectorError::Spawn("no stdin pipe".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VectorError::Spawn("no stdout pipe".into()))?;

        Ok(Pipe {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Spawn the child ahead of time so the first query does not pay the
    /// startup cost. Errors are reported but not fatal.
    pub async fn prewarm(&self) {
        let mut guard = self.pipe.lock().await;
        if guard.is_none() {
            match self.spawn() {
                Ok(pipe) => *guard = Some(pipe),
                Err(e) => warn!("oracle: vector backend prewarm failed: {}", e),
            }
        }
    }

    /// One JSON-RPC round trip, holding the pipe for the duration.
    async fn call(&self, method: &str, params: Value) -> VectorResult<Value> {
        let mut guard = self.pipe.lock().await;
        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut frame = serde_json::to_string(&request)
            .map_err(|e| VectorError::Protocol(e.to_string()))?;
        frame.push('\n');

        let result = tokio::time::timeout(self.timeout, async {
            let pipe = guard.as_mut().expect("pipe populated above");
            pipe.stdin
                .write_all(frame.as_bytes())
                .await
                .map_err(|e| VectorError::Pipe(e.to_string()))?;
            pipe.stdin
                .flush()
                .await
                .map_err(|e| VectorError::Pipe(e.to_string()))?;

            let mut line = String::new();
            let n = pipe
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| VectorError::Pipe(e.to_string()))?;
            if n == 0 {
                return Err(VectorError::Pipe("child closed the pipe".into()));
            }
            Ok(line)
        })
        .await;

        let line = match result {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                // A broken pipe means the child is gone; drop it so the next
                // call respawns.
                self.teardown(&mut guard).await;
                return Err(e);
            }
            Err(_) => {
                // An abandoned call leaves the pipe in an unknown framing
                // state; the child is restarted on the next call.
                self.teardown(&mut guard).await;
                return Err(VectorError::Timeout(self.timeout));
            }
        };

        let response: Value = serde_json::from_str(line.trim())
            .map_err(|e| VectorError::Protocol(format!("bad frame: {}", e)))?;
        if let Some(err) = response.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(VectorError::Remote(message.to_string()));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn teardown(&self, guard: &mut Option<Pipe>) {
        if let Some(mut pipe) = guard.take() {
            let _ = pipe.child.start_kill();
        }
    }

    /// Idempotently create the collection.
    pub async fn ensure_collection(&self, name: &str) -> VectorResult<()> {
        self.call("ensure_collection", json!({ "name": name })).await?;
        Ok(())
    }

    /// Upsert a batch of items. Callers batch at [`UPSERT_BATCH`]; a
    /// duplicate id overwrites.
    pub async fn upsert(&self, name: &str, items: &[VectorItem]) -> VectorResult<()> {
        self.call("upsert", json!({ "name": name, "items": items })).await?;
        Ok(())
    }

    /// Top-k nearest neighbours for `text`. `where_type` is the only
    /// server-side equality filter pushed down.
    pub async fn query(
        &self,
        name: &str,
        text: &str,
        k: usize,
        where_type: Option<&str>,
    ) -> VectorResult<VectorQueryResult> {
        let mut params = json!({ "name": name, "text": text, "k": k });
        if let Some(t) = where_type {
            params["where"] = json!({ "type": t });
        }
        let result = self.call("query", params).await?;
        serde_json::from_value(result).map_err(|e| VectorError::Protocol(e.to_string()))
    }

    /// Collection statistics.
    pub async fn stats(&self, name: &str) -> VectorResult<VectorStats> {
        let result = self.call("stats", json!({ "name": name })).await?;
        serde_json::from_value(result).map_err(|e| VectorError::Protocol(e.to_string()))
    }

    /// Drop the collection (re-index rebuilds it).
    pub async fn delete_collection(&self, name: &str) -> VectorResult<()> {
        self.call("delete_collection", json!({ "name": name })).await?;
        Ok(())
    }

    /// Terminate the child process (cooperative shutdown).
    pub async fn shutdown(&self) {
        let mut guard = self.pipe.lock().await;
        self.teardown(&mut guard).await;
    }
}

/// Convert cosine distance `d ∈ [0, 2]` into similarity in [0, 1]:
/// 0 distance → 1.0, orthogonal → 0.5, opposite → 0.0.
pub fn distance_to_similarity(d: f64) -> f64 {
    (1.0 - d / 2.0).max(0.0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_similarity_bounds() {
        assert_eq!(distance_to_similarity(0.0), 1.0);
        assert_eq!(distance_to_similarity(1.0), 0.5);
        assert_eq!(distance_to_similarity(2.0), 0.0);
        // Out-of-range distances clamp at zero
        assert_eq!(distance_to_similarity(3.0), 0.0);
    }

    #[test]
    fn test_query_result_parses_partial_frames() {
        let result: VectorQueryResult = serde_json::from_value(json!({
            "ids": ["a", "b"],
            "distances": [0.1, 0.4],
        }))
        .unwrap();
        assert_eq!(result.ids.len(), 2);
        assert!(result.documents.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_command_degrades() {
        let backend = VectorBackend::new("oracle-embedd-does-not-exist")
            .with_timeout(Duration::from_millis(200));
        let err = backend.query("c", "q", 5, None).await.unwrap_err();
        assert!(matches!(err, VectorError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_echo_child_protocol_error() {
        // `cat` echoes the request back: a valid JSON frame but not a
        // JSON-RPC result we accept silently — it parses as a response with
        // no error and no result, which maps to Null.
        let backend = VectorBackend::new("cat").with_timeout(Duration::from_millis(500));
        let result = backend.call("stats", json!({ "name": "c" })).await;
        match result {
            Ok(v) => assert!(v.is_null()),
            Err(VectorError::Spawn(_)) => {} // no `cat` on exotic hosts
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}
