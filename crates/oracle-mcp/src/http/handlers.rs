//! HTTP API Handlers
//!
//! JSON endpoints mirroring the tool set plus dashboard routes. Errors are
//! always `{"error": message}` with a 4xx/5xx status; stack traces never
//! cross the wire.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use oracle_core::{
    ChainDirection, DecisionInput, DecisionStatus, DecisionUpdate, DigPoints, LearnRequest,
    OracleError, Origin, SearchMode, SearchRequest, ThreadMessageInput, TraceFilter, TraceInput,
    TraceStatus,
};

use crate::state::Oracle;
use crate::tools::{explicit_project, parse_type_filter};

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult = Result<Json<Value>, ApiError>;

/// Map engine errors onto wire errors.
pub fn api_error(e: OracleError) -> ApiError {
    let status = match &e {
        OracleError::Validation(_) => StatusCode::BAD_REQUEST,
        OracleError::NotFound(_) => StatusCode::NOT_FOUND,
        OracleError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
}

fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": message.into() })),
    )
}

fn to_json<T: serde::Serialize>(value: T) -> ApiResult {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| api_error(OracleError::Init(e.to_string())))
}

// ============================================================================
// HEALTH / SEARCH / CONSULT / REFLECT
// ============================================================================

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub mode: Option<String>,
    pub project: Option<String>,
    pub cwd: Option<String>,
}

pub async fn search(
    State(oracle): State<Arc<Oracle>>,
    Query(params): Query<SearchParams>,
) -> ApiResult {
    let doc_type = parse_type_filter(params.doc_type.as_deref()).map_err(bad_request)?;
    let mode = match params.mode.as_deref() {
        None => SearchMode::Hybrid,
        Some(s) => SearchMode::parse(s).ok_or_else(|| bad_request(format!("Invalid mode: {}", s)))?,
    };

    let mut request = SearchRequest::new(params.q);
    request.doc_type = doc_type;
    request.limit = params.limit.unwrap_or(10);
    request.offset = params.offset.unwrap_or(0);
    request.mode = mode;
    request.project = explicit_project(params.project);
    request.cwd = params.cwd.map(Into::into);

    let response = oracle.retrieval.search(request).await.map_err(api_error)?;
    to_json(response)
}

#[derive(Debug, Deserialize)]
pub struct ConsultParams {
    pub q: String,
    pub context: Option<String>,
}

pub async fn consult(
    State(oracle): State<Arc<Oracle>>,
    Query(params): Query<ConsultParams>,
) -> ApiResult {
    let response = oracle
        .consult
        .consult(&params.q, params.context.as_deref())
        .await
        .map_err(api_error)?;
    to_json(response)
}

pub async fn reflect(State(oracle): State<Arc<Oracle>>) -> ApiResult {
    let doc = oracle
        .store
        .random_reflect()
        .map_err(api_error)?
        .ok_or_else(|| not_found("No principles or learnings indexed yet"))?;
    to_json(doc)
}

// ============================================================================
// BROWSING
// ============================================================================

pub async fn stats(State(oracle): State<Arc<Oracle>>) -> ApiResult {
    to_json(oracle.dashboard.summary().map_err(api_error)?)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub group: Option<bool>,
}

pub async fn list(
    State(oracle): State<Arc<Oracle>>,
    Query(params): Query<ListParams>,
) -> ApiResult {
    let doc_type = parse_type_filter(params.doc_type.as_deref()).map_err(bad_request)?;
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = params.offset.unwrap_or(0);
    let group = params.group.unwrap_or(true);

    let documents = oracle
        .store
        .list_documents(doc_type, limit, offset, group)
        .map_err(api_error)?;
    Ok(Json(json!({
        "documents": documents,
        "limit": limit,
        "offset": offset,
        "group": group,
    })))
}

pub async fn graph(State(oracle): State<Arc<Oracle>>) -> ApiResult {
    Ok(Json(oracle.dashboard.graph(100).map_err(api_error)?))
}

#[derive(Debug, Deserialize)]
pub struct ConceptsParams {
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub limit: Option<usize>,
}

pub async fn concepts(
    State(oracle): State<Arc<Oracle>>,
    Query(params): Query<ConceptsParams>,
) -> ApiResult {
    let doc_type = parse_type_filter(params.doc_type.as_deref()).map_err(bad_request)?;
    let counts = oracle
        .store
        .concept_counts(doc_type, params.limit.unwrap_or(20).clamp(1, 100))
        .map_err(api_error)?;
    let concepts: Vec<Value> = counts
        .into_iter()
        .map(|(concept, count)| json!({"concept": concept, "count": count}))
        .collect();
    Ok(Json(json!({ "concepts": concepts })))
}

// ============================================================================
// LEARN
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LearnBody {
    pub pattern: String,
    pub source: Option<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    pub origin: Option<String>,
    pub project: Option<String>,
    pub cwd: Option<String>,
}

pub async fn learn(
    State(oracle): State<Arc<Oracle>>,
    Json(body): Json<LearnBody>,
) -> ApiResult {
    let origin = match body.origin.as_deref() {
        None => None,
        Some(s) => Some(
            Origin::parse(s).ok_or_else(|| bad_request(format!("Invalid origin: {}", s)))?,
        ),
    };

    let response = oracle
        .learn
        .learn(LearnRequest {
            pattern: body.pattern,
            source: body.source,
            concepts: body.concepts,
            origin,
            project: explicit_project(body.project),
            cwd: body.cwd.map(Into::into),
        })
        .map_err(api_error)?;
    to_json(response)
}

// ============================================================================
// FILE ACCESS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FileParams {
    pub path: String,
}

/// Serve a file from under the repo root. Both sides are resolved via
/// `realpath`; symlinks that escape the root are rejected.
pub async fn file(
    State(oracle): State<Arc<Oracle>>,
    Query(params): Query<FileParams>,
) -> ApiResult {
    let root = oracle
        .config
        .repo_root
        .canonicalize()
        .map_err(|e| api_error(OracleError::Init(format!("repo root unresolvable: {}", e))))?;

    let requested = std::path::Path::new(&params.path);
    let absolute = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    let resolved = absolute
        .canonicalize()
        .map_err(|_| not_found(format!("File not found: {}", params.path)))?;

    if !resolved.starts_with(&root) {
        return Err(bad_request("Path escapes the repository root"));
    }

    let content = std::fs::read_to_string(&resolved)
        .map_err(|e| api_error(OracleError::Io(e)))?;
    Ok(Json(json!({
        "path": params.path,
        "content": content,
    })))
}

// ============================================================================
// DASHBOARD
// ============================================================================

pub async fn dashboard_summary(State(oracle): State<Arc<Oracle>>) -> ApiResult {
    to_json(oracle.dashboard.summary().map_err(api_error)?)
}

#[derive(Debug, Deserialize)]
pub struct ActivityParams {
    pub days: Option<i64>,
}

pub async fn dashboard_activity(
    State(oracle): State<Arc<Oracle>>,
    Query(params): Query<ActivityParams>,
) -> ApiResult {
    Ok(Json(
        oracle
            .dashboard
            .activity(params.days.unwrap_or(7))
            .map_err(api_error)?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct GrowthParams {
    pub period: Option<String>,
}

pub async fn dashboard_growth(
    State(oracle): State<Arc<Oracle>>,
    Query(params): Query<GrowthParams>,
) -> ApiResult {
    let period = params.period.as_deref().unwrap_or("week");
    if !matches!(period, "week" | "month" | "quarter") {
        return Err(bad_request(format!("Invalid period: {}", period)));
    }
    Ok(Json(oracle.dashboard.growth(period).map_err(api_error)?))
}

#[derive(Debug, Deserialize)]
pub struct SessionStatsParams {
    pub since: String,
}

pub async fn session_stats(
    State(oracle): State<Arc<Oracle>>,
    Query(params): Query<SessionStatsParams>,
) -> ApiResult {
    to_json(
        oracle
            .dashboard
            .session_stats(&params.since)
            .map_err(api_error)?,
    )
}

// ============================================================================
// THREADS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ThreadsParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn threads(
    State(oracle): State<Arc<Oracle>>,
    Query(params): Query<ThreadsParams>,
) -> ApiResult {
    let threads = oracle
        .forum
        .list_threads(
            params.status.as_deref(),
            params.limit.unwrap_or(20).clamp(1, 100),
            params.offset.unwrap_or(0),
        )
        .map_err(api_error)?;
    Ok(Json(json!({ "threads": threads })))
}

#[derive(Debug, Deserialize)]
pub struct ThreadBody {
    pub message: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<i64>,
    pub title: Option<String>,
    pub role: Option<String>,
    pub project: Option<String>,
}

pub async fn post_thread(
    State(oracle): State<Arc<Oracle>>,
    Json(body): Json<ThreadBody>,
) -> ApiResult {
    let reply = oracle
        .forum
        .handle_message(ThreadMessageInput {
            message: body.message,
            thread_id: body.thread_id,
            title: body.title,
            role: body.role,
            project: body.project,
        })
        .await
        .map_err(api_error)?;
    to_json(reply)
}

pub async fn get_thread(
    State(oracle): State<Arc<Oracle>>,
    Path(id): Path<i64>,
) -> ApiResult {
    let thread = oracle
        .forum
        .get_thread(id)
        .map_err(api_error)?
        .ok_or_else(|| not_found(format!("Thread: {}", id)))?;
    let messages = oracle.forum.messages(id).map_err(api_error)?;
    Ok(Json(json!({ "thread": thread, "messages": messages })))
}

#[derive(Debug, Deserialize)]
pub struct ThreadStatusBody {
    pub status: String,
}

pub async fn patch_thread_status(
    State(oracle): State<Arc<Oracle>>,
    Path(id): Path<i64>,
    Json(body): Json<ThreadStatusBody>,
) -> ApiResult {
    to_json(
        oracle
            .forum
            .update_status(id, &body.status)
            .map_err(api_error)?,
    )
}

// ============================================================================
// DECISIONS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DecisionsParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn parse_decision_status(s: &str) -> Result<DecisionStatus, ApiError> {
    DecisionStatus::parse(s).ok_or_else(|| bad_request(format!("Invalid status: {}", s)))
}

pub async fn decisions_list(
    State(oracle): State<Arc<Oracle>>,
    Query(params): Query<DecisionsParams>,
) -> ApiResult {
    let status = params
        .status
        .as_deref()
        .map(parse_decision_status)
        .transpose()?;
    let decisions = oracle
        .decisions
        .list(
            status,
            params.limit.unwrap_or(20).clamp(1, 100),
            params.offset.unwrap_or(0),
        )
        .map_err(api_error)?;
    Ok(Json(json!({ "decisions": decisions })))
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub title: String,
    pub context: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    pub project: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub async fn decisions_create(
    State(oracle): State<Arc<Oracle>>,
    Json(body): Json<DecisionBody>,
) -> ApiResult {
    to_json(
        oracle
            .decisions
            .create(DecisionInput {
                title: body.title,
                context: body.context,
                options: body.options,
                project: body.project,
                tags: body.tags,
            })
            .map_err(api_error)?,
    )
}

pub async fn decisions_get(
    State(oracle): State<Arc<Oracle>>,
    Path(id): Path<i64>,
) -> ApiResult {
    let decision = oracle
        .decisions
        .get(id)
        .map_err(api_error)?
        .ok_or_else(|| not_found(format!("Decision: {}", id)))?;
    to_json(decision)
}

#[derive(Debug, Deserialize)]
pub struct DecisionPatchBody {
    pub title: Option<String>,
    pub context: Option<String>,
    pub options: Option<Vec<String>>,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub async fn decisions_patch(
    State(oracle): State<Arc<Oracle>>,
    Path(id): Path<i64>,
    Json(body): Json<DecisionPatchBody>,
) -> ApiResult {
    to_json(
        oracle
            .decisions
            .update(
                id,
                DecisionUpdate {
                    title: body.title,
                    context: body.context,
                    options: body.options,
                    decision: body.decision,
                    rationale: body.rationale,
                    tags: body.tags,
                },
            )
            .map_err(api_error)?,
    )
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub status: String,
    #[serde(rename = "decidedBy")]
    pub decided_by: Option<String>,
}

pub async fn decisions_transition(
    State(oracle): State<Arc<Oracle>>,
    Path(id): Path<i64>,
    Json(body): Json<TransitionBody>,
) -> ApiResult {
    let status = parse_decision_status(&body.status)?;
    to_json(
        oracle
            .decisions
            .transition(id, status, body.decided_by.as_deref())
            .map_err(api_error)?,
    )
}

// ============================================================================
// TRACES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TracesParams {
    pub status: Option<String>,
    #[serde(rename = "queryType")]
    pub query_type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn traces_list(
    State(oracle): State<Arc<Oracle>>,
    Query(params): Query<TracesParams>,
) -> ApiResult {
    let status = match params.status.as_deref() {
        None => None,
        Some(s) => Some(
            TraceStatus::parse(s).ok_or_else(|| bad_request(format!("Invalid status: {}", s)))?,
        ),
    };
    let traces = oracle
        .traces
        .list(&TraceFilter {
            status,
            query_type: params.query_type,
            limit: params.limit.unwrap_or(20).clamp(1, 100),
            offset: params.offset.unwrap_or(0),
        })
        .map_err(api_error)?;
    Ok(Json(json!({ "traces": traces })))
}

#[derive(Debug, Deserialize)]
pub struct TraceBody {
    pub query: String,
    #[serde(rename = "queryType")]
    pub query_type: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub retros: Vec<String>,
    #[serde(default)]
    pub learnings: Vec<String>,
    #[serde(default)]
    pub resonance: Vec<String>,
    #[serde(rename = "parentTraceId")]
    pub parent_trace_id: Option<String>,
    pub project: Option<String>,
}

pub async fn traces_create(
    State(oracle): State<Arc<Oracle>>,
    Json(body): Json<TraceBody>,
) -> ApiResult {
    to_json(
        oracle
            .traces
            .create(TraceInput {
                query: body.query,
                query_type: body.query_type,
                dig_points: DigPoints {
                    files: body.files,
                    commits: body.commits,
                    issues: body.issues,
                    retros: body.retros,
                    learnings: body.learnings,
                    resonance: body.resonance,
                },
                parent_trace_id: body.parent_trace_id,
                project: body.project,
            })
            .map_err(api_error)?,
    )
}

#[derive(Debug, Deserialize)]
pub struct TraceGetParams {
    pub chain: Option<String>,
}

pub async fn traces_get(
    State(oracle): State<Arc<Oracle>>,
    Path(id): Path<String>,
    Query(params): Query<TraceGetParams>,
) -> ApiResult {
    match params.chain.as_deref() {
        Some(direction) => {
            let direction = ChainDirection::parse(direction)
                .ok_or_else(|| bad_request(format!("Invalid chain direction: {}", direction)))?;
            to_json(oracle.traces.chain(&id, direction).map_err(api_error)?)
        }
        None => {
            let trace = oracle
                .traces
                .get(&id)
                .map_err(api_error)?
                .ok_or_else(|| not_found(format!("Trace: {}", id)))?;
            to_json(trace)
        }
    }
}
