//! Tool Handlers
//!
//! One module per tool family. Each exposes `schema()` (JSON Schema for
//! the tool's input) and `execute()` returning the JSON payload or an
//! error string for the protocol layer to wrap.

pub mod concepts;
pub mod consult;
pub mod decisions;
pub mod learn;
pub mod list;
pub mod reflect;
pub mod search;
pub mod stats;
pub mod thread;
pub mod trace;

use oracle_core::DocType;
use serde_json::Value;

/// Parse a `type` argument: absent or `all` means no filter.
pub(crate) fn parse_type_filter(value: Option<&str>) -> Result<Option<DocType>, String> {
    match value {
        None | Some("all") => Ok(None),
        Some(s) => DocType::parse(s)
            .map(Some)
            .ok_or_else(|| format!("Invalid type: {}", s)),
    }
}

/// Interpret a `project` argument: absent means auto-detect from cwd,
/// empty string means universal-only, anything else is the project slug.
pub(crate) fn explicit_project(value: Option<String>) -> Option<Option<String>> {
    value.map(|p| if p.is_empty() { None } else { Some(p) })
}

/// Missing-arguments guard shared by handlers that require input.
pub(crate) fn require_args(args: Option<Value>) -> Result<Value, String> {
    args.ok_or_else(|| "Missing arguments".to_string())
}
