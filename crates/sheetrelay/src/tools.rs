//! Tool-call surface
//!
//! Requests arrive as tagged JSON objects, one per line when served over
//! stdio:
//!
//! ```json
//! {"id": 1, "tool": "session.begin", "args": {"path": "/data/report.xlsx"}}
//! {"id": 2, "tool": "range.set_values", "args": {"session_id": "...", "sheet_name": "Sheet1", "range_address": "A1", "values": [[42]]}}
//! ```
//!
//! Every request yields an [`Outcome`]: failures are values, never panics or
//! transport errors.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sheetrelay_core::CellValue;
use tracing::debug;

use crate::error::{ErrorKind, OperationError, SessionError};
use crate::executor::{Access, Executor, Target};
use crate::ops;

/// A request plus the caller's correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: u64,
    #[serde(flatten)]
    pub request: ToolRequest,
}

/// The answer to a [`ToolCall`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: u64,
    #[serde(flatten)]
    pub outcome: Outcome<Value>,
}

fn default_true() -> bool {
    true
}

/// Every tool the surface understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args")]
pub enum ToolRequest {
    #[serde(rename = "session.begin")]
    SessionBegin { path: PathBuf },

    #[serde(rename = "session.create")]
    SessionCreate { path: PathBuf },

    #[serde(rename = "session.commit")]
    SessionCommit {
        session_id: String,
        #[serde(default = "default_true")]
        save: bool,
    },

    #[serde(rename = "session.save")]
    SessionSave { session_id: String },

    #[serde(rename = "session.list")]
    SessionList,

    #[serde(rename = "sheet.list")]
    SheetList {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        path: Option<PathBuf>,
    },

    #[serde(rename = "range.info")]
    RangeInfo {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        sheet_name: String,
        range_address: String,
    },

    #[serde(rename = "range.get_values")]
    RangeGetValues {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        sheet_name: String,
        range_address: String,
    },

    #[serde(rename = "range.set_values")]
    RangeSetValues {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        sheet_name: String,
        range_address: String,
        values: Vec<Vec<CellValue>>,
    },

    #[serde(rename = "range.get_formulas")]
    RangeGetFormulas {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        sheet_name: String,
        range_address: String,
    },

    #[serde(rename = "range.set_formulas")]
    RangeSetFormulas {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        sheet_name: String,
        range_address: String,
        formulas: Vec<Vec<String>>,
    },
}

impl ToolRequest {
    /// The wire name of the tool
    pub fn name(&self) -> &'static str {
        match self {
            ToolRequest::SessionBegin { .. } => "session.begin",
            ToolRequest::SessionCreate { .. } => "session.create",
            ToolRequest::SessionCommit { .. } => "session.commit",
            ToolRequest::SessionSave { .. } => "session.save",
            ToolRequest::SessionList => "session.list",
            ToolRequest::SheetList { .. } => "sheet.list",
            ToolRequest::RangeInfo { .. } => "range.info",
            ToolRequest::RangeGetValues { .. } => "range.get_values",
            ToolRequest::RangeSetValues { .. } => "range.set_values",
            ToolRequest::RangeGetFormulas { .. } => "range.get_formulas",
            ToolRequest::RangeSetFormulas { .. } => "range.set_formulas",
        }
    }
}

/// Success flag, error kind and message, plus the payload on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Valid sheet or defined names when resolution failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
    /// The session already holding the document, for `session_already_open`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error_kind: None,
            message: None,
            data: Some(data),
            alternatives: Vec::new(),
            session_id: None,
        }
    }

    pub fn failed(error: &OperationError) -> Self {
        let session_id = match error {
            OperationError::Session(SessionError::AlreadyOpen { session_id, .. }) => {
                Some(session_id.clone())
            }
            _ => None,
        };
        Self {
            success: false,
            error_kind: Some(error.kind()),
            message: Some(error.to_string()),
            data: None,
            alternatives: error.alternatives().to_vec(),
            session_id,
        }
    }
}

impl<T> From<Result<T, OperationError>> for Outcome<T> {
    fn from(result: Result<T, OperationError>) -> Self {
        match result {
            Ok(data) => Outcome::ok(data),
            Err(e) => Outcome::failed(&e),
        }
    }
}

/// Run one tool request.
pub fn dispatch(executor: &Executor<'_>, request: ToolRequest) -> Outcome<Value> {
    let tool = request.name();
    let outcome = Outcome::from(handle(executor, request));
    match &outcome.error_kind {
        None => debug!(tool, "tool succeeded"),
        Some(kind) => debug!(tool, ?kind, message = outcome.message.as_deref(), "tool failed"),
    }
    outcome
}

/// Run a [`ToolCall`] and tag the outcome with its id.
pub fn answer(executor: &Executor<'_>, call: ToolCall) -> ToolResponse {
    ToolResponse {
        id: call.id,
        outcome: dispatch(executor, call.request),
    }
}

fn handle(executor: &Executor<'_>, request: ToolRequest) -> Result<Value, OperationError> {
    let registry = executor.registry();
    match request {
        ToolRequest::SessionBegin { path } => {
            let session_id = registry.begin(&path)?;
            Ok(json!({ "session_id": session_id }))
        }
        ToolRequest::SessionCreate { path } => {
            let session_id = registry.create(&path)?;
            Ok(json!({ "session_id": session_id }))
        }
        ToolRequest::SessionCommit { session_id, save } => {
            Ok(serde_json::to_value(registry.commit(&session_id, save)?)?)
        }
        ToolRequest::SessionSave { session_id } => {
            registry.save(&session_id)?;
            Ok(json!({ "saved": true }))
        }
        ToolRequest::SessionList => Ok(json!({ "sessions": registry.list() })),
        ToolRequest::SheetList { session_id, path } => {
            let target = Target::from_parts(session_id, path)?;
            let sheets = executor.execute(&target, Access::Read, ops::list_sheets)?;
            Ok(json!({ "sheets": sheets }))
        }
        ToolRequest::RangeInfo {
            session_id,
            path,
            sheet_name,
            range_address,
        } => {
            let target = Target::from_parts(session_id, path)?;
            let summary = executor.execute(&target, Access::Read, |wb| {
                ops::range_info(wb, &sheet_name, &range_address)
            })?;
            Ok(serde_json::to_value(summary)?)
        }
        ToolRequest::RangeGetValues {
            session_id,
            path,
            sheet_name,
            range_address,
        } => {
            let target = Target::from_parts(session_id, path)?;
            let values = executor.execute(&target, Access::Read, |wb| {
                ops::get_values(wb, &sheet_name, &range_address)
            })?;
            Ok(serde_json::to_value(values)?)
        }
        ToolRequest::RangeSetValues {
            session_id,
            path,
            sheet_name,
            range_address,
            values,
        } => {
            let target = Target::from_parts(session_id, path)?;
            let summary = executor.execute(&target, Access::Write, |wb| {
                ops::set_values(wb, &sheet_name, &range_address, &values)
            })?;
            Ok(serde_json::to_value(summary)?)
        }
        ToolRequest::RangeGetFormulas {
            session_id,
            path,
            sheet_name,
            range_address,
        } => {
            let target = Target::from_parts(session_id, path)?;
            let formulas = executor.execute(&target, Access::Read, |wb| {
                ops::get_formulas(wb, &sheet_name, &range_address)
            })?;
            Ok(serde_json::to_value(formulas)?)
        }
        ToolRequest::RangeSetFormulas {
            session_id,
            path,
            sheet_name,
            range_address,
            formulas,
        } => {
            let target = Target::from_parts(session_id, path)?;
            let summary = executor.execute(&target, Access::Write, |wb| {
                ops::set_formulas(wb, &sheet_name, &range_address, &formulas)
            })?;
            Ok(serde_json::to_value(summary)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_tool_call() {
        let call: ToolCall = serde_json::from_str(
            r#"{"id": 7, "tool": "range.get_values", "args": {"session_id": "s", "range_address": "Totals"}}"#,
        )
        .unwrap();
        assert_eq!(call.id, 7);
        assert_eq!(
            call.request,
            ToolRequest::RangeGetValues {
                session_id: Some("s".into()),
                path: None,
                sheet_name: String::new(),
                range_address: "Totals".into(),
            }
        );
    }

    #[test]
    fn test_commit_saves_by_default() {
        let call: ToolCall = serde_json::from_str(
            r#"{"id": 1, "tool": "session.commit", "args": {"session_id": "s"}}"#,
        )
        .unwrap();
        assert_eq!(
            call.request,
            ToolRequest::SessionCommit {
                session_id: "s".into(),
                save: true
            }
        );
    }

    #[test]
    fn test_list_without_args() {
        let call: ToolCall = serde_json::from_str(r#"{"id": 3, "tool": "session.list"}"#).unwrap();
        assert_eq!(call.request, ToolRequest::SessionList);
    }

    #[test]
    fn test_failed_outcome_shape() {
        let err = OperationError::from(SessionError::AlreadyOpen {
            path: PathBuf::from("/tmp/a.xlsx"),
            session_id: "abc".into(),
        });
        let outcome: Outcome<Value> = Outcome::failed(&err);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_kind"], "session_already_open");
        assert_eq!(json["session_id"], "abc");
        assert!(json.get("data").is_none());
        assert!(json.get("alternatives").is_none());
    }
}
