//! Shared protocol types for communication between the native client
//! and the Windows COM bridge process running under WINE.
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.
//!
//! The bridge never hands COM pointers across the pipe. Every object it
//! acquires (application, workbook, worksheet, range) is parked in a handle
//! table and the client receives an opaque `u64`. The client is responsible
//! for sending [`Command::Release`] for every handle it was given, except
//! workbook handles, which [`Command::CloseWorkbook`] releases.

use serde::{Deserialize, Serialize};

pub use sheetrelay_core::{CellError, CellValue};

/// A command sent from the client to the bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    /// The command to execute.
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the client can send to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Initialize COM and create the Excel.Application instance.
    /// Returns the application handle.
    Init,

    /// Open an existing workbook (Windows path). Returns a workbook handle.
    OpenWorkbook { path: String },

    /// Create a new empty workbook. Returns a workbook handle.
    CreateWorkbook,

    /// Save a workbook in place.
    SaveWorkbook { workbook: u64 },

    /// Save a workbook to a new path (Windows path). Format follows the extension.
    SaveWorkbookAs { workbook: u64, path: String },

    /// Close a workbook, discarding unsaved changes unless `save` is set,
    /// and release its handle.
    CloseWorkbook { workbook: u64, save: bool },

    /// Look up a worksheet by name. Returns a handle, or no data if absent.
    GetWorksheet { workbook: u64, name: String },

    /// Names of the first `limit` worksheets, in tab order.
    ListWorksheets { workbook: u64, limit: u32 },

    /// Look up a defined name and return a handle to the range it refers to,
    /// or no data if the workbook has no such name.
    GetName { workbook: u64, name: String },

    /// The first `limit` defined names.
    ListNames { workbook: u64, limit: u32 },

    /// Evaluate an address against a worksheet. Returns a range handle.
    GetRange { sheet: u64, address: String },

    /// Describe a range: display address, owning sheet and dimensions.
    RangeInfo { range: u64 },

    /// Read the values of a range as a row-major 2D array.
    GetValues { range: u64 },

    /// Write a row-major 2D array into a range.
    SetValues { range: u64, values: Vec<Vec<CellValue>> },

    /// Read the formulas of a range (constants come back as their text).
    GetFormulas { range: u64 },

    /// Write formulas into a range.
    SetFormulas { range: u64, formulas: Vec<Vec<String>> },

    /// Release a handle. Releasing an unknown handle is not an error.
    Release { handle: u64 },

    /// Shut down the bridge: close all workbooks, quit Excel, uninitialize COM.
    Shutdown,
}

/// A response sent from the bridge back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The request ID this response corresponds to.
    pub id: u64,
    /// The result of the command.
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ResponseResult {
    pub fn ok(data: ResponseData) -> Self {
        ResponseResult::Ok { data: Some(data) }
    }

    pub fn empty() -> Self {
        ResponseResult::Ok { data: None }
    }
}

/// Data returned in successful responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Handle to a newly acquired object.
    Handle { handle: u64 },
    /// A list of sheet or defined names.
    Names { names: Vec<String> },
    /// Description of a range.
    Range(RangeDescription),
    /// Cell values, row-major.
    Values { values: Vec<Vec<CellValue>> },
    /// Cell formulas, row-major.
    Formulas { formulas: Vec<Vec<String>> },
}

/// What the application reports about a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescription {
    /// Address as reported by the application, e.g. `$A$1:$B$2`
    pub address: String,
    /// Name of the owning worksheet, when the application reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub rows: u32,
    pub columns: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_wire_format() {
        let req = Request {
            id: 7,
            command: Command::GetRange {
                sheet: 3,
                address: "A1:B2".into(),
            },
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"id":7,"cmd":"GetRange","params":{"sheet":3,"address":"A1:B2"}}"#
        );

        let unit = serde_json::to_string(&Request {
            id: 1,
            command: Command::Init,
        })
        .unwrap();
        assert_eq!(unit, r#"{"id":1,"cmd":"Init"}"#);
    }

    #[test]
    fn test_response_data_is_distinguishable() {
        let parse = |s: &str| -> Response { serde_json::from_str(s).unwrap() };

        let r = parse(r#"{"id":1,"status":"ok","data":{"handle":9}}"#);
        assert!(matches!(
            r.result,
            ResponseResult::Ok {
                data: Some(ResponseData::Handle { handle: 9 })
            }
        ));

        let r = parse(r#"{"id":2,"status":"ok","data":{"address":"$A$1","sheet":"Sheet1","rows":1,"columns":1}}"#);
        let ResponseResult::Ok {
            data: Some(ResponseData::Range(desc)),
        } = r.result
        else {
            panic!("expected range description");
        };
        assert_eq!(desc.sheet.as_deref(), Some("Sheet1"));

        let r = parse(r#"{"id":3,"status":"ok"}"#);
        assert!(matches!(r.result, ResponseResult::Ok { data: None }));

        let r = parse(r#"{"id":4,"status":"error","message":"boom"}"#);
        assert!(matches!(r.result, ResponseResult::Error { .. }));
    }
}
