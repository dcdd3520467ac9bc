//! [`Automation`] over the bridge protocol

use std::path::Path;

use excel_com_protocol::{Command as BridgeCommand, ResponseData};
use sheetrelay::{Automation, AutomationResult, CellValue, NativeHandle, RangeInfo};
use tracing::debug;

use crate::bridge::{BridgeError, ExcelBridge};

fn limit(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

pub(crate) fn expect_handle(
    data: Option<ResponseData>,
    what: &'static str,
) -> Result<NativeHandle, BridgeError> {
    match data {
        Some(ResponseData::Handle { handle }) => Ok(NativeHandle(handle)),
        _ => Err(BridgeError::UnexpectedResponse(what)),
    }
}

/// Lookups answer with a handle, or with no data when nothing matched.
pub(crate) fn optional_handle(
    data: Option<ResponseData>,
    what: &'static str,
) -> Result<Option<NativeHandle>, BridgeError> {
    match data {
        None => Ok(None),
        Some(ResponseData::Handle { handle }) => Ok(Some(NativeHandle(handle))),
        Some(_) => Err(BridgeError::UnexpectedResponse(what)),
    }
}

pub(crate) fn expect_names(
    data: Option<ResponseData>,
    what: &'static str,
) -> Result<Vec<String>, BridgeError> {
    match data {
        Some(ResponseData::Names { names }) => Ok(names),
        None => Ok(Vec::new()),
        _ => Err(BridgeError::UnexpectedResponse(what)),
    }
}

impl ExcelBridge {
    fn call(&self, command: BridgeCommand) -> AutomationResult<Option<ResponseData>> {
        Ok(self.send_command(command)?)
    }

    fn call_unit(&self, command: BridgeCommand) -> AutomationResult<()> {
        self.send_command(command)?;
        Ok(())
    }
}

impl Automation for ExcelBridge {
    fn start_application(&self) -> AutomationResult<NativeHandle> {
        self.ensure_running()?;
        let data = self.call(BridgeCommand::Init)?;
        Ok(expect_handle(data, "Init")?)
    }

    fn quit_application(&self, application: NativeHandle) -> AutomationResult<()> {
        debug!(%application, "quitting excel");
        Ok(self.shutdown()?)
    }

    fn open_workbook(&self, _application: NativeHandle, path: &Path) -> AutomationResult<NativeHandle> {
        let data = self.call(BridgeCommand::OpenWorkbook {
            path: self.bridge_path(path),
        })?;
        Ok(expect_handle(data, "OpenWorkbook")?)
    }

    fn create_workbook(&self, _application: NativeHandle) -> AutomationResult<NativeHandle> {
        let data = self.call(BridgeCommand::CreateWorkbook)?;
        Ok(expect_handle(data, "CreateWorkbook")?)
    }

    fn save_workbook(&self, workbook: NativeHandle) -> AutomationResult<()> {
        self.call_unit(BridgeCommand::SaveWorkbook {
            workbook: workbook.0,
        })
    }

    fn save_workbook_as(&self, workbook: NativeHandle, path: &Path) -> AutomationResult<()> {
        self.call_unit(BridgeCommand::SaveWorkbookAs {
            workbook: workbook.0,
            path: self.bridge_path(path),
        })
    }

    fn close_workbook(&self, workbook: NativeHandle, save: bool) -> AutomationResult<()> {
        self.call_unit(BridgeCommand::CloseWorkbook {
            workbook: workbook.0,
            save,
        })
    }

    fn worksheet(&self, workbook: NativeHandle, name: &str) -> AutomationResult<Option<NativeHandle>> {
        let data = self.call(BridgeCommand::GetWorksheet {
            workbook: workbook.0,
            name: name.to_string(),
        })?;
        Ok(optional_handle(data, "GetWorksheet")?)
    }

    fn worksheet_names(&self, workbook: NativeHandle, max: usize) -> AutomationResult<Vec<String>> {
        let data = self.call(BridgeCommand::ListWorksheets {
            workbook: workbook.0,
            limit: limit(max),
        })?;
        Ok(expect_names(data, "ListWorksheets")?)
    }

    fn named_range(&self, workbook: NativeHandle, name: &str) -> AutomationResult<Option<NativeHandle>> {
        let data = self.call(BridgeCommand::GetName {
            workbook: workbook.0,
            name: name.to_string(),
        })?;
        Ok(optional_handle(data, "GetName")?)
    }

    fn range_names(&self, workbook: NativeHandle, max: usize) -> AutomationResult<Vec<String>> {
        let data = self.call(BridgeCommand::ListNames {
            workbook: workbook.0,
            limit: limit(max),
        })?;
        Ok(expect_names(data, "ListNames")?)
    }

    fn range(&self, sheet: NativeHandle, address: &str) -> AutomationResult<NativeHandle> {
        let data = self.call(BridgeCommand::GetRange {
            sheet: sheet.0,
            address: address.to_string(),
        })?;
        Ok(expect_handle(data, "GetRange")?)
    }

    fn range_info(&self, range: NativeHandle) -> AutomationResult<RangeInfo> {
        match self.call(BridgeCommand::RangeInfo { range: range.0 })? {
            Some(ResponseData::Range(desc)) => Ok(RangeInfo {
                address: desc.address,
                sheet: desc.sheet,
                rows: desc.rows,
                columns: desc.columns,
            }),
            _ => Err(BridgeError::UnexpectedResponse("RangeInfo").into()),
        }
    }

    fn read_values(&self, range: NativeHandle) -> AutomationResult<Vec<Vec<CellValue>>> {
        match self.call(BridgeCommand::GetValues { range: range.0 })? {
            Some(ResponseData::Values { values }) => Ok(values),
            _ => Err(BridgeError::UnexpectedResponse("GetValues").into()),
        }
    }

    fn write_values(&self, range: NativeHandle, values: &[Vec<CellValue>]) -> AutomationResult<()> {
        self.call_unit(BridgeCommand::SetValues {
            range: range.0,
            values: values.to_vec(),
        })
    }

    fn read_formulas(&self, range: NativeHandle) -> AutomationResult<Vec<Vec<String>>> {
        match self.call(BridgeCommand::GetFormulas { range: range.0 })? {
            Some(ResponseData::Formulas { formulas }) => Ok(formulas),
            _ => Err(BridgeError::UnexpectedResponse("GetFormulas").into()),
        }
    }

    fn write_formulas(&self, range: NativeHandle, formulas: &[Vec<String>]) -> AutomationResult<()> {
        self.call_unit(BridgeCommand::SetFormulas {
            range: range.0,
            formulas: formulas.to_vec(),
        })
    }

    fn release(&self, handle: NativeHandle) -> AutomationResult<()> {
        self.call_unit(BridgeCommand::Release { handle: handle.0 })
    }
}
