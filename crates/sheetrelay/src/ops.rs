//! Range operations run as units of work
//!
//! Each function binds its range through [`Workbook::resolve`], talks to the
//! application, and lets the bound range release its handle on return.

use serde::{Deserialize, Serialize};
use sheetrelay_core::CellValue;

use crate::error::OperationError;
use crate::executor::Workbook;
use crate::resolve::BoundRange;

/// Upper bound for sheet listings
pub const MAX_SHEETS_LISTED: usize = 256;

/// Description of a resolved range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSummary {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub rows: u32,
    pub columns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<&BoundRange<'_>> for RangeSummary {
    fn from(bound: &BoundRange<'_>) -> Self {
        Self {
            address: bound.address.clone(),
            sheet: bound.sheet.clone(),
            rows: bound.rows,
            columns: bound.columns,
            warning: bound.qualifier_warning.clone(),
        }
    }
}

/// Values read from a range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeValues {
    pub address: String,
    pub values: Vec<Vec<CellValue>>,
}

/// Formulas read from a range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeFormulas {
    pub address: String,
    pub formulas: Vec<Vec<String>>,
}

pub fn range_info(wb: &Workbook<'_>, sheet: &str, address: &str) -> Result<RangeSummary, OperationError> {
    let bound = wb.resolve(sheet, address)?;
    Ok(RangeSummary::from(&bound))
}

pub fn get_values(wb: &Workbook<'_>, sheet: &str, address: &str) -> Result<RangeValues, OperationError> {
    let bound = wb.resolve(sheet, address)?;
    let values = wb.automation().read_values(bound.native()?)?;
    Ok(RangeValues {
        address: bound.address.clone(),
        values,
    })
}

pub fn set_values(
    wb: &Workbook<'_>,
    sheet: &str,
    address: &str,
    values: &[Vec<CellValue>],
) -> Result<RangeSummary, OperationError> {
    let bound = wb.resolve(sheet, address)?;
    check_shape(&bound, values, "values")?;
    wb.automation().write_values(bound.native()?, values)?;
    Ok(RangeSummary::from(&bound))
}

pub fn get_formulas(wb: &Workbook<'_>, sheet: &str, address: &str) -> Result<RangeFormulas, OperationError> {
    let bound = wb.resolve(sheet, address)?;
    let formulas = wb.automation().read_formulas(bound.native()?)?;
    Ok(RangeFormulas {
        address: bound.address.clone(),
        formulas,
    })
}

pub fn set_formulas(
    wb: &Workbook<'_>,
    sheet: &str,
    address: &str,
    formulas: &[Vec<String>],
) -> Result<RangeSummary, OperationError> {
    let bound = wb.resolve(sheet, address)?;
    check_shape(&bound, formulas, "formulas")?;
    wb.automation().write_formulas(bound.native()?, formulas)?;
    Ok(RangeSummary::from(&bound))
}

pub fn list_sheets(wb: &Workbook<'_>) -> Result<Vec<String>, OperationError> {
    wb.worksheet_names(MAX_SHEETS_LISTED)
}

/// The grid must be rectangular and exactly as large as the range.
fn check_shape<T>(bound: &BoundRange<'_>, grid: &[Vec<T>], what: &str) -> Result<(), OperationError> {
    let rows = grid.len();
    if rows == 0 {
        return Err(OperationError::invalid(format!("{what} must not be empty")));
    }
    let columns = grid[0].len();
    if let Some(i) = grid.iter().position(|row| row.len() != columns) {
        return Err(OperationError::invalid(format!(
            "{what} row {} has {} entries, expected {columns}",
            i + 1,
            grid[i].len()
        )));
    }
    if rows != bound.rows as usize || columns != bound.columns as usize {
        return Err(OperationError::invalid(format!(
            "{what} are {rows}x{columns} but range {} is {}x{}",
            bound.address, bound.rows, bound.columns
        )));
    }
    Ok(())
}
