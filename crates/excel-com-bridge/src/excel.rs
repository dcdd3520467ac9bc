//! Excel.Application and the handle table of objects lent to the client.

#![cfg(windows)]

use std::collections::HashMap;

use excel_com_protocol::{CellError, CellValue, RangeDescription};

use crate::dispatch::{
    scalar, variant_bool, variant_dispatch, variant_empty, variant_f64, variant_i32, variant_str,
    DispatchObject, Scalar,
};

/// Ranges bigger than this are clamped to the sheet's used range before
/// being read cell by cell, so `A:A` does not walk a million rows.
const CLAMP_CELLS: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Application,
    Workbook,
    Worksheet,
    Range,
}

struct Entry {
    kind: Kind,
    object: DispatchObject,
}

/// A running Excel.Application plus every object the client holds a handle to.
pub struct ExcelApp {
    app: DispatchObject,
    app_handle: u64,
    objects: HashMap<u64, Entry>,
    next_handle: u64,
}

impl ExcelApp {
    pub fn new() -> Result<Self, String> {
        let app = DispatchObject::create_from_progid("Excel.Application")?;

        app.put("Visible", variant_bool(false))?;
        app.put("DisplayAlerts", variant_bool(false))?;
        app.put("ScreenUpdating", variant_bool(false))?;

        let mut excel = Self {
            app: app.clone(),
            app_handle: 0,
            objects: HashMap::new(),
            next_handle: 1,
        };
        excel.app_handle = excel.insert(Kind::Application, app);
        Ok(excel)
    }

    pub fn application_handle(&self) -> u64 {
        self.app_handle
    }

    fn insert(&mut self, kind: Kind, object: DispatchObject) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(handle, Entry { kind, object });
        handle
    }

    fn get(&self, handle: u64, kind: Kind) -> Result<&DispatchObject, String> {
        match self.objects.get(&handle) {
            Some(entry) if entry.kind == kind => Ok(&entry.object),
            Some(entry) => Err(format!(
                "handle {handle} is a {:?}, expected a {kind:?}",
                entry.kind
            )),
            None => Err(format!("invalid or released handle {handle}")),
        }
    }

    pub fn open_workbook(&mut self, path: &str) -> Result<u64, String> {
        let wb = self
            .app
            .object("Workbooks", &[])?
            .call_object("Open", &[variant_str(path)])?;
        Ok(self.insert(Kind::Workbook, wb))
    }

    pub fn create_workbook(&mut self) -> Result<u64, String> {
        let wb = self.app.object("Workbooks", &[])?.call_object("Add", &[])?;
        Ok(self.insert(Kind::Workbook, wb))
    }

    pub fn save_workbook(&self, workbook: u64) -> Result<(), String> {
        self.get(workbook, Kind::Workbook)?.call("Save", &[])?;
        Ok(())
    }

    pub fn save_workbook_as(&self, workbook: u64, path: &str) -> Result<(), String> {
        let wb = self.get(workbook, Kind::Workbook)?;
        wb.call("SaveAs", &[variant_str(path), variant_i32(file_format(path))])?;
        Ok(())
    }

    /// Close a workbook and drop its handle. The handle is gone even if
    /// Excel refuses to close.
    pub fn close_workbook(&mut self, workbook: u64, save: bool) -> Result<(), String> {
        self.get(workbook, Kind::Workbook)?;
        let entry = self
            .objects
            .remove(&workbook)
            .ok_or_else(|| format!("invalid or released handle {workbook}"))?;
        entry.object.call("Close", &[variant_bool(save)])?;
        Ok(())
    }

    /// Worksheet by name, compared case-insensitively as Excel does.
    pub fn worksheet(&mut self, workbook: u64, name: &str) -> Result<Option<u64>, String> {
        let sheets = self.get(workbook, Kind::Workbook)?.object("Worksheets", &[])?;
        let wanted = name.to_lowercase();
        for i in 1..=sheets.count("Count")? {
            let sheet = sheets.object("Item", &[variant_i32(i as i32)])?;
            if sheet.text("Name")?.to_lowercase() == wanted {
                return Ok(Some(self.insert(Kind::Worksheet, sheet)));
            }
        }
        Ok(None)
    }

    pub fn worksheet_names(&self, workbook: u64, limit: u32) -> Result<Vec<String>, String> {
        let sheets = self.get(workbook, Kind::Workbook)?.object("Worksheets", &[])?;
        let total = sheets.count("Count")?.min(limit);
        (1..=total)
            .map(|i| sheets.object("Item", &[variant_i32(i as i32)])?.text("Name"))
            .collect()
    }

    /// Range a defined name refers to. Sheet-scoped names match either
    /// their full `Sheet!Name` form or their bare name.
    pub fn named_range(&mut self, workbook: u64, name: &str) -> Result<Option<u64>, String> {
        let names = self.get(workbook, Kind::Workbook)?.object("Names", &[])?;
        let wanted = name.to_lowercase();
        let mut found = None;
        for i in 1..=names.count("Count")? {
            let defined = names.object("Item", &[variant_i32(i as i32)])?;
            let full = defined.text("Name")?.to_lowercase();
            let bare = full.rsplit('!').next().unwrap_or(&full).to_string();
            if full == wanted {
                found = Some(defined);
                break;
            }
            if bare == wanted && found.is_none() {
                found = Some(defined);
            }
        }
        let Some(defined) = found else {
            return Ok(None);
        };
        let range = defined
            .object("RefersToRange", &[])
            .map_err(|_| format!("Name '{name}' does not refer to a range"))?;
        Ok(Some(self.insert(Kind::Range, range)))
    }

    pub fn range_names(&self, workbook: u64, limit: u32) -> Result<Vec<String>, String> {
        let names = self.get(workbook, Kind::Workbook)?.object("Names", &[])?;
        let mut out = Vec::new();
        for i in 1..=names.count("Count")? {
            if out.len() as u32 >= limit {
                break;
            }
            let defined = names.object("Item", &[variant_i32(i as i32)])?;
            // hidden names are Excel's own bookkeeping
            if matches!(scalar(&defined.get("Visible", &[])?), Scalar::Bool(false)) {
                continue;
            }
            out.push(defined.text("Name")?);
        }
        Ok(out)
    }

    pub fn range(&mut self, sheet: u64, address: &str) -> Result<u64, String> {
        let range = self
            .get(sheet, Kind::Worksheet)?
            .object("Range", &[variant_str(address)])?;
        Ok(self.insert(Kind::Range, range))
    }

    pub fn range_info(&self, range: u64) -> Result<RangeDescription, String> {
        let range = self.get(range, Kind::Range)?;
        Ok(RangeDescription {
            address: range.text("Address")?,
            sheet: Some(range.object("Worksheet", &[])?.text("Name")?),
            rows: range.object("Rows", &[])?.count("Count")?,
            columns: range.object("Columns", &[])?.count("Count")?,
        })
    }

    pub fn read_values(&self, range: u64) -> Result<Vec<Vec<CellValue>>, String> {
        let range = self.readable(self.get(range, Kind::Range)?)?;
        self.each_cell(&range, |cell| Ok(to_cell_value(scalar(&cell.get("Value", &[])?))))
    }

    pub fn read_formulas(&self, range: u64) -> Result<Vec<Vec<String>>, String> {
        let range = self.readable(self.get(range, Kind::Range)?)?;
        self.each_cell(&range, |cell| cell.text("Formula"))
    }

    pub fn write_values(&self, range: u64, values: &[Vec<CellValue>]) -> Result<(), String> {
        let range = self.get(range, Kind::Range)?;
        check_shape(range, values)?;
        for (r, row) in values.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                cell(range, r, c)?.put("Value", to_variant(value)?)?;
            }
        }
        Ok(())
    }

    pub fn write_formulas(&self, range: u64, formulas: &[Vec<String>]) -> Result<(), String> {
        let range = self.get(range, Kind::Range)?;
        check_shape(range, formulas)?;
        for (r, row) in formulas.iter().enumerate() {
            for (c, formula) in row.iter().enumerate() {
                cell(range, r, c)?.put("Formula", variant_str(formula))?;
            }
        }
        Ok(())
    }

    /// Forget a handle. Unknown handles are ignored; the application handle
    /// stays until shutdown.
    pub fn release(&mut self, handle: u64) {
        if handle != self.app_handle {
            self.objects.remove(&handle);
        }
    }

    /// Close every open workbook without saving and quit Excel.
    pub fn shutdown(mut self) -> Result<(), String> {
        let workbooks: Vec<u64> = self
            .objects
            .iter()
            .filter(|(_, e)| e.kind == Kind::Workbook)
            .map(|(h, _)| *h)
            .collect();
        for wb in workbooks {
            if let Err(e) = self.close_workbook(wb, false) {
                eprintln!("[excel-com-bridge] closing workbook {wb} failed: {e}");
            }
        }
        self.objects.clear();
        self.app.call("Quit", &[])?;
        Ok(())
    }

    /// Large ranges shrink to their overlap with the used range.
    fn readable(&self, range: &DispatchObject) -> Result<DispatchObject, String> {
        let cells = u64::from(range.object("Rows", &[])?.count("Count")?)
            * u64::from(range.object("Columns", &[])?.count("Count")?);
        if cells <= CLAMP_CELLS {
            return Ok(range.clone());
        }
        let used = range.object("Worksheet", &[])?.object("UsedRange", &[])?;
        let overlap = self
            .app
            .call("Intersect", &[variant_dispatch(range), variant_dispatch(&used)])?;
        match scalar(&overlap) {
            Scalar::Object(obj) => Ok(obj),
            _ => Err("range lies entirely outside the used area of its sheet".to_string()),
        }
    }

    fn each_cell<T>(
        &self,
        range: &DispatchObject,
        mut read: impl FnMut(&DispatchObject) -> Result<T, String>,
    ) -> Result<Vec<Vec<T>>, String> {
        let rows = range.object("Rows", &[])?.count("Count")? as usize;
        let columns = range.object("Columns", &[])?.count("Count")? as usize;
        (0..rows)
            .map(|r| (0..columns).map(|c| read(&cell(range, r, c)?)).collect())
            .collect()
    }
}

/// Cell at zero-based offsets within a range.
fn cell(range: &DispatchObject, row: usize, col: usize) -> Result<DispatchObject, String> {
    range.object(
        "Cells",
        &[variant_i32(row as i32 + 1), variant_i32(col as i32 + 1)],
    )
}

fn check_shape<T>(range: &DispatchObject, rows: &[Vec<T>]) -> Result<(), String> {
    let want_rows = range.object("Rows", &[])?.count("Count")? as usize;
    let want_cols = range.object("Columns", &[])?.count("Count")? as usize;
    if rows.len() != want_rows || rows.iter().any(|r| r.len() != want_cols) {
        return Err(format!(
            "data does not match the range shape ({want_rows} rows x {want_cols} columns)"
        ));
    }
    Ok(())
}

/// `SaveAs` file format from the path's extension
fn file_format(path: &str) -> i32 {
    // xlOpenXMLWorkbook = 51, xlOpenXMLWorkbookMacroEnabled = 52,
    // xlWorkbookNormal = -4143, xlCSV = 6
    let lower = path.to_lowercase();
    if lower.ends_with(".xlsm") {
        52
    } else if lower.ends_with(".xls") {
        -4143
    } else if lower.ends_with(".csv") {
        6
    } else {
        51
    }
}

fn to_variant(value: &CellValue) -> Result<windows::Win32::System::Variant::VARIANT, String> {
    Ok(match value {
        CellValue::Null => variant_empty(),
        CellValue::Bool(b) => variant_bool(*b),
        CellValue::Number(n) => variant_f64(*n),
        CellValue::String(s) => variant_str(s),
        CellValue::Error(e) => return Err(format!("cannot write error value {}", e.code)),
    })
}

fn to_cell_value(v: Scalar) -> CellValue {
    match v {
        Scalar::Empty | Scalar::Object(_) | Scalar::Other(_) => CellValue::Null,
        Scalar::Bool(b) => CellValue::Bool(b),
        Scalar::Number(n) => CellValue::Number(n),
        Scalar::Text(s) => CellValue::String(s),
        Scalar::Error(code) => CellValue::Error(CellError {
            code: error_text(code).to_string(),
        }),
    }
}

fn error_text(code: u16) -> &'static str {
    match code {
        2000 => "#NULL!",
        2007 => "#DIV/0!",
        2015 => "#VALUE!",
        2023 => "#REF!",
        2029 => "#NAME?",
        2036 => "#NUM!",
        2042 => "#N/A",
        _ => "#ERROR",
    }
}
