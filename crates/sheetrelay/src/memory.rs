//! In-memory automation backend
//!
//! [`MemoryAutomation`] behaves like a spreadsheet application closely enough
//! to drive the whole session core without one: documents live on disk as JSON
//! ([`MemoryDocument`]), every object handed out is a counted handle, and
//! failures can be injected per operation. Used by the test suites and by the
//! CLI's `--backend memory`.
//!
//! Formulas are stored but never evaluated. Reading whole rows or columns, or
//! any range over [`CLAMP_CELLS`] cells, returns only the used part of the sheet.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use sheetrelay_core::{
    CellAddress, CellRange, CellValue, NamedRange, NamedRangeCollection, SheetReference,
};
use tracing::trace;

use crate::automation::{Automation, NativeHandle, RangeInfo};
use crate::error::{AutomationError, AutomationResult};

/// Reads of ranges larger than this are clamped to the used part of the sheet
pub const CLAMP_CELLS: u64 = 100_000;

/// A spreadsheet document as stored by the in-memory backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryDocument {
    pub sheets: Vec<MemorySheet>,
    #[serde(default)]
    pub names: NamedRangeCollection,
}

/// One worksheet of a [`MemoryDocument`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySheet {
    pub name: String,
    #[serde(default)]
    cells: Cells,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct StoredCell {
    value: CellValue,
    formula: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<CellEntry>", into = "Vec<CellEntry>")]
struct Cells(BTreeMap<(u32, u16), StoredCell>);

#[derive(Debug, Serialize, Deserialize)]
struct CellEntry {
    cell: String,
    #[serde(default, skip_serializing_if = "CellValue::is_null")]
    value: CellValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    formula: Option<String>,
}

impl TryFrom<Vec<CellEntry>> for Cells {
    type Error = sheetrelay_core::Error;

    fn try_from(entries: Vec<CellEntry>) -> sheetrelay_core::Result<Self> {
        let mut cells = BTreeMap::new();
        for entry in entries {
            let addr = CellAddress::parse(&entry.cell)?;
            cells.insert(
                (addr.row, addr.col),
                StoredCell {
                    value: entry.value,
                    formula: entry.formula,
                },
            );
        }
        Ok(Cells(cells))
    }
}

impl From<Cells> for Vec<CellEntry> {
    fn from(cells: Cells) -> Self {
        cells
            .0
            .into_iter()
            .map(|((row, col), cell)| CellEntry {
                cell: CellAddress::new(row, col).to_a1_string(),
                value: cell.value,
                formula: cell.formula,
            })
            .collect()
    }
}

impl MemorySheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: Cells::default(),
        }
    }

    fn value_at(&self, row: u32, col: u16) -> CellValue {
        self.cells
            .0
            .get(&(row, col))
            .map(|c| c.value.clone())
            .unwrap_or_default()
    }

    fn formula_at(&self, row: u32, col: u16) -> String {
        match self.cells.0.get(&(row, col)) {
            Some(StoredCell {
                formula: Some(f), ..
            }) => f.clone(),
            Some(cell) => constant_text(&cell.value),
            None => String::new(),
        }
    }

    fn put(&mut self, row: u32, col: u16, cell: StoredCell) {
        if cell.value.is_null() && cell.formula.is_none() {
            self.cells.0.remove(&(row, col));
        } else {
            self.cells.0.insert((row, col), cell);
        }
    }

    /// Whole-row and whole-column ranges, and any range over [`CLAMP_CELLS`]
    /// cells, shrink to the used part of the sheet.
    fn clamp_to_used(&self, range: CellRange) -> CellRange {
        let cells = u64::from(range.row_count()) * u64::from(range.col_count());
        if cells <= CLAMP_CELLS && !range.is_whole_columns() && !range.is_whole_rows() {
            return range;
        }
        let (max_row, max_col) = self
            .cells
            .0
            .keys()
            .fold((0, 0), |(r, c), &(kr, kc)| (r.max(kr), c.max(kc)));
        CellRange::from_indices(
            range.start.row,
            range.start.col,
            range.end.row.min(max_row.max(range.start.row)),
            range.end.col.min(max_col.max(range.start.col)),
        )
    }
}

impl MemoryDocument {
    /// A document with the given (empty) sheets, in tab order
    pub fn with_sheets(names: &[&str]) -> Self {
        Self {
            sheets: names.iter().map(|n| MemorySheet::new(*n)).collect(),
            names: NamedRangeCollection::new(),
        }
    }

    /// Find a sheet by name, case-insensitively
    pub fn sheet(&self, name: &str) -> Option<&MemorySheet> {
        self.sheets.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    fn sheet_mut(&mut self, name: &str) -> Option<&mut MemorySheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Set a constant value
    pub fn set_value(
        &mut self,
        sheet: &str,
        cell: &str,
        value: impl Into<CellValue>,
    ) -> sheetrelay_core::Result<()> {
        let addr = CellAddress::parse(cell)?;
        let sheet = self
            .sheet_mut(sheet)
            .ok_or_else(|| sheetrelay_core::Error::InvalidSheetName(format!("no sheet '{sheet}'")))?;
        sheet.put(
            addr.row,
            addr.col,
            StoredCell {
                value: value.into(),
                formula: None,
            },
        );
        Ok(())
    }

    /// Add a defined name
    pub fn define_name(&mut self, range: NamedRange) -> sheetrelay_core::Result<()> {
        self.names.define(range)
    }

    /// The value stored in a cell
    pub fn value(&self, sheet: &str, cell: &str) -> Option<CellValue> {
        let addr = CellAddress::parse(cell).ok()?;
        Some(self.sheet(sheet)?.value_at(addr.row, addr.col))
    }

    /// The formula stored in a cell, if it holds one
    pub fn formula(&self, sheet: &str, cell: &str) -> Option<String> {
        let addr = CellAddress::parse(cell).ok()?;
        self.sheet(sheet)?
            .cells
            .0
            .get(&(addr.row, addr.col))?
            .formula
            .clone()
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)
    }

    pub fn read_from(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Operations that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Start,
    Quit,
    Open,
    Create,
    Save,
    Close,
    ListSheets,
    ListNames,
    Write,
    Release,
}

#[derive(Debug)]
struct OpenWorkbook {
    path: Option<PathBuf>,
    doc: MemoryDocument,
}

#[derive(Debug)]
enum Object {
    Application,
    Workbook(OpenWorkbook),
    Worksheet {
        workbook: u64,
        sheet: String,
    },
    Range {
        workbook: u64,
        sheet: String,
        range: CellRange,
    },
}

#[derive(Debug, Default)]
struct MemoryState {
    next_handle: u64,
    objects: AHashMap<u64, Object>,
    faults: AHashMap<Fault, String>,
    stale_releases: usize,
    applications_started: usize,
}

impl MemoryState {
    fn insert(&mut self, object: Object) -> NativeHandle {
        self.next_handle += 1;
        self.objects.insert(self.next_handle, object);
        NativeHandle(self.next_handle)
    }

    fn check(&self, fault: Fault) -> AutomationResult<()> {
        match self.faults.get(&fault) {
            Some(msg) => Err(AutomationError::Native(msg.clone())),
            None => Ok(()),
        }
    }

    fn expect_application(&self, h: NativeHandle) -> AutomationResult<()> {
        match self.objects.get(&h.0) {
            Some(Object::Application) => Ok(()),
            _ => Err(AutomationError::InvalidHandle(h.0)),
        }
    }

    fn workbook(&self, h: NativeHandle) -> AutomationResult<&OpenWorkbook> {
        match self.objects.get(&h.0) {
            Some(Object::Workbook(wb)) => Ok(wb),
            _ => Err(AutomationError::InvalidHandle(h.0)),
        }
    }

    fn workbook_mut(&mut self, h: NativeHandle) -> AutomationResult<&mut OpenWorkbook> {
        match self.objects.get_mut(&h.0) {
            Some(Object::Workbook(wb)) => Ok(wb),
            _ => Err(AutomationError::InvalidHandle(h.0)),
        }
    }

    fn worksheet(&self, h: NativeHandle) -> AutomationResult<(u64, String)> {
        match self.objects.get(&h.0) {
            Some(Object::Worksheet { workbook, sheet }) => Ok((*workbook, sheet.clone())),
            _ => Err(AutomationError::InvalidHandle(h.0)),
        }
    }

    fn range(&self, h: NativeHandle) -> AutomationResult<(u64, String, CellRange)> {
        match self.objects.get(&h.0) {
            Some(Object::Range {
                workbook,
                sheet,
                range,
            }) => Ok((*workbook, sheet.clone(), *range)),
            _ => Err(AutomationError::InvalidHandle(h.0)),
        }
    }

    fn sheet(&self, workbook: u64, name: &str) -> AutomationResult<&MemorySheet> {
        self.workbook(NativeHandle(workbook))?
            .doc
            .sheet(name)
            .ok_or_else(|| AutomationError::Native(format!("sheet '{name}' no longer exists")))
    }

    fn sheet_mut(&mut self, workbook: u64, name: &str) -> AutomationResult<&mut MemorySheet> {
        self.workbook_mut(NativeHandle(workbook))?
            .doc
            .sheet_mut(name)
            .ok_or_else(|| AutomationError::Native(format!("sheet '{name}' no longer exists")))
    }
}

/// Spreadsheet application simulated in memory.
#[derive(Debug, Default)]
pub struct MemoryAutomation {
    state: Mutex<MemoryState>,
}

impl MemoryAutomation {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of handles handed out and not yet given back
    pub fn live_handles(&self) -> usize {
        self.state().objects.len()
    }

    /// Number of releases of unknown or already released handles
    pub fn stale_releases(&self) -> usize {
        self.state().stale_releases
    }

    /// Number of times the application was started
    pub fn applications_started(&self) -> usize {
        self.state().applications_started
    }

    /// Whether an application instance is currently running
    pub fn is_running(&self) -> bool {
        self.state()
            .objects
            .values()
            .any(|o| matches!(o, Object::Application))
    }

    /// Make every later `fault` operation fail with `message`
    pub fn inject(&self, fault: Fault, message: impl Into<String>) {
        self.state().faults.insert(fault, message.into());
    }

    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }
}

impl Automation for MemoryAutomation {
    fn start_application(&self) -> AutomationResult<NativeHandle> {
        let mut state = self.state();
        if let Some(msg) = state.faults.get(&Fault::Start) {
            return Err(AutomationError::Unavailable(msg.clone()));
        }
        state.applications_started += 1;
        Ok(state.insert(Object::Application))
    }

    fn quit_application(&self, application: NativeHandle) -> AutomationResult<()> {
        let mut state = self.state();
        state.expect_application(application)?;
        state.objects.remove(&application.0);
        state.check(Fault::Quit)
    }

    fn open_workbook(
        &self,
        application: NativeHandle,
        path: &Path,
    ) -> AutomationResult<NativeHandle> {
        let mut state = self.state();
        state.expect_application(application)?;
        state.check(Fault::Open)?;
        let doc = MemoryDocument::read_from(path).map_err(|e| {
            AutomationError::Native(format!("Cannot open '{}': {e}", path.display()))
        })?;
        Ok(state.insert(Object::Workbook(OpenWorkbook {
            path: Some(path.to_path_buf()),
            doc,
        })))
    }

    fn create_workbook(&self, application: NativeHandle) -> AutomationResult<NativeHandle> {
        let mut state = self.state();
        state.expect_application(application)?;
        state.check(Fault::Create)?;
        Ok(state.insert(Object::Workbook(OpenWorkbook {
            path: None,
            doc: MemoryDocument::with_sheets(&["Sheet1"]),
        })))
    }

    fn save_workbook(&self, workbook: NativeHandle) -> AutomationResult<()> {
        let state = self.state();
        let wb = state.workbook(workbook)?;
        state.check(Fault::Save)?;
        let path = wb.path.as_deref().ok_or_else(|| {
            AutomationError::Native("Document has never been saved; use Save As".into())
        })?;
        wb.doc
            .write_to(path)
            .map_err(|e| AutomationError::Native(format!("Cannot save '{}': {e}", path.display())))
    }

    fn save_workbook_as(&self, workbook: NativeHandle, path: &Path) -> AutomationResult<()> {
        let mut state = self.state();
        state.workbook(workbook)?;
        state.check(Fault::Save)?;
        let wb = state.workbook_mut(workbook)?;
        wb.doc
            .write_to(path)
            .map_err(|e| AutomationError::Native(format!("Cannot save '{}': {e}", path.display())))?;
        wb.path = Some(path.to_path_buf());
        Ok(())
    }

    fn close_workbook(&self, workbook: NativeHandle, save: bool) -> AutomationResult<()> {
        if save {
            self.save_workbook(workbook)?;
        }
        let mut state = self.state();
        state.workbook(workbook)?;
        state.check(Fault::Close)?;
        state.objects.remove(&workbook.0);
        Ok(())
    }

    fn worksheet(
        &self,
        workbook: NativeHandle,
        name: &str,
    ) -> AutomationResult<Option<NativeHandle>> {
        let mut state = self.state();
        let Some(sheet) = state.workbook(workbook)?.doc.sheet(name) else {
            return Ok(None);
        };
        let sheet = sheet.name.clone();
        Ok(Some(state.insert(Object::Worksheet {
            workbook: workbook.0,
            sheet,
        })))
    }

    fn worksheet_names(&self, workbook: NativeHandle, limit: usize) -> AutomationResult<Vec<String>> {
        let state = self.state();
        let wb = state.workbook(workbook)?;
        state.check(Fault::ListSheets)?;
        Ok(wb.doc.sheets.iter().take(limit).map(|s| s.name.clone()).collect())
    }

    fn named_range(
        &self,
        workbook: NativeHandle,
        name: &str,
    ) -> AutomationResult<Option<NativeHandle>> {
        let mut state = self.state();
        let wb = state.workbook(workbook)?;
        let Some(defined) = wb.doc.names.find(name) else {
            return Ok(None);
        };
        let not_a_range =
            || AutomationError::Native(format!("Name '{name}' does not refer to a range"));
        let reference = SheetReference::parse(defined.expression()).map_err(|_| not_a_range())?;
        let sheet = reference
            .sheet
            .or_else(|| defined.sheet.clone())
            .ok_or_else(not_a_range)?;
        let sheet = wb
            .doc
            .sheet(&sheet)
            .ok_or_else(|| AutomationError::Native(format!("Name '{name}' refers to #REF!")))?
            .name
            .clone();
        Ok(Some(state.insert(Object::Range {
            workbook: workbook.0,
            sheet,
            range: reference.range,
        })))
    }

    fn range_names(&self, workbook: NativeHandle, limit: usize) -> AutomationResult<Vec<String>> {
        let state = self.state();
        let wb = state.workbook(workbook)?;
        state.check(Fault::ListNames)?;
        Ok(wb.doc.names.display_names(limit))
    }

    fn range(&self, sheet: NativeHandle, address: &str) -> AutomationResult<NativeHandle> {
        let mut state = self.state();
        let (workbook, sheet_name) = state.worksheet(sheet)?;

        let range = match SheetReference::parse(address) {
            Ok(reference) => {
                if let Some(other) = reference.sheet {
                    if !other.eq_ignore_ascii_case(&sheet_name) {
                        return Err(AutomationError::Native(format!(
                            "Range '{address}' refers to another sheet than '{sheet_name}'"
                        )));
                    }
                }
                reference.range
            }
            Err(parse_error) => {
                // a defined name is also accepted where an address is
                let wb = state.workbook(NativeHandle(workbook))?;
                let named = wb
                    .doc
                    .names
                    .find(address)
                    .and_then(|n| SheetReference::parse(n.expression()).ok())
                    .filter(|r| {
                        r.sheet
                            .as_deref()
                            .map_or(true, |s| s.eq_ignore_ascii_case(&sheet_name))
                    });
                match named {
                    Some(reference) => reference.range,
                    None => {
                        return Err(AutomationError::Native(format!(
                            "'{address}' is not a valid range reference: {parse_error}"
                        )))
                    }
                }
            }
        };

        state.sheet(workbook, &sheet_name)?;
        Ok(state.insert(Object::Range {
            workbook,
            sheet: sheet_name,
            range,
        }))
    }

    fn range_info(&self, range: NativeHandle) -> AutomationResult<RangeInfo> {
        let state = self.state();
        let (workbook, sheet, bound) = state.range(range)?;
        state.sheet(workbook, &sheet)?;
        Ok(RangeInfo {
            address: bound.to_absolute_string(),
            sheet: Some(sheet),
            rows: bound.row_count(),
            columns: u32::from(bound.col_count()),
        })
    }

    fn read_values(&self, range: NativeHandle) -> AutomationResult<Vec<Vec<CellValue>>> {
        let state = self.state();
        let (workbook, sheet, bound) = state.range(range)?;
        let sheet = state.sheet(workbook, &sheet)?;
        let bound = sheet.clamp_to_used(bound);
        Ok((bound.start.row..=bound.end.row)
            .map(|row| {
                (bound.start.col..=bound.end.col)
                    .map(|col| sheet.value_at(row, col))
                    .collect()
            })
            .collect())
    }

    fn write_values(&self, range: NativeHandle, values: &[Vec<CellValue>]) -> AutomationResult<()> {
        let mut state = self.state();
        let (workbook, sheet, bound) = state.range(range)?;
        state.check(Fault::Write)?;
        check_shape(&bound, values)?;
        let sheet = state.sheet_mut(workbook, &sheet)?;
        for (row, row_values) in (bound.start.row..).zip(values) {
            for (col, value) in (bound.start.col..).zip(row_values) {
                sheet.put(
                    row,
                    col,
                    StoredCell {
                        value: value.clone(),
                        formula: None,
                    },
                );
            }
        }
        trace!(%range, "wrote values");
        Ok(())
    }

    fn read_formulas(&self, range: NativeHandle) -> AutomationResult<Vec<Vec<String>>> {
        let state = self.state();
        let (workbook, sheet, bound) = state.range(range)?;
        let sheet = state.sheet(workbook, &sheet)?;
        let bound = sheet.clamp_to_used(bound);
        Ok((bound.start.row..=bound.end.row)
            .map(|row| {
                (bound.start.col..=bound.end.col)
                    .map(|col| sheet.formula_at(row, col))
                    .collect()
            })
            .collect())
    }

    fn write_formulas(&self, range: NativeHandle, formulas: &[Vec<String>]) -> AutomationResult<()> {
        let mut state = self.state();
        let (workbook, sheet, bound) = state.range(range)?;
        state.check(Fault::Write)?;
        check_shape(&bound, formulas)?;
        let sheet = state.sheet_mut(workbook, &sheet)?;
        for (row, row_formulas) in (bound.start.row..).zip(formulas) {
            for (col, text) in (bound.start.col..).zip(row_formulas) {
                let cell = if text.starts_with('=') {
                    StoredCell {
                        value: CellValue::Null,
                        formula: Some(text.clone()),
                    }
                } else {
                    StoredCell {
                        value: parse_constant(text),
                        formula: None,
                    }
                };
                sheet.put(row, col, cell);
            }
        }
        trace!(%range, "wrote formulas");
        Ok(())
    }

    fn release(&self, handle: NativeHandle) -> AutomationResult<()> {
        let mut state = self.state();
        if !state.objects.contains_key(&handle.0) {
            state.stale_releases += 1;
            return Err(AutomationError::InvalidHandle(handle.0));
        }
        state.check(Fault::Release)?;
        state.objects.remove(&handle.0);
        Ok(())
    }
}

fn check_shape<T>(bound: &CellRange, grid: &[Vec<T>]) -> AutomationResult<()> {
    let rows = bound.row_count() as usize;
    let cols = bound.col_count() as usize;
    if grid.len() != rows || grid.iter().any(|r| r.len() != cols) {
        return Err(AutomationError::Native(format!(
            "data does not match the {rows}x{cols} shape of {}",
            bound.to_absolute_string()
        )));
    }
    Ok(())
}

/// Text typed into a cell becomes a number, boolean or string the way a
/// spreadsheet would interpret it.
fn parse_constant(text: &str) -> CellValue {
    if text.is_empty() {
        return CellValue::Null;
    }
    if let Ok(n) = text.trim().parse::<f64>() {
        return CellValue::Number(n);
    }
    match text.to_ascii_uppercase().as_str() {
        "TRUE" => CellValue::Bool(true),
        "FALSE" => CellValue::Bool(false),
        _ => CellValue::String(text.to_string()),
    }
}

fn constant_text(value: &CellValue) -> String {
    match value {
        CellValue::Null => String::new(),
        other => other.to_string(),
    }
}
