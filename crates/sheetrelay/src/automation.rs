//! The narrow surface a spreadsheet application must expose to be driven by
//! the session core.
//!
//! Backends mint opaque [`NativeHandle`]s for every object they hand out
//! (application, workbook, worksheet, range) and keep the real objects on
//! their side. Callers give each handle back exactly once: through
//! [`Automation::release`], or for workbooks and applications through
//! [`Automation::close_workbook`] / [`Automation::quit_application`].
//! Callers never do that by hand; see [`crate::handle::OwnedHandle`].

use std::fmt;
use std::path::Path;

use sheetrelay_core::CellValue;

use crate::error::AutomationResult;

/// Opaque token for an object living inside the automation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the application reports about a bound range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeInfo {
    /// Address as the application prints it (usually absolute: `$A$1:$B$2`)
    pub address: String,
    /// Owning worksheet, when the application reports one
    pub sheet: Option<String>,
    pub rows: u32,
    pub columns: u32,
}

/// Operations the session core needs from a spreadsheet application.
///
/// Every method blocks until the application answers. Implementations must be
/// safe to call from several threads, but the core never drives one workbook
/// from two threads at once.
pub trait Automation: Send + Sync {
    /// Start (or attach to) the application. The returned handle is given
    /// back through [`Automation::quit_application`].
    fn start_application(&self) -> AutomationResult<NativeHandle>;

    /// Quit the application and release its handle.
    fn quit_application(&self, application: NativeHandle) -> AutomationResult<()>;

    /// Open an existing document.
    fn open_workbook(&self, application: NativeHandle, path: &Path)
        -> AutomationResult<NativeHandle>;

    /// Create a new, unsaved document.
    fn create_workbook(&self, application: NativeHandle) -> AutomationResult<NativeHandle>;

    /// Persist a document to the path it was opened from.
    fn save_workbook(&self, workbook: NativeHandle) -> AutomationResult<()>;

    /// Persist a document to a new path.
    fn save_workbook_as(&self, workbook: NativeHandle, path: &Path) -> AutomationResult<()>;

    /// Close a document, discarding unsaved changes unless `save` is set, and
    /// release the workbook handle.
    fn close_workbook(&self, workbook: NativeHandle, save: bool) -> AutomationResult<()>;

    /// Look a worksheet up by name. `Ok(None)` when the workbook has no such sheet.
    fn worksheet(&self, workbook: NativeHandle, name: &str)
        -> AutomationResult<Option<NativeHandle>>;

    /// The first `limit` worksheet names, in tab order.
    fn worksheet_names(&self, workbook: NativeHandle, limit: usize) -> AutomationResult<Vec<String>>;

    /// Look a defined name up and bind the range it currently refers to.
    /// `Ok(None)` when the workbook has no such name.
    fn named_range(&self, workbook: NativeHandle, name: &str)
        -> AutomationResult<Option<NativeHandle>>;

    /// The first `limit` defined names.
    fn range_names(&self, workbook: NativeHandle, limit: usize) -> AutomationResult<Vec<String>>;

    /// Evaluate `address` against a worksheet. An address the application
    /// cannot parse is reported as [`crate::AutomationError::Native`].
    fn range(&self, sheet: NativeHandle, address: &str) -> AutomationResult<NativeHandle>;

    /// Describe a bound range.
    fn range_info(&self, range: NativeHandle) -> AutomationResult<RangeInfo>;

    /// Row-major values of a range.
    fn read_values(&self, range: NativeHandle) -> AutomationResult<Vec<Vec<CellValue>>>;

    /// Write row-major values into a range of the same shape.
    fn write_values(&self, range: NativeHandle, values: &[Vec<CellValue>]) -> AutomationResult<()>;

    /// Row-major formulas of a range; constants come back as their text.
    fn read_formulas(&self, range: NativeHandle) -> AutomationResult<Vec<Vec<String>>>;

    /// Write row-major formulas into a range of the same shape.
    fn write_formulas(&self, range: NativeHandle, formulas: &[Vec<String>]) -> AutomationResult<()>;

    /// Release a worksheet or range handle.
    fn release(&self, handle: NativeHandle) -> AutomationResult<()>;
}
