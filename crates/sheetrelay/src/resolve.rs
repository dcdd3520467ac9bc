//! Binding `(sheet, address)` pairs to live ranges
//!
//! With a sheet name, the address is evaluated against that worksheet. An
//! address carrying its own `Sheet!` qualifier is accepted; if the qualifier
//! names a different sheet it is ignored in favor of `sheet` and a warning is
//! attached to the result.
//!
//! Without a sheet name, the address is either a qualified reference
//! (`Sheet2!B3`) or a defined name.
//!
//! Every failure a caller can fix comes back as a [`ResolutionFailure`] that
//! says which step failed and lists what would have worked.

use sheetrelay_core::{split_sheet_qualifier, SheetReference};
use tracing::{debug, warn};

use crate::automation::{Automation, NativeHandle};
use crate::error::{AutomationError, OperationError, ResolutionFailure, ResolutionStage};
use crate::handle::{HandleKind, OwnedHandle};

/// Address shapes listed in syntax failures
pub const ACCEPTED_SHAPES: &str = "A1, A1:B10, A:A, 1:1, Sheet1!A1, or a defined name";

/// A range bound in a live workbook. The range handle is released when this
/// is dropped.
#[derive(Debug)]
pub struct BoundRange<'a> {
    pub handle: OwnedHandle<'a>,
    /// Address as reported by the application
    pub address: String,
    /// Owning worksheet, when known
    pub sheet: Option<String>,
    pub rows: u32,
    pub columns: u32,
    /// Set when the address carried a sheet qualifier that was overridden
    pub qualifier_warning: Option<String>,
}

impl BoundRange<'_> {
    /// The live range handle
    pub fn native(&self) -> Result<NativeHandle, OperationError> {
        Ok(self.handle.live()?)
    }
}

/// Resolve `address` in `workbook`, on `sheet_name` when it is non-empty.
pub fn resolve<'a>(
    automation: &'a dyn Automation,
    workbook: NativeHandle,
    sheet_name: &str,
    address: &str,
    max_alternatives: usize,
) -> Result<BoundRange<'a>, OperationError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(OperationError::invalid("range address is empty"));
    }

    let sheet_name = sheet_name.trim();
    if !sheet_name.is_empty() {
        return resolve_on_sheet(automation, workbook, sheet_name, address, max_alternatives);
    }

    // A qualified reference names its own sheet
    if let Ok(SheetReference {
        sheet: Some(sheet), ..
    }) = SheetReference::parse(address)
    {
        return resolve_on_sheet(automation, workbook, &sheet, address, max_alternatives);
    }

    resolve_named(automation, workbook, address, max_alternatives)
}

fn resolve_on_sheet<'a>(
    automation: &'a dyn Automation,
    workbook: NativeHandle,
    sheet_name: &str,
    address: &str,
    max_alternatives: usize,
) -> Result<BoundRange<'a>, OperationError> {
    let mut qualifier_warning = None;
    let bare = match split_sheet_qualifier(address) {
        Ok((Some(qualifier), rest)) => {
            if !qualifier.eq_ignore_ascii_case(sheet_name) {
                let msg = format!(
                    "address '{address}' names sheet '{qualifier}', using sheet '{sheet_name}' instead"
                );
                warn!(sheet = sheet_name, address, "{msg}");
                qualifier_warning = Some(msg);
            }
            rest
        }
        Ok((None, rest)) => rest,
        // leave malformed qualifiers for the application to reject
        Err(_) => address,
    };

    let Some(sheet) = automation.worksheet(workbook, sheet_name)? else {
        let alternatives = match automation.worksheet_names(workbook, max_alternatives) {
            Ok(names) => names,
            Err(e) => {
                debug!(error = %e, "could not list worksheets");
                Vec::new()
            }
        };
        let message = if alternatives.is_empty() {
            format!("Sheet '{sheet_name}' not found.")
        } else {
            format!(
                "Sheet '{sheet_name}' not found. Available sheets: {}",
                alternatives.join(", ")
            )
        };
        return Err(ResolutionFailure {
            stage: ResolutionStage::SheetLookup,
            sheet: sheet_name.to_string(),
            input: address.to_string(),
            message,
            alternatives,
        }
        .into());
    };
    let sheet = OwnedHandle::new(automation, sheet, HandleKind::Worksheet);

    let range = match automation.range(sheet.live()?, bare) {
        Ok(range) => range,
        Err(AutomationError::Native(native)) => {
            return Err(ResolutionFailure {
                stage: ResolutionStage::AddressSyntax,
                sheet: sheet_name.to_string(),
                input: address.to_string(),
                alternatives: Vec::new(),
                message: format!(
                    "Cannot evaluate address '{address}' on sheet '{sheet_name}': {native}. \
                     Accepted forms: {ACCEPTED_SHAPES}"
                ),
            }
            .into())
        }
        Err(other) => return Err(other.into()),
    };

    bind(automation, range, qualifier_warning)
}

fn resolve_named<'a>(
    automation: &'a dyn Automation,
    workbook: NativeHandle,
    name: &str,
    max_alternatives: usize,
) -> Result<BoundRange<'a>, OperationError> {
    let failure = |message: String, alternatives: Vec<String>| ResolutionFailure {
        stage: ResolutionStage::NamedRangeLookup,
        sheet: String::new(),
        input: name.to_string(),
        alternatives,
        message,
    };

    match automation.named_range(workbook, name) {
        Ok(Some(range)) => bind(automation, range, None),
        Ok(None) => {
            // an empty list only proves there are no names if it was asked for
            let (alternatives, listed) = match automation.range_names(workbook, max_alternatives) {
                Ok(names) => (names, max_alternatives > 0),
                Err(e) => {
                    debug!(error = %e, "could not list defined names");
                    (Vec::new(), false)
                }
            };
            let message = if !alternatives.is_empty() {
                format!(
                    "Named range '{name}' not found. Available names: {}",
                    alternatives.join(", ")
                )
            } else if listed {
                format!(
                    "Named range '{name}' not found and the workbook has no named ranges. \
                     Pass a sheet name to use a cell address"
                )
            } else {
                format!("Named range '{name}' not found.")
            };
            Err(failure(message, alternatives).into())
        }
        Err(AutomationError::Native(native)) => Err(failure(
            format!("Named range '{name}' cannot be used as a range: {native}"),
            Vec::new(),
        )
        .into()),
        Err(other) => Err(other.into()),
    }
}

fn bind(
    automation: &dyn Automation,
    range: NativeHandle,
    qualifier_warning: Option<String>,
) -> Result<BoundRange<'_>, OperationError> {
    let handle = OwnedHandle::new(automation, range, HandleKind::Range);
    let info = automation.range_info(handle.live()?)?;
    Ok(BoundRange {
        handle,
        address: info.address,
        sheet: info.sheet,
        rows: info.rows,
        columns: info.columns,
        qualifier_warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Fault, MemoryAutomation, MemoryDocument};
    use pretty_assertions::assert_eq;
    use sheetrelay_core::NamedRange;

    struct Fixture {
        _dir: tempfile::TempDir,
        automation: MemoryAutomation,
        workbook: NativeHandle,
    }

    fn fixture(names: &[(&str, &str)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        let mut doc = MemoryDocument::with_sheets(&["Sheet1", "Q1 Data"]);
        for (name, refers_to) in names {
            doc.define_name(NamedRange::workbook_scope(*name, *refers_to))
                .unwrap();
        }
        doc.write_to(&path).unwrap();

        let automation = MemoryAutomation::new();
        let app = automation.start_application().unwrap();
        let workbook = automation.open_workbook(app, &path).unwrap();
        Fixture {
            _dir: dir,
            automation,
            workbook,
        }
    }

    fn failure(err: OperationError) -> ResolutionFailure {
        match err {
            OperationError::Resolution(f) => f,
            other => panic!("expected a resolution failure, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_on_sheet() {
        let fx = fixture(&[]);
        let bound = resolve(&fx.automation, fx.workbook, "Sheet1", "A1:B2", 10).unwrap();
        assert_eq!(bound.address, "$A$1:$B$2");
        assert_eq!((bound.rows, bound.columns), (2, 2));
        assert_eq!(bound.sheet.as_deref(), Some("Sheet1"));
        assert!(bound.qualifier_warning.is_none());

        // app + workbook + range; the sheet handle is already gone
        assert_eq!(fx.automation.live_handles(), 3);
        drop(bound);
        assert_eq!(fx.automation.live_handles(), 2);
    }

    #[test]
    fn test_missing_sheet_lists_sheets() {
        let fx = fixture(&[]);
        let err = resolve(&fx.automation, fx.workbook, "Nope", "A1", 10).unwrap_err();
        let f = failure(err);
        assert_eq!(f.stage, ResolutionStage::SheetLookup);
        assert_eq!(f.alternatives, vec!["Sheet1", "Q1 Data"]);
        assert!(f.message.contains("Sheet1, Q1 Data"));
    }

    #[test]
    fn test_bad_address_reports_syntax() {
        let fx = fixture(&[]);
        let err = resolve(&fx.automation, fx.workbook, "Sheet1", "A1:::", 10).unwrap_err();
        let f = failure(err);
        assert_eq!(f.stage, ResolutionStage::AddressSyntax);
        assert!(f.message.contains("A1:::"));
        assert!(f.message.contains(ACCEPTED_SHAPES));
        assert_eq!(fx.automation.live_handles(), 2);
    }

    #[test]
    fn test_conflicting_qualifier_uses_sheet_argument() {
        let fx = fixture(&[]);
        let bound = resolve(&fx.automation, fx.workbook, "Sheet1", "'Q1 Data'!C3", 10).unwrap();
        assert_eq!(bound.sheet.as_deref(), Some("Sheet1"));
        assert_eq!(bound.address, "$C$3");
        assert!(bound.qualifier_warning.unwrap().contains("Q1 Data"));

        let bound = resolve(&fx.automation, fx.workbook, "Sheet1", "sheet1!C3", 10).unwrap();
        assert!(bound.qualifier_warning.is_none());
    }

    #[test]
    fn test_qualified_address_without_sheet() {
        let fx = fixture(&[]);
        let bound = resolve(&fx.automation, fx.workbook, "", "'Q1 Data'!A1:A3", 10).unwrap();
        assert_eq!(bound.sheet.as_deref(), Some("Q1 Data"));
        assert_eq!(bound.rows, 3);
    }

    #[test]
    fn test_named_range() {
        let fx = fixture(&[("Totals", "Sheet1!$B$1:$B$4")]);
        let bound = resolve(&fx.automation, fx.workbook, "", "totals", 10).unwrap();
        assert_eq!(bound.address, "$B$1:$B$4");
    }

    #[test]
    fn test_missing_name_lists_names() {
        let names: Vec<(String, String)> = (0..12)
            .map(|i| (format!("Name{i:02}"), "Sheet1!$A$1".to_string()))
            .collect();
        let borrowed: Vec<(&str, &str)> = names
            .iter()
            .map(|(n, r)| (n.as_str(), r.as_str()))
            .collect();
        let fx = fixture(&borrowed);

        let f = failure(resolve(&fx.automation, fx.workbook, "", "Missing", 10).unwrap_err());
        assert_eq!(f.stage, ResolutionStage::NamedRangeLookup);
        assert_eq!(f.alternatives.len(), 10);
        assert!(f.message.contains("Name00"));
    }

    #[test]
    fn test_missing_name_in_workbook_without_names() {
        let fx = fixture(&[]);
        let f = failure(resolve(&fx.automation, fx.workbook, "", "Missing", 10).unwrap_err());
        assert!(f.alternatives.is_empty());
        assert!(f.message.contains("no named ranges"));
    }

    #[test]
    fn test_name_listing_failure_is_not_fatal() {
        let fx = fixture(&[("Totals", "Sheet1!$B$1")]);
        fx.automation.inject(Fault::ListNames, "names unavailable");
        let f = failure(resolve(&fx.automation, fx.workbook, "", "Missing", 10).unwrap_err());
        assert_eq!(f.stage, ResolutionStage::NamedRangeLookup);
        assert!(f.alternatives.is_empty());
        assert_eq!(f.message, "Named range 'Missing' not found.");
    }

    #[test]
    fn test_missing_name_without_listing_makes_no_claim() {
        let fx = fixture(&[("Totals", "Sheet1!$B$1")]);
        let f = failure(resolve(&fx.automation, fx.workbook, "", "Missing", 0).unwrap_err());
        assert!(f.alternatives.is_empty());
        assert_eq!(f.message, "Named range 'Missing' not found.");
    }

    #[test]
    fn test_sheet_listing_failure_is_not_fatal() {
        let fx = fixture(&[]);
        fx.automation.inject(Fault::ListSheets, "sheets unavailable");
        let f = failure(resolve(&fx.automation, fx.workbook, "Nope", "A1", 10).unwrap_err());
        assert_eq!(f.stage, ResolutionStage::SheetLookup);
        assert_eq!(f.sheet, "Nope");
        assert!(f.alternatives.is_empty());
        assert_eq!(f.message, "Sheet 'Nope' not found.");
        assert_eq!(fx.automation.live_handles(), 2);
    }

    #[test]
    fn test_name_that_is_not_a_range() {
        let fx = fixture(&[("Rate", "=0.07")]);
        let f = failure(resolve(&fx.automation, fx.workbook, "", "Rate", 10).unwrap_err());
        assert_eq!(f.stage, ResolutionStage::NamedRangeLookup);
        assert!(f.message.contains("does not refer to a range"));
    }

    #[test]
    fn test_empty_address_is_invalid() {
        let fx = fixture(&[]);
        let err = resolve(&fx.automation, fx.workbook, "Sheet1", "  ", 10).unwrap_err();
        assert!(matches!(err, OperationError::InvalidRequest(_)));
    }
}
