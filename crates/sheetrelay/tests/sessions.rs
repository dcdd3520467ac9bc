//! Session lifecycle against the in-memory backend

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use sheetrelay::memory::{Fault, MemoryAutomation, MemoryDocument};
use sheetrelay::{
    ops, Access, CellValue, ErrorKind, Executor, OperationError, ResolutionStage, SessionConfig,
    SessionError, SessionRegistry, Target,
};
use sheetrelay_core::NamedRange;

struct Harness {
    dir: tempfile::TempDir,
    automation: Arc<MemoryAutomation>,
    registry: SessionRegistry,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    fn with_config(config: SessionConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let automation = Arc::new(MemoryAutomation::new());
        let registry = SessionRegistry::new(automation.clone(), config);
        Self {
            dir,
            automation,
            registry,
        }
    }

    fn document(&self, file: &str, doc: &MemoryDocument) -> PathBuf {
        let path = self.dir.path().join(file);
        doc.write_to(&path).unwrap();
        path
    }

    fn workbook(&self, file: &str) -> PathBuf {
        self.document(file, &MemoryDocument::with_sheets(&["Sheet1", "Sheet2"]))
    }

    fn executor(&self) -> Executor<'_> {
        Executor::new(&self.registry)
    }
}

fn read_a1(path: &Path) -> CellValue {
    MemoryDocument::read_from(path)
        .unwrap()
        .value("Sheet1", "A1")
        .unwrap()
}

#[test]
fn test_second_begin_on_same_path_fails() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");

    let first = h.registry.begin(&path).unwrap();
    let err = h
        .registry
        .begin(h.dir.path().join(".").join("book.xlsx"))
        .unwrap_err();
    match err {
        SessionError::AlreadyOpen { session_id, .. } => assert_eq!(session_id, first),
        other => panic!("expected AlreadyOpen, got {other:?}"),
    }

    let sessions = h.registry.list();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, first);

    // the first session is still usable
    h.registry.use_session(&first).unwrap();
}

#[test]
fn test_unknown_and_committed_sessions_are_not_found() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");

    assert!(matches!(
        h.registry.use_session("no-such-session"),
        Err(SessionError::NotFound(_))
    ));

    let id = h.registry.begin(&path).unwrap();
    h.registry.commit(&id, false).unwrap();
    assert!(matches!(
        h.registry.use_session(&id),
        Err(SessionError::NotFound(_))
    ));
    assert!(matches!(
        h.registry.commit(&id, true),
        Err(SessionError::NotFound(_))
    ));

    let err = h
        .executor()
        .execute(&Target::Session(id), Access::Read, ops::list_sheets)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionNotFound);
}

#[test]
fn test_commit_with_save_persists() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");

    let id = h.registry.begin(&path).unwrap();
    h.executor()
        .execute(&Target::Session(id.clone()), Access::Write, |wb| {
            ops::set_values(wb, "Sheet1", "A1", &[vec![42.into()]])
        })
        .unwrap();
    let outcome = h.registry.commit(&id, true).unwrap();
    assert!(outcome.saved);
    assert_eq!(read_a1(&path), CellValue::Number(42.0));

    // reopen and read it back through a new session
    let id = h.registry.begin(&path).unwrap();
    let values = h
        .executor()
        .execute(&Target::Session(id.clone()), Access::Read, |wb| {
            ops::get_values(wb, "Sheet1", "A1")
        })
        .unwrap();
    assert_eq!(values.values, vec![vec![CellValue::Number(42.0)]]);
    h.registry.commit(&id, false).unwrap();
}

#[test]
fn test_commit_without_save_leaves_file_untouched() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");
    let before = fs::read(&path).unwrap();

    let id = h.registry.begin(&path).unwrap();
    h.executor()
        .execute(&Target::Session(id.clone()), Access::Write, |wb| {
            ops::set_values(wb, "Sheet1", "A1:B1", &[vec!["x".into(), 1.into()]])
        })
        .unwrap();
    let outcome = h.registry.commit(&id, false).unwrap();

    assert!(!outcome.saved);
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_writes_visible_within_session() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");
    let id = h.registry.begin(&path).unwrap();
    let target = Target::Session(id.clone());
    let grid = vec![
        vec![CellValue::from(1), CellValue::from("two")],
        vec![CellValue::from(true), CellValue::Null],
    ];

    h.executor()
        .execute(&target, Access::Write, |wb| {
            ops::set_values(wb, "Sheet1", "A1:B2", &grid)
        })
        .unwrap();
    let read = h
        .executor()
        .execute(&target, Access::Read, |wb| ops::get_values(wb, "Sheet1", "A1:B2"))
        .unwrap();

    assert_eq!(read.address, "$A$1:$B$2");
    assert_eq!(read.values, grid);
    h.registry.commit(&id, false).unwrap();
}

#[test]
fn test_failed_operation_keeps_session_usable() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");
    let id = h.registry.begin(&path).unwrap();
    let target = Target::Session(id.clone());

    let err = h
        .executor()
        .execute(&target, Access::Write, |wb| {
            ops::set_values(wb, "Sheet1", "A1:B1", &[vec![1.into()]])
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    h.executor()
        .execute(&target, Access::Write, |wb| {
            ops::set_values(wb, "Sheet1", "A1", &[vec![7.into()]])
        })
        .unwrap();
    assert!(h.registry.commit(&id, true).unwrap().saved);
    assert_eq!(read_a1(&path), CellValue::Number(7.0));
}

#[test]
fn test_missing_sheet_lists_real_sheets() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");

    let err = h
        .executor()
        .execute(&Target::OneShot(path), Access::Read, |wb| {
            ops::get_values(wb, "Summary", "A1")
        })
        .unwrap_err();
    let OperationError::Resolution(failure) = err else {
        panic!("expected a resolution failure, got {err:?}");
    };
    assert_eq!(failure.stage, ResolutionStage::SheetLookup);
    assert_eq!(failure.alternatives, vec!["Sheet1", "Sheet2"]);
}

#[test]
fn test_named_range_alternatives_are_capped() {
    let h = Harness::new();
    let mut doc = MemoryDocument::with_sheets(&["Sheet1"]);
    for i in 0..25 {
        doc.define_name(NamedRange::workbook_scope(
            format!("Region_{i:02}"),
            format!("Sheet1!$A${}", i + 1),
        ))
        .unwrap();
    }
    let path = h.document("names.xlsx", &doc);

    let err = h
        .executor()
        .execute(&Target::OneShot(path.clone()), Access::Read, |wb| {
            ops::range_info(wb, "", "Region_99")
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResolutionFailure);
    assert_eq!(err.alternatives().len(), 10);

    let empty = h.workbook("empty.xlsx");
    let err = h
        .executor()
        .execute(&Target::OneShot(empty), Access::Read, |wb| {
            ops::range_info(wb, "", "Region_99")
        })
        .unwrap_err();
    assert!(err.alternatives().is_empty());

    let found = h
        .executor()
        .execute(&Target::OneShot(path), Access::Read, |wb| {
            ops::range_info(wb, "", "region_03")
        })
        .unwrap();
    assert_eq!(found.address, "$A$4");
}

#[test]
fn test_idle_session_is_reclaimed_without_saving() {
    let h = Harness::with_config(SessionConfig::default().with_idle_timeout(Duration::from_millis(50)));
    let path = h.workbook("book.xlsx");
    let id = h.registry.begin(&path).unwrap();
    h.executor()
        .execute(&Target::Session(id.clone()), Access::Write, |wb| {
            ops::set_values(wb, "Sheet1", "A1", &[vec![99.into()]])
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(120));

    assert!(h.registry.list().is_empty());
    assert!(matches!(
        h.registry.use_session(&id),
        Err(SessionError::NotFound(_))
    ));
    assert_eq!(read_a1(&path), CellValue::Null);
    assert_eq!(h.automation.live_handles(), 0);

    // the path is free again
    let again = h.registry.begin(&path).unwrap();
    h.registry.commit(&again, false).unwrap();
}

#[test]
fn test_failed_save_still_removes_session() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");
    let id = h.registry.begin(&path).unwrap();
    h.executor()
        .execute(&Target::Session(id.clone()), Access::Write, |wb| {
            ops::set_values(wb, "Sheet1", "A1", &[vec![1.into()]])
        })
        .unwrap();

    h.automation.inject(Fault::Save, "The document is read-only.");
    let err = h.registry.commit(&id, true).unwrap_err();
    assert_eq!(err.to_string(), "The document is read-only.");

    assert!(h.registry.list().is_empty());
    assert_eq!(h.automation.live_handles(), 0);
    h.automation.clear_faults();
    let again = h.registry.begin(&path).unwrap();
    h.registry.commit(&again, false).unwrap();
}

#[test]
fn test_every_handle_is_released() {
    let h = Harness::new();
    let mut doc = MemoryDocument::with_sheets(&["Sheet1"]);
    doc.define_name(NamedRange::workbook_scope("Block", "Sheet1!$A$1:$C$3"))
        .unwrap();
    let path = h.document("book.xlsx", &doc);
    let id = h.registry.begin(&path).unwrap();
    let target = Target::Session(id.clone());
    let executor = h.executor();

    // app + workbook
    let baseline = h.automation.live_handles();
    assert_eq!(baseline, 2);

    executor
        .execute(&target, Access::Read, |wb| ops::get_values(wb, "", "Block"))
        .unwrap();
    executor
        .execute(&target, Access::Read, |wb| ops::get_values(wb, "Nope", "A1"))
        .unwrap_err();
    executor
        .execute(&target, Access::Read, |wb| ops::get_values(wb, "Sheet1", "A1:::"))
        .unwrap_err();
    executor
        .execute(&target, Access::Write, |wb| {
            ops::set_formulas(wb, "Sheet1", "A1", &[vec!["=1+1".to_string()]])
        })
        .unwrap();
    executor
        .execute(&target, Access::Read, |wb| -> Result<(), OperationError> {
            let _bound = wb.resolve("Sheet1", "B2")?;
            Err(OperationError::Internal("unit failed while holding a range".into()))
        })
        .unwrap_err();
    assert_eq!(h.automation.live_handles(), baseline);

    h.registry.commit(&id, true).unwrap();
    assert_eq!(h.automation.live_handles(), 0);
    assert_eq!(h.automation.stale_releases(), 0);
}

#[test]
fn test_one_shot_saves_only_successful_writes() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");
    let target = Target::OneShot(path.clone());

    h.executor()
        .execute(&target, Access::Write, |wb| {
            ops::set_values(wb, "Sheet1", "A1", &[vec!["saved".into()]])
        })
        .unwrap();
    assert_eq!(read_a1(&path), CellValue::from("saved"));

    h.executor()
        .execute(&target, Access::Write, |wb| {
            ops::set_values(wb, "Sheet1", "A1", &[vec!["lost".into()]])?;
            ops::set_values(wb, "Missing", "A1", &[vec![1.into()]])
        })
        .unwrap_err();
    assert_eq!(read_a1(&path), CellValue::from("saved"));

    assert!(h.registry.is_empty());
    assert_eq!(h.automation.live_handles(), 0);
}

#[test]
fn test_one_shot_on_open_path_reports_session() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");
    let id = h.registry.begin(&path).unwrap();

    let err = h
        .executor()
        .execute(&Target::OneShot(path), Access::Read, ops::list_sheets)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionAlreadyOpen);
    assert!(err.to_string().contains(&id));
}

#[test]
fn test_create_then_commit_writes_new_file() {
    let h = Harness::new();
    let path = h.dir.path().join("fresh.xlsx");

    let id = h.registry.create(&path).unwrap();
    assert!(!path.exists());
    h.executor()
        .execute(&Target::Session(id.clone()), Access::Write, |wb| {
            ops::set_values(wb, "Sheet1", "A1", &[vec![3.5.into()]])
        })
        .unwrap();
    assert!(h.registry.commit(&id, true).unwrap().saved);
    assert_eq!(read_a1(&path), CellValue::Number(3.5));

    assert!(matches!(
        h.registry.create(&path),
        Err(SessionError::AlreadyExists(_))
    ));
}

#[test]
fn test_save_checkpoints_without_closing() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");
    let id = h.registry.begin(&path).unwrap();
    let target = Target::Session(id.clone());

    h.executor()
        .execute(&target, Access::Write, |wb| {
            ops::set_values(wb, "Sheet1", "A1", &[vec![1.into()]])
        })
        .unwrap();
    h.registry.save(&id).unwrap();
    assert_eq!(read_a1(&path), CellValue::Number(1.0));
    assert!(!h.registry.list()[0].dirty);

    // nothing changed since the checkpoint
    assert!(!h.registry.commit(&id, true).unwrap().saved);
}

#[test]
fn test_concurrent_sessions_on_different_documents() {
    let h = Harness::new();
    let paths: Vec<PathBuf> = (0..4).map(|i| h.workbook(&format!("book{i}.xlsx"))).collect();
    let ids: Vec<String> = paths.iter().map(|p| h.registry.begin(p).unwrap()).collect();

    std::thread::scope(|scope| {
        for (i, id) in ids.iter().enumerate() {
            let executor = h.executor();
            scope.spawn(move || {
                let target = Target::Session(id.clone());
                for row in 1..=20 {
                    executor
                        .execute(&target, Access::Write, |wb| {
                            let cell = format!("A{row}");
                            ops::set_values(wb, "Sheet1", &cell, &[vec![(i as i32).into()]])
                        })
                        .unwrap();
                }
            });
        }
    });

    for (i, id) in ids.iter().enumerate() {
        h.registry.commit(id, true).unwrap();
        let doc = MemoryDocument::read_from(&paths[i]).unwrap();
        assert_eq!(doc.value("Sheet1", "A20"), Some(CellValue::Number(i as f64)));
    }
    assert_eq!(h.automation.applications_started(), 1);
    assert_eq!(h.automation.live_handles(), 0);
}

#[test]
fn test_units_on_one_session_never_overlap() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");
    let id = h.registry.begin(&path).unwrap();
    let in_unit = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for t in 0..2 {
            let executor = h.executor();
            let (id, in_unit) = (&id, &in_unit);
            scope.spawn(move || {
                let target = Target::Session(id.clone());
                for row in 1..=25i32 {
                    executor
                        .execute(&target, Access::Write, |wb| {
                            assert!(!in_unit.swap(true, Ordering::SeqCst), "units overlapped");
                            std::thread::sleep(Duration::from_millis(1));
                            let cell = format!("{}{row}", if t == 0 { 'A' } else { 'B' });
                            let written = ops::set_values(wb, "Sheet1", &cell, &[vec![row.into()]]);
                            in_unit.store(false, Ordering::SeqCst);
                            written
                        })
                        .unwrap();
                }
            });
        }
    });

    h.registry.commit(&id, true).unwrap();
    let doc = MemoryDocument::read_from(&path).unwrap();
    assert_eq!(doc.value("Sheet1", "A25"), Some(CellValue::Number(25.0)));
    assert_eq!(doc.value("Sheet1", "B25"), Some(CellValue::Number(25.0)));
}

#[test]
fn test_missing_sheet_when_sheets_cannot_be_listed() {
    let h = Harness::new();
    let path = h.workbook("book.xlsx");
    let id = h.registry.begin(&path).unwrap();
    h.automation.inject(Fault::ListSheets, "sheet list unavailable");

    let err = h
        .executor()
        .execute(&Target::Session(id.clone()), Access::Read, |wb| {
            ops::get_values(wb, "Summary", "A1")
        })
        .unwrap_err();
    let OperationError::Resolution(failure) = err else {
        panic!("expected a resolution failure, got {err:?}");
    };
    assert_eq!(failure.stage, ResolutionStage::SheetLookup);
    assert!(failure.alternatives.is_empty());
    assert_eq!(failure.message, "Sheet 'Summary' not found.");

    // the session survives the failed lookup
    h.automation.clear_faults();
    h.executor()
        .execute(&Target::Session(id.clone()), Access::Read, |wb| {
            ops::get_values(wb, "Sheet1", "A1")
        })
        .unwrap();
    h.registry.commit(&id, false).unwrap();
}
