//! # sheetrelay
//!
//! Keeps spreadsheet documents open across many independently dispatched tool
//! calls, resolves user-supplied addresses against the live document, and makes
//! sure every native handle acquired along the way is released exactly once.
//!
//! ## Architecture
//!
//! ```text
//! tool call ──► tools::dispatch
//!                  └── Executor ──► SessionRegistry (one session per document path)
//!                        └── Workbook::resolve ──► BoundRange (OwnedHandle, released on drop)
//!                              └── dyn Automation (Excel COM bridge, in-memory backend, ...)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sheetrelay::memory::{MemoryAutomation, MemoryDocument};
//! use sheetrelay::{ops, Access, Executor, SessionConfig, SessionRegistry, Target};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("report.xlsx");
//! MemoryDocument::with_sheets(&["Sheet1"]).write_to(&path)?;
//!
//! let registry = SessionRegistry::new(Arc::new(MemoryAutomation::new()), SessionConfig::default());
//! let session_id = registry.begin(&path)?;
//!
//! let executor = Executor::new(&registry);
//! let target = Target::Session(session_id.clone());
//! executor.execute(&target, Access::Write, |wb| {
//!     ops::set_values(wb, "Sheet1", "A1", &[vec![42.into()]])
//! })?;
//!
//! let outcome = registry.commit(&session_id, true)?;
//! assert!(outcome.saved);
//! # Ok(())
//! # }
//! ```

pub mod automation;
pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod memory;
pub mod ops;
pub mod registry;
pub mod resolve;
pub mod tools;

pub use automation::{Automation, NativeHandle, RangeInfo};
pub use config::SessionConfig;
pub use error::{
    AutomationError, AutomationResult, ErrorKind, OperationError, ResolutionFailure,
    ResolutionStage, SessionError,
};
pub use executor::{Access, Executor, Target, Workbook};
pub use handle::{release_slot, HandleKind, OwnedHandle};
pub use registry::{CommitOutcome, SessionRegistry, SessionSummary};
pub use resolve::BoundRange;
pub use tools::{Outcome, ToolCall, ToolRequest, ToolResponse};

pub use sheetrelay_core::{CellValue, SheetReference};
