//! Unit-of-work executor
//!
//! Runs one caller-supplied unit of work against a document, either inside an
//! existing session or as a one-shot that opens, runs, saves and closes.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::automation::{Automation, NativeHandle};
use crate::error::OperationError;
use crate::registry::SessionRegistry;
use crate::resolve::{self, BoundRange};

/// Which document a unit of work runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An open batch session
    Session(String),
    /// Open the document just for this unit, save on success, close
    OneShot(PathBuf),
}

impl Target {
    /// A session id when one is given, otherwise a one-shot on `path`.
    pub fn from_parts(
        session_id: Option<String>,
        path: Option<PathBuf>,
    ) -> Result<Self, OperationError> {
        match (session_id, path) {
            (Some(id), _) if !id.trim().is_empty() => Ok(Target::Session(id)),
            (_, Some(path)) if !path.as_os_str().is_empty() => Ok(Target::OneShot(path)),
            _ => Err(OperationError::invalid(
                "either session_id or path must be provided",
            )),
        }
    }
}

/// Whether a unit of work modifies the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// What a unit of work gets to see: the live document and the means to bind
/// ranges in it. Valid only for the duration of the unit.
pub struct Workbook<'a> {
    automation: &'a dyn Automation,
    handle: NativeHandle,
    path: &'a Path,
    max_alternatives: usize,
}

impl<'a> Workbook<'a> {
    /// Bind `address` on `sheet`, or as a defined name when `sheet` is empty.
    pub fn resolve(&self, sheet: &str, address: &str) -> Result<BoundRange<'a>, OperationError> {
        resolve::resolve(
            self.automation,
            self.handle,
            sheet,
            address,
            self.max_alternatives,
        )
    }

    /// Worksheet names in tab order, at most `limit` of them
    pub fn worksheet_names(&self, limit: usize) -> Result<Vec<String>, OperationError> {
        Ok(self.automation.worksheet_names(self.handle, limit)?)
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn path(&self) -> &Path {
        self.path
    }

    pub fn automation(&self) -> &'a dyn Automation {
        self.automation
    }
}

/// Runs units of work against sessions held by a [`SessionRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct Executor<'r> {
    registry: &'r SessionRegistry,
}

impl<'r> Executor<'r> {
    pub fn new(registry: &'r SessionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r SessionRegistry {
        self.registry
    }

    /// Run `unit` against `target`.
    ///
    /// In a session nothing is torn down afterwards and a failed unit leaves
    /// the session usable. A one-shot saves only when a write unit succeeds;
    /// if both the unit and the teardown fail, the unit's error is returned.
    pub fn execute<T, F>(&self, target: &Target, access: Access, unit: F) -> Result<T, OperationError>
    where
        F: FnOnce(&Workbook<'_>) -> Result<T, OperationError>,
    {
        match target {
            Target::Session(id) => self.run_in_session(id, access, unit),
            Target::OneShot(path) => self.run_one_shot(path, access, unit),
        }
    }

    fn run_in_session<T, F>(&self, id: &str, access: Access, unit: F) -> Result<T, OperationError>
    where
        F: FnOnce(&Workbook<'_>) -> Result<T, OperationError>,
    {
        let automation = self.registry.automation();
        let max_alternatives = self.registry.config().max_alternatives;
        self.registry
            .with_session(id, access == Access::Write, |handle, path| {
                unit(&Workbook {
                    automation,
                    handle,
                    path,
                    max_alternatives,
                })
            })
    }

    fn run_one_shot<T, F>(&self, path: &Path, access: Access, unit: F) -> Result<T, OperationError>
    where
        F: FnOnce(&Workbook<'_>) -> Result<T, OperationError>,
    {
        let id = self.registry.begin(path)?;
        debug!(session_id = %id, path = %path.display(), "one-shot session");

        let result = self.run_in_session(&id, access, unit);
        let save = result.is_ok() && access == Access::Write;
        let committed = self.registry.commit(&id, save);

        match (result, committed) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(teardown)) => {
                warn!(error = %teardown, "one-shot teardown failed after failed unit of work");
                Err(e)
            }
        }
    }
}
