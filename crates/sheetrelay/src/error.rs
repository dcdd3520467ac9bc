//! Error types for sessions, address resolution and automation calls

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for calls into an automation backend
pub type AutomationResult<T> = std::result::Result<T, AutomationError>;

/// Failures reported by an automation backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutomationError {
    /// The application rejected the call. The text is the application's own
    /// message, passed through unchanged.
    #[error("{0}")]
    Native(String),

    /// The channel to the application broke (process exited, pipe closed, bad reply).
    #[error("automation transport failed: {0}")]
    Transport(String),

    /// The handle is unknown to the backend, or was already released.
    #[error("invalid or released handle {0}")]
    InvalidHandle(u64),

    /// The application could not be started.
    #[error("automation backend unavailable: {0}")]
    Unavailable(String),
}

/// Which step of address resolution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStage {
    /// The named sheet does not exist in the workbook
    SheetLookup,
    /// The address could not be evaluated against the sheet
    AddressSyntax,
    /// The workbook has no such defined name, or it does not refer to a range
    NamedRangeLookup,
}

impl fmt::Display for ResolutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolutionStage::SheetLookup => "sheet lookup",
            ResolutionStage::AddressSyntax => "address syntax",
            ResolutionStage::NamedRangeLookup => "named range lookup",
        })
    }
}

/// A caller-correctable failure to bind `(sheet, address)` to a range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ResolutionFailure {
    pub stage: ResolutionStage,
    /// Sheet name as supplied (empty for named-range resolution)
    pub sheet: String,
    /// Address or name as supplied
    pub input: String,
    /// Up to `max_alternatives` valid sheet names or defined names
    pub alternatives: Vec<String>,
    /// Human-readable, ready to show to the caller
    pub message: String,
}

/// Session bookkeeping failures
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("session '{0}' not found (it may have been committed or reclaimed after being idle)")]
    NotFound(String),

    #[error("'{}' already has an open session ({session_id}); pass that session_id or commit it first", .path.display())]
    AlreadyOpen { path: PathBuf, session_id: String },

    #[error("'{}' already exists; use session.begin to open it", .0.display())]
    AlreadyExists(PathBuf),

    #[error("invalid document path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error(transparent)]
    Automation(#[from] AutomationError),
}

/// Error kinds reported across the tool boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ResolutionFailure,
    SessionNotFound,
    SessionAlreadyOpen,
    AlreadyExists,
    NativeOperationFailure,
    InvalidRequest,
    Internal,
}

/// Anything a unit of work can fail with
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    #[error(transparent)]
    Resolution(#[from] ResolutionFailure),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Native(#[from] AutomationError),

    /// The request itself is malformed (missing address, ragged value grid, ...)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OperationError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        OperationError::InvalidRequest(msg.into())
    }

    /// The kind reported to callers
    pub fn kind(&self) -> ErrorKind {
        match self {
            OperationError::Resolution(_) => ErrorKind::ResolutionFailure,
            OperationError::Session(e) => match e {
                SessionError::NotFound(_) => ErrorKind::SessionNotFound,
                SessionError::AlreadyOpen { .. } => ErrorKind::SessionAlreadyOpen,
                SessionError::AlreadyExists(_) => ErrorKind::AlreadyExists,
                SessionError::InvalidPath { .. } => ErrorKind::InvalidRequest,
                SessionError::Automation(_) => ErrorKind::NativeOperationFailure,
            },
            OperationError::Native(_) => ErrorKind::NativeOperationFailure,
            OperationError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            OperationError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Alternatives carried by a resolution failure, empty otherwise
    pub fn alternatives(&self) -> &[String] {
        match self {
            OperationError::Resolution(failure) => &failure.alternatives,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for OperationError {
    fn from(e: serde_json::Error) -> Self {
        OperationError::Internal(e.to_string())
    }
}
