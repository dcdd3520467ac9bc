//! Scoped ownership of native handles
//!
//! Every worksheet or range handle obtained from an [`Automation`] backend is
//! wrapped in an [`OwnedHandle`] right away. The guard gives the handle back
//! exactly once: on an explicit [`OwnedHandle::release`], or when it goes out
//! of scope on any path (success, `?` early return, or unwinding).
//!
//! Release never fails from the caller's point of view. A backend error during
//! release is logged and dropped so it cannot mask the error that caused the
//! scope to unwind in the first place.

use std::fmt;

use tracing::debug;

use crate::automation::{Automation, NativeHandle};
use crate::error::{AutomationError, AutomationResult};

/// What kind of object a handle refers to (for diagnostics)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Worksheet,
    Range,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandleKind::Worksheet => "worksheet",
            HandleKind::Range => "range",
        })
    }
}

/// A native handle that is released when dropped.
pub struct OwnedHandle<'a> {
    automation: &'a dyn Automation,
    handle: Option<NativeHandle>,
    kind: HandleKind,
}

impl<'a> OwnedHandle<'a> {
    /// Take ownership of `handle`.
    pub fn new(automation: &'a dyn Automation, handle: NativeHandle, kind: HandleKind) -> Self {
        debug!(%handle, %kind, "acquired handle");
        Self {
            automation,
            handle: Some(handle),
            kind,
        }
    }

    /// The handle, or `None` once released.
    pub fn get(&self) -> Option<NativeHandle> {
        self.handle
    }

    /// The handle, or [`AutomationError::InvalidHandle`] once released.
    pub fn live(&self) -> AutomationResult<NativeHandle> {
        self.handle.ok_or(AutomationError::InvalidHandle(0))
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Give the handle back to the backend and forget it. Calling this again
    /// is a no-op. Never fails.
    pub fn release(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        match self.automation.release(handle) {
            Ok(()) => debug!(%handle, kind = %self.kind, "released handle"),
            Err(e) => debug!(%handle, kind = %self.kind, error = %e, "release failed, ignoring"),
        }
    }
}

impl Drop for OwnedHandle<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for OwnedHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Release whatever `slot` holds and leave it empty. Safe to call on an empty slot.
pub fn release_slot(slot: &mut Option<OwnedHandle<'_>>) {
    if let Some(mut owned) = slot.take() {
        owned.release();
    }
}
