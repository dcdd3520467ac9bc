//! Session registry
//!
//! A session keeps one document open in the shared application instance
//! between tool calls. The registry guarantees at most one session per
//! canonical document path, reference-counts the application across sessions,
//! and reclaims sessions nobody has touched for [`SessionConfig::idle_timeout`].
//!
//! Locking: the registry table sits behind one coarse mutex. Each session has
//! its own work mutex that is held for the length of a unit of work, a save,
//! or teardown. The table lock is never held while waiting on a work mutex.
//! Starting and quitting the application both happen under the table lock, so
//! a new session never attaches to an application that is shutting down.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::automation::{Automation, NativeHandle};
use crate::config::SessionConfig;
use crate::error::{AutomationError, SessionError};

/// Result of [`SessionRegistry::commit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    /// Whether the document was written to disk
    pub saved: bool,
}

/// Snapshot of one live session, for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub age_seconds: u64,
    pub idle_seconds: u64,
    pub dirty: bool,
}

struct SessionWork {
    /// `None` once the session has been torn down
    workbook: Option<NativeHandle>,
    /// Created by `create` and never saved: the first save must be a save-as
    is_new: bool,
}

struct Session {
    id: String,
    path: PathBuf,
    created_at: DateTime<Utc>,
    opened: Instant,
    last_touched: Mutex<Instant>,
    dirty: AtomicBool,
    work: Mutex<SessionWork>,
}

impl Session {
    fn new(path: PathBuf, workbook: NativeHandle, is_new: bool) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            path,
            created_at: Utc::now(),
            opened: now,
            last_touched: Mutex::new(now),
            dirty: AtomicBool::new(false),
            work: Mutex::new(SessionWork {
                workbook: Some(workbook),
                is_new,
            }),
        }
    }

    fn touch(&self) {
        *lock(&self.last_touched) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        lock(&self.last_touched).elapsed()
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// A unit of work holds the work lock. A poisoned lock is not held by
    /// anyone.
    fn is_busy(&self) -> bool {
        matches!(self.work.try_lock(), Err(TryLockError::WouldBlock))
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            path: self.path.clone(),
            created_at: self.created_at,
            age_seconds: self.opened.elapsed().as_secs(),
            idle_seconds: self.idle_for().as_secs(),
            dirty: self.is_dirty(),
        }
    }
}

struct SharedApplication {
    handle: NativeHandle,
    sessions: usize,
}

#[derive(Default)]
struct RegistryState {
    sessions: AHashMap<String, Arc<Session>>,
    by_path: AHashMap<PathBuf, String>,
    application: Option<SharedApplication>,
}

impl RegistryState {
    fn insert(&mut self, session: Session) -> String {
        let id = session.id.clone();
        self.by_path.insert(session.path.clone(), id.clone());
        self.sessions.insert(id.clone(), Arc::new(session));
        id
    }

    fn remove(&mut self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.remove(id)?;
        self.by_path.remove(&session.path);
        Some(session)
    }

    fn check_free(&self, path: &Path) -> Result<(), SessionError> {
        match self.by_path.get(path) {
            Some(existing) => Err(SessionError::AlreadyOpen {
                path: path.to_path_buf(),
                session_id: existing.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Drop one reference to the application; returns its handle when it
    /// should be quit.
    fn unref_application(&mut self) -> Option<NativeHandle> {
        let app = self.application.as_mut()?;
        app.sessions = app.sessions.saturating_sub(1);
        if app.sessions > 0 {
            return None;
        }
        self.application.take().map(|app| app.handle)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide table of open batch sessions
pub struct SessionRegistry {
    automation: Arc<dyn Automation>,
    config: SessionConfig,
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    pub fn new(automation: Arc<dyn Automation>, config: SessionConfig) -> Self {
        Self {
            automation,
            config,
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn automation(&self) -> &dyn Automation {
        self.automation.as_ref()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        lock(&self.state)
    }

    /// Open the document at `path` and start a session on it.
    pub fn begin(&self, path: impl AsRef<Path>) -> Result<String, SessionError> {
        self.sweep();
        let path = canonical_path(path.as_ref())?;
        self.open_session(path, false)
    }

    /// Start a session on a new, empty document that will be written to `path`
    /// on the first save.
    pub fn create(&self, path: impl AsRef<Path>) -> Result<String, SessionError> {
        self.sweep();
        let path = canonical_path(path.as_ref())?;
        if path.exists() {
            return Err(SessionError::AlreadyExists(path));
        }
        self.open_session(path, true)
    }

    fn open_session(&self, path: PathBuf, is_new: bool) -> Result<String, SessionError> {
        let mut state = self.state();
        state.check_free(&path)?;

        let application = match &mut state.application {
            Some(app) => {
                app.sessions += 1;
                app.handle
            }
            None => {
                let handle = self.automation.start_application()?;
                info!(%handle, "started application");
                state.application = Some(SharedApplication {
                    handle,
                    sessions: 1,
                });
                handle
            }
        };

        let opened = if is_new {
            self.automation.create_workbook(application)
        } else {
            self.automation.open_workbook(application, &path)
        };
        let workbook = match opened {
            Ok(workbook) => workbook,
            Err(e) => {
                self.release_application(&mut state);
                return Err(e.into());
            }
        };

        let id = state.insert(Session::new(path.clone(), workbook, is_new));
        info!(session_id = %id, path = %path.display(), new = is_new, "session started");
        Ok(id)
    }

    fn lookup(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.state()
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Refresh a session's idle clock and return its live document handle.
    ///
    /// The handle is only valid until the session is committed or reclaimed;
    /// prefer [`SessionRegistry::with_session`], which also serializes access.
    pub fn use_session(&self, id: &str) -> Result<NativeHandle, SessionError> {
        self.sweep();
        let session = self.lookup(id)?;
        session.touch();
        let work = lock(&session.work);
        work.workbook
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Run `f` against a session's document while holding the session's work
    /// lock. `Write` units mark the session dirty when they succeed.
    pub fn with_session<T, E>(
        &self,
        id: &str,
        write: bool,
        f: impl FnOnce(NativeHandle, &Path) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<SessionError>,
    {
        self.sweep();
        let session = self.lookup(id)?;
        session.touch();

        let work = lock(&session.work);
        // committed or reclaimed while we waited
        let workbook = work
            .workbook
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let result = f(workbook, &session.path);
        if write && result.is_ok() {
            session.dirty.store(true, Ordering::Release);
        }
        drop(work);
        session.touch();
        result
    }

    /// Save the document without ending the session.
    pub fn save(&self, id: &str) -> Result<(), SessionError> {
        self.sweep();
        let session = self.lookup(id)?;
        session.touch();

        let mut work = lock(&session.work);
        let workbook = work
            .workbook
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        if work.is_new {
            self.automation.save_workbook_as(workbook, &session.path)?;
            work.is_new = false;
        } else {
            self.automation.save_workbook(workbook)?;
        }
        session.dirty.store(false, Ordering::Release);
        info!(session_id = id, path = %session.path.display(), "session saved");
        Ok(())
    }

    /// End a session, saving first when `save` is set and there is something
    /// to save. The session is gone afterwards even if saving or closing fails.
    pub fn commit(&self, id: &str, save: bool) -> Result<CommitOutcome, SessionError> {
        self.sweep();
        let session = self
            .state()
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let result = self.teardown(&session, save);
        match &result {
            Ok(saved) => info!(session_id = id, saved, "session committed"),
            Err(e) => warn!(session_id = id, error = %e, "session removed after failed teardown"),
        }
        result.map(|saved| CommitOutcome { saved })
    }

    /// Commit without saving.
    pub fn discard(&self, id: &str) -> Result<(), SessionError> {
        self.commit(id, false).map(|_| ())
    }

    /// Close the session's document and drop its application reference. The
    /// session must already be out of the table.
    fn teardown(&self, session: &Session, save: bool) -> Result<bool, SessionError> {
        let mut work = lock(&session.work);
        let Some(workbook) = work.workbook.take() else {
            return Ok(false);
        };

        let mut saved = false;
        let mut first_error: Option<AutomationError> = None;
        if save && (session.is_dirty() || work.is_new) {
            let result = if work.is_new {
                self.automation.save_workbook_as(workbook, &session.path)
            } else {
                self.automation.save_workbook(workbook)
            };
            match result {
                Ok(()) => saved = true,
                Err(e) => first_error = Some(e),
            }
        }

        if let Err(e) = self.automation.close_workbook(workbook, false) {
            match first_error {
                None => first_error = Some(e),
                Some(_) => warn!(session_id = %session.id, error = %e, "close failed after failed save"),
            }
        }
        drop(work);

        self.release_application(&mut self.state());

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(saved),
        }
    }

    /// Drop one session's reference to the application, quitting it when that
    /// was the last one. Takes the table guard so no session can start on the
    /// application while it quits.
    fn release_application(&self, state: &mut RegistryState) {
        let quit = state.unref_application();
        self.quit(quit);
    }

    fn quit(&self, application: Option<NativeHandle>) {
        let Some(handle) = application else {
            return;
        };
        match self.automation.quit_application(handle) {
            Ok(()) => info!(%handle, "application quit"),
            Err(e) => warn!(%handle, error = %e, "failed to quit application"),
        }
    }

    /// Snapshot of all live sessions, oldest first.
    pub fn list(&self) -> Vec<SessionSummary> {
        self.sweep();
        let mut summaries: Vec<SessionSummary> = self
            .state()
            .sessions
            .values()
            .map(|s| s.summary())
            .collect();
        summaries.sort_by(|a, b| b.age_seconds.cmp(&a.age_seconds).then(a.path.cmp(&b.path)));
        summaries
    }

    pub fn len(&self) -> usize {
        self.state().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard, without saving, every session idle longer than the configured
    /// timeout. Sessions in the middle of a unit of work are skipped. Returns
    /// the number of sessions reclaimed.
    pub fn sweep(&self) -> usize {
        let timeout = self.config.idle_timeout;
        let expired: Vec<Arc<Session>> = {
            let mut state = self.state();
            let ids: Vec<String> = state
                .sessions
                .values()
                .filter(|s| s.idle_for() > timeout && !s.is_busy())
                .map(|s| s.id.clone())
                .collect();
            ids.iter().filter_map(|id| state.remove(id)).collect()
        };

        for session in &expired {
            warn!(
                session_id = %session.id,
                path = %session.path.display(),
                idle_secs = session.idle_for().as_secs(),
                dirty = session.is_dirty(),
                "reclaiming idle session without saving"
            );
            if let Err(e) = self.teardown(session, false) {
                warn!(session_id = %session.id, error = %e, "idle session teardown failed");
            }
        }
        expired.len()
    }

    /// Discard every session without saving and quit the application.
    pub fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut state = self.state();
            state.by_path.clear();
            state.sessions.drain().map(|(_, s)| s).collect()
        };
        if !sessions.is_empty() {
            info!(count = sessions.len(), "discarding open sessions");
        }
        for session in &sessions {
            if let Err(e) = self.teardown(session, false) {
                warn!(session_id = %session.id, error = %e, "teardown failed during shutdown");
            }
        }
        // application started but every open failed to register
        let mut state = self.state();
        let leftover = state.application.take().map(|app| app.handle);
        self.quit(leftover);
        drop(state);
        debug!("registry shut down");
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.config)
            .field("sessions", &self.len())
            .finish()
    }
}

/// The identity of a document: its canonical path when it exists, otherwise
/// its absolute, lexically normalized path.
pub fn canonical_path(path: &Path) -> Result<PathBuf, SessionError> {
    if path.as_os_str().is_empty() {
        return Err(SessionError::InvalidPath {
            path: String::new(),
            reason: "path is empty".into(),
        });
    }
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| SessionError::InvalidPath {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    // the directory may exist even when the file does not
    if let (Some(parent), Some(name)) = (normalized.parent(), normalized.file_name()) {
        if let Ok(parent) = parent.canonicalize() {
            return Ok(parent.join(name));
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::RangeInfo;
    use crate::error::AutomationResult;
    use crate::memory::{Fault, MemoryAutomation, MemoryDocument};
    use sheetrelay_core::CellValue;
    use std::sync::mpsc;
    use std::thread;

    fn setup() -> (tempfile::TempDir, Arc<MemoryAutomation>, SessionRegistry) {
        let dir = tempfile::tempdir().unwrap();
        MemoryDocument::with_sheets(&["Sheet1"])
            .write_to(&dir.path().join("a.xlsx"))
            .unwrap();
        MemoryDocument::with_sheets(&["Sheet1"])
            .write_to(&dir.path().join("b.xlsx"))
            .unwrap();
        let automation = Arc::new(MemoryAutomation::new());
        let registry = SessionRegistry::new(automation.clone(), SessionConfig::default());
        (dir, automation, registry)
    }

    /// One application process. Starting while it runs attaches to it, and
    /// quitting closes whatever documents are still open in it. Quit announces
    /// itself on `quitting` and then waits, up to a bound, for `resume`.
    struct OneProcess {
        inner: MemoryAutomation,
        running: Mutex<Option<NativeHandle>>,
        documents: Mutex<Vec<NativeHandle>>,
        quitting: Mutex<mpsc::Sender<()>>,
        resume: Mutex<mpsc::Receiver<()>>,
    }

    impl OneProcess {
        fn new(quitting: mpsc::Sender<()>, resume: mpsc::Receiver<()>) -> Self {
            Self {
                inner: MemoryAutomation::new(),
                running: Mutex::new(None),
                documents: Mutex::new(Vec::new()),
                quitting: Mutex::new(quitting),
                resume: Mutex::new(resume),
            }
        }

        fn opened(&self, workbook: AutomationResult<NativeHandle>) -> AutomationResult<NativeHandle> {
            let workbook = workbook?;
            lock(&self.documents).push(workbook);
            Ok(workbook)
        }
    }

    impl Automation for OneProcess {
        fn start_application(&self) -> AutomationResult<NativeHandle> {
            let mut running = lock(&self.running);
            if let Some(app) = *running {
                return Ok(app);
            }
            let app = self.inner.start_application()?;
            *running = Some(app);
            Ok(app)
        }

        fn quit_application(&self, application: NativeHandle) -> AutomationResult<()> {
            let _ = lock(&self.quitting).send(());
            let _ = lock(&self.resume).recv_timeout(Duration::from_millis(300));
            for workbook in lock(&self.documents).drain(..) {
                let _ = self.inner.close_workbook(workbook, false);
            }
            *lock(&self.running) = None;
            self.inner.quit_application(application)
        }

        fn open_workbook(&self, application: NativeHandle, path: &Path) -> AutomationResult<NativeHandle> {
            self.opened(self.inner.open_workbook(application, path))
        }

        fn create_workbook(&self, application: NativeHandle) -> AutomationResult<NativeHandle> {
            self.opened(self.inner.create_workbook(application))
        }

        fn save_workbook(&self, workbook: NativeHandle) -> AutomationResult<()> {
            self.inner.save_workbook(workbook)
        }

        fn save_workbook_as(&self, workbook: NativeHandle, path: &Path) -> AutomationResult<()> {
            self.inner.save_workbook_as(workbook, path)
        }

        fn close_workbook(&self, workbook: NativeHandle, save: bool) -> AutomationResult<()> {
            lock(&self.documents).retain(|&open| open != workbook);
            self.inner.close_workbook(workbook, save)
        }

        fn worksheet(&self, workbook: NativeHandle, name: &str) -> AutomationResult<Option<NativeHandle>> {
            self.inner.worksheet(workbook, name)
        }

        fn worksheet_names(&self, workbook: NativeHandle, limit: usize) -> AutomationResult<Vec<String>> {
            self.inner.worksheet_names(workbook, limit)
        }

        fn named_range(&self, workbook: NativeHandle, name: &str) -> AutomationResult<Option<NativeHandle>> {
            self.inner.named_range(workbook, name)
        }

        fn range_names(&self, workbook: NativeHandle, limit: usize) -> AutomationResult<Vec<String>> {
            self.inner.range_names(workbook, limit)
        }

        fn range(&self, sheet: NativeHandle, address: &str) -> AutomationResult<NativeHandle> {
            self.inner.range(sheet, address)
        }

        fn range_info(&self, range: NativeHandle) -> AutomationResult<RangeInfo> {
            self.inner.range_info(range)
        }

        fn read_values(&self, range: NativeHandle) -> AutomationResult<Vec<Vec<CellValue>>> {
            self.inner.read_values(range)
        }

        fn write_values(&self, range: NativeHandle, values: &[Vec<CellValue>]) -> AutomationResult<()> {
            self.inner.write_values(range, values)
        }

        fn read_formulas(&self, range: NativeHandle) -> AutomationResult<Vec<Vec<String>>> {
            self.inner.read_formulas(range)
        }

        fn write_formulas(&self, range: NativeHandle, formulas: &[Vec<String>]) -> AutomationResult<()> {
            self.inner.write_formulas(range, formulas)
        }

        fn release(&self, handle: NativeHandle) -> AutomationResult<()> {
            self.inner.release(handle)
        }
    }

    #[test]
    fn test_canonical_path_collapses_spellings() {
        let (dir, _automation, _registry) = setup();
        let plain = canonical_path(&dir.path().join("a.xlsx")).unwrap();
        let dotted = canonical_path(&dir.path().join(".").join("a.xlsx")).unwrap();
        assert_eq!(plain, dotted);

        let missing = canonical_path(&dir.path().join("sub").join("..").join("new.xlsx")).unwrap();
        assert_eq!(missing.file_name().unwrap(), "new.xlsx");
        assert_eq!(missing.parent(), plain.parent());

        assert!(canonical_path(Path::new("")).is_err());
    }

    #[test]
    fn test_application_is_shared() {
        let (dir, automation, registry) = setup();
        let a = registry.begin(dir.path().join("a.xlsx")).unwrap();
        let b = registry.begin(dir.path().join("b.xlsx")).unwrap();
        assert_eq!(automation.applications_started(), 1);

        registry.commit(&a, false).unwrap();
        assert!(automation.is_running());
        registry.commit(&b, false).unwrap();
        assert!(!automation.is_running());
        assert_eq!(automation.live_handles(), 0);
    }

    #[test]
    fn test_failed_open_releases_application() {
        let (dir, automation, registry) = setup();
        let err = registry.begin(dir.path().join("missing.xlsx")).unwrap_err();
        assert!(matches!(err, SessionError::Automation(AutomationError::Native(_))));
        assert!(!automation.is_running());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_with_session_marks_dirty_on_success_only() {
        let (dir, _automation, registry) = setup();
        let id = registry.begin(dir.path().join("a.xlsx")).unwrap();

        let failed: Result<(), SessionError> =
            registry.with_session(&id, true, |_, _| Err(SessionError::NotFound("x".into())));
        assert!(failed.is_err());
        assert!(!registry.list()[0].dirty);

        registry
            .with_session(&id, true, |_, _| Ok::<_, SessionError>(()))
            .unwrap();
        assert!(registry.list()[0].dirty);

        registry.save(&id).unwrap();
        assert!(!registry.list()[0].dirty);
    }

    #[test]
    fn test_quit_failure_does_not_fail_commit() {
        let (dir, automation, registry) = setup();
        let id = registry.begin(dir.path().join("a.xlsx")).unwrap();
        automation.inject(Fault::Quit, "application busy");
        assert_eq!(registry.commit(&id, true).unwrap(), CommitOutcome { saved: false });
    }

    #[test]
    fn test_session_begun_during_quit_outlives_it() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["a.xlsx", "b.xlsx"] {
            MemoryDocument::with_sheets(&["Sheet1"])
                .write_to(&dir.path().join(file))
                .unwrap();
        }
        let (quitting_tx, quitting_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel();
        let automation = Arc::new(OneProcess::new(quitting_tx, resume_rx));
        let registry = SessionRegistry::new(automation.clone(), SessionConfig::default());
        let a = registry.begin(dir.path().join("a.xlsx")).unwrap();

        let b = thread::scope(|scope| {
            scope.spawn(|| registry.commit(&a, false).unwrap());
            quitting_rx.recv().unwrap();
            // quit is in progress and waits until this begin returns
            let b = scope
                .spawn(|| registry.begin(dir.path().join("b.xlsx")))
                .join()
                .unwrap()
                .unwrap();
            resume_tx.send(()).unwrap();
            b
        });

        let sheets = registry
            .with_session(&b, false, |wb, _| {
                automation.worksheet_names(wb, 10).map_err(SessionError::from)
            })
            .unwrap();
        assert_eq!(sheets, vec!["Sheet1"]);
        assert_eq!(automation.inner.applications_started(), 2);

        registry.commit(&b, false).unwrap();
        assert_eq!(automation.inner.live_handles(), 0);
    }

    #[test]
    fn test_sweep_reclaims_session_poisoned_by_panic() {
        let dir = tempfile::tempdir().unwrap();
        MemoryDocument::with_sheets(&["Sheet1"])
            .write_to(&dir.path().join("a.xlsx"))
            .unwrap();
        let automation = Arc::new(MemoryAutomation::new());
        let registry = SessionRegistry::new(
            automation.clone(),
            SessionConfig::default().with_idle_timeout(Duration::from_millis(20)),
        );
        let id = registry.begin(dir.path().join("a.xlsx")).unwrap();

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), SessionError> =
                registry.with_session(&id, true, |_, _| panic!("unit of work blew up"));
        }));
        assert!(panicked.is_err());

        thread::sleep(Duration::from_millis(60));
        assert_eq!(registry.sweep(), 1);
        assert!(registry.is_empty());
        assert_eq!(automation.live_handles(), 0);
    }

    #[test]
    fn test_shutdown_discards_everything() {
        let (dir, automation, registry) = setup();
        registry.begin(dir.path().join("a.xlsx")).unwrap();
        registry.create(dir.path().join("c.xlsx")).unwrap();
        registry.shutdown();
        assert!(registry.is_empty());
        assert_eq!(automation.live_handles(), 0);
        assert!(!dir.path().join("c.xlsx").exists());
    }
}
