//! Subprocess management and JSON IPC for the WINE bridge process.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use excel_com_protocol::{Command as BridgeCommand, Request, Response, ResponseResult};
use serde::{Deserialize, Serialize};
use sheetrelay::AutomationError;
use tracing::{debug, info, warn};

pub use excel_com_protocol::ResponseData;

/// Errors from the Excel COM bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn WINE bridge process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Bridge process not running")]
    NotRunning,

    #[error("Failed to send command to bridge: {0}")]
    SendFailed(String),

    #[error("Failed to read response from bridge: {0}")]
    ReadFailed(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    BridgeError(String),

    #[error("Unexpected response data for {0}")]
    UnexpectedResponse(&'static str),

    #[error("Response id {got} does not match request id {expected}")]
    IdMismatch { expected: u64, got: u64 },

    #[error("WINE not found. Install WINE and ensure 'wine' is in PATH.")]
    WineNotFound,

    #[error("Bridge executable not found at: {0}")]
    BridgeExeNotFound(String),
}

impl From<BridgeError> for AutomationError {
    fn from(e: BridgeError) -> Self {
        match e {
            // Excel's own message, passed through unchanged
            BridgeError::BridgeError(message) => AutomationError::Native(message),
            BridgeError::SpawnFailed(_)
            | BridgeError::WineNotFound
            | BridgeError::BridgeExeNotFound(_) => AutomationError::Unavailable(e.to_string()),
            other => AutomationError::Transport(other.to_string()),
        }
    }
}

/// Configuration for the Excel COM bridge.
///
/// Loadable from a `[bridge]` table; `timeout_secs` holds the timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcelBridgeConfig {
    /// Path to the `excel-com-bridge.exe` Windows executable.
    /// If None, will search in common locations relative to the current binary.
    pub bridge_exe_path: Option<PathBuf>,

    /// Path to the WINE executable. Defaults to "wine".
    pub wine_path: PathBuf,

    /// Optional WINEPREFIX to use (for isolating the WINE environment).
    pub wine_prefix: Option<PathBuf>,

    /// Run the bridge under WINE and translate paths to `Z:\...`. Off on Windows.
    pub use_wine: bool,

    /// How long to wait for the bridge to exit after `Shutdown` before killing it.
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for ExcelBridgeConfig {
    fn default() -> Self {
        Self {
            bridge_exe_path: None,
            wine_path: PathBuf::from("wine"),
            wine_prefix: None,
            use_wine: !cfg!(windows),
            timeout: Duration::from_secs(30),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl BridgeProcess {
    fn spawn(config: &ExcelBridgeConfig) -> Result<Self, BridgeError> {
        let exe_path = config
            .bridge_exe_path
            .clone()
            .unwrap_or_else(find_bridge_exe);

        if !exe_path.exists() {
            return Err(BridgeError::BridgeExeNotFound(
                exe_path.display().to_string(),
            ));
        }

        let mut cmd = if config.use_wine {
            let mut cmd = std::process::Command::new(&config.wine_path);
            if let Some(prefix) = &config.wine_prefix {
                cmd.env("WINEPREFIX", prefix);
            }
            cmd.arg(&exe_path);
            cmd
        } else {
            std::process::Command::new(&exe_path)
        };
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit()); // Bridge diagnostics go to our stderr

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound && config.use_wine {
                BridgeError::WineNotFound
            } else {
                BridgeError::SpawnFailed(e)
            }
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(BridgeError::NotRunning);
        };
        info!(exe = %exe_path.display(), pid = child.id(), "spawned excel bridge");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// One request/response exchange.
    fn exchange(&mut self, request: &Request) -> Result<Response, BridgeError> {
        let json = serde_json::to_string(request)?;
        writeln!(self.stdin, "{json}").map_err(|e| BridgeError::SendFailed(e.to_string()))?;
        self.stdin
            .flush()
            .map_err(|e| BridgeError::SendFailed(e.to_string()))?;

        let mut line = String::new();
        self.stdout
            .read_line(&mut line)
            .map_err(|e| BridgeError::ReadFailed(e.to_string()))?;
        if line.is_empty() {
            return Err(BridgeError::NotRunning);
        }
        Ok(serde_json::from_str(&line)?)
    }

    /// Wait up to `timeout` for the process to exit, then kill it.
    fn reap(mut self, timeout: Duration) {
        drop(self.stdin);
        let deadline = Instant::now() + timeout;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "excel bridge exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Ok(None) | Err(_) => {
                    warn!("excel bridge did not exit in time, killing it");
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    return;
                }
            }
        }
    }
}

/// The main handle for communicating with the Excel COM bridge.
///
/// The bridge process is spawned lazily by the first
/// [`start_application`](sheetrelay::Automation::start_application) and
/// stopped by [`quit_application`](sheetrelay::Automation::quit_application).
/// One mutex covers each whole request/response exchange, so concurrent
/// callers never read each other's responses.
pub struct ExcelBridge {
    config: ExcelBridgeConfig,
    process: Mutex<Option<BridgeProcess>>,
    next_id: AtomicU64,
}

impl ExcelBridge {
    /// Create a bridge client. Nothing is spawned until the application is started.
    pub fn new(config: ExcelBridgeConfig) -> Self {
        Self {
            config,
            process: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ExcelBridgeConfig {
        &self.config
    }

    fn process(&self) -> MutexGuard<'_, Option<BridgeProcess>> {
        self.process.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.process().is_some()
    }

    /// Spawn the bridge process if it is not running yet.
    pub(crate) fn ensure_running(&self) -> Result<(), BridgeError> {
        let mut process = self.process();
        if process.is_none() {
            *process = Some(BridgeProcess::spawn(&self.config)?);
        }
        Ok(())
    }

    /// Send a command to the bridge and wait for the response.
    pub(crate) fn send_command(
        &self,
        command: BridgeCommand,
    ) -> Result<Option<ResponseData>, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request { id, command };

        let mut guard = self.process();
        let process = guard.as_mut().ok_or(BridgeError::NotRunning)?;
        let response = match process.exchange(&request) {
            Ok(response) => response,
            Err(e) => {
                // the pipe is out of sync or dead either way
                if let Some(process) = guard.take() {
                    process.reap(Duration::ZERO);
                }
                return Err(e);
            }
        };
        drop(guard);

        if response.id != id {
            return Err(BridgeError::IdMismatch {
                expected: id,
                got: response.id,
            });
        }
        match response.result {
            ResponseResult::Ok { data } => Ok(data),
            ResponseResult::Error { message } => Err(BridgeError::BridgeError(message)),
        }
    }

    /// Shut down the bridge: close all workbooks, quit Excel, and terminate the process.
    pub fn shutdown(&self) -> Result<(), BridgeError> {
        let result = if self.is_running() {
            self.send_command(BridgeCommand::Shutdown).map(|_| ())
        } else {
            Ok(())
        };
        if let Some(process) = self.process().take() {
            process.reap(self.config.timeout);
        }
        result
    }

    /// Translate a local path into the path the bridge process sees.
    pub(crate) fn bridge_path(&self, path: &Path) -> String {
        if self.config.use_wine {
            linux_to_wine_path(path)
        } else {
            path.display().to_string()
        }
    }
}

impl Drop for ExcelBridge {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!(error = %e, "bridge shutdown on drop failed");
        }
    }
}

/// Convert a Linux filesystem path to a WINE (Windows) path.
///
/// WINE maps `/` to `Z:\`, so `/home/user/file.xlsx` becomes `Z:\home\user\file.xlsx`.
/// The WINE prefix's `drive_c` maps to `C:\`.
pub fn linux_to_wine_path(linux_path: &Path) -> String {
    let abs = if linux_path.is_absolute() {
        linux_path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(linux_path)
    };

    // WINE maps the root filesystem to Z:
    format!("Z:{}", abs.display()).replace('/', "\\")
}

/// Attempt to locate the bridge exe relative to the current executable or in common paths.
pub fn find_bridge_exe() -> PathBuf {
    // Check next to the current executable
    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop();
        let candidate = exe.join("excel-com-bridge.exe");
        if candidate.exists() {
            return candidate;
        }
    }

    // Check in the target directory (for development)
    for profile in ["release", "debug"] {
        let candidate = PathBuf::from(format!(
            "target/x86_64-pc-windows-gnu/{profile}/excel-com-bridge.exe"
        ));
        if candidate.exists() {
            return candidate;
        }
    }

    // Default: assume it's in the current directory
    PathBuf::from("excel-com-bridge.exe")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wine_path() {
        assert_eq!(
            linux_to_wine_path(Path::new("/home/user/data/report.xlsx")),
            r"Z:\home\user\data\report.xlsx"
        );
    }

    #[test]
    fn test_error_mapping() {
        let native: AutomationError =
            BridgeError::BridgeError("Cannot change part of a merged cell.".into()).into();
        assert_eq!(
            native,
            AutomationError::Native("Cannot change part of a merged cell.".into())
        );

        let missing: AutomationError = BridgeError::BridgeExeNotFound("x.exe".into()).into();
        assert!(matches!(missing, AutomationError::Unavailable(_)));

        let pipe: AutomationError = BridgeError::NotRunning.into();
        assert!(matches!(pipe, AutomationError::Transport(_)));
    }

    #[test]
    fn test_config_partial_table() {
        let config: ExcelBridgeConfig =
            serde_json::from_str(r#"{"wine_prefix": "/opt/excel", "timeout_secs": 5}"#).unwrap();
        assert_eq!(config.wine_prefix, Some(PathBuf::from("/opt/excel")));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.wine_path, PathBuf::from("wine"));
    }

    #[test]
    fn test_missing_exe_is_unavailable() {
        let bridge = ExcelBridge::new(ExcelBridgeConfig {
            bridge_exe_path: Some(PathBuf::from("/nonexistent/excel-com-bridge.exe")),
            ..ExcelBridgeConfig::default()
        });
        assert!(matches!(
            bridge.ensure_running(),
            Err(BridgeError::BridgeExeNotFound(_))
        ));
        assert!(!bridge.is_running());
        assert!(matches!(
            bridge.send_command(BridgeCommand::Init),
            Err(BridgeError::NotRunning)
        ));
    }
}
