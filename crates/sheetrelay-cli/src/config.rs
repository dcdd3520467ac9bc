//! TOML configuration file
//!
//! ```toml
//! [session]
//! idle_timeout_secs = 900
//! max_alternatives = 10
//!
//! [bridge]
//! bridge_exe_path = "/opt/sheetrelay/excel-com-bridge.exe"
//! wine_prefix = "/home/me/.wine-excel"
//! timeout_secs = 30
//! ```
//!
//! Every table and key is optional. Command-line flags override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sheetrelay::SessionConfig;
use sheetrelay_excel_com::ExcelBridgeConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub session: SessionConfig,
    pub bridge: ExcelBridgeConfig,
}

/// Flags that override the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub idle_timeout_secs: Option<u64>,
    pub bridge_exe: Option<PathBuf>,
    pub wine: Option<PathBuf>,
    pub wine_prefix: Option<PathBuf>,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path`, or start from defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config '{}'", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config '{}'", path.display()))
    }

    pub fn apply(mut self, overrides: &Overrides) -> Self {
        if let Some(secs) = overrides.idle_timeout_secs {
            self.session.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(exe) = &overrides.bridge_exe {
            self.bridge.bridge_exe_path = Some(exe.clone());
        }
        if let Some(wine) = &overrides.wine {
            self.bridge.wine_path = wine.clone();
        }
        if let Some(prefix) = &overrides.wine_prefix {
            self.bridge.wine_prefix = Some(prefix.clone());
        }
        self
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_file() {
        let config = Config::from_toml("[session]\nidle_timeout_secs = 60\n").unwrap();
        assert_eq!(config.session.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.session.max_alternatives, 10);
        assert_eq!(config.bridge, ExcelBridgeConfig::default());
    }

    #[test]
    fn test_unknown_table_rejected() {
        assert!(Config::from_toml("[sesion]\nidle_timeout_secs = 60\n").is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let config = Config::from_toml("[session]\nidle_timeout_secs = 60\n")
            .unwrap()
            .apply(&Overrides {
                idle_timeout_secs: Some(5),
                wine_prefix: Some(PathBuf::from("/tmp/prefix")),
                ..Overrides::default()
            });
        assert_eq!(config.session.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.bridge.wine_prefix, Some(PathBuf::from("/tmp/prefix")));
    }

    #[test]
    fn test_effective_config_reloads() {
        let config = Config::default().apply(&Overrides {
            idle_timeout_secs: Some(120),
            ..Overrides::default()
        });
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("nope.toml"));
    }
}
