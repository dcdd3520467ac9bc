//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default idle time after which a session is reclaimed without saving
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default number of alternatives reported with a resolution failure
pub const DEFAULT_MAX_ALTERNATIVES: usize = 10;

/// Tunables for [`crate::SessionRegistry`] and the address resolver.
///
/// Deserializes from a `[session]` table; every field is optional:
///
/// ```toml
/// [session]
/// idle_timeout_secs = 900
/// max_alternatives = 5
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions untouched for longer than this are closed without saving
    #[serde(rename = "idle_timeout_secs", with = "duration_secs")]
    pub idle_timeout: Duration,
    /// Cap on sheet or defined-name alternatives in a resolution failure
    pub max_alternatives: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_alternatives: DEFAULT_MAX_ALTERNATIVES,
        }
    }
}

impl SessionConfig {
    /// Builder-style override of the idle timeout
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Builder-style override of the alternatives cap
    pub fn with_max_alternatives(mut self, max_alternatives: usize) -> Self {
        self.max_alternatives = max_alternatives;
        self
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.idle_timeout, Duration::from_secs(1800));
        assert_eq!(config.max_alternatives, 10);
    }

    #[test]
    fn test_partial_json() {
        let config: SessionConfig = serde_json::from_str(r#"{"idle_timeout_secs": 5}"#).unwrap();
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.max_alternatives, DEFAULT_MAX_ALTERNATIVES);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["idle_timeout_secs"], 5);
    }
}
