//! Controller configuration.
//!
//! Read from `~/.config/harmonyctl/config.json` unless another path is given.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use harmonyctl_activity::{SessionConfig, Timings};
use harmonyctl_hub_connection::HubCredentials;
use harmonyctl_protocol::constants::{
    ACTIVITY_GRACE_PERIOD, DISCOVERY_PORT, KEEPALIVE_INITIAL_DELAY, KEEPALIVE_PERIOD,
    WATCHDOG_TIMEOUT, WS_DEFAULT_PORT,
};

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonyConfig {
    /// Hub address. Discovery is used when unset.
    pub ip_address: Option<String>,
    pub email: String,
    pub password: String,
    /// WebSocket port of the hub.
    pub port: u16,
    /// Local port hubs answer discovery pings on.
    pub discovery_port: u16,
    pub timings: TimingsFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingsFile {
    pub watchdog_secs: u64,
    pub grace_millis: u64,
    pub keepalive_delay_secs: u64,
    pub keepalive_period_secs: u64,
}

impl Default for TimingsFile {
    fn default() -> Self {
        Self {
            watchdog_secs: WATCHDOG_TIMEOUT.as_secs(),
            grace_millis: ACTIVITY_GRACE_PERIOD.as_millis() as u64,
            keepalive_delay_secs: KEEPALIVE_INITIAL_DELAY.as_secs(),
            keepalive_period_secs: KEEPALIVE_PERIOD.as_secs(),
        }
    }
}

/// Zero watchdog and keep-alive period values fall back to the defaults.
impl From<TimingsFile> for Timings {
    fn from(t: TimingsFile) -> Self {
        Self {
            watchdog: nonzero_secs("watchdog_secs", t.watchdog_secs, WATCHDOG_TIMEOUT),
            grace: Duration::from_millis(t.grace_millis),
            keepalive_delay: Duration::from_secs(t.keepalive_delay_secs),
            keepalive_period: nonzero_secs(
                "keepalive_period_secs",
                t.keepalive_period_secs,
                KEEPALIVE_PERIOD,
            ),
        }
    }
}

fn nonzero_secs(field: &str, secs: u64, default: Duration) -> Duration {
    if secs == 0 {
        tracing::warn!(
            field,
            default_secs = default.as_secs(),
            "zero timing in config, using default"
        );
        default
    } else {
        Duration::from_secs(secs)
    }
}

impl Default for HarmonyConfig {
    fn default() -> Self {
        Self {
            ip_address: None,
            email: String::new(),
            password: String::new(),
            port: WS_DEFAULT_PORT,
            discovery_port: DISCOVERY_PORT,
            timings: TimingsFile::default(),
        }
    }
}

impl fmt::Debug for HarmonyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarmonyConfig")
            .field("ip_address", &self.ip_address)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .field("discovery_port", &self.discovery_port)
            .field("timings", &self.timings)
            .finish()
    }
}

impl HarmonyConfig {
    /// Loads `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };

        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn credentials(&self) -> HubCredentials {
        HubCredentials::new(&self.email, &self.password)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            address: self.ip_address.clone().filter(|a| !a.trim().is_empty()),
            discovery_port: self.discovery_port,
            timings: self.timings.into(),
        }
    }
}

fn default_config_path() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("harmonyctl")
        .join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarmonyConfig::load(Some(&dir.path().join("absent.json"))).unwrap();

        assert!(config.ip_address.is_none());
        assert_eq!(config.port, WS_DEFAULT_PORT);
        assert_eq!(config.session_config(), SessionConfig::default());
    }

    #[test]
    fn full_file_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{
                "ip_address": "192.168.1.20",
                "email": "me@example.com",
                "password": "hunter2",
                "port": 9000,
                "discovery_port": 61000,
                "timings": {
                    "watchdog_secs": 30,
                    "grace_millis": 1500,
                    "keepalive_delay_secs": 1,
                    "keepalive_period_secs": 10
                }
            }"#,
        );

        let config = HarmonyConfig::load(Some(&path)).unwrap();
        let session = config.session_config();

        assert_eq!(session.address.as_deref(), Some("192.168.1.20"));
        assert_eq!(session.discovery_port, 61000);
        assert_eq!(session.timings.watchdog, Duration::from_secs(30));
        assert_eq!(session.timings.grace, Duration::from_millis(1500));
        assert_eq!(session.timings.keepalive_period, Duration::from_secs(10));
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"email": "me@example.com", "timings": {"grace_millis": 500}}"#);

        let config = HarmonyConfig::load(Some(&path)).unwrap();

        assert_eq!(config.email, "me@example.com");
        assert_eq!(config.discovery_port, DISCOVERY_PORT);
        assert_eq!(config.timings.grace_millis, 500);
        assert_eq!(config.timings.watchdog_secs, 60);
    }

    #[test]
    fn zero_timings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{"timings": {"watchdog_secs": 0, "keepalive_delay_secs": 0, "keepalive_period_secs": 0}}"#,
        );

        let timings = HarmonyConfig::load(Some(&path)).unwrap().session_config().timings;

        assert_eq!(timings.watchdog, WATCHDOG_TIMEOUT);
        assert_eq!(timings.keepalive_period, KEEPALIVE_PERIOD);
        assert_eq!(timings.keepalive_delay, Duration::ZERO);
    }

    #[test]
    fn blank_address_means_discovery() {
        let config = HarmonyConfig {
            ip_address: Some("  ".into()),
            ..HarmonyConfig::default()
        };
        assert!(config.session_config().address.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "{ not json");
        assert!(HarmonyConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn debug_hides_password() {
        let config = HarmonyConfig {
            password: "hunter2".into(),
            ..HarmonyConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
