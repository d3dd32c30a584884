//! Engine configuration.
//!
//! Settings come from an optional JSON file, then `GRIDSYNC_*` environment
//! variables, and are finally checked by [`EngineConfig::validated`].

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LayoutError, Result};
use crate::state::persistence::{DEFAULT_LAYOUT_KEY, DEFAULT_LEGACY_KEY};
use crate::state::DEFAULT_MAX_HISTORY_SIZE;
use crate::sync::engine::{
    SyncConfig, DEFAULT_HTTP_URL, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_WS_URL,
};

const MIN_TIMER_MS: u64 = 10;
const MIN_HEARTBEAT_MS: u64 = 1_000;

/// Top-level settings for a [`DashboardStore`](crate::store::DashboardStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the durable records and the fallback file.
    pub storage_dir: PathBuf,

    /// Durable record id.
    pub layout_key: String,

    /// Fallback store key, also the legacy record migrated on first load.
    pub legacy_key: String,

    pub max_history_size: usize,
    pub autosave_delay_ms: u64,
    pub sync: SyncSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(".gridsync"),
            layout_key: DEFAULT_LAYOUT_KEY.to_string(),
            legacy_key: DEFAULT_LEGACY_KEY.to_string(),
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            autosave_delay_ms: 1_000,
            sync: SyncSettings::default(),
        }
    }
}

/// Remote sync settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub enabled: bool,
    pub ws_url: String,
    pub http_url: String,
    pub debounce_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,

    /// Budget for one connect plus upgrade handshake.
    pub connect_timeout_ms: u64,
    pub http_timeout_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ws_url: DEFAULT_WS_URL.to_string(),
            http_url: DEFAULT_HTTP_URL.to_string(),
            debounce_ms: 500,
            heartbeat_interval_ms: 30_000,
            reconnect_interval_ms: 5_000,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout_ms: 3_000,
            http_timeout_ms: 10_000,
        }
    }
}

impl SyncSettings {
    /// Engine timing derived from these settings.
    pub fn engine_config(&self) -> SyncConfig {
        SyncConfig {
            ws_url: self.ws_url.clone(),
            http_url: self.http_url.clone(),
            debounce: Duration::from_millis(self.debounce_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(value: Option<String>, name: &str) -> Option<T> {
    let raw = value?;
    match raw.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl EngineConfig {
    /// Read settings from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| LayoutError::InvalidConfig {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&content).map_err(|e| LayoutError::InvalidConfig {
            reason: format!("{}: {}", path.display(), e),
        })
    }

    /// File (if given), then environment, then validation.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.with_env().validated()
    }

    /// Apply `GRIDSYNC_*` overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_vars(|name| env::var(name).ok())
    }

    /// Apply `GRIDSYNC_*` overrides from an arbitrary lookup.
    pub fn with_vars<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("GRIDSYNC_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(key) = lookup("GRIDSYNC_LAYOUT_KEY") {
            self.layout_key = key;
        }
        if let Some(key) = lookup("GRIDSYNC_LEGACY_KEY") {
            self.legacy_key = key;
        }
        if let Some(v) = parse_var(lookup("GRIDSYNC_MAX_HISTORY"), "GRIDSYNC_MAX_HISTORY") {
            self.max_history_size = v;
        }
        if let Some(v) = parse_var(lookup("GRIDSYNC_AUTOSAVE_MS"), "GRIDSYNC_AUTOSAVE_MS") {
            self.autosave_delay_ms = v;
        }

        if let Some(raw) = lookup("GRIDSYNC_SYNC_ENABLED") {
            match parse_bool(&raw) {
                Some(enabled) => self.sync.enabled = enabled,
                None => log::warn!("Ignoring GRIDSYNC_SYNC_ENABLED={:?}", raw),
            }
        }
        if let Some(url) = lookup("GRIDSYNC_WS_URL") {
            self.sync.ws_url = url;
        }
        if let Some(url) = lookup("GRIDSYNC_HTTP_URL") {
            self.sync.http_url = url;
        }
        if let Some(v) = parse_var(lookup("GRIDSYNC_SYNC_DEBOUNCE_MS"), "GRIDSYNC_SYNC_DEBOUNCE_MS") {
            self.sync.debounce_ms = v;
        }
        if let Some(v) = parse_var(lookup("GRIDSYNC_HEARTBEAT_MS"), "GRIDSYNC_HEARTBEAT_MS") {
            self.sync.heartbeat_interval_ms = v;
        }
        if let Some(v) = parse_var(lookup("GRIDSYNC_RECONNECT_MS"), "GRIDSYNC_RECONNECT_MS") {
            self.sync.reconnect_interval_ms = v;
        }
        if let Some(v) = parse_var(
            lookup("GRIDSYNC_MAX_RECONNECT_ATTEMPTS"),
            "GRIDSYNC_MAX_RECONNECT_ATTEMPTS",
        ) {
            self.sync.max_reconnect_attempts = v;
        }
        if let Some(v) = parse_var(
            lookup("GRIDSYNC_CONNECT_TIMEOUT_MS"),
            "GRIDSYNC_CONNECT_TIMEOUT_MS",
        ) {
            self.sync.connect_timeout_ms = v;
        }
        if let Some(v) = parse_var(lookup("GRIDSYNC_HTTP_TIMEOUT_MS"), "GRIDSYNC_HTTP_TIMEOUT_MS") {
            self.sync.http_timeout_ms = v;
        }
        self
    }

    /// Clamp sizes and timers into range and reject unusable values.
    pub fn validated(mut self) -> Result<Self> {
        let required = [
            ("layout_key", self.layout_key.trim().is_empty()),
            ("legacy_key", self.legacy_key.trim().is_empty()),
            ("sync.ws_url", self.sync.ws_url.trim().is_empty()),
            ("sync.http_url", self.sync.http_url.trim().is_empty()),
        ];
        if let Some((name, _)) = required.iter().find(|(_, empty)| *empty) {
            return Err(LayoutError::InvalidConfig {
                reason: format!("{} must not be empty", name),
            });
        }
        if !self.sync.ws_url.trim().starts_with("ws://") {
            return Err(LayoutError::InvalidConfig {
                reason: format!(
                    "sync.ws_url must be a ws:// URL, got {:?} (TLS endpoints are not supported)",
                    self.sync.ws_url
                ),
            });
        }
        if self.storage_dir.as_os_str().is_empty() {
            return Err(LayoutError::InvalidConfig {
                reason: "storage_dir must not be empty".to_string(),
            });
        }

        self.max_history_size = self.max_history_size.max(1);
        self.autosave_delay_ms = self.autosave_delay_ms.max(MIN_TIMER_MS);
        self.sync.debounce_ms = self.sync.debounce_ms.max(MIN_TIMER_MS);
        self.sync.reconnect_interval_ms = self.sync.reconnect_interval_ms.max(MIN_TIMER_MS);
        self.sync.heartbeat_interval_ms = self.sync.heartbeat_interval_ms.max(MIN_HEARTBEAT_MS);
        self.sync.connect_timeout_ms = self.sync.connect_timeout_ms.max(MIN_TIMER_MS);
        self.sync.http_timeout_ms = self.sync.http_timeout_ms.max(MIN_TIMER_MS);
        Ok(self)
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    /// Path of the durable record directory.
    pub fn durable_dir(&self) -> PathBuf {
        self.storage_dir.join("records")
    }

    /// Path of the fallback key-value file.
    pub fn fallback_path(&self) -> PathBuf {
        self.storage_dir.join("fallback.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.layout_key, "default");
        assert_eq!(config.legacy_key, "dashboard-layout");
        assert_eq!(config.max_history_size, 50);
        assert_eq!(config.autosave_delay(), Duration::from_secs(1));

        let sync = config.sync.engine_config();
        assert_eq!(sync.ws_url, "ws://localhost:3001/ws");
        assert_eq!(sync.debounce, Duration::from_millis(500));
        assert_eq!(sync.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(sync.reconnect_interval, Duration::from_secs(5));
        assert_eq!(sync.max_reconnect_attempts, 5);
        assert_eq!(config.sync.connect_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gridsync.json");
        fs::write(&path, r#"{"max_history_size": 10, "sync": {"enabled": false}}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();

        assert_eq!(config.max_history_size, 10);
        assert!(!config.sync.enabled);
        assert_eq!(config.sync.ws_url, DEFAULT_WS_URL);
    }

    #[test]
    fn test_load_bad_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gridsync.json");
        fs::write(&path, "{ not json").unwrap();

        let err = EngineConfig::load(&path).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidConfig { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::default().with_vars(vars(&[
            ("GRIDSYNC_WS_URL", "ws://example.test/ws"),
            ("GRIDSYNC_MAX_HISTORY", "20"),
            ("GRIDSYNC_SYNC_ENABLED", "off"),
            ("GRIDSYNC_RECONNECT_MS", "not-a-number"),
            ("GRIDSYNC_CONNECT_TIMEOUT_MS", "750"),
        ]));

        assert_eq!(config.sync.connect_timeout_ms, 750);
        assert_eq!(config.sync.ws_url, "ws://example.test/ws");
        assert_eq!(config.max_history_size, 20);
        assert!(!config.sync.enabled);
        assert_eq!(config.sync.reconnect_interval_ms, 5_000);
    }

    #[test]
    fn test_validated_clamps() {
        let mut config = EngineConfig::default();
        config.max_history_size = 0;
        config.sync.debounce_ms = 0;
        config.sync.heartbeat_interval_ms = 5;

        let config = config.validated().unwrap();

        assert_eq!(config.max_history_size, 1);
        assert_eq!(config.sync.debounce_ms, MIN_TIMER_MS);
        assert_eq!(config.sync.heartbeat_interval_ms, MIN_HEARTBEAT_MS);
    }

    #[test]
    fn test_validated_rejects_empty_url() {
        let mut config = EngineConfig::default();
        config.sync.ws_url = "  ".to_string();

        let err = config.validated().unwrap_err();
        assert!(err.to_string().contains("sync.ws_url"));
    }

    #[test]
    fn test_validated_rejects_tls_ws_url() {
        let mut config = EngineConfig::default();
        config.sync.ws_url = "wss://dash.example.test/ws".to_string();

        let err = config.validated().unwrap_err();
        assert!(matches!(err, LayoutError::InvalidConfig { .. }));
        assert!(err.to_string().contains("ws://"));
    }
}
