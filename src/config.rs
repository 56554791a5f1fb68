//! Persistence for client configuration.
//!
//! **Config** (`config.json`): backend URL and session timer settings, saved to
//! the platform config directory (`~/.config/medguard/` on Linux).
//!
//! Session state itself is never persisted; every `medguard session` starts a
//! fresh countdown.

use crate::session::{SESSION_DURATION_SECS, URGENT_THRESHOLD_SECS, WARNING_THRESHOLD_SECS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Backend used when no config file exists.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// User preferences (persisted to config.json).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the verification backend
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub session: SessionSettings,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            session: SessionSettings::default(),
        }
    }
}

/// Countdown timing for the admin session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub duration_secs: u32,
    /// Remaining seconds at which the warning modal appears
    pub warning_secs: u32,
    /// Remaining seconds at or below which the countdown is urgent
    pub urgent_secs: u32,
    pub tick_millis: u64,
    /// Minimum gap between forwarded activity resets (0 = forward every event)
    pub activity_debounce_millis: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duration_secs: SESSION_DURATION_SECS,
            warning_secs: WARNING_THRESHOLD_SECS,
            urgent_secs: URGENT_THRESHOLD_SECS,
            tick_millis: 1000,
            activity_debounce_millis: 0,
        }
    }
}

impl SessionSettings {
    /// Clamp values into a consistent range.
    ///
    /// The warning must fire strictly before expiry, and debouncing may never
    /// delay a reset by more than one tick.
    pub fn sanitized(mut self) -> Self {
        self.duration_secs = self.duration_secs.max(2);
        if self.warning_secs == 0 || self.warning_secs >= self.duration_secs {
            self.warning_secs = WARNING_THRESHOLD_SECS.min(self.duration_secs - 1);
        }
        self.urgent_secs = self.urgent_secs.min(self.duration_secs);
        self.tick_millis = self.tick_millis.max(1);
        self.activity_debounce_millis = self.activity_debounce_millis.min(self.tick_millis);
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    pub fn activity_debounce(&self) -> Duration {
        Duration::from_millis(self.activity_debounce_millis)
    }
}

// ---------------------------------------------------------------------------
// Directory helpers
// ---------------------------------------------------------------------------

/// MedGuard config directory (e.g. `~/.config/medguard/`).
fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("medguard"))
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load config from disk, returning defaults if the file is missing or invalid.
pub fn load_config() -> Config {
    let Some(path) = config_dir().map(|d| d.join("config.json")) else {
        return Config::default();
    };
    load_config_from(&path)
}

/// Save config to disk, returning the path written.
pub fn save_config(config: &Config) -> Result<PathBuf, std::io::Error> {
    let dir = config_dir().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "config dir not found")
    })?;
    let path = dir.join("config.json");
    save_config_to(config, &path)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Path-parameterised helpers (used by public API and tests)
// ---------------------------------------------------------------------------

fn load_config_from(path: &Path) -> Config {
    let mut config: Config = match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            debug!("Ignoring invalid config {}: {}", path.display(), e);
            Config::default()
        }),
        Err(_) => Config::default(),
    };
    config.session = config.session.sanitized();
    config
}

fn save_config_to(config: &Config, path: &Path) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Write bytes to a file atomically: write to a temp file in the same
/// directory, then rename over the target. Prevents partial JSON on crash.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    use std::io::Write;

    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
