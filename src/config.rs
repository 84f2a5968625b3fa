use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ReminderChainError, Result};

pub const DEFAULT_LOOKAHEAD_MS: i64 = 10 * 60 * 1000;
pub const DEFAULT_NEAR_FUTURE_WINDOW_MS: i64 = 24 * 3600 * 1000;
pub const DEFAULT_DOZE_MARGIN_MS: i64 = 15 * 60 * 1000;
pub const DEFAULT_HEALTH_TOLERANCE_MS: i64 = 120 * 1000;
pub const DEFAULT_TITLE: &str = "(untitled)";

fn default_lookahead_ms() -> i64 {
    DEFAULT_LOOKAHEAD_MS
}

fn default_near_future_window_ms() -> i64 {
    DEFAULT_NEAR_FUTURE_WINDOW_MS
}

fn default_doze_margin_ms() -> i64 {
    DEFAULT_DOZE_MARGIN_MS
}

fn default_health_tolerance_ms() -> i64 {
    DEFAULT_HEALTH_TOLERANCE_MS
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

/// Timing knobs of the single-timer policy. All values are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChainPolicy {
    /// Reminders due at or before `now + lookahead_ms` are treated as already due.
    #[serde(default = "default_lookahead_ms")]
    pub lookahead_ms: i64,
    /// Reminders due within this window get an exact wake-up; later ones a horizon probe.
    #[serde(default = "default_near_future_window_ms")]
    pub near_future_window_ms: i64,
    /// Subtracted from the window when placing a horizon probe.
    #[serde(default = "default_doze_margin_ms")]
    pub doze_margin_ms: i64,
    /// How late a ledger entry may be at boot before the platform is considered unreliable.
    #[serde(default = "default_health_tolerance_ms")]
    pub health_tolerance_ms: i64,
}

impl Default for ChainPolicy {
    fn default() -> Self {
        Self {
            lookahead_ms: DEFAULT_LOOKAHEAD_MS,
            near_future_window_ms: DEFAULT_NEAR_FUTURE_WINDOW_MS,
            doze_margin_ms: DEFAULT_DOZE_MARGIN_MS,
            health_tolerance_ms: DEFAULT_HEALTH_TOLERANCE_MS,
        }
    }
}

impl ChainPolicy {
    pub fn horizon_probe_at(&self, now: i64) -> i64 {
        now + self.near_future_window_ms - self.doze_margin_ms
    }

    pub fn validate(&self) -> Result<()> {
        if self.lookahead_ms < 0 || self.doze_margin_ms < 0 || self.health_tolerance_ms < 0 {
            return Err(ReminderChainError::Config(
                "policy margins must not be negative".to_string(),
            ));
        }
        if self.doze_margin_ms >= self.near_future_window_ms {
            return Err(ReminderChainError::Config(format!(
                "doze_margin_ms ({}) must be smaller than near_future_window_ms ({})",
                self.doze_margin_ms, self.near_future_window_ms
            )));
        }
        // A probe that lands inside the lookahead would be caught up instead of fired.
        if self.lookahead_ms >= self.near_future_window_ms - self.doze_margin_ms {
            return Err(ReminderChainError::Config(format!(
                "lookahead_ms ({}) must end before the horizon probe ({} ms from now)",
                self.lookahead_ms,
                self.near_future_window_ms - self.doze_margin_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    pub sqlite_path: Option<String>,
    #[serde(flatten)]
    pub policy: ChainPolicy,
    #[serde(default = "default_title")]
    pub default_title: String,
}

impl ChainConfig {
    pub fn convention_defaults(db_path: &str) -> Self {
        Self {
            sqlite_path: Some(db_path.to_string()),
            policy: ChainPolicy::default(),
            default_title: default_title(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: ChainConfig =
            serde_json::from_str(raw).map_err(|e| ReminderChainError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            ReminderChainError::Config(format!(
                "Failed to read config file {}: {e}",
                path.to_string_lossy()
            ))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_title.trim().is_empty() {
            return Err(ReminderChainError::Config(
                "default_title must not be empty".to_string(),
            ));
        }
        self.policy.validate()
    }

    pub fn resolve_sqlite_path(&self) -> String {
        self.sqlite_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .unwrap_or_else(crate::runtime_paths::default_db_path)
    }
}
