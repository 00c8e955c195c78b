use crate::interval::{IntervalPolicy, IntervalStep, IntervalTableError};
use crate::notifier::NotifierKind;
use crate::session_tracker::{SessionTracker, DEFAULT_GRACE_TICKS};
use crate::watch_set::WatchSet;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Get the local data directory for scrollguard.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("scrollguard");
    Ok(path)
}

/// Default location of the config file
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("config.toml"))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid interval table: {0}")]
    IntervalTable(#[from] IntervalTableError),
    #[error("watch set is empty; nothing to monitor")]
    EmptyWatchSet,
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("{field} must be at most {max}")]
    OutOfRange { field: &'static str, max: u64 },
}

/// Inclusive upper bound for each timing option
const LIMITS: [(&str, u64); 7] = [
    ("sampling_period_ms", 60_000),
    ("grace_ticks", 10_000),
    ("backoff_ms", 3_600_000),
    ("classifier_window_secs", 3_600),
    ("classifier_timeout_ms", 60_000),
    ("notifier_timeout_ms", 60_000),
    ("health_check_secs", 86_400),
];

/// Commented `[watch_set]` for desktop sources.
///
/// The built-in watch set holds Android package names, which the X11 and
/// macOS sources never report. Uncomment and edit to watch desktop apps.
pub const DESKTOP_WATCH_SET_EXAMPLE: &str = r#"
# Desktop app ids: the WM_CLASS class on X11, the bundle id on macOS
# [watch_set]
# "firefox" = "Firefox"
# "Google-chrome" = "Chrome"
# "com.google.Chrome" = "Chrome"
# "com.apple.Safari" = "Safari"
"#;

/// Static monitoring configuration, loaded once at daemon start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Watched application IDs and their display names
    pub watch_set: WatchSet,
    pub sampling_period_ms: u64,
    /// Consecutive inconclusive ticks before a session ends
    pub grace_ticks: u32,
    pub interval_table: Vec<IntervalStep>,
    /// Delay before the next tick after a failed one
    pub backoff_ms: u64,
    pub classifier_window_secs: u64,
    pub classifier_timeout_ms: u64,
    pub notifier_timeout_ms: u64,
    pub health_check_secs: u64,
    pub notifier: NotifierKind,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watch_set: WatchSet::default(),
            sampling_period_ms: 200,
            grace_ticks: DEFAULT_GRACE_TICKS,
            interval_table: IntervalPolicy::default_steps(),
            backoff_ms: 1_000,
            classifier_window_secs: 5,
            classifier_timeout_ms: 2_000,
            notifier_timeout_ms: 5_000,
            health_check_secs: 30,
            notifier: NotifierKind::default(),
        }
    }
}

impl MonitorConfig {
    /// Parse and validate a TOML document; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or fall back to defaults when the file does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or validated
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                log::info!("Loading config from {}", path.display());
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Check every option for consistency
    ///
    /// # Errors
    ///
    /// Returns the first invalid option found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch_set.is_empty() {
            return Err(ConfigError::EmptyWatchSet);
        }
        let values = [
            self.sampling_period_ms,
            u64::from(self.grace_ticks),
            self.backoff_ms,
            self.classifier_window_secs,
            self.classifier_timeout_ms,
            self.notifier_timeout_ms,
            self.health_check_secs,
        ];
        for (&(field, max), value) in LIMITS.iter().zip(values) {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
            if value > max {
                return Err(ConfigError::OutOfRange { field, max });
            }
        }
        self.interval_policy()?;
        Ok(())
    }

    /// Render the effective configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// # Errors
    ///
    /// Returns an error if the interval table is invalid
    pub fn interval_policy(&self) -> Result<IntervalPolicy, IntervalTableError> {
        IntervalPolicy::new(self.interval_table.clone())
    }

    /// # Errors
    ///
    /// Returns an error if the interval table is invalid
    pub fn session_tracker(&self) -> Result<SessionTracker, ConfigError> {
        Ok(SessionTracker::new(
            self.watch_set.clone(),
            self.interval_policy()?,
            self.grace_ticks,
        ))
    }

    #[must_use]
    pub fn sampling_period(&self) -> Duration {
        Duration::from_millis(self.sampling_period_ms)
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    #[must_use]
    pub fn classifier_window(&self) -> chrono::Duration {
        i64::try_from(self.classifier_window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    #[must_use]
    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_millis(self.classifier_timeout_ms)
    }

    #[must_use]
    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_millis(self.notifier_timeout_ms)
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_secs)
    }
}
